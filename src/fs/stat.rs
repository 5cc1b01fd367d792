//! The normalized stat record every `stat`/`fstat`/`lstat` completion
//! carries: a fixed set of fields, timestamps as 64-bit nanosecond counts
//! rather than platform-specific `timespec` types.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatRecord {
    pub dev: i64,
    pub mode: i64,
    pub nlink: i64,
    pub uid: i64,
    pub gid: i64,
    pub rdev: i64,
    pub ino: i64,
    pub size: i64,
    pub blksize: i64,
    pub blocks: i64,
    pub atime_ns: i64,
    pub mtime_ns: i64,
    pub ctime_ns: i64,
    /// Creation time where the OS exposes one (BSD/Darwin's `st_birthtime`);
    /// `0` on platforms (Linux) that don't track it, same as libuv's
    /// `birthtim` fallback.
    pub birthtime_ns: i64,
}

#[cfg(unix)]
impl StatRecord {
    pub(crate) fn from_raw(st: &libc::stat) -> StatRecord {
        StatRecord {
            dev: st.st_dev as i64,
            mode: st.st_mode as i64,
            nlink: st.st_nlink as i64,
            uid: st.st_uid as i64,
            gid: st.st_gid as i64,
            rdev: st.st_rdev as i64,
            ino: st.st_ino as i64,
            size: st.st_size as i64,
            blksize: st.st_blksize as i64,
            blocks: st.st_blocks as i64,
            atime_ns: to_nanos(st.st_atime, atime_nsec(st)),
            mtime_ns: to_nanos(st.st_mtime, mtime_nsec(st)),
            ctime_ns: to_nanos(st.st_ctime, ctime_nsec(st)),
            birthtime_ns: birthtime(st),
        }
    }
}

fn to_nanos(secs: libc::time_t, nsec: i64) -> i64 {
    secs as i64 * 1_000_000_000 + nsec
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn atime_nsec(st: &libc::stat) -> i64 {
    st.st_atime_nsec as i64
}
#[cfg(any(target_os = "linux", target_os = "android"))]
fn mtime_nsec(st: &libc::stat) -> i64 {
    st.st_mtime_nsec as i64
}
#[cfg(any(target_os = "linux", target_os = "android"))]
fn ctime_nsec(st: &libc::stat) -> i64 {
    st.st_ctime_nsec as i64
}
#[cfg(any(target_os = "linux", target_os = "android"))]
fn birthtime(_st: &libc::stat) -> i64 {
    0
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd"))]
fn atime_nsec(st: &libc::stat) -> i64 {
    st.st_atime_nsec as i64
}
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd"))]
fn mtime_nsec(st: &libc::stat) -> i64 {
    st.st_mtime_nsec as i64
}
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd"))]
fn ctime_nsec(st: &libc::stat) -> i64 {
    st.st_ctime_nsec as i64
}
#[cfg(any(target_os = "macos", target_os = "ios"))]
fn birthtime(st: &libc::stat) -> i64 {
    to_nanos(st.st_birthtime, st.st_birthtime_nsec as i64)
}
#[cfg(any(target_os = "freebsd", target_os = "netbsd", target_os = "openbsd"))]
fn birthtime(_st: &libc::stat) -> i64 {
    0
}
