//! Filesystem ops. Every blocking call here is packaged as a request and
//! dispatched through the thread pool; each has a `_sync` twin that runs
//! `work_fn` inline on whatever thread calls it (typically the loop thread),
//! with no callback and no pool involved.

pub mod resolver;
pub mod stat;

use std::ffi::CString;
use std::io;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::evloop::Loop;
use crate::pool::{Completion, WorkFn};
use crate::request::{RequestId, RequestKind};
pub use stat::StatRecord;

pub type ResultCallback<T> = Box<dyn FnOnce(&mut Loop, Result<T>) + Send>;

/// Runs `work` on the thread pool, delivering its result to `cb` back on the
/// loop thread; a request canceled before `work` is drained delivers
/// `Error::Canceled` instead of `work`'s own result.
fn submit<T>(loop_: &mut Loop, work: impl FnOnce() -> Result<T> + Send + 'static, cb: ResultCallback<T>) -> RequestId
where
    T: Send + 'static,
{
    let work_fn: WorkFn = Box::new(move || {
        let result = work();
        let completion: Completion = Box::new(move |loop_, _id, canceled| {
            if canceled {
                cb(loop_, Err(Error::Canceled));
            } else {
                cb(loop_, result);
            }
        });
        completion
    });
    loop_.submit_work(RequestKind::Fs, None, work_fn)
}

fn cstr(path: &Path) -> Result<CString> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(path.as_os_str().as_bytes()).map_err(|_| Error::Inval)
}

fn check(rc: libc::c_int) -> Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(Error::from_io(&io::Error::last_os_error()))
    }
}

// ---- open/close ------------------------------------------------------------

pub fn open_sync(path: &Path, flags: i32, mode: u32) -> Result<RawFd> {
    let c = cstr(path)?;
    let fd = unsafe { libc::open(c.as_ptr(), flags, mode as libc::mode_t) };
    if fd < 0 {
        Err(Error::from_io(&io::Error::last_os_error()))
    } else {
        Ok(fd)
    }
}

pub fn open(loop_: &mut Loop, path: impl AsRef<Path>, flags: i32, mode: u32, cb: ResultCallback<RawFd>) -> RequestId {
    let path = path.as_ref().to_path_buf();
    submit(loop_, move || open_sync(&path, flags, mode), cb)
}

pub fn close_sync(fd: RawFd) -> Result<()> {
    check(unsafe { libc::close(fd) })
}

pub fn close(loop_: &mut Loop, fd: RawFd, cb: ResultCallback<()>) -> RequestId {
    submit(loop_, move || close_sync(fd), cb)
}

// ---- read/write (positional: fs read/write take an explicit offset,
// mirroring pread/pwrite rather than the stream engine's sequential read) --

pub fn read_sync(fd: RawFd, len: usize, offset: i64) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let n = if offset < 0 {
        unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, len) }
    } else {
        unsafe { libc::pread(fd, buf.as_mut_ptr() as *mut _, len, offset as libc::off_t) }
    };
    if n < 0 {
        return Err(Error::from_io(&io::Error::last_os_error()));
    }
    buf.truncate(n as usize);
    Ok(buf)
}

pub fn read(loop_: &mut Loop, fd: RawFd, len: usize, offset: i64, cb: ResultCallback<Vec<u8>>) -> RequestId {
    submit(loop_, move || read_sync(fd, len, offset), cb)
}

pub fn write_sync(fd: RawFd, data: &[u8], offset: i64) -> Result<usize> {
    let n = if offset < 0 {
        unsafe { libc::write(fd, data.as_ptr() as *const _, data.len()) }
    } else {
        unsafe { libc::pwrite(fd, data.as_ptr() as *const _, data.len(), offset as libc::off_t) }
    };
    if n < 0 {
        Err(Error::from_io(&io::Error::last_os_error()))
    } else {
        Ok(n as usize)
    }
}

pub fn write(loop_: &mut Loop, fd: RawFd, data: Vec<u8>, offset: i64, cb: ResultCallback<usize>) -> RequestId {
    submit(loop_, move || write_sync(fd, &data, offset), cb)
}

// ---- stat/fstat/lstat -------------------------------------------------------

pub fn stat_sync(path: &Path) -> Result<StatRecord> {
    let c = cstr(path)?;
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    check(unsafe { libc::stat(c.as_ptr(), &mut st) })?;
    Ok(StatRecord::from_raw(&st))
}

pub fn stat(loop_: &mut Loop, path: impl AsRef<Path>, cb: ResultCallback<StatRecord>) -> RequestId {
    let path = path.as_ref().to_path_buf();
    submit(loop_, move || stat_sync(&path), cb)
}

pub fn lstat_sync(path: &Path) -> Result<StatRecord> {
    let c = cstr(path)?;
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    check(unsafe { libc::lstat(c.as_ptr(), &mut st) })?;
    Ok(StatRecord::from_raw(&st))
}

pub fn lstat(loop_: &mut Loop, path: impl AsRef<Path>, cb: ResultCallback<StatRecord>) -> RequestId {
    let path = path.as_ref().to_path_buf();
    submit(loop_, move || lstat_sync(&path), cb)
}

pub fn fstat_sync(fd: RawFd) -> Result<StatRecord> {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    check(unsafe { libc::fstat(fd, &mut st) })?;
    Ok(StatRecord::from_raw(&st))
}

pub fn fstat(loop_: &mut Loop, fd: RawFd, cb: ResultCallback<StatRecord>) -> RequestId {
    submit(loop_, move || fstat_sync(fd), cb)
}

// ---- rename/unlink/mkdir/rmdir ----------------------------------------------

pub fn rename_sync(from: &Path, to: &Path) -> Result<()> {
    let from = cstr(from)?;
    let to = cstr(to)?;
    check(unsafe { libc::rename(from.as_ptr(), to.as_ptr()) })
}

pub fn rename(loop_: &mut Loop, from: impl AsRef<Path>, to: impl AsRef<Path>, cb: ResultCallback<()>) -> RequestId {
    let (from, to) = (from.as_ref().to_path_buf(), to.as_ref().to_path_buf());
    submit(loop_, move || rename_sync(&from, &to), cb)
}

pub fn unlink_sync(path: &Path) -> Result<()> {
    let c = cstr(path)?;
    check(unsafe { libc::unlink(c.as_ptr()) })
}

pub fn unlink(loop_: &mut Loop, path: impl AsRef<Path>, cb: ResultCallback<()>) -> RequestId {
    let path = path.as_ref().to_path_buf();
    submit(loop_, move || unlink_sync(&path), cb)
}

pub fn rmdir_sync(path: &Path) -> Result<()> {
    let c = cstr(path)?;
    check(unsafe { libc::rmdir(c.as_ptr()) })
}

pub fn rmdir(loop_: &mut Loop, path: impl AsRef<Path>, cb: ResultCallback<()>) -> RequestId {
    let path = path.as_ref().to_path_buf();
    submit(loop_, move || rmdir_sync(&path), cb)
}

pub fn mkdir_sync(path: &Path, mode: u32) -> Result<()> {
    let c = cstr(path)?;
    check(unsafe { libc::mkdir(c.as_ptr(), mode as libc::mode_t) })
}

pub fn mkdir(loop_: &mut Loop, path: impl AsRef<Path>, mode: u32, cb: ResultCallback<()>) -> RequestId {
    let path = path.as_ref().to_path_buf();
    submit(loop_, move || mkdir_sync(&path, mode), cb)
}

// ---- readdir/symlink/readlink -----------------------------------------------

pub fn readdir_sync(path: &Path) -> Result<Vec<String>> {
    // `std::fs::read_dir` already wraps opendir/readdir correctly (including
    // skipping `.`/`..`); no reason to hand-roll the raw syscalls here.
    let entries = std::fs::read_dir(path).map_err(|e| Error::from_io(&e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::from_io(&e))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

pub fn readdir(loop_: &mut Loop, path: impl AsRef<Path>, cb: ResultCallback<Vec<String>>) -> RequestId {
    let path = path.as_ref().to_path_buf();
    submit(loop_, move || readdir_sync(&path), cb)
}

pub fn symlink_sync(target: &Path, link: &Path) -> Result<()> {
    let target = cstr(target)?;
    let link = cstr(link)?;
    check(unsafe { libc::symlink(target.as_ptr(), link.as_ptr()) })
}

pub fn symlink(loop_: &mut Loop, target: impl AsRef<Path>, link: impl AsRef<Path>, cb: ResultCallback<()>) -> RequestId {
    let (target, link) = (target.as_ref().to_path_buf(), link.as_ref().to_path_buf());
    submit(loop_, move || symlink_sync(&target, &link), cb)
}

pub fn readlink_sync(path: &Path) -> Result<PathBuf> {
    std::fs::read_link(path).map_err(|e| Error::from_io(&e))
}

pub fn readlink(loop_: &mut Loop, path: impl AsRef<Path>, cb: ResultCallback<PathBuf>) -> RequestId {
    let path = path.as_ref().to_path_buf();
    submit(loop_, move || readlink_sync(&path), cb)
}

// ---- permissions/ownership/timestamps ---------------------------------------

pub fn chmod_sync(path: &Path, mode: u32) -> Result<()> {
    let c = cstr(path)?;
    check(unsafe { libc::chmod(c.as_ptr(), mode as libc::mode_t) })
}

pub fn chmod(loop_: &mut Loop, path: impl AsRef<Path>, mode: u32, cb: ResultCallback<()>) -> RequestId {
    let path = path.as_ref().to_path_buf();
    submit(loop_, move || chmod_sync(&path, mode), cb)
}

pub fn fchmod_sync(fd: RawFd, mode: u32) -> Result<()> {
    check(unsafe { libc::fchmod(fd, mode as libc::mode_t) })
}

pub fn fchmod(loop_: &mut Loop, fd: RawFd, mode: u32, cb: ResultCallback<()>) -> RequestId {
    submit(loop_, move || fchmod_sync(fd, mode), cb)
}

pub fn chown_sync(path: &Path, uid: u32, gid: u32) -> Result<()> {
    let c = cstr(path)?;
    check(unsafe { libc::chown(c.as_ptr(), uid, gid) })
}

pub fn chown(loop_: &mut Loop, path: impl AsRef<Path>, uid: u32, gid: u32, cb: ResultCallback<()>) -> RequestId {
    let path = path.as_ref().to_path_buf();
    submit(loop_, move || chown_sync(&path, uid, gid), cb)
}

pub fn fchown_sync(fd: RawFd, uid: u32, gid: u32) -> Result<()> {
    check(unsafe { libc::fchown(fd, uid, gid) })
}

pub fn fchown(loop_: &mut Loop, fd: RawFd, uid: u32, gid: u32, cb: ResultCallback<()>) -> RequestId {
    submit(loop_, move || fchown_sync(fd, uid, gid), cb)
}

fn timespec(seconds: f64) -> libc::timespec {
    libc::timespec { tv_sec: seconds.trunc() as libc::time_t, tv_nsec: (seconds.fract() * 1e9) as i64 }
}

pub fn utime_sync(path: &Path, atime: f64, mtime: f64) -> Result<()> {
    let c = cstr(path)?;
    let times = [timespec(atime), timespec(mtime)];
    check(unsafe { libc::utimensat(libc::AT_FDCWD, c.as_ptr(), times.as_ptr(), 0) })
}

pub fn utime(loop_: &mut Loop, path: impl AsRef<Path>, atime: f64, mtime: f64, cb: ResultCallback<()>) -> RequestId {
    let path = path.as_ref().to_path_buf();
    submit(loop_, move || utime_sync(&path, atime, mtime), cb)
}

pub fn futimes_sync(fd: RawFd, atime: f64, mtime: f64) -> Result<()> {
    let times = [timespec(atime), timespec(mtime)];
    check(unsafe { libc::futimens(fd, times.as_ptr()) })
}

pub fn futimes(loop_: &mut Loop, fd: RawFd, atime: f64, mtime: f64, cb: ResultCallback<()>) -> RequestId {
    submit(loop_, move || futimes_sync(fd, atime, mtime), cb)
}

// ---- fsync/fdatasync/ftruncate/sendfile/access ------------------------------

pub fn fsync_sync(fd: RawFd) -> Result<()> {
    check(unsafe { libc::fsync(fd) })
}

pub fn fsync(loop_: &mut Loop, fd: RawFd, cb: ResultCallback<()>) -> RequestId {
    submit(loop_, move || fsync_sync(fd), cb)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn fdatasync_sync(fd: RawFd) -> Result<()> {
    check(unsafe { libc::fdatasync(fd) })
}
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn fdatasync_sync(fd: RawFd) -> Result<()> {
    fsync_sync(fd)
}

pub fn fdatasync(loop_: &mut Loop, fd: RawFd, cb: ResultCallback<()>) -> RequestId {
    submit(loop_, move || fdatasync_sync(fd), cb)
}

pub fn ftruncate_sync(fd: RawFd, len: i64) -> Result<()> {
    check(unsafe { libc::ftruncate(fd, len as libc::off_t) })
}

pub fn ftruncate(loop_: &mut Loop, fd: RawFd, len: i64, cb: ResultCallback<()>) -> RequestId {
    submit(loop_, move || ftruncate_sync(fd, len), cb)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn sendfile_sync(out_fd: RawFd, in_fd: RawFd, offset: i64, count: usize) -> Result<usize> {
    let mut off = offset as libc::off_t;
    let n = unsafe { libc::sendfile(out_fd, in_fd, &mut off, count) };
    if n < 0 {
        Err(Error::from_io(&io::Error::last_os_error()))
    } else {
        Ok(n as usize)
    }
}

/// BSD/Darwin's `sendfile(2)` takes a different shape (output/input fds
/// swapped, length in/out by pointer); rather than matching its exact
/// signature, fall back to a plain `pread`/`write` copy loop, same observable
/// result for this core's purposes.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn sendfile_sync(out_fd: RawFd, in_fd: RawFd, offset: i64, count: usize) -> Result<usize> {
    let chunk = read_sync(in_fd, count, offset)?;
    write_sync(out_fd, &chunk, -1)
}

pub fn sendfile(
    loop_: &mut Loop,
    out_fd: RawFd,
    in_fd: RawFd,
    offset: i64,
    count: usize,
    cb: ResultCallback<usize>,
) -> RequestId {
    submit(loop_, move || sendfile_sync(out_fd, in_fd, offset, count), cb)
}

pub fn access_sync(path: &Path, mode: i32) -> Result<()> {
    let c = cstr(path)?;
    check(unsafe { libc::access(c.as_ptr(), mode) })
}

pub fn access(loop_: &mut Loop, path: impl AsRef<Path>, mode: i32, cb: ResultCallback<()>) -> RequestId {
    let path = path.as_ref().to_path_buf();
    submit(loop_, move || access_sync(&path, mode), cb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_sync_reads_own_crate_manifest() {
        let record = stat_sync(Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml").as_path()).unwrap();
        assert!(record.size > 0);
    }

    #[test]
    fn mkdir_rmdir_round_trip() {
        let dir = std::env::temp_dir().join(format!("aioloop-fs-test-{}", std::process::id()));
        mkdir_sync(&dir, 0o755).unwrap();
        assert!(dir.is_dir());
        rmdir_sync(&dir).unwrap();
        assert!(!dir.exists());
    }
}
