//! The process-wide signal self-pipe backing `handles::signal`. Follows
//! mio's/libuv's shared pattern: a signal handler may
//! only call async-signal-safe functions, so the handler does nothing but
//! `write()` the signal number to a pipe the loop already watches like any
//! other readable fd; the actual callback runs later, on the loop thread.
//!
//! One pipe per process (signal delivery is process-wide, not per-loop), set
//! up lazily the first time any loop starts watching a signal.

use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::OnceLock;

use crate::error::{Error, Result};

static WRITE_FD: AtomicI32 = AtomicI32::new(-1);
static READER: OnceLock<OwnedFd> = OnceLock::new();

extern "C" fn on_signal(signum: libc::c_int) {
    let fd = WRITE_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        let byte = signum as u8;
        unsafe {
            libc::write(fd, &byte as *const u8 as *const _, 1);
        }
    }
}

/// Ensures the self-pipe exists, returning its read end's raw fd for the
/// caller to register with a [`crate::poller::Poller`].
pub fn ensure_pipe() -> Result<RawFd> {
    if let Some(reader) = READER.get() {
        use std::os::fd::AsRawFd;
        return Ok(reader.as_raw_fd());
    }
    let mut fds = [0 as RawFd; 2];
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) };
    if rc != 0 {
        return Err(Error::from_io(&std::io::Error::last_os_error()));
    }
    WRITE_FD.store(fds[1], Ordering::Relaxed);
    let reader = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    use std::os::fd::AsRawFd;
    let raw = reader.as_raw_fd();
    let _ = READER.set(reader);
    Ok(raw)
}

/// Installs (or restores) the handler for `signum`. Idempotent; `stop_watch`
/// undoes it once the last watcher for that signal number goes away.
pub fn install_handler(signum: i32) -> Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_signal as usize;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(signum, &action, std::ptr::null_mut()) != 0 {
            return Err(Error::from_io(&std::io::Error::last_os_error()));
        }
    }
    Ok(())
}

pub fn restore_default(signum: i32) {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = libc::SIG_DFL;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(signum, &action, std::ptr::null_mut());
    }
}

/// Drains every pending byte, returning the distinct signal numbers seen
/// this wakeup (order doesn't matter; the loop dispatches each once).
pub fn drain(fd: RawFd) -> Vec<i32> {
    let mut seen = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
        if n <= 0 {
            break;
        }
        for &b in &buf[..n as usize] {
            let signum = b as i32;
            if !seen.contains(&signum) {
                seen.push(signum);
            }
        }
    }
    seen
}
