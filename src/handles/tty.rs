//! Tty handle ("Tty: wraps an inherited fd, raw-mode toggle").
//! Always wraps an fd the host already owns (stdin/stdout/stderr, or one
//! side of a pty) rather than creating its own, unlike `Tcp`/`Pipe`.

use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use crate::error::{Error, Result};
use crate::evloop::Loop;
use crate::handle::{Handle, HandleId, HandleKind, HandlePayload};
use crate::stream::StreamState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Raw,
}

/// Wraps `fd` (which must already refer to a tty; callers check
/// `libc::isatty` before calling, same contract as `uv_tty_init`).
pub fn init(loop_: &mut Loop, fd: OwnedFd) -> Result<HandleId> {
    set_nonblocking(fd.as_raw_fd())?;
    let id = loop_.alloc_handle_id();
    let handle = Handle::new(id, HandleKind::Tty, HandlePayload::Tty(StreamState::with_fd(fd)));
    Ok(loop_.insert_handle(handle))
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(Error::from_io(&io::Error::last_os_error()));
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(Error::from_io(&io::Error::last_os_error()));
    }
    Ok(())
}

/// Switches the underlying terminal between canonical (line-buffered, echo
/// on) and raw mode, mirroring `uv_tty_set_mode`.
pub fn set_mode(loop_: &mut Loop, id: HandleId, mode: Mode) -> Result<()> {
    let fd = loop_.get(id).and_then(|h| h.payload.stream()).and_then(|s| s.raw_fd()).ok_or(Error::BadF)?;
    let mut termios: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(fd, &mut termios) } != 0 {
        return Err(Error::from_io(&io::Error::last_os_error()));
    }
    match mode {
        Mode::Raw => unsafe { libc::cfmakeraw(&mut termios) },
        Mode::Normal => {
            termios.c_lflag |= libc::ICANON | libc::ECHO | libc::ISIG;
            termios.c_iflag |= libc::ICRNL;
            termios.c_oflag |= libc::OPOST;
        }
    }
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
        return Err(Error::from_io(&io::Error::last_os_error()));
    }
    Ok(())
}

/// Current terminal size in columns/rows, for the host's resize handling
/// (`uv_tty_get_winsize`).
pub fn get_winsize(loop_: &Loop, id: HandleId) -> Result<(u16, u16)> {
    let fd = loop_.get(id).and_then(|h| h.payload.stream()).and_then(|s| s.raw_fd()).ok_or(Error::BadF)?;
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    if unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut ws) } != 0 {
        return Err(Error::from_io(&io::Error::last_os_error()));
    }
    Ok((ws.ws_col, ws.ws_row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::FromRawFd;

    #[test]
    fn init_sets_nonblocking_on_a_pipe_fd() {
        let mut fds = [0i32; 2];
        unsafe {
            libc::pipe(fds.as_mut_ptr());
        }
        let mut loop_ = Loop::new(crate::evloop::LoopConfig::default()).unwrap();
        let fd = unsafe { OwnedFd::from_raw_fd(fds[0]) };
        let id = init(&mut loop_, fd).unwrap();
        assert!(loop_.get(id).is_some());
        unsafe {
            libc::close(fds[1]);
        }
    }
}
