//! The stream engine shared by Tcp/Pipe/Tty: read/write/shutdown,
//! backpressure bookkeeping, and FD-passing. Orchestration (calling
//! `alloc_cb`/`read_cb`, invoking queued write callbacks) happens in
//! `crate::evloop` where a `&mut Loop` is available; this module owns the
//! per-stream state plus the raw, callback-free read/write primitives,
//! mirroring how `StreamWrap`'s `DoRead`/`DoWrite` sit below libuv's
//! callback dispatch in the original source.

pub mod write_queue;

use std::collections::VecDeque;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use crate::error::{Error, Result};
use crate::handle::HandleId;
pub use write_queue::{PendingWrite, WriteCallback, WriteQueue};

pub type AllocCallback = Box<dyn FnMut(usize) -> Vec<u8>>;
/// `Ok(Some(buf))` is a chunk of data, `Ok(None)` is EOF: a read-to-EOF
/// convention rather than mio's raw byte-count return.
pub type ReadCallback =
    Box<dyn FnMut(&mut crate::evloop::Loop, HandleId, Result<Option<&[u8]>>)>;
pub type ShutdownCallback = Box<dyn FnMut(&mut crate::evloop::Loop, HandleId, Result<()>)>;
pub type ConnectCallback = Box<dyn FnMut(&mut crate::evloop::Loop, HandleId, Result<()>)>;
pub type AcceptCallback = Box<dyn FnMut(&mut crate::evloop::Loop, HandleId)>;

pub struct StreamState {
    pub fd: Option<OwnedFd>,
    /// True for the one pipe slot the host may use to pass fds alongside
    /// data ("FD-passing"; original source's `OnRead2`/pending
    /// handle type).
    pub ipc: bool,
    pub alloc_cb: Option<AllocCallback>,
    pub read_cb: Option<ReadCallback>,
    pub write_queue: WriteQueue,
    pub shutdown_cb: Option<ShutdownCallback>,
    pub connect_cb: Option<ConnectCallback>,
    pub listening: bool,
    pub backlog: i32,
    pub accept_cb: Option<AcceptCallback>,
    pub accept_queue: VecDeque<OwnedFd>,
    /// Fds received via IPC ancillary data, paired 1:1 with the data chunk
    /// they arrived alongside; drained by the host same as `accept_queue`.
    pub received_fds: VecDeque<OwnedFd>,
}

impl StreamState {
    pub fn new() -> StreamState {
        StreamState {
            fd: None,
            ipc: false,
            alloc_cb: None,
            read_cb: None,
            write_queue: WriteQueue::new(),
            shutdown_cb: None,
            connect_cb: None,
            listening: false,
            backlog: 0,
            accept_cb: None,
            accept_queue: VecDeque::new(),
            received_fds: VecDeque::new(),
        }
    }

    pub fn with_fd(fd: OwnedFd) -> StreamState {
        StreamState { fd: Some(fd), ..StreamState::new() }
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        use std::os::fd::AsRawFd;
        self.fd.as_ref().map(|f| f.as_raw_fd())
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
pub fn raw_read(fd: RawFd, buf: &mut [u8]) -> Result<usize> {
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return Err(Error::from_io(&err));
    }
}

#[cfg(unix)]
pub fn raw_write(fd: RawFd, buf: &[u8]) -> Result<usize> {
    loop {
        let n = unsafe { libc::write(fd, buf.as_ptr() as *const _, buf.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return Err(Error::from_io(&err));
    }
}

/// `recvmsg` with an `SCM_RIGHTS` ancillary buffer large enough for one fd,
/// for the IPC pipe slot ("FD-passing").
#[cfg(unix)]
pub fn raw_read_ipc(fd: RawFd, buf: &mut [u8]) -> Result<(usize, Option<OwnedFd>)> {
    let mut iov = libc::iovec { iov_base: buf.as_mut_ptr() as *mut _, iov_len: buf.len() };
    let mut cbuf = [0u8; cmsg_space_one_fd()];
    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cbuf.as_mut_ptr() as *mut _;
    msg.msg_controllen = cbuf.len() as _;

    let n = loop {
        let n = unsafe { libc::recvmsg(fd, &mut msg, 0) };
        if n >= 0 {
            break n;
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return Err(Error::from_io(&err));
    };

    let mut received_fd = None;
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            let hdr = &*cmsg;
            if hdr.cmsg_level == libc::SOL_SOCKET && hdr.cmsg_type == libc::SCM_RIGHTS {
                let data = libc::CMSG_DATA(cmsg) as *const libc::c_int;
                let raw_fd = std::ptr::read_unaligned(data);
                received_fd = Some(OwnedFd::from_raw_fd(raw_fd));
                break;
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }

    Ok((n as usize, received_fd))
}

#[cfg(unix)]
pub fn raw_write_ipc(fd: RawFd, buf: &[u8], send_fd: Option<RawFd>) -> Result<usize> {
    let mut iov = libc::iovec { iov_base: buf.as_ptr() as *mut _, iov_len: buf.len() };
    let mut cbuf = [0u8; cmsg_space_one_fd()];
    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;

    if let Some(passed) = send_fd {
        msg.msg_control = cbuf.as_mut_ptr() as *mut _;
        msg.msg_controllen = cbuf.len() as _;
        unsafe {
            let cmsg = libc::CMSG_FIRSTHDR(&msg);
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = libc::SCM_RIGHTS;
            (*cmsg).cmsg_len = libc::CMSG_LEN(std::mem::size_of::<libc::c_int>() as u32) as _;
            std::ptr::write_unaligned(libc::CMSG_DATA(cmsg) as *mut libc::c_int, passed);
        }
        msg.msg_controllen = unsafe { libc::CMSG_SPACE(std::mem::size_of::<libc::c_int>() as u32) } as _;
    }

    loop {
        let n = unsafe { libc::sendmsg(fd, &msg, 0) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return Err(Error::from_io(&err));
    }
}

#[cfg(unix)]
const fn cmsg_space_one_fd() -> usize {
    // libc::CMSG_SPACE isn't `const fn`; one fd's worth is small and fixed,
    // so size generously rather than compute it at const-eval time.
    64
}

/// Checks `SO_ERROR` on a socket whose non-blocking `connect()` just became
/// writable-ready — the only way to learn whether it actually succeeded.
#[cfg(unix)]
pub fn check_connect_error(fd: RawFd) -> Result<()> {
    let mut err: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(fd, libc::SOL_SOCKET, libc::SO_ERROR, &mut err as *mut _ as *mut _, &mut len)
    };
    if rc != 0 {
        return Err(Error::from_io(&io::Error::last_os_error()));
    }
    if err == 0 {
        Ok(())
    } else {
        Err(Error::from_errno(err))
    }
}

#[cfg(unix)]
pub fn shutdown_write(fd: RawFd) -> Result<()> {
    let rc = unsafe { libc::shutdown(fd, libc::SHUT_WR) };
    if rc == 0 {
        Ok(())
    } else {
        Err(Error::from_io(&io::Error::last_os_error()))
    }
}

#[cfg(unix)]
pub fn accept_one(listener_fd: RawFd) -> Result<Option<OwnedFd>> {
    loop {
        let fd = unsafe { libc::accept4(listener_fd, std::ptr::null_mut(), std::ptr::null_mut(), libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC) };
        if fd >= 0 {
            return Ok(Some(unsafe { OwnedFd::from_raw_fd(fd) }));
        }
        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::Interrupted => continue,
            io::ErrorKind::WouldBlock => return Ok(None),
            _ => return Err(Error::from_io(&err)),
        }
    }
}

/// Result of draining as much of the write queue as the fd currently
/// accepts without blocking (backpressure).
pub struct FlushReport {
    pub completed: Vec<PendingWrite>,
    pub failed: Option<(PendingWrite, Error)>,
}

pub fn try_flush(fd: RawFd, queue: &mut WriteQueue, ipc: bool) -> FlushReport {
    let mut completed = Vec::new();
    loop {
        let Some(front) = queue.front_mut() else {
            return FlushReport { completed, failed: None };
        };
        let send_fd = if front.written == 0 { front.send_fd } else { None };
        let result =
            if ipc { raw_write_ipc(fd, front.remaining(), send_fd) } else { raw_write(fd, front.remaining()) };
        match result {
            Ok(n) => {
                front.written += n;
                if front.is_done() {
                    completed.push(queue.pop_front().expect("front just observed Some"));
                } else {
                    return FlushReport { completed, failed: None };
                }
            }
            Err(Error::Again) => return FlushReport { completed, failed: None },
            Err(e) => {
                let failed = queue.pop_front().expect("front just observed Some");
                return FlushReport { completed, failed: Some((failed, e)) };
            }
        }
    }
}
