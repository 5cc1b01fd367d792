//! TCP handle ("Tcp: socket, bind, connect, listen/accept, keepalive,
//! nodelay"). Kind-specific setup only; read/write/shutdown/backpressure all
//! live in the stream engine (`crate::evloop`'s stream ops) shared with
//! `Pipe`/`Tty`.

use std::io;
use std::net::SocketAddr;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use crate::error::{Error, Result};
use crate::evloop::Loop;
use crate::handle::{Handle, HandleId, HandleKind, HandlePayload};
use crate::poller::Interest;
use crate::stream::{AcceptCallback, ConnectCallback, StreamState};

/// Creates an unbound, non-blocking TCP handle (`socket()` only; bind/connect
/// are separate calls, same as `uv_tcp_init`).
pub fn init(loop_: &mut Loop, domain: Domain) -> Result<HandleId> {
    let fd = new_socket(domain)?;
    let id = loop_.alloc_handle_id();
    let handle = Handle::new(id, HandleKind::Tcp, HandlePayload::Tcp(StreamState::with_fd(fd)));
    Ok(loop_.insert_handle(handle))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    V4,
    V6,
}

fn new_socket(domain: Domain) -> Result<OwnedFd> {
    let af = match domain {
        Domain::V4 => libc::AF_INET,
        Domain::V6 => libc::AF_INET6,
    };
    let fd = unsafe { libc::socket(af, libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(Error::from_io(&io::Error::last_os_error()));
    }
    let one: libc::c_int = 1;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &one as *const _ as *const _,
            std::mem::size_of_val(&one) as u32,
        );
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

pub fn bind(loop_: &mut Loop, id: HandleId, addr: SocketAddr) -> Result<()> {
    let fd = stream_fd(loop_, id)?;
    let (storage, len) = sockaddr_from(addr);
    let rc = unsafe { libc::bind(fd, &storage as *const _ as *const libc::sockaddr, len) };
    if rc != 0 {
        return Err(Error::from_io(&io::Error::last_os_error()));
    }
    Ok(())
}

pub fn listen(loop_: &mut Loop, id: HandleId, backlog: i32, cb: AcceptCallback) -> Result<()> {
    let fd = stream_fd(loop_, id)?;
    let rc = unsafe { libc::listen(fd, backlog) };
    if rc != 0 {
        return Err(Error::from_io(&io::Error::last_os_error()));
    }
    loop_.stream_listen(id, backlog, cb)
}

/// Starts a non-blocking `connect()`; completion (success or error) arrives
/// through `cb` the next time the fd is writable-ready, same as libuv's
/// `uv_tcp_connect` riding on `EINPROGRESS`.
pub fn connect(loop_: &mut Loop, id: HandleId, addr: SocketAddr, cb: ConnectCallback) -> Result<()> {
    let fd = stream_fd(loop_, id)?;
    let (storage, len) = sockaddr_from(addr);
    let rc = unsafe { libc::connect(fd, &storage as *const _ as *const libc::sockaddr, len) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::WouldBlock && Error::from_io(&err) != Error::Again {
            return Err(Error::from_io(&err));
        }
    }
    if let Some(handle) = loop_.get_mut(id) {
        if let Some(stream) = handle.payload.stream_mut() {
            stream.connect_cb = Some(cb);
        }
        handle.activate();
    }
    loop_.register_stream(id, Interest::WRITABLE)
}

/// Wraps an fd accepted by `evloop::Loop::stream_accept` (or inherited from a
/// spawned process's stdio) in a fresh, already-connected Tcp handle.
pub fn adopt(loop_: &mut Loop, fd: OwnedFd) -> HandleId {
    let id = loop_.alloc_handle_id();
    let handle = Handle::new(id, HandleKind::Tcp, HandlePayload::Tcp(StreamState::with_fd(fd)));
    loop_.insert_handle(handle)
}

fn stream_fd(loop_: &Loop, id: HandleId) -> Result<RawFd> {
    loop_.get(id).and_then(|h| h.payload.stream()).and_then(|s| s.raw_fd()).ok_or(Error::BadF)
}

/// The address the kernel actually bound, e.g. to recover the ephemeral
/// port after `bind`ing to port 0.
pub fn local_addr(loop_: &Loop, id: HandleId) -> Result<SocketAddr> {
    let fd = stream_fd(loop_, id)?;
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let rc = unsafe { libc::getsockname(fd, &mut storage as *mut _ as *mut libc::sockaddr, &mut len) };
    if rc != 0 {
        return Err(Error::from_io(&io::Error::last_os_error()));
    }
    sockaddr_to_std(&storage).ok_or(Error::Inval)
}

fn sockaddr_to_std(storage: &libc::sockaddr_storage) -> Option<SocketAddr> {
    use std::net::{Ipv4Addr, Ipv6Addr};
    unsafe {
        match storage.ss_family as libc::c_int {
            libc::AF_INET => {
                let sin = &*(storage as *const _ as *const libc::sockaddr_in);
                let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
                Some(SocketAddr::new(ip.into(), u16::from_be(sin.sin_port)))
            }
            libc::AF_INET6 => {
                let sin6 = &*(storage as *const _ as *const libc::sockaddr_in6);
                let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
                Some(SocketAddr::new(ip.into(), u16::from_be(sin6.sin6_port)))
            }
            _ => None,
        }
    }
}

fn sockaddr_from(addr: SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let len = match addr {
        SocketAddr::V4(v4) => {
            let sin = libc::sockaddr_in {
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: v4.port().to_be(),
                sin_addr: libc::in_addr { s_addr: u32::from_ne_bytes(v4.ip().octets()) },
                sin_zero: [0; 8],
            };
            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in, sin);
            }
            std::mem::size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let sin6 = libc::sockaddr_in6 {
                sin6_family: libc::AF_INET6 as libc::sa_family_t,
                sin6_port: v6.port().to_be(),
                sin6_flowinfo: v6.flowinfo(),
                sin6_addr: libc::in6_addr { s6_addr: v6.ip().octets() },
                sin6_scope_id: v6.scope_id(),
            };
            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in6, sin6);
            }
            std::mem::size_of::<libc::sockaddr_in6>()
        }
    };
    (storage, len as libc::socklen_t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_nonblocking_socket() {
        let mut loop_ = Loop::new(crate::evloop::LoopConfig::default()).unwrap();
        let id = init(&mut loop_, Domain::V4).unwrap();
        assert!(loop_.get(id).unwrap().payload.stream().unwrap().raw_fd().is_some());
    }
}
