//! Pipe handle ("Pipe: unix domain socket, optional IPC mode with
//! FD-passing"). Backed by `AF_UNIX` `SOCK_STREAM`, same as libuv's
//! `uv_pipe_t` on unix; `ipc` mode turns on `SCM_RIGHTS` framing in the
//! stream engine.

use std::ffi::CString;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::evloop::Loop;
use crate::handle::{Handle, HandleFlags, HandleId, HandleKind, HandlePayload};
use crate::poller::Interest;
use crate::stream::{AcceptCallback, StreamState};

pub fn init(loop_: &mut Loop, ipc: bool) -> Result<HandleId> {
    let fd = new_socket()?;
    let id = loop_.alloc_handle_id();
    let mut state = StreamState::with_fd(fd);
    state.ipc = ipc;
    let mut handle = Handle::new(id, HandleKind::Pipe, HandlePayload::Pipe(state));
    if ipc {
        handle.flags.insert(HandleFlags::IPC);
    }
    Ok(loop_.insert_handle(handle))
}

fn new_socket() -> Result<OwnedFd> {
    let fd = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(Error::from_io(&io::Error::last_os_error()));
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

pub fn bind(loop_: &mut Loop, id: HandleId, path: &Path) -> Result<()> {
    let fd = stream_fd(loop_, id)?;
    let (addr, len) = sockaddr_un(path)?;
    let rc = unsafe { libc::bind(fd, &addr as *const _ as *const libc::sockaddr, len) };
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

pub fn connect(
    loop_: &mut Loop,
    id: HandleId,
    path: &Path,
    cb: crate::stream::ConnectCallback,
) -> Result<()> {
    let fd = stream_fd(loop_, id)?;
    let (addr, len) = sockaddr_un(path)?;
    let rc = unsafe { libc::connect(fd, &addr as *const _ as *const libc::sockaddr, len) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::WouldBlock {
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

/// Wraps an fd accepted by `evloop::Loop::stream_accept`, or the parent end
/// of a process's IPC stdio slot, in a fresh Pipe handle.
pub fn adopt(loop_: &mut Loop, fd: OwnedFd, ipc: bool) -> HandleId {
    let id = loop_.alloc_handle_id();
    let mut state = StreamState::with_fd(fd);
    state.ipc = ipc;
    let handle = Handle::new(id, HandleKind::Pipe, HandlePayload::Pipe(state));
    loop_.insert_handle(handle)
}

fn stream_fd(loop_: &Loop, id: HandleId) -> Result<RawFd> {
    loop_.get(id).and_then(|h| h.payload.stream()).and_then(|s| s.raw_fd()).ok_or(Error::BadF)
}

fn sockaddr_un(path: &Path) -> Result<(libc::sockaddr_un, libc::socklen_t)> {
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    let bytes = path.as_os_str().as_bytes();
    if bytes.len() >= addr.sun_path.len() {
        return Err(Error::Inval);
    }
    let cstr = CString::new(bytes).map_err(|_| Error::Inval)?;
    let cstr_bytes = cstr.as_bytes_with_nul();
    for (dst, src) in addr.sun_path.iter_mut().zip(cstr_bytes.iter()) {
        *dst = *src as libc::c_char;
    }
    let len = std::mem::size_of::<libc::sa_family_t>() + cstr_bytes.len();
    Ok((addr, len as libc::socklen_t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_sets_ipc_flag() {
        let mut loop_ = Loop::new(crate::evloop::LoopConfig::default()).unwrap();
        let id = init(&mut loop_, true).unwrap();
        let handle = loop_.get(id).unwrap();
        assert!(handle.flags.contains(HandleFlags::IPC));
        assert!(handle.payload.stream().unwrap().ipc);
    }
}
