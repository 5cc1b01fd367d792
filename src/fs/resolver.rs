//! DNS resolution via the thread pool: `getaddrinfo` is packaged as a
//! request and dispatched through the worker pool. `getaddrinfo(3)` blocks on
//! network I/O, so unlike the rest of `crate::fs` there's no meaningful
//! `_sync` variant exposed for the loop thread to call directly — it would
//! defeat the point of a single-threaded loop.

use std::ffi::CString;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::error::{Error, Result};
use crate::evloop::Loop;
use crate::fs::ResultCallback;
use crate::pool::{Completion, WorkFn};
use crate::request::{RequestId, RequestKind};

/// Resolves `host` (optionally restricted to a `service`/port), returning
/// every address the resolver hands back, in the order libc gave them.
pub fn getaddrinfo(loop_: &mut Loop, host: &str, port: Option<u16>, cb: ResultCallback<Vec<SocketAddr>>) -> RequestId {
    let host = host.to_owned();
    let work_fn: WorkFn = Box::new(move || {
        let result = resolve(&host, port);
        let completion: Completion = Box::new(move |loop_, _id, canceled| {
            if canceled {
                cb(loop_, Err(Error::Canceled));
            } else {
                cb(loop_, result);
            }
        });
        completion
    });
    loop_.submit_work(RequestKind::GetAddrInfo, None, work_fn)
}

fn resolve(host: &str, port: Option<u16>) -> Result<Vec<SocketAddr>> {
    let c_host = CString::new(host).map_err(|_| Error::Inval)?;
    let c_port = port.map(|p| CString::new(p.to_string()).expect("port string has no interior nul"));

    let mut hints: libc::addrinfo = unsafe { std::mem::zeroed() };
    hints.ai_family = libc::AF_UNSPEC;
    hints.ai_socktype = libc::SOCK_STREAM;

    let mut res: *mut libc::addrinfo = std::ptr::null_mut();
    let rc = unsafe {
        libc::getaddrinfo(
            c_host.as_ptr(),
            c_port.as_ref().map_or(std::ptr::null(), |p| p.as_ptr()),
            &hints,
            &mut res,
        )
    };
    if rc != 0 {
        return Err(gai_error(rc));
    }

    let mut addrs = Vec::new();
    let mut cur = res;
    while !cur.is_null() {
        let ai = unsafe { &*cur };
        if let Some(addr) = sockaddr_to_std(ai) {
            addrs.push(addr);
        }
        cur = ai.ai_next;
    }
    unsafe {
        libc::freeaddrinfo(res);
    }
    Ok(addrs)
}

fn sockaddr_to_std(ai: &libc::addrinfo) -> Option<SocketAddr> {
    unsafe {
        match ai.ai_family {
            libc::AF_INET => {
                let sin = &*(ai.ai_addr as *const libc::sockaddr_in);
                let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
                Some(SocketAddr::new(IpAddr::V4(ip), u16::from_be(sin.sin_port)))
            }
            libc::AF_INET6 => {
                let sin6 = &*(ai.ai_addr as *const libc::sockaddr_in6);
                let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
                Some(SocketAddr::new(IpAddr::V6(ip), u16::from_be(sin6.sin6_port)))
            }
            _ => None,
        }
    }
}

fn gai_error(rc: libc::c_int) -> Error {
    if rc == libc::EAI_SYSTEM {
        Error::from_io(&io::Error::last_os_error())
    } else {
        // getaddrinfo's own error space doesn't map onto errno; surface it
        // as an opaque OS error rather than guessing a named kind.
        Error::Os(rc)
    }
}
