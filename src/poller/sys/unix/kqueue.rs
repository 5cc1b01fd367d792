//! BSD/Darwin backend: kqueue. Grounded on mio's
//! `sys::unix::selector::kqueue`: one `EVFILT_READ`/`EVFILT_WRITE`
//! registration per interest, `EV_CLEAR` so the kernel hands us
//! edge-triggered notifications the same way epoll's `EPOLLET` does,
//! re-armed by the caller every iteration it still wants the interest.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

use crate::error::Result;
use crate::poller::{Interest, PollToken, RawFd};

#[derive(Debug)]
pub struct Selector {
    kq: OwnedFd,
}

impl Selector {
    pub fn new() -> Result<Selector> {
        let fd = syscall!(kqueue())?;
        syscall!(fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC))?;
        Ok(Selector { kq: unsafe { OwnedFd::from_raw_fd(fd) } })
    }

    fn change(&self, fd: RawFd, interest: Interest, token: PollToken, op: EventOp) -> Result<()> {
        let mut changes = Vec::with_capacity(2);
        let flags: libc::c_int = match op {
            EventOp::Add => (libc::EV_ADD | libc::EV_CLEAR) as libc::c_int,
            EventOp::Delete => libc::EV_DELETE as libc::c_int,
        };
        if interest.is_readable() || op == EventOp::Delete {
            changes.push(kevent(fd, libc::EVFILT_READ as libc::c_int, flags, token));
        }
        if interest.is_writable() || op == EventOp::Delete {
            changes.push(kevent(fd, libc::EVFILT_WRITE as libc::c_int, flags, token));
        }
        syscall!(kevent(
            self.kq.as_raw_fd(),
            changes.as_ptr(),
            changes.len() as libc::c_int,
            std::ptr::null_mut(),
            0,
            std::ptr::null(),
        ))?;
        Ok(())
    }

    pub fn register(&self, fd: RawFd, interest: Interest, token: PollToken) -> Result<()> {
        self.change(fd, interest, token, EventOp::Add)
    }

    pub fn reregister(&self, fd: RawFd, interest: Interest, token: PollToken) -> Result<()> {
        // kqueue has no MOD; deleting a filter that was never added is
        // harmless (ENOENT, ignored), so just re-add what's wanted.
        let _ = self.change(fd, Interest::READABLE | Interest::WRITABLE, token, EventOp::Delete);
        self.change(fd, interest, token, EventOp::Add)
    }

    pub fn deregister(&self, fd: RawFd) -> Result<()> {
        self.change(fd, Interest::READABLE | Interest::WRITABLE, PollToken(0), EventOp::Delete)
    }

    pub fn select(&self, events: &mut Events, timeout: Option<Duration>) -> Result<()> {
        let ts = timeout.map(|to| libc::timespec {
            tv_sec: to.as_secs() as libc::time_t,
            tv_nsec: to.subsec_nanos() as libc::c_long,
        });
        events.inner.resize(events.capacity, unsafe { std::mem::zeroed() });
        let n = syscall!(kevent(
            self.kq.as_raw_fd(),
            std::ptr::null(),
            0,
            events.inner.as_mut_ptr(),
            events.capacity as libc::c_int,
            ts.as_ref().map_or(std::ptr::null(), |t| t as *const _),
        ))?;
        events.inner.truncate(n as usize);
        Ok(())
    }
}

#[derive(PartialEq)]
enum EventOp {
    Add,
    Delete,
}

fn kevent(fd: RawFd, filter: libc::c_int, flags: libc::c_int, token: PollToken) -> libc::kevent {
    libc::kevent {
        ident: fd as libc::uintptr_t,
        filter: filter as _,
        flags: flags as _,
        fflags: 0,
        data: 0,
        udata: token.0 as *mut libc::c_void,
    }
}

pub struct Events {
    inner: Vec<libc::kevent>,
    capacity: usize,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Events {
        Events { inner: Vec::with_capacity(capacity), capacity }
    }

    pub fn iter(&self) -> impl Iterator<Item = &libc::kevent> {
        self.inner.iter()
    }
}

pub mod event {
    use crate::poller::PollToken;

    pub fn token(event: &libc::kevent) -> PollToken {
        PollToken(event.udata as u64)
    }

    pub fn is_readable(event: &libc::kevent) -> bool {
        event.filter == libc::EVFILT_READ as _
    }

    pub fn is_writable(event: &libc::kevent) -> bool {
        event.filter == libc::EVFILT_WRITE as _
    }

    pub fn is_error(event: &libc::kevent) -> bool {
        (event.flags & libc::EV_ERROR as libc::c_ushort) != 0
    }
}
