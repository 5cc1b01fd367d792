//! Linux/Android backend: epoll. Grounded directly on mio's
//! `sys::unix::selector::epoll` — same edge-triggered-internally,
//! level-triggered-to-callers contract, same `epoll_event.u64` token
//! encoding.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

use libc::{EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN, EPOLLOUT, EPOLLRDHUP};

use crate::error::Result;
use crate::poller::{Interest, PollToken, RawFd};

#[derive(Debug)]
pub struct Selector {
    ep: OwnedFd,
}

impl Selector {
    pub fn new() -> Result<Selector> {
        let fd = syscall!(epoll_create1(libc::EPOLL_CLOEXEC))?;
        Ok(Selector { ep: unsafe { OwnedFd::from_raw_fd(fd) } })
    }

    pub fn register(&self, fd: RawFd, interest: Interest, token: PollToken) -> Result<()> {
        let mut event = libc::epoll_event { events: interest_to_epoll(interest), u64: token.0 };
        syscall!(epoll_ctl(self.ep.as_raw_fd(), libc::EPOLL_CTL_ADD, fd, &mut event))?;
        Ok(())
    }

    pub fn reregister(&self, fd: RawFd, interest: Interest, token: PollToken) -> Result<()> {
        let mut event = libc::epoll_event { events: interest_to_epoll(interest), u64: token.0 };
        syscall!(epoll_ctl(self.ep.as_raw_fd(), libc::EPOLL_CTL_MOD, fd, &mut event))?;
        Ok(())
    }

    pub fn deregister(&self, fd: RawFd) -> Result<()> {
        syscall!(epoll_ctl(self.ep.as_raw_fd(), libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()))?;
        Ok(())
    }

    pub fn select(&self, events: &mut Events, timeout: Option<Duration>) -> Result<()> {
        let timeout_ms = match timeout {
            None => -1,
            Some(to) => to
                .checked_add(Duration::from_nanos(999_999))
                .unwrap_or(to)
                .as_millis() as libc::c_int,
        };
        events.inner.clear();
        events.inner.resize(events.capacity, unsafe { std::mem::zeroed() });
        let n = syscall!(epoll_wait(
            self.ep.as_raw_fd(),
            events.inner.as_mut_ptr(),
            events.capacity as i32,
            timeout_ms,
        ))?;
        events.inner.truncate(n as usize);
        Ok(())
    }
}

fn interest_to_epoll(interest: Interest) -> u32 {
    let mut kind = EPOLLET as u32;
    if interest.is_readable() {
        kind |= (EPOLLIN | EPOLLRDHUP) as u32;
    }
    if interest.is_writable() {
        kind |= EPOLLOUT as u32;
    }
    kind
}

pub struct Events {
    inner: Vec<libc::epoll_event>,
    capacity: usize,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Events {
        Events { inner: Vec::with_capacity(capacity), capacity }
    }

    pub fn iter(&self) -> impl Iterator<Item = &libc::epoll_event> {
        self.inner.iter()
    }
}

pub mod event {
    use crate::poller::PollToken;

    // `libc::epoll_event` is packed on some targets; copy fields out before
    // use rather than taking references into the struct (mio does the same
    // in its `debug_details`).
    pub fn token(event: &libc::epoll_event) -> PollToken {
        let u64_ = event.u64;
        PollToken(u64_)
    }

    pub fn is_readable(event: &libc::epoll_event) -> bool {
        let events = event.events;
        (events as libc::c_int & (super::EPOLLIN | super::EPOLLHUP)) != 0
    }

    pub fn is_writable(event: &libc::epoll_event) -> bool {
        let events = event.events;
        (events as libc::c_int & (super::EPOLLOUT | super::EPOLLHUP)) != 0
    }

    pub fn is_error(event: &libc::epoll_event) -> bool {
        let events = event.events;
        (events as libc::c_int & super::EPOLLERR) != 0
    }
}
