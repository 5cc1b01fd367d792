//! Fallback backend for targets without `os-poll`: every operation returns
//! `ENOSYS`-equivalent (mio's `sys::shell` does the same so the crate still
//! type-checks everywhere even without a real poller).

use std::time::Duration;

use crate::error::{Error, Result};
use crate::poller::{Interest, PollToken, RawFd};

#[derive(Debug)]
pub struct Selector;

impl Selector {
    pub fn new() -> Result<Selector> {
        Ok(Selector)
    }

    pub fn register(&self, _fd: RawFd, _interest: Interest, _token: PollToken) -> Result<()> {
        Err(Error::Os(libc_enosys()))
    }

    pub fn reregister(&self, _fd: RawFd, _interest: Interest, _token: PollToken) -> Result<()> {
        Err(Error::Os(libc_enosys()))
    }

    pub fn deregister(&self, _fd: RawFd) -> Result<()> {
        Err(Error::Os(libc_enosys()))
    }

    pub fn select(&self, _events: &mut Events, _timeout: Option<Duration>) -> Result<()> {
        Err(Error::Os(libc_enosys()))
    }
}

#[cfg(unix)]
fn libc_enosys() -> i32 {
    libc::ENOSYS
}

#[cfg(not(unix))]
fn libc_enosys() -> i32 {
    88 // ENOSYS on Linux; used as a stable placeholder off-unix too.
}

pub struct Events;

impl Events {
    pub fn with_capacity(_capacity: usize) -> Events {
        Events
    }

    pub fn iter(&self) -> impl Iterator<Item = &()> {
        std::iter::empty()
    }
}

pub mod event {
    use crate::poller::PollToken;

    pub fn token(_event: &()) -> PollToken {
        PollToken(0)
    }

    pub fn is_readable(_event: &()) -> bool {
        false
    }

    pub fn is_writable(_event: &()) -> bool {
        false
    }

    pub fn is_error(_event: &()) -> bool {
        false
    }
}

pub mod waker {
    use crate::error::{Error, Result};
    use crate::poller::RawFd;

    #[derive(Debug)]
    pub struct WakerInternal;

    impl WakerInternal {
        pub fn new() -> Result<WakerInternal> {
            Err(Error::Os(super::libc_enosys()))
        }

        pub fn wake(&self) -> Result<()> {
            Err(Error::Os(super::libc_enosys()))
        }

        pub fn drain(&self) {}

        pub fn as_raw_fd(&self) -> RawFd {
            0
        }
    }
}
