//! Cross-thread wake-up handle. The loop registers its fd with the poller
//! at a reserved token so a blocked `poll` returns as soon as another thread
//! (typically the thread pool) calls `Waker::wake`. This is one of the two
//! synchronization primitives the core uses.

use crate::error::Result;
use crate::poller::sys::waker::WakerInternal;
use crate::poller::{Interest, Poller, PollToken, RawFd};

#[derive(Debug)]
pub struct Waker {
    inner: WakerInternal,
}

impl Waker {
    pub fn new(poller: &Poller, token: PollToken) -> Result<Waker> {
        let inner = WakerInternal::new()?;
        poller.watch(inner.as_raw_fd(), Interest::READABLE, token)?;
        Ok(Waker { inner })
    }

    pub fn wake(&self) -> Result<()> {
        self.inner.wake()
    }

    /// Drains the pending wake-up signal after the poller reports it
    /// readable, so it doesn't re-fire spuriously on the next iteration.
    pub fn ack(&self) {
        self.inner.drain();
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}
