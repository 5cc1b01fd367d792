//! Async handle: the only cross-thread-safe way into a loop. Thread-safe
//! wakeup that coalesces repeated sends into one callback invocation.
//! `send()` may be called from any
//! thread; the loop only ever invokes the callback on its own thread during
//! the async phase.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::poller::waker::Waker;

pub type AsyncCallback = Box<dyn FnMut(&mut crate::evloop::Loop, crate::handle::HandleId)>;

/// Shared with whatever `Arc` clone the host hands to other threads; a
/// pending send that arrives before the loop drains the previous one is
/// coalesced into a single wakeup.
#[derive(Clone)]
pub struct AsyncSender {
    pending: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl AsyncSender {
    /// Returns `Ok(())` whether or not this call actually triggered the
    /// wakeup (a prior unconsumed send already did).
    pub fn send(&self) -> Result<()> {
        if !self.pending.swap(true, Ordering::AcqRel) {
            self.waker.wake()?;
        }
        Ok(())
    }
}

pub struct AsyncState {
    pub cb: Option<AsyncCallback>,
    pending: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl AsyncState {
    pub fn new(waker: Arc<Waker>) -> AsyncState {
        AsyncState { cb: None, pending: Arc::new(AtomicBool::new(false)), waker }
    }

    pub fn sender(&self) -> AsyncSender {
        AsyncSender { pending: Arc::clone(&self.pending), waker: Arc::clone(&self.waker) }
    }

    /// Called by the loop's async phase; returns whether a send had arrived
    /// since the last check, clearing the flag either way.
    pub(crate) fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}
