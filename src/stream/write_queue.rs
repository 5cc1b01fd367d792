//! Pending-write backlog. Writes that can't be flushed in one syscall queue
//! here ("backpressure": `write` must not block, partial writes
//! stay queued and retried when the fd is next writable).

use std::collections::VecDeque;
use std::os::fd::RawFd;

use crate::handle::HandleId;

pub type WriteCallback = Box<dyn FnMut(&mut crate::evloop::Loop, HandleId, crate::error::Result<()>)>;

pub struct PendingWrite {
    pub data: Vec<u8>,
    pub written: usize,
    /// An fd handed to `write` for passing alongside the first chunk of
    /// this write over an IPC-enabled pipe ("FD-passing").
    pub send_fd: Option<RawFd>,
    pub cb: Option<WriteCallback>,
}

impl PendingWrite {
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.written..]
    }

    pub fn is_done(&self) -> bool {
        self.written >= self.data.len()
    }
}

#[derive(Default)]
pub struct WriteQueue {
    queue: VecDeque<PendingWrite>,
}

impl WriteQueue {
    pub fn new() -> WriteQueue {
        WriteQueue { queue: VecDeque::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total unwritten bytes still queued, the value the bridge surfaces as
    /// `write_queue_size` for the host's own backpressure decisions.
    pub fn queued_bytes(&self) -> usize {
        self.queue.iter().map(|w| w.data.len() - w.written).sum()
    }

    pub fn push(&mut self, write: PendingWrite) {
        self.queue.push_back(write);
    }

    pub fn front_mut(&mut self) -> Option<&mut PendingWrite> {
        self.queue.front_mut()
    }

    pub fn pop_front(&mut self) -> Option<PendingWrite> {
        self.queue.pop_front()
    }
}
