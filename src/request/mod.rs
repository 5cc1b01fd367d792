//! The request base. Requests are the one-shot counterpart to handles: a
//! single completion, with no REF/ACTIVE state of their own, used for
//! thread-pool work, filesystem ops, and resolver lookups. This is
//! deliberately thin bookkeeping — identity, kind, and cancellation state —
//! not a dispatch registry: the actual completion callback is whatever
//! closure `crate::fs`/`crate::pool` captured when the request was
//! submitted, so delivering a typed result never needs to round-trip
//! through a type-erased slot here.

use std::collections::HashMap;

use crate::handle::HandleId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub(crate) fn from_raw(n: u64) -> RequestId {
        RequestId(n)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Fs,
    GetAddrInfo,
    Work,
}

pub struct Request {
    pub id: RequestId,
    pub kind: RequestKind,
    /// The handle this request logically belongs to, if any.
    pub handle: Option<HandleId>,
    canceled: bool,
}

/// Owns every in-flight request, keyed by [`RequestId`] the same way
/// [`crate::handle`] keys handles — a slab rather than intrusive pointers.
#[derive(Default)]
pub struct Requests {
    map: HashMap<RequestId, Request>,
    next_id: u64,
}

impl Requests {
    pub fn new() -> Requests {
        Requests { map: HashMap::new(), next_id: 0 }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn alloc(&mut self, kind: RequestKind, handle: Option<HandleId>) -> RequestId {
        let id = RequestId::from_raw(self.next_id);
        self.next_id += 1;
        self.map.insert(id, Request { id, kind, handle, canceled: false });
        id
    }

    /// Marks a still-pending request canceled ("canceled requests
    /// still complete, with UV_ECANCELED"); a no-op if it already completed
    /// (the id is simply absent) or was already canceled.
    pub fn cancel(&mut self, id: RequestId) -> bool {
        match self.map.get_mut(&id) {
            Some(req) if !req.canceled => {
                req.canceled = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_canceled(&self, id: RequestId) -> bool {
        self.map.get(&id).is_some_and(|r| r.canceled)
    }

    /// Drops the bookkeeping entry once its completion has been delivered.
    pub fn forget(&mut self, id: RequestId) -> Option<Request> {
        self.map.remove(&id)
    }
}
