//! The handle base. Every long-lived object bound to a loop (timer, socket,
//! pipe, ...) shares this common lifecycle; kind-specific fields live in a
//! discriminated [`HandlePayload`] variant.

use std::ffi::c_void;
use std::os::raw::c_int;

use crate::handles::async_handle::AsyncState;
use crate::handles::check::CheckState;
use crate::handles::idle::IdleState;
use crate::handles::prepare::PrepareState;
use crate::handles::process::ProcessState;
use crate::handles::signal::SignalState;
use crate::handles::timer::TimerHandleState;
use crate::stream::StreamState;

/// Stable identity for a handle, unique for the lifetime of the loop that
/// created it. IDs are never reused (monotonic counter), which sidesteps
/// ABA hazards when a callback stashes an ID across iterations without
/// needing a generation field on every comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub(crate) fn from_raw(n: usize) -> HandleId {
        HandleId(n as u64)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

bitflags::bitflags! {
    /// Per-handle state bits tracked across the handle's lifetime.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HandleFlags: u32 {
        const CLOSING   = 1 << 0;
        const CLOSED    = 1 << 1;
        const REF       = 1 << 2;
        const ACTIVE    = 1 << 3;
        const READABLE  = 1 << 4;
        const WRITABLE  = 1 << 5;
        const IPC       = 1 << 6;
        const SHUTTING  = 1 << 7;
        const SHUT      = 1 << 8;
        const READ_EOF  = 1 << 9;
        const READING   = 1 << 10;
    }
}

/// Which concrete kind of handle this is. Mirrors `HandlePayload`'s variant
/// one-for-one; kept separate so dispatch code can match on a `Copy` tag
/// without borrowing the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Timer,
    Tcp,
    Pipe,
    Tty,
    Async,
    Idle,
    Check,
    Prepare,
    Signal,
    Process,
}

impl HandleKind {
    pub fn name(self) -> &'static str {
        match self {
            HandleKind::Timer => "timer",
            HandleKind::Tcp => "tcp",
            HandleKind::Pipe => "pipe",
            HandleKind::Tty => "tty",
            HandleKind::Async => "async",
            HandleKind::Idle => "idle",
            HandleKind::Check => "check",
            HandleKind::Prepare => "prepare",
            HandleKind::Signal => "signal",
            HandleKind::Process => "process",
        }
    }
}

/// Kind-specific state. `Tcp`/`Pipe`/`Tty` each embed a [`StreamState`]
/// rather than duplicating the read/write/shutdown/backpressure fields.
pub enum HandlePayload {
    Timer(TimerHandleState),
    Tcp(StreamState),
    Pipe(StreamState),
    Tty(StreamState),
    Async(AsyncState),
    Idle(IdleState),
    Check(CheckState),
    Prepare(PrepareState),
    Signal(SignalState),
    Process(ProcessState),
}

impl HandlePayload {
    pub fn stream(&self) -> Option<&StreamState> {
        match self {
            HandlePayload::Tcp(s) | HandlePayload::Pipe(s) | HandlePayload::Tty(s) => Some(s),
            _ => None,
        }
    }

    pub fn stream_mut(&mut self) -> Option<&mut StreamState> {
        match self {
            HandlePayload::Tcp(s) | HandlePayload::Pipe(s) | HandlePayload::Tty(s) => Some(s),
            _ => None,
        }
    }
}

/// A close callback: invoked exactly once, with the handle already CLOSED,
/// so the host may now free any storage it owns that was keyed by this id.
pub type CloseCallback = Box<dyn FnMut(HandleId)>;

/// One entry in the loop's handle list ("doubly-linked list of
/// active handles" — realized here as a keyed slab rather than literal
/// intrusive pointers, per this crate's arena guidance).
pub struct Handle {
    pub id: HandleId,
    pub kind: HandleKind,
    pub flags: HandleFlags,
    /// Opaque slot the host uses to map a handle back to its own scripted
    /// object. The core never reads or writes through this pointer.
    pub user_data: *mut c_void,
    pub close_cb: Option<CloseCallback>,
    pub payload: HandlePayload,
}

// SAFETY: the whole core is single-threaded-per-loop; `user_data`
// is opaque to us and never dereferenced here, only stored and handed back.
unsafe impl Send for Handle {}

impl Handle {
    pub fn new(id: HandleId, kind: HandleKind, payload: HandlePayload) -> Handle {
        Handle {
            id,
            kind,
            flags: HandleFlags::REF,
            user_data: std::ptr::null_mut(),
            close_cb: None,
            payload,
        }
    }

    pub fn is_active(&self) -> bool {
        self.flags.contains(HandleFlags::ACTIVE)
    }

    pub fn is_closing(&self) -> bool {
        self.flags.intersects(HandleFlags::CLOSING | HandleFlags::CLOSED)
    }

    pub fn is_closed(&self) -> bool {
        self.flags.contains(HandleFlags::CLOSED)
    }

    pub fn has_ref(&self) -> bool {
        self.flags.contains(HandleFlags::REF)
    }

    pub fn r#ref(&mut self) {
        self.flags.insert(HandleFlags::REF);
    }

    pub fn unref(&mut self) {
        self.flags.remove(HandleFlags::REF);
    }

    /// Marks the handle active, returning whether it was previously
    /// inactive (the caller uses this to adjust the loop's refcount).
    pub(crate) fn activate(&mut self) -> bool {
        let was = self.flags.contains(HandleFlags::ACTIVE);
        self.flags.insert(HandleFlags::ACTIVE);
        !was
    }

    /// Marks the handle inactive, returning whether it was previously active.
    pub(crate) fn deactivate(&mut self) -> bool {
        let was = self.flags.contains(HandleFlags::ACTIVE);
        self.flags.remove(HandleFlags::ACTIVE);
        was
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Negative `errno` / non-negative byte-count convention every completion
/// callback in the bridge uses.
pub type RawResult = isize;

pub fn ok_result(n: usize) -> RawResult {
    n as RawResult
}

pub fn err_result(code: c_int) -> RawResult {
    debug_assert!(code >= 0, "pass the positive errno magnitude");
    -(code as RawResult)
}
