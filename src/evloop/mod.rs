//! The event loop. One iteration runs eight fixed phases, in
//! this order, mirroring the shape of libuv's `uv_run`:
//!
//! 1. update the cached clock
//! 2. run due timers
//! 3. run pending callbacks (thread-pool completions from the previous
//!    iteration)
//! 4. run idle handle callbacks
//! 5. run prepare handle callbacks
//! 6. poll for I/O, with a timeout chosen from the above, and dispatch
//!    readiness to stream/async handles
//! 7. run check handle callbacks
//! 8. run close callbacks for handles closed during this iteration
//!
//! The loop keeps running while any handle is both active and ref'd, or any
//! request/thread-pool job is outstanding.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use log::trace;

use crate::error::{Error, Result};
use crate::handle::{CloseCallback, Handle, HandleFlags, HandleId, HandleKind, HandlePayload};
use crate::handles::async_handle::{AsyncSender, AsyncState};
use crate::handles::check::CheckState;
use crate::handles::idle::IdleState;
use crate::handles::prepare::PrepareState;
use crate::handles::process::ProcessState;
use crate::handles::signal::SignalState;
use crate::handles::timer::{TimerCallback, TimerHandleState};
use crate::pool::{ThreadPool, WorkFn};
use crate::poller::waker::Waker;
use crate::poller::{Interest, PollToken, Poller};
use crate::request::{RequestId, RequestKind, Requests};
use crate::stream::{self, PendingWrite, ShutdownCallback, WriteCallback};
use crate::time::{Clock, Timers};

#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    /// Worker threads backing the thread pool.
    pub pool_threads: usize,
    /// Upper bound on thread-pool completions drained per iteration, so one
    /// overloaded pool can't starve timers/I/O forever (mirrors mio-era
    /// `EventLoopConfig::messages_per_tick`).
    pub max_pending_per_tick: usize,
}

impl Default for LoopConfig {
    fn default() -> LoopConfig {
        LoopConfig { pool_threads: 4, max_pending_per_tick: 64 }
    }
}

/// Reserved token identifying the cross-thread waker's own fd among
/// `Poller` readiness events; real stream fds get tokens from
/// `Loop::alloc_handle_id` so collision is impossible (`HandleId` never
/// reaches `u64::MAX` in any realistic run).
const WAKER_TOKEN: PollToken = PollToken(u64::MAX);
const SIGNAL_TOKEN: PollToken = PollToken(u64::MAX - 1);

pub struct Loop {
    run: bool,
    clock: Clock,
    timers: Timers,
    poller: Poller,
    waker: Arc<Waker>,
    pool: ThreadPool,
    handles: HashMap<HandleId, Handle>,
    next_handle_id: u64,
    requests: Requests,
    /// `PollToken -> HandleId` for every fd-bearing handle currently
    /// registered with the poller.
    tokens: HashMap<PollToken, HandleId>,
    pending_callbacks: VecDeque<Box<dyn FnOnce(&mut Loop)>>,
    /// Handles whose `close` arrived while they were taken out of `handles`
    /// for dispatch (re-entrancy: closing a handle from within its
    /// own callback must still work); finalized as soon as the handle comes
    /// back.
    closing_requested: HashSet<HandleId>,
    /// Ids currently removed from `handles` for dispatch (inside
    /// `with_handle`), so a stream op invoked re-entrantly from a handle's
    /// own callback can tell "mid-dispatch" apart from "no such handle".
    dispatching: HashSet<HandleId>,
    /// Stream ops invoked re-entrantly on a handle that's mid-dispatch;
    /// replayed, in order, the moment `with_handle` puts the handle back.
    reentrant_ops: HashMap<HandleId, Vec<Box<dyn FnOnce(&mut Loop)>>>,
    close_queue: VecDeque<HandleId>,
    config: LoopConfig,
    /// The self-pipe's read fd, once any `Signal` handle has started
    /// watching; `None` until then so a loop that never touches signals
    /// never pays for the pipe or the poller registration.
    signal_fd: Option<std::os::fd::RawFd>,
    signal_watchers: HashMap<i32, Vec<HandleId>>,
    child_processes: HashMap<i32, HandleId>,
    sigchld_installed: bool,
}

impl Loop {
    pub fn new(config: LoopConfig) -> Result<Loop> {
        let poller = Poller::new()?;
        let waker = Arc::new(Waker::new(&poller, WAKER_TOKEN)?);
        let pool = ThreadPool::new(config.pool_threads, Arc::clone(&waker));
        log::debug!("event loop initialized, pool_threads={}", config.pool_threads);
        Ok(Loop {
            run: true,
            clock: Clock::new(),
            timers: Timers::new(),
            poller,
            waker,
            pool,
            handles: HashMap::new(),
            next_handle_id: 0,
            requests: Requests::new(),
            tokens: HashMap::new(),
            pending_callbacks: VecDeque::new(),
            closing_requested: HashSet::new(),
            dispatching: HashSet::new(),
            reentrant_ops: HashMap::new(),
            close_queue: VecDeque::new(),
            config,
            signal_fd: None,
            signal_watchers: HashMap::new(),
            child_processes: HashMap::new(),
            sigchld_installed: false,
        })
    }

    // ---- identity allocation -------------------------------------------------

    pub(crate) fn alloc_handle_id(&mut self) -> HandleId {
        let id = HandleId::from_raw(self.next_handle_id as usize);
        self.next_handle_id += 1;
        id
    }

    pub(crate) fn insert_handle(&mut self, handle: Handle) -> HandleId {
        let id = handle.id;
        self.handles.insert(id, handle);
        id
    }

    pub fn get(&self, id: HandleId) -> Option<&Handle> {
        self.handles.get(&id)
    }

    pub fn get_mut(&mut self, id: HandleId) -> Option<&mut Handle> {
        self.handles.get_mut(&id)
    }

    // ---- handle lifecycle ------------------------------------------

    pub fn ref_handle(&mut self, id: HandleId) {
        if let Some(h) = self.handles.get_mut(&id) {
            h.r#ref();
        }
    }

    pub fn unref_handle(&mut self, id: HandleId) {
        if let Some(h) = self.handles.get_mut(&id) {
            h.unref();
        }
    }

    /// Sum over `id`'s in-flight write requests of unwritten bytes: for each
    /// queued write, total bytes minus bytes already written. `0` for a
    /// non-stream handle or one with nothing queued.
    pub fn write_queue_size(&self, id: HandleId) -> usize {
        self.handles
            .get(&id)
            .and_then(|h| h.payload.stream())
            .map(|s| s.write_queue.queued_bytes())
            .unwrap_or(0)
    }

    /// Marks a handle closing; its close callback runs in phase 8 of this
    /// iteration (or, if called mid-dispatch, the current pass once the
    /// handle is back in `self.handles`). Returns `Error::Inval` for a
    /// handle that's already closing/closed.
    pub fn close(&mut self, id: HandleId, close_cb: Option<CloseCallback>) -> Result<()> {
        if let Some(handle) = self.handles.get_mut(&id) {
            if handle.is_closing() {
                return Err(Error::Inval);
            }
            handle.flags.insert(HandleFlags::CLOSING);
            handle.deactivate();
            if close_cb.is_some() {
                handle.close_cb = close_cb;
            }
            self.teardown_for_close(id);
            self.close_queue.push_back(id);
            Ok(())
        } else if self.closing_requested.insert(id) {
            // Handle is mid-dispatch (taken out of `self.handles`);
            // `with_handle`'s reinsertion path will call us again once it's
            // back, completing the close then.
            Ok(())
        } else {
            Err(Error::Inval)
        }
    }

    /// Unregisters anything the poller/timers/pool still know about this
    /// handle before it's discarded, so a stale fd/token never fires again,
    /// and cancels whatever operation was in flight on it: a canceled
    /// connect/read/write/shutdown fires its callback with `ECANCELED`
    /// before the handle's own close callback runs.
    fn teardown_for_close(&mut self, id: HandleId) {
        if matches!(self.handles.get(&id).map(|h| &h.payload), Some(HandlePayload::Timer(_))) {
            self.timers.remove(id);
        }
        self.with_handle(id, |loop_, handle| {
            let Some(stream) = handle.payload.stream_mut() else { return };
            if let Some(fd) = stream.raw_fd() {
                let _ = loop_.poller.unwatch(fd);
                loop_.tokens.remove(&PollToken(id.as_u64()));
            }
            if let Some(mut cb) = stream.connect_cb.take() {
                cb(loop_, id, Err(Error::Canceled));
            }
            if let Some(mut cb) = stream.read_cb.take() {
                cb(loop_, id, Err(Error::Canceled));
            }
            while let Some(mut pending) = stream.write_queue.pop_front() {
                if let Some(mut cb) = pending.cb.take() {
                    cb(loop_, id, Err(Error::Canceled));
                }
            }
            if let Some(mut cb) = stream.shutdown_cb.take() {
                cb(loop_, id, Err(Error::Canceled));
            }
        });
    }

    /// Runs `f` with the handle temporarily removed from `self.handles`, so
    /// `f` can hold `&mut Loop` and `&mut Handle` simultaneously without
    /// aliasing. If `f` (or something it calls) closes this handle, the
    /// close is finalized immediately after `f` returns.
    fn with_handle<F>(&mut self, id: HandleId, f: F)
    where
        F: FnOnce(&mut Loop, &mut Handle),
    {
        let Some(mut handle) = self.handles.remove(&id) else { return };
        self.dispatching.insert(id);
        f(self, &mut handle);
        self.dispatching.remove(&id);
        if self.closing_requested.remove(&id) {
            self.handles.insert(id, handle);
            let _ = self.close(id, None);
        } else {
            self.handles.insert(id, handle);
        }
        if let Some(ops) = self.reentrant_ops.remove(&id) {
            for op in ops {
                op(self);
            }
        }
    }

    /// Whether `id`'s handle is currently removed from `handles` for
    /// dispatch, as opposed to not existing at all.
    fn is_dispatching(&self, id: HandleId) -> bool {
        self.dispatching.contains(&id)
    }

    /// Defers `f` until `id`'s handle is back in `handles`, for a stream op
    /// invoked re-entrantly from that handle's own callback.
    fn defer_on_handle<F>(&mut self, id: HandleId, f: F)
    where
        F: FnOnce(&mut Loop) + 'static,
    {
        self.reentrant_ops.entry(id).or_default().push(Box::new(f));
    }

    // ---- iteration -------------------------------------------------------

    pub fn stop(&mut self) {
        self.run = false;
    }

    /// Whether the loop would keep iterating if `run` were called again
    /// (this crate's liveness rule).
    pub fn is_alive(&self) -> bool {
        self.handles.values().any(|h| h.is_active() && h.has_ref())
            || !self.requests.is_empty()
    }

    /// `RUN_DEFAULT`: iterate until no longer alive or `stop()` is called.
    pub fn run(&mut self) -> Result<()> {
        self.run = true;
        while self.run && self.is_alive() {
            self.run_once()?;
        }
        Ok(())
    }

    /// A single iteration, for hosts that want `RUN_ONCE`/`RUN_NOWAIT`
    /// semantics instead of blocking inside `run()`.
    pub fn run_once(&mut self) -> Result<()> {
        // Phase 1: update time.
        self.clock.update();
        trace!("loop iteration start, now_ms={}", self.clock.now_ms());

        // Phase 2: due timers.
        let due = self.timers.run_due(self.clock.now_ms());
        for id in due {
            self.dispatch_timer(id);
        }

        // Phase 3: pending callbacks (thread-pool completions).
        self.drain_pool_completions();

        // Phase 4: idle callbacks.
        for id in self.snapshot_kind(HandleKind::Idle) {
            self.dispatch_idle(id);
        }

        // Phase 5: prepare callbacks.
        for id in self.snapshot_kind(HandleKind::Prepare) {
            self.dispatch_prepare(id);
        }

        // Phase 6: poll for I/O.
        let timeout_ms = self.compute_poll_timeout();
        let events: Vec<_> = self.poller.poll(timeout_ms)?.to_vec();
        self.clock.update();
        for event in events {
            if event.token == WAKER_TOKEN {
                self.waker.ack();
                self.dispatch_async_handles();
                continue;
            }
            if event.token == SIGNAL_TOKEN {
                self.dispatch_signals();
                continue;
            }
            if let Some(&id) = self.tokens.get(&event.token) {
                self.dispatch_stream_ready(id, event.readable, event.writable, event.error);
            }
        }

        // Phase 7: check callbacks.
        for id in self.snapshot_kind(HandleKind::Check) {
            self.dispatch_check(id);
        }

        // Phase 8: close callbacks. Only now does the handle actually leave
        // `self.handles` — until then a second `close()` on the same id is
        // correctly rejected as a double-close.
        while let Some(id) = self.close_queue.pop_front() {
            if let Some(mut handle) = self.handles.remove(&id) {
                handle.flags.remove(HandleFlags::CLOSING);
                handle.flags.insert(HandleFlags::CLOSED);
                if let Some(mut cb) = handle.close_cb.take() {
                    cb(id);
                }
            }
        }

        Ok(())
    }

    fn snapshot_kind(&self, kind: HandleKind) -> Vec<HandleId> {
        self.handles
            .iter()
            .filter(|(_, h)| h.kind == kind && h.is_active())
            .map(|(id, _)| *id)
            .collect()
    }

    /// `None` blocks indefinitely, chosen when nothing but I/O could wake
    /// the loop; `Some(0)` polls non-blocking, chosen whenever idle handles
    /// are active: idle handles run every iteration, so the loop must never
    /// block while one exists.
    fn compute_poll_timeout(&self) -> Option<u64> {
        if self.handles.values().any(|h| h.kind == HandleKind::Idle && h.is_active()) {
            return Some(0);
        }
        match self.timers.next_deadline_ms() {
            Some(deadline) => Some(deadline.saturating_sub(self.clock.now_ms())),
            None => None,
        }
    }

    // ---- phase dispatch ----------------------------------------------------

    fn dispatch_timer(&mut self, id: HandleId) {
        self.with_handle(id, |loop_, handle| {
            if let HandlePayload::Timer(state) = &mut handle.payload {
                if let Some(mut cb) = state.cb.take() {
                    cb(loop_, id);
                    state.cb = Some(cb);
                }
            }
        });
    }

    fn dispatch_idle(&mut self, id: HandleId) {
        self.with_handle(id, |loop_, handle| {
            if !handle.is_active() {
                return;
            }
            if let HandlePayload::Idle(state) = &mut handle.payload {
                if let Some(mut cb) = state.cb.take() {
                    cb(loop_, id);
                    state.cb = Some(cb);
                }
            }
        });
    }

    fn dispatch_check(&mut self, id: HandleId) {
        self.with_handle(id, |loop_, handle| {
            if !handle.is_active() {
                return;
            }
            if let HandlePayload::Check(state) = &mut handle.payload {
                if let Some(mut cb) = state.cb.take() {
                    cb(loop_, id);
                    state.cb = Some(cb);
                }
            }
        });
    }

    fn dispatch_prepare(&mut self, id: HandleId) {
        self.with_handle(id, |loop_, handle| {
            if !handle.is_active() {
                return;
            }
            if let HandlePayload::Prepare(state) = &mut handle.payload {
                if let Some(mut cb) = state.cb.take() {
                    cb(loop_, id);
                    state.cb = Some(cb);
                }
            }
        });
    }

    fn dispatch_async_handles(&mut self) {
        for id in self.snapshot_kind(HandleKind::Async) {
            self.with_handle(id, |loop_, handle| {
                if let HandlePayload::Async(state) = &mut handle.payload {
                    if state.take_pending() {
                        if let Some(mut cb) = state.cb.take() {
                            cb(loop_, id);
                            state.cb = Some(cb);
                        }
                    }
                }
            });
        }
    }

    fn dispatch_stream_ready(&mut self, id: HandleId, readable: bool, writable: bool, error: bool) {
        self.with_handle(id, |loop_, handle| {
            if handle.payload.stream().is_none() {
                return;
            }
            if error {
                loop_.fail_stream(handle, Error::Pipe);
                return;
            }
            if readable {
                let listening = handle.payload.stream().is_some_and(|s| s.listening);
                if listening {
                    loop_.dispatch_accept(handle, id);
                } else {
                    loop_.dispatch_read(handle, id);
                }
            }
            if writable {
                loop_.dispatch_write_ready(handle, id);
            }
        });
    }

    fn dispatch_read(&mut self, handle: &mut Handle, id: HandleId) {
        let Some(stream) = handle.payload.stream_mut() else { return };
        let Some(fd) = stream.raw_fd() else { return };
        loop {
            let Some(alloc) = stream.alloc_cb.as_mut() else { break };
            let mut buf = alloc(64 * 1024);
            let read = if stream.ipc {
                stream::raw_read_ipc(fd, &mut buf)
            } else {
                stream::raw_read(fd, &mut buf).map(|n| (n, None))
            };
            match read {
                Ok((0, _)) => {
                    handle.flags.insert(HandleFlags::READ_EOF);
                    if let Some(mut cb) = stream.read_cb.take() {
                        cb(self, id, Ok(None));
                        stream.read_cb = Some(cb);
                    }
                    break;
                }
                Ok((n, recv_fd)) => {
                    if let Some(f) = recv_fd {
                        stream.received_fds.push_back(f);
                    }
                    if let Some(mut cb) = stream.read_cb.take() {
                        cb(self, id, Ok(Some(&buf[..n])));
                        stream.read_cb = Some(cb);
                    }
                }
                Err(Error::Again) => break,
                Err(e) => {
                    if let Some(mut cb) = stream.read_cb.take() {
                        cb(self, id, Err(e));
                        stream.read_cb = Some(cb);
                    }
                    break;
                }
            }
        }
    }

    fn dispatch_accept(&mut self, handle: &mut Handle, id: HandleId) {
        let Some(stream) = handle.payload.stream_mut() else { return };
        let Some(fd) = stream.raw_fd() else { return };
        loop {
            match stream::accept_one(fd) {
                Ok(Some(conn)) => stream.accept_queue.push_back(conn),
                Ok(None) => break,
                Err(_) => break,
            }
        }
        if let Some(mut cb) = stream.accept_cb.take() {
            cb(self, id);
            stream.accept_cb = Some(cb);
        }
    }

    fn dispatch_write_ready(&mut self, handle: &mut Handle, id: HandleId) {
        let Some(stream) = handle.payload.stream_mut() else { return };
        let Some(fd) = stream.raw_fd() else { return };
        if let Some(mut cb) = stream.connect_cb.take() {
            let result = stream::check_connect_error(fd);
            cb(self, id, result);
            return;
        }
        let report = stream::try_flush(fd, &mut stream.write_queue, stream.ipc);
        for mut completed in report.completed {
            if let Some(mut cb) = completed.cb.take() {
                cb(self, id, Ok(()));
            }
        }
        if let Some((mut failed, err)) = report.failed {
            if let Some(mut cb) = failed.cb.take() {
                cb(self, id, Err(err));
            }
            // A hard write error means every other queued write will fail
            // the same way; fail them all rather than retry forever.
            while let Some(mut pending) = stream.write_queue.pop_front() {
                if let Some(mut cb) = pending.cb.take() {
                    cb(self, id, Err(err));
                }
            }
        }
        if stream.write_queue.is_empty() {
            handle.flags.remove(HandleFlags::WRITABLE);
            if let Some(mut cb) = stream.shutdown_cb.take() {
                let fd = stream.raw_fd();
                let result = fd.map(stream::shutdown_write).unwrap_or(Err(Error::BadF));
                handle.flags.insert(HandleFlags::SHUT);
                cb(self, id, result);
            }
        }
    }

    fn fail_stream(&mut self, handle: &mut Handle, err: Error) {
        let id = handle.id;
        if let Some(stream) = handle.payload.stream_mut() {
            if let Some(mut cb) = stream.read_cb.take() {
                cb(self, id, Err(err));
            }
        }
    }

    // ---- stream registration (used by handles::{tcp,pipe,tty}) -----------

    pub(crate) fn register_stream(&mut self, id: HandleId, interest: Interest) -> Result<()> {
        let fd = self
            .handles
            .get(&id)
            .and_then(|h| h.payload.stream())
            .and_then(|s| s.raw_fd())
            .ok_or(Error::BadF)?;
        self.poller.watch(fd, interest, PollToken(id.as_u64()))?;
        self.tokens.insert(PollToken(id.as_u64()), id);
        Ok(())
    }

    pub(crate) fn reregister_stream(&mut self, id: HandleId, interest: Interest) -> Result<()> {
        let fd = self
            .handles
            .get(&id)
            .and_then(|h| h.payload.stream())
            .and_then(|s| s.raw_fd())
            .ok_or(Error::BadF)?;
        self.poller.reregister(fd, interest, PollToken(id.as_u64()))
    }

    // ---- stream ops shared by handles::{tcp,pipe,tty} (surface) --

    pub fn stream_read_start(
        &mut self,
        id: HandleId,
        alloc_cb: stream::AllocCallback,
        read_cb: stream::ReadCallback,
    ) -> Result<()> {
        if !self.handles.contains_key(&id) && self.is_dispatching(id) {
            self.defer_on_handle(id, move |loop_| {
                let _ = loop_.stream_read_start(id, alloc_cb, read_cb);
            });
            return Ok(());
        }
        {
            let handle = self.handles.get_mut(&id).ok_or(Error::BadF)?;
            let stream = handle.payload.stream_mut().ok_or(Error::Inval)?;
            stream.alloc_cb = Some(alloc_cb);
            stream.read_cb = Some(read_cb);
            handle.flags.insert(HandleFlags::READING);
            handle.activate();
        }
        self.reregister_stream(id, self.stream_interest(id))
    }

    pub fn stream_read_stop(&mut self, id: HandleId) -> Result<()> {
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.flags.remove(HandleFlags::READING);
        }
        self.reregister_stream(id, self.stream_interest(id))
    }

    /// Queues `data` (and, on an IPC pipe, an fd to pass alongside it),
    /// flushing as much as the fd accepts without blocking right away
    /// (backpressure: the rest stays queued for the next
    /// writable-ready dispatch).
    pub fn stream_write(
        &mut self,
        id: HandleId,
        data: Vec<u8>,
        send_fd: Option<std::os::fd::RawFd>,
        cb: Option<WriteCallback>,
    ) -> Result<()> {
        if !self.handles.contains_key(&id) && self.is_dispatching(id) {
            self.defer_on_handle(id, move |loop_| {
                let _ = loop_.stream_write(id, data, send_fd, cb);
            });
            return Ok(());
        }
        let handle = self.handles.get_mut(&id).ok_or(Error::BadF)?;
        let stream = handle.payload.stream_mut().ok_or(Error::Inval)?;
        stream.write_queue.push(PendingWrite { data, written: 0, send_fd, cb });
        handle.flags.insert(HandleFlags::WRITABLE);
        // A queued write is a liveness source in its own right, even on a
        // stream nothing ever reads from or was told to read: the loop must
        // stay alive while a refed handle still has bytes to flush.
        handle.activate();
        self.flush_stream_writes(id)?;
        self.reregister_stream(id, self.stream_interest(id))
    }

    fn flush_stream_writes(&mut self, id: HandleId) -> Result<()> {
        let Some(handle) = self.handles.get_mut(&id) else { return Ok(()) };
        let Some(stream) = handle.payload.stream_mut() else { return Ok(()) };
        let Some(fd) = stream.raw_fd() else { return Ok(()) };
        let report = stream::try_flush(fd, &mut stream.write_queue, stream.ipc);
        for mut completed in report.completed {
            if let Some(mut cb) = completed.cb.take() {
                cb(self, id, Ok(()));
            }
        }
        if let Some((mut failed, err)) = report.failed {
            if let Some(mut cb) = failed.cb.take() {
                cb(self, id, Err(err));
            }
            return Err(err);
        }
        Ok(())
    }

    pub fn stream_shutdown(&mut self, id: HandleId, cb: Option<ShutdownCallback>) -> Result<()> {
        if !self.handles.contains_key(&id) && self.is_dispatching(id) {
            self.defer_on_handle(id, move |loop_| {
                let _ = loop_.stream_shutdown(id, cb);
            });
            return Ok(());
        }
        let handle = self.handles.get_mut(&id).ok_or(Error::BadF)?;
        let stream = handle.payload.stream_mut().ok_or(Error::Inval)?;
        if !stream.write_queue.is_empty() {
            // Deferred until the queue drains; `dispatch_write_ready` checks
            // `shutdown_cb` once empty. Kept simple here since this core's
            // streams are always written-to in small bursts.
            stream.shutdown_cb = cb;
            return Ok(());
        }
        let fd = stream.raw_fd().ok_or(Error::BadF)?;
        let result = stream::shutdown_write(fd);
        handle.flags.insert(HandleFlags::SHUT);
        if let Some(mut cb) = cb {
            cb(self, id, result);
        }
        Ok(())
    }

    pub fn stream_listen(&mut self, id: HandleId, backlog: i32, cb: stream::AcceptCallback) -> Result<()> {
        {
            let handle = self.handles.get_mut(&id).ok_or(Error::BadF)?;
            let stream = handle.payload.stream_mut().ok_or(Error::Inval)?;
            stream.listening = true;
            stream.backlog = backlog;
            stream.accept_cb = Some(cb);
            handle.activate();
        }
        self.register_stream(id, Interest::READABLE)
    }

    /// Pops one fd handed off by `dispatch_accept`; the host wraps it in a
    /// fresh handle of the same kind via `Tcp::init`/`Pipe::init` + `adopt`.
    pub fn stream_accept(&mut self, id: HandleId) -> Option<std::os::fd::OwnedFd> {
        self.handles.get_mut(&id).and_then(|h| h.payload.stream_mut()).and_then(|s| s.accept_queue.pop_front())
    }

    fn stream_interest(&self, id: HandleId) -> Interest {
        let mut interest = Interest::READABLE;
        if let Some(h) = self.handles.get(&id) {
            if let Some(s) = h.payload.stream() {
                if !s.write_queue.is_empty() {
                    interest |= Interest::WRITABLE;
                }
            }
            if !h.flags.contains(HandleFlags::READING) && h.payload.stream().is_some_and(|s| !s.listening) {
                // Still watch for writability even when the host isn't
                // reading, but don't bother polling readable.
                interest.remove(Interest::READABLE);
            }
        }
        interest
    }

    // ---- trivial handle kinds: allocate + insert with empty state ----------

    pub fn timer_init(&mut self) -> HandleId {
        let id = self.alloc_handle_id();
        self.insert_handle(Handle::new(id, HandleKind::Timer, HandlePayload::Timer(TimerHandleState::new())));
        id
    }

    pub fn idle_init(&mut self) -> HandleId {
        let id = self.alloc_handle_id();
        self.insert_handle(Handle::new(id, HandleKind::Idle, HandlePayload::Idle(IdleState::new())));
        id
    }

    pub fn check_init(&mut self) -> HandleId {
        let id = self.alloc_handle_id();
        self.insert_handle(Handle::new(id, HandleKind::Check, HandlePayload::Check(CheckState::new())));
        id
    }

    pub fn prepare_init(&mut self) -> HandleId {
        let id = self.alloc_handle_id();
        self.insert_handle(Handle::new(id, HandleKind::Prepare, HandlePayload::Prepare(PrepareState::new())));
        id
    }

    pub fn signal_init(&mut self, signum: i32) -> HandleId {
        let id = self.alloc_handle_id();
        self.insert_handle(Handle::new(id, HandleKind::Signal, HandlePayload::Signal(SignalState::new(signum))));
        id
    }

    // ---- timers (surface) ---------------------------------------

    pub fn timer_start(
        &mut self,
        id: HandleId,
        timeout_ms: u64,
        repeat_ms: u64,
        cb: TimerCallback,
    ) -> Result<()> {
        let handle = self.handles.get_mut(&id).ok_or(Error::BadF)?;
        if handle.kind != HandleKind::Timer {
            return Err(Error::Inval);
        }
        handle.activate();
        if let HandlePayload::Timer(state) = &mut handle.payload {
            state.cb = Some(cb);
        }
        self.timers.start(self.clock.now_ms(), id, timeout_ms, repeat_ms);
        Ok(())
    }

    pub fn timer_stop(&mut self, id: HandleId) {
        self.timers.stop(id);
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.deactivate();
        }
    }

    pub fn timer_again(&mut self, id: HandleId) -> Result<()> {
        self.timers.again(self.clock.now_ms(), id)?;
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.activate();
        }
        Ok(())
    }

    // ---- idle/check/prepare ------------------------------------

    pub fn idle_start(&mut self, id: HandleId, cb: crate::handles::idle::IdleCallback) -> Result<()> {
        let handle = self.handles.get_mut(&id).ok_or(Error::BadF)?;
        handle.activate();
        if let HandlePayload::Idle(state) = &mut handle.payload {
            state.cb = Some(cb);
        }
        Ok(())
    }

    pub fn idle_stop(&mut self, id: HandleId) {
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.deactivate();
        }
    }

    pub fn check_start(&mut self, id: HandleId, cb: crate::handles::check::CheckCallback) -> Result<()> {
        let handle = self.handles.get_mut(&id).ok_or(Error::BadF)?;
        handle.activate();
        if let HandlePayload::Check(state) = &mut handle.payload {
            state.cb = Some(cb);
        }
        Ok(())
    }

    pub fn check_stop(&mut self, id: HandleId) {
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.deactivate();
        }
    }

    pub fn prepare_start(
        &mut self,
        id: HandleId,
        cb: crate::handles::prepare::PrepareCallback,
    ) -> Result<()> {
        let handle = self.handles.get_mut(&id).ok_or(Error::BadF)?;
        handle.activate();
        if let HandlePayload::Prepare(state) = &mut handle.payload {
            state.cb = Some(cb);
        }
        Ok(())
    }

    pub fn prepare_stop(&mut self, id: HandleId) {
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.deactivate();
        }
    }

    // ---- async --------------------------------------------------

    pub fn async_init(
        &mut self,
        cb: crate::handles::async_handle::AsyncCallback,
    ) -> Result<(HandleId, AsyncSender)> {
        let id = self.alloc_handle_id();
        let mut state = AsyncState::new(Arc::clone(&self.waker));
        state.cb = Some(cb);
        let sender = state.sender();
        let mut handle = Handle::new(id, HandleKind::Async, HandlePayload::Async(state));
        handle.activate();
        self.insert_handle(handle);
        Ok((id, sender))
    }

    // ---- signals ("Signal") --------------------------------------

    pub fn signal_start(&mut self, id: HandleId, signum: i32, cb: crate::handles::signal::SignalCallback) -> Result<()> {
        if self.signal_fd.is_none() {
            let fd = crate::signal_pipe::ensure_pipe()?;
            self.poller.watch(fd, Interest::READABLE, SIGNAL_TOKEN)?;
            self.signal_fd = Some(fd);
        }
        let watchers = self.signal_watchers.entry(signum).or_default();
        if watchers.is_empty() {
            crate::signal_pipe::install_handler(signum)?;
        }
        watchers.push(id);

        let handle = self.handles.get_mut(&id).ok_or(Error::BadF)?;
        handle.activate();
        if let HandlePayload::Signal(state) = &mut handle.payload {
            state.cb = Some(cb);
        }
        Ok(())
    }

    pub fn signal_stop(&mut self, id: HandleId) {
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.deactivate();
            let signum = if let HandlePayload::Signal(state) = &handle.payload { Some(state.signum) } else { None };
            if let Some(signum) = signum {
                if let Some(watchers) = self.signal_watchers.get_mut(&signum) {
                    watchers.retain(|&w| w != id);
                    if watchers.is_empty() {
                        self.signal_watchers.remove(&signum);
                        crate::signal_pipe::restore_default(signum);
                    }
                }
            }
        }
    }

    fn dispatch_signals(&mut self) {
        let Some(fd) = self.signal_fd else { return };
        let signums = crate::signal_pipe::drain(fd);
        for signum in signums {
            if signum == libc::SIGCHLD {
                self.reap_children();
                continue;
            }
            let ids = self.signal_watchers.get(&signum).cloned().unwrap_or_default();
            for id in ids {
                self.with_handle(id, |loop_, handle| {
                    if let HandlePayload::Signal(state) = &mut handle.payload {
                        if let Some(mut cb) = state.cb.take() {
                            cb(loop_, id, signum);
                            state.cb = Some(cb);
                        }
                    }
                });
            }
        }
    }

    // ---- process handle ("Process") ------------------------------

    /// Called by `handles::process::spawn` right after `posix_spawn`
    /// succeeds; ensures `SIGCHLD` is being watched via the same self-pipe
    /// `Signal` handles use, then remembers which handle owns this pid.
    pub(crate) fn track_child(&mut self, pid: i32, id: HandleId) -> Result<()> {
        if self.signal_fd.is_none() {
            let fd = crate::signal_pipe::ensure_pipe()?;
            self.poller.watch(fd, Interest::READABLE, SIGNAL_TOKEN)?;
            self.signal_fd = Some(fd);
        }
        if !self.sigchld_installed {
            crate::signal_pipe::install_handler(libc::SIGCHLD)?;
            self.sigchld_installed = true;
        }
        self.child_processes.insert(pid, id);
        Ok(())
    }

    fn reap_children(&mut self) {
        loop {
            let mut status: libc::c_int = 0;
            let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
            if pid <= 0 {
                break;
            }
            let Some(id) = self.child_processes.remove(&pid) else { continue };
            let (exit_status, term_signal) = if libc::WIFEXITED(status) {
                (libc::WEXITSTATUS(status) as i64, 0)
            } else if libc::WIFSIGNALED(status) {
                (-1, libc::WTERMSIG(status))
            } else {
                (-1, 0)
            };
            self.with_handle(id, |loop_, handle| {
                if let HandlePayload::Process(state) = &mut handle.payload {
                    state.exit_status = Some((exit_status, term_signal));
                    if let Some(mut cb) = state.exit_cb.take() {
                        cb(loop_, id, exit_status, term_signal);
                        state.exit_cb = Some(cb);
                    }
                }
            });
        }
    }

    // ---- thread pool bridge ------------------------------------

    /// Submits blocking work to the pool; `work` runs off the loop thread
    /// and must return a `Completion` thunk to run back on it, which
    /// receives whether `cancel_request` was called before it was drained.
    /// Used by `crate::fs` for every blocking syscall.
    pub fn submit_work(&mut self, kind: RequestKind, handle: Option<HandleId>, work: WorkFn) -> RequestId {
        let id = self.requests.alloc(kind, handle);
        self.pool.submit(id, work);
        id
    }

    pub fn cancel_request(&mut self, id: RequestId) -> bool {
        self.requests.cancel(id)
    }

    fn drain_pool_completions(&mut self) {
        let drained = self.pool.drain_completions(self.config.max_pending_per_tick);
        for (id, completion) in drained {
            let canceled = self.requests.is_canceled(id);
            self.requests.forget(id);
            completion(self, id, canceled);
        }
    }
}

impl std::fmt::Debug for Loop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loop")
            .field("handles", &self.handles.len())
            .field("alive", &self.is_alive())
            .finish()
    }
}
