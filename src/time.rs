//! Monotonic clock cache and the timer min-heap.
//!
//! The loop caches `Instant::now()` once per iteration (`loop_now`) so every
//! timer comparison and callback within one iteration sees a consistent
//! "now". All timer bookkeeping lives here; `crate::evloop`
//! only calls `Clock::update` and `Timers::run_due`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::handle::HandleId;

/// Cached monotonic time, refreshed once per loop iteration.
#[derive(Debug)]
pub struct Clock {
    started: Instant,
    now_ms: u64,
}

impl Clock {
    pub fn new() -> Clock {
        Clock { started: Instant::now(), now_ms: 0 }
    }

    /// Refreshes the cached time. Called at the top of every iteration
    /// (phase 1) and once more immediately after a blocking poll call.
    pub fn update(&mut self) {
        self.now_ms = self.started.elapsed().as_millis() as u64;
    }

    /// The cached "now", in milliseconds since the clock was created.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }
}

impl Default for Clock {
    fn default() -> Clock {
        Clock::new()
    }
}

/// A single entry in the timer heap. Ordered by `(deadline_ms,
/// start_sequence)` ascending so two timers due in the same iteration fire
/// in the order they were started.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct TimerEntry {
    deadline_ms: u64,
    start_seq: u64,
    handle: HandleId,
    generation: u64,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest deadline sorts
        // to the top.
        other
            .deadline_ms
            .cmp(&self.deadline_ms)
            .then_with(|| other.start_seq.cmp(&self.start_seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-handle timer bookkeeping kept outside the heap so `timer_stop` can
/// invalidate an entry in O(1) without a heap removal: the heap entry is
/// left in place and discarded (lazy deletion) when popped if its
/// `generation` no longer matches.
#[derive(Debug, Clone, Copy)]
struct TimerState {
    repeat_ms: u64,
    generation: u64,
    active: bool,
}

/// The loop's timer heap plus a side table of per-handle state, enabling
/// O(log n) `timer_start`/lazy O(log n) `timer_stop`/`timer_again`.
///
/// Backed by `std::collections::BinaryHeap` rather than a hand-rolled 4-ary
/// heap; fan-out is free to pick as long as pop order respects
/// `(deadline, start_sequence)`, which a binary heap gives for free and more
/// simply than hand-rolling wider arithmetic.
#[derive(Debug, Default)]
pub struct Timers {
    heap: BinaryHeap<TimerEntry>,
    state: std::collections::HashMap<HandleId, TimerState>,
    next_seq: u64,
    active_count: usize,
}

impl Timers {
    pub fn new() -> Timers {
        Timers::default()
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// `timer_start(handle, timeout_ms, repeat_ms)`.
    pub fn start(&mut self, now_ms: u64, handle: HandleId, timeout_ms: u64, repeat_ms: u64) {
        let was_active = self.state.get(&handle).is_some_and(|s| s.active);
        let generation = self
            .state
            .get(&handle)
            .map(|s| s.generation.wrapping_add(1))
            .unwrap_or(0);
        self.state.insert(handle, TimerState { repeat_ms, generation, active: true });
        if !was_active {
            self.active_count += 1;
        }
        self.push(now_ms + timeout_ms, handle, generation);
    }

    fn push(&mut self, deadline_ms: u64, handle: HandleId, generation: u64) {
        let start_seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimerEntry { deadline_ms, start_seq, handle, generation });
    }

    /// `timer_stop`. Idempotent: stopping an inactive/unknown timer is a
    /// no-op, matching handle-base semantics where deactivation just drops
    /// the activating condition.
    pub fn stop(&mut self, handle: HandleId) {
        if let Some(state) = self.state.get_mut(&handle) {
            if state.active {
                state.active = false;
                state.generation = state.generation.wrapping_add(1);
                self.active_count -= 1;
            }
        }
    }

    /// `timer_again`: restart a running repeating timer with its own
    /// `repeat_ms` as the new timeout. Fails with `EINVAL` if the timer was
    /// never started with a nonzero `repeat_ms`.
    pub fn again(&mut self, now_ms: u64, handle: HandleId) -> Result<()> {
        let repeat_ms = match self.state.get(&handle) {
            Some(s) if s.repeat_ms > 0 => s.repeat_ms,
            _ => return Err(Error::Inval),
        };
        self.start(now_ms, handle, repeat_ms, repeat_ms);
        Ok(())
    }

    pub fn is_active(&self, handle: HandleId) -> bool {
        self.state.get(&handle).is_some_and(|s| s.active)
    }

    /// Milliseconds until the earliest live timer is due, or `None` if no
    /// timer is armed. Used by the loop to compute the poll timeout.
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.live_peek().map(|e| e.deadline_ms)
    }

    fn live_peek(&self) -> Option<&TimerEntry> {
        // Lazily skip stale (stopped/superseded) entries sitting at the top
        // without mutating; `run_due` does the actual popping/cleanup.
        self.heap.iter().filter(|e| self.is_live(e)).min_by(|a, b| {
            a.deadline_ms
                .cmp(&b.deadline_ms)
                .then_with(|| a.start_seq.cmp(&b.start_seq))
        })
    }

    fn is_live(&self, entry: &TimerEntry) -> bool {
        match self.state.get(&entry.handle) {
            Some(s) => s.active && s.generation == entry.generation,
            None => false,
        }
    }

    /// Pops and returns every timer handle due at or before `now_ms`, in
    /// `(deadline, start_sequence)` order, reinserting repeating timers with
    /// their next deadline *before* returning the handle to the caller —
    /// matching this crate's requirement that a `timer_stop` called from
    /// within the fired callback is honored (the reinsertion already
    /// happened, but the callback may immediately call `stop`, which will
    /// bump the generation and make the just-pushed entry stale).
    pub fn run_due(&mut self, now_ms: u64) -> Vec<HandleId> {
        let mut due = Vec::new();
        loop {
            let top_deadline = match self.heap.peek() {
                Some(e) => e.deadline_ms,
                None => break,
            };
            if top_deadline > now_ms {
                break;
            }
            let entry = self.heap.pop().unwrap();
            // Stale entry: handle was stopped/restarted since this entry
            // was pushed (generation mismatch). Lazily discard it.
            if !self.is_live(&entry) {
                continue;
            }
            let repeat_ms = self.state.get(&entry.handle).unwrap().repeat_ms;
            if repeat_ms > 0 {
                let next_deadline = std::cmp::max(now_ms, entry.deadline_ms + repeat_ms);
                let generation = self.state.get(&entry.handle).unwrap().generation;
                self.push(next_deadline, entry.handle, generation);
            } else {
                let state = self.state.get_mut(&entry.handle).unwrap();
                state.active = false;
                self.active_count -= 1;
            }
            due.push(entry.handle);
        }
        due
    }

    pub fn remove(&mut self, handle: HandleId) {
        self.stop(handle);
        self.state.remove(&handle);
    }
}

/// Clamps a computed poll timeout to a non-negative `Duration`, used by
/// `crate::evloop` phase 6.
pub fn ms_to_duration(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hid(n: usize) -> HandleId {
        HandleId::from_raw(n)
    }

    #[test]
    fn fires_in_deadline_then_start_order() {
        // Start A(10ms), B(20ms), C(10ms) in that order; expect A, C, B.
        let mut timers = Timers::new();
        timers.start(0, hid(0), 10, 0); // A
        timers.start(0, hid(1), 20, 0); // B
        timers.start(0, hid(2), 10, 0); // C

        let due = timers.run_due(15);
        assert_eq!(due, vec![hid(0), hid(2)]);

        let due = timers.run_due(20);
        assert_eq!(due, vec![hid(1)]);
    }

    #[test]
    fn stop_from_within_tick_is_honored() {
        let mut timers = Timers::new();
        timers.start(0, hid(0), 10, 10);
        let due = timers.run_due(10);
        assert_eq!(due, vec![hid(0)]);
        // Repeating timer rearmed for 20; simulate the callback stopping it.
        timers.stop(hid(0));
        assert!(timers.run_due(30).is_empty());
    }

    #[test]
    fn again_requires_prior_repeat() {
        let mut timers = Timers::new();
        timers.start(0, hid(0), 10, 0);
        assert_eq!(timers.again(5, hid(0)), Err(Error::Inval));

        let mut timers = Timers::new();
        timers.start(0, hid(1), 10, 10);
        timers.run_due(10);
        assert!(timers.again(10, hid(1)).is_ok());
        assert_eq!(timers.run_due(20), vec![hid(1)]);
    }

    #[test]
    fn next_deadline_ignores_stale_entries() {
        let mut timers = Timers::new();
        timers.start(0, hid(0), 10, 0);
        timers.start(0, hid(0), 50, 0); // restart before it fired
        assert_eq!(timers.next_deadline_ms(), Some(50));
    }
}
