//! The thread pool bridge. Blocking syscalls (`fs`, the resolver) run here
//! instead of on the loop thread; completions are handed back across to the
//! loop thread and drained on its next wakeup.
//!
//! Exactly two synchronization primitives make up the whole bridge: a
//! `Mutex`+`Condvar` pair guarding the work queue that idle workers block on,
//! and a plain `Mutex` guarding the completion queue the loop drains — the
//! loop doesn't need a condvar there because the `Waker` is what actually
//! wakes it.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::poller::waker::Waker;
use crate::request::RequestId;

/// A unit of work submitted from the loop thread; `run` executes on a pool
/// thread and must not touch loop state directly — it returns a completion
/// thunk that the loop thread runs later, with `&mut Loop` in hand.
pub type WorkFn = Box<dyn FnOnce() -> Completion + Send>;
/// `bool` is whether the owning request was canceled before this completion
/// was drained; the closure itself decides what that means for its result.
pub type Completion = Box<dyn FnOnce(&mut crate::evloop::Loop, RequestId, bool) + Send>;

struct Job {
    request: RequestId,
    work: WorkFn,
}

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    queue_cv: Condvar,
    completions: Mutex<VecDeque<(RequestId, Completion)>>,
    shutdown: Mutex<bool>,
}

pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(size: usize, waker: Arc<Waker>) -> ThreadPool {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            queue_cv: Condvar::new(),
            completions: Mutex::new(VecDeque::new()),
            shutdown: Mutex::new(false),
        });

        let workers = (0..size.max(1))
            .map(|idx| {
                let shared = Arc::clone(&shared);
                let waker = Arc::clone(&waker);
                std::thread::Builder::new()
                    .name(format!("aioloop-worker-{idx}"))
                    .spawn(move || worker_loop(shared, waker))
                    .expect("spawning a pool worker thread")
            })
            .collect();

        ThreadPool { shared, workers }
    }

    pub fn submit(&self, request: RequestId, work: WorkFn) {
        self.shared.queue.lock().unwrap().push_back(Job { request, work });
        self.shared.queue_cv.notify_one();
    }

    /// Pops at most `max` completions that arrived since the last call,
    /// leaving any remainder queued for the next drain, to be run one at a
    /// time by the loop's pending-callbacks phase.
    pub fn drain_completions(&self, max: usize) -> Vec<(RequestId, Completion)> {
        let mut guard = self.shared.completions.lock().unwrap();
        let n = guard.len().min(max);
        guard.drain(..n).collect()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        *self.shared.shutdown.lock().unwrap() = true;
        self.shared.queue_cv.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>, waker: Arc<Waker>) {
    loop {
        let job = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                if *shared.shutdown.lock().unwrap() {
                    return;
                }
                queue = shared.queue_cv.wait(queue).unwrap();
            }
        };
        let Some(job) = job else { return };

        let completion = (job.work)();
        shared.completions.lock().unwrap().push_back((job.request, completion));
        // Best-effort: if the loop is already awake this just sets a byte
        // the next `poll` reads harmlessly, per this crate's wakeup contract.
        let _ = waker.wake();
    }
}
