//! A single-threaded, event-driven I/O runtime core for a server-side
//! scripting host: the event loop, handle/request lifecycle, and stream I/O
//! engine that let scripted callbacks drive non-blocking network, pipe,
//! timer, child-process, and filesystem operations while a worker thread
//! pool absorbs the syscalls that can't be made non-blocking.
//!
//! `crate::bridge` is the stable surface meant for a host's binding glue;
//! everything else is free to change shape between versions.

#[macro_use]
mod macros;

pub mod bridge;
pub mod error;
pub mod evloop;
pub mod fs;
pub mod handle;
pub mod handles;
pub mod poller;
pub mod pool;
pub mod request;
mod signal_pipe;
pub mod stream;
pub mod time;

pub use bridge::*;
