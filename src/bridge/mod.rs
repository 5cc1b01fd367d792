//! The host bridge. A thin, stable surface a scripting host's
//! binding glue sits on top of — not literally `extern "C"` (that marshaling
//! layer is the host's own problem), but shaped so one
//! could sit directly on top without redesigning anything underneath: every
//! operation here takes `&mut Loop` plus plain Rust values/closures, and
//! every handle/request is an opaque, `Copy` id rather than a pointer the
//! host could misuse.
//!
//! This module doesn't re-implement anything; it re-exports the stable
//! subset of `crate::{evloop,handles,fs}` a host actually needs, so the rest
//! of the crate stays free to reshape its internals without breaking callers
//! who only ever go through `crate::bridge`.

pub use crate::error::{strerror_message, strerror_name, Error, Result};
pub use crate::evloop::{Loop, LoopConfig};
pub use crate::handle::{CloseCallback, HandleFlags, HandleId, HandleKind};
pub use crate::request::{RequestId, RequestKind};

pub use crate::handles::async_handle::{AsyncCallback, AsyncSender};
pub use crate::handles::check::CheckCallback;
pub use crate::handles::idle::IdleCallback;
pub use crate::handles::prepare::PrepareCallback;
pub use crate::handles::process;
pub use crate::handles::process::{ExitCallback, Stdio};
pub use crate::handles::signal::SignalCallback;
pub use crate::handles::timer::TimerCallback;

pub use crate::handles::pipe;
pub use crate::handles::tcp;
pub use crate::handles::tty;

pub use crate::stream::{AcceptCallback, AllocCallback, ConnectCallback, ReadCallback, ShutdownCallback, WriteCallback};

pub use crate::fs;
pub use crate::fs::resolver;

#[cfg(test)]
mod tests {
    use super::*;

    /// The bridge surface alone is enough to take a loop through one full
    /// iteration without reaching into any other module directly.
    #[test]
    fn run_once_through_the_bridge_only() {
        let mut loop_ = Loop::new(LoopConfig::default()).unwrap();
        let id = loop_.timer_init();
        loop_.timer_start(id, 0, 0, Box::new(|loop_: &mut Loop, _id: HandleId| loop_.stop())).unwrap();
        loop_.run().unwrap();
    }
}
