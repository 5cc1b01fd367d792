#[cfg(any(target_os = "linux", target_os = "android"))]
#[path = "epoll.rs"]
mod imp;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
))]
#[path = "kqueue.rs"]
mod imp;

pub use imp::{event, Events, Selector};

pub mod waker;
