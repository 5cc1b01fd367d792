/// Runs a libc syscall, translating a `-1` return into `io::Error::last_os_error()`.
///
/// Mirrors the equivalent helper mio's unix selectors use at every `libc::`
/// call site so error propagation is uniform across epoll/kqueue/waker code.
#[cfg(unix)]
macro_rules! syscall {
    ($fn:ident ( $($arg:expr),* $(,)* ) ) => {{
        #[allow(unused_unsafe)]
        let res = unsafe { libc::$fn($($arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}
