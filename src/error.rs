//! The errno-style error space every completion callback in the bridge
//! speaks: a small fixed set of named kinds layered over raw
//! OS errno values, plus `strerror`-style name/message lookups.

/// Sentinel magnitude used to encode EOF as a result code. Not a real OS
/// errno; chosen well outside the range `errno.h` assigns on any supported
/// platform so `from_errno`/`to_errno` never collide with it.
const EOF_SENTINEL: i32 = 0x4000_0000;

/// A result code as delivered to a completion callback: `>= 0` is success
/// (often a byte count), `< 0` is a negated [`Error`] code. See
/// [`Error::to_result`] / [`Error::from_result`].
pub type Result<T> = std::result::Result<T, Error>;

/// One member of the core's fixed error space.
///
/// Variants without an explicit discriminant are logical contract errors
/// the core itself raises (misuse, not a syscall failure); `Os` carries a
/// raw errno that didn't map to one of the named kinds.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Stream reached end-of-file. Not a failure; delivered as a read result.
    #[error("end of file")]
    Eof,
    #[error("resource temporarily unavailable")]
    Again,
    #[error("connection reset by peer")]
    ConnReset,
    /// An in-flight operation was aborted by `close`.
    #[error("operation canceled")]
    Canceled,
    #[error("no buffer space available")]
    NoBufs,
    #[error("broken pipe")]
    Pipe,
    #[error("connection refused")]
    ConnRefused,
    #[error("address already in use")]
    AddrInUse,
    #[error("address not available")]
    AddrNotAvail,
    #[error("socket is not connected")]
    NotConn,
    #[error("socket is already connected")]
    IsConn,
    #[error("too many open files")]
    MFile,
    #[error("no such file or directory")]
    NoEnt,
    #[error("permission denied")]
    Access,
    #[error("no space left on device")]
    NoSpace,
    #[error("out of memory")]
    NoMem,
    /// Misuse of the API: double-close, invalid argument, starting an
    /// already-active watcher, `repeat` on a never-started timer, etc.
    #[error("invalid argument")]
    Inval,
    #[error("bad file descriptor")]
    BadF,
    /// A raw OS errno that doesn't correspond to one of the named kinds
    /// above. Carries the value so `strerror_message` can still render it.
    #[error("OS error {0}")]
    Os(i32),
}

impl Error {
    /// Maps a raw (positive) OS `errno` value to our fixed space.
    pub fn from_errno(errno: i32) -> Error {
        #[cfg(unix)]
        {
            match errno {
                EOF_SENTINEL => Error::Eof,
                libc::ECANCELED => Error::Canceled,
                libc::ECONNRESET => Error::ConnReset,
                libc::ENOBUFS => Error::NoBufs,
                libc::EPIPE => Error::Pipe,
                libc::ECONNREFUSED => Error::ConnRefused,
                libc::EADDRINUSE => Error::AddrInUse,
                libc::EADDRNOTAVAIL => Error::AddrNotAvail,
                libc::ENOTCONN => Error::NotConn,
                libc::EISCONN => Error::IsConn,
                libc::EMFILE => Error::MFile,
                libc::ENOENT => Error::NoEnt,
                libc::EACCES => Error::Access,
                libc::ENOSPC => Error::NoSpace,
                libc::ENOMEM => Error::NoMem,
                libc::EINVAL => Error::Inval,
                libc::EBADF => Error::BadF,
                libc::EAGAIN => Error::Again,
                other => Error::Os(other),
            }
        }
        #[cfg(not(unix))]
        {
            Error::Os(errno)
        }
    }

    /// Converts a `std::io::Error` into our space, falling back to `Os` for
    /// errors that didn't originate from a raw OS errno.
    pub fn from_io(err: &std::io::Error) -> Error {
        match err.raw_os_error() {
            Some(errno) => Error::from_errno(errno),
            None => Error::Os(-1),
        }
    }

    /// The negative-errno encoding used by every completion callback:
    /// `result < 0` carries `-errno`-shaped meaning; this function returns
    /// that negative code for `self`.
    pub fn to_result_code(self) -> isize {
        -(self.to_errno() as isize)
    }

    /// The positive errno magnitude backing this error.
    pub fn to_errno(self) -> i32 {
        #[cfg(unix)]
        {
            match self {
                Error::Eof => EOF_SENTINEL,
                Error::Again => libc::EAGAIN,
                Error::ConnReset => libc::ECONNRESET,
                Error::Canceled => libc::ECANCELED,
                Error::NoBufs => libc::ENOBUFS,
                Error::Pipe => libc::EPIPE,
                Error::ConnRefused => libc::ECONNREFUSED,
                Error::AddrInUse => libc::EADDRINUSE,
                Error::AddrNotAvail => libc::EADDRNOTAVAIL,
                Error::NotConn => libc::ENOTCONN,
                Error::IsConn => libc::EISCONN,
                Error::MFile => libc::EMFILE,
                Error::NoEnt => libc::ENOENT,
                Error::Access => libc::EACCES,
                Error::NoSpace => libc::ENOSPC,
                Error::NoMem => libc::ENOMEM,
                Error::Inval => libc::EINVAL,
                Error::BadF => libc::EBADF,
                Error::Os(e) => e,
            }
        }
        #[cfg(not(unix))]
        {
            match self {
                Error::Os(e) => e,
                _ => -1,
            }
        }
    }

    /// `strerror(code) -> name`: the short symbolic name (`"ECANCELED"`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Error::Eof => "EOF",
            Error::Again => "EAGAIN",
            Error::ConnReset => "ECONNRESET",
            Error::Canceled => "ECANCELED",
            Error::NoBufs => "ENOBUFS",
            Error::Pipe => "EPIPE",
            Error::ConnRefused => "ECONNREFUSED",
            Error::AddrInUse => "EADDRINUSE",
            Error::AddrNotAvail => "EADDRNOTAVAIL",
            Error::NotConn => "ENOTCONN",
            Error::IsConn => "EISCONN",
            Error::MFile => "EMFILE",
            Error::NoEnt => "ENOENT",
            Error::Access => "EACCES",
            Error::NoSpace => "ENOSPC",
            Error::NoMem => "ENOMEM",
            Error::Inval => "EINVAL",
            Error::BadF => "EBADF",
            Error::Os(_) => "UNKNOWN",
        }
    }
}

/// Helper so `name()`/`Display` line up with the `strerror(code) -> name,
/// strerror(code) -> message` surface a scripting host's bindings need.
pub fn strerror_name(code: i32) -> &'static str {
    Error::from_errno(code.unsigned_abs() as i32).name()
}

pub fn strerror_message(code: i32) -> String {
    Error::from_errno(code.unsigned_abs() as i32).to_string()
}
