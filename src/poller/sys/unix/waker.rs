//! Cross-thread wake-up primitive backing `crate::poller::waker::Waker`.
//! Linux gets `eventfd` (mio's preferred backend there); every other unix
//! falls back to a self-pipe, both watched for read by the selector so a
//! blocked `poll` wakes on either an I/O event or a wake-up.

use crate::error::Result;
use crate::poller::RawFd;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use eventfd::WakerInternal;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub use pipe::WakerInternal;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod eventfd {
    use std::fs::File;
    use std::io::{self, Read, Write};
    use std::os::fd::{AsRawFd, FromRawFd};

    use super::*;

    #[derive(Debug)]
    pub struct WakerInternal {
        fd: File,
    }

    impl WakerInternal {
        pub fn new() -> Result<WakerInternal> {
            let fd = syscall!(eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK))?;
            Ok(WakerInternal { fd: unsafe { File::from_raw_fd(fd) } })
        }

        pub fn wake(&self) -> Result<()> {
            let buf = 1u64.to_ne_bytes();
            match (&self.fd).write(&buf) {
                Ok(_) => Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.drain();
                    self.wake()
                }
                Err(e) => Err(crate::error::Error::from_io(&e)),
            }
        }

        pub fn drain(&self) {
            let mut buf = [0u8; 8];
            let _ = (&self.fd).read(&mut buf);
        }

        pub fn as_raw_fd(&self) -> RawFd {
            self.fd.as_raw_fd()
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
mod pipe {
    use std::io::{self, Read, Write};
    use std::os::fd::{FromRawFd, RawFd as StdRawFd};

    use super::*;

    #[derive(Debug)]
    pub struct WakerInternal {
        reader: std::fs::File,
        writer: std::fs::File,
    }

    impl WakerInternal {
        pub fn new() -> Result<WakerInternal> {
            let mut fds = [0 as StdRawFd; 2];
            syscall!(pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK))?;
            Ok(WakerInternal {
                reader: unsafe { std::fs::File::from_raw_fd(fds[0]) },
                writer: unsafe { std::fs::File::from_raw_fd(fds[1]) },
            })
        }

        pub fn wake(&self) -> Result<()> {
            match (&self.writer).write(&[1u8]) {
                Ok(_) => Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
                Err(e) => Err(crate::error::Error::from_io(&e)),
            }
        }

        pub fn drain(&self) {
            let mut buf = [0u8; 64];
            loop {
                match (&self.reader).read(&mut buf) {
                    Ok(0) => break,
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        }

        pub fn as_raw_fd(&self) -> RawFd {
            use std::os::fd::AsRawFd;
            self.reader.as_raw_fd()
        }
    }
}
