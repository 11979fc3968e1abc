use std::io;
use std::os::unix::prelude::*;

use libc::c_void;

use super::error::{cvt, cvt_len, retry};

/// A level-triggered wakeup that can be polled together with a device descriptor.
///
/// The signal is a pipe. Arming it writes a byte that is never consumed, so the read end stays
/// readable and every `poll(2)` that includes it, current or future, returns immediately.
#[derive(Debug)]
pub struct CancelSignal {
    read: RawFd,
    write: RawFd,
}

impl CancelSignal {
    pub fn new() -> io::Result<Self> {
        let mut fds: [RawFd; 2] = [-1; 2];
        cvt(unsafe { libc::pipe(fds.as_mut_ptr()) })?;

        let signal = CancelSignal {
            read: fds[0],
            write: fds[1],
        };

        for &fd in &fds {
            cvt(unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) })?;
        }

        // arming must never block, even if it happens repeatedly
        let flags = cvt(unsafe { libc::fcntl(signal.write, libc::F_GETFL) })?;
        cvt(unsafe { libc::fcntl(signal.write, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;

        Ok(signal)
    }

    /// Wakes all current and future waiters.
    pub fn arm(&self) -> io::Result<()> {
        let byte = [0u8];

        let written = retry(|| {
            cvt_len(unsafe { libc::write(self.write, byte.as_ptr() as *const c_void, 1) })
        });

        match written {
            Ok(_) => Ok(()),
            // a full pipe is already readable
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Returns `true` once `arm()` has been called.
    pub fn is_armed(&self) -> bool {
        let mut fds = [libc::pollfd {
            fd: self.read,
            events: libc::POLLIN,
            revents: 0,
        }];

        let ready = retry(|| cvt(unsafe { libc::poll(fds.as_mut_ptr(), 1, 0) }));
        matches!(ready, Ok(n) if n > 0)
    }
}

impl AsRawFd for CancelSignal {
    fn as_raw_fd(&self) -> RawFd {
        self.read
    }
}

impl Drop for CancelSignal {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.write);
            libc::close(self.read);
        }
    }
}
