use std::io;
use std::time::{Duration, Instant};

use libc::{c_int, c_short};

use crate::timeout::Deadline;

/// Outcome of waiting on a device descriptor together with a cancellation signal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// The device is ready for the requested operation.
    Ready,

    /// The cancellation signal fired. It takes precedence over device readiness.
    Cancelled,

    /// The deadline passed first.
    TimedOut,
}

pub fn wait_read_fd(fd: c_int, cancel_fd: c_int, deadline: &Deadline) -> io::Result<Readiness> {
    wait_fd(fd, cancel_fd, libc::POLLIN, deadline)
}

pub fn wait_write_fd(fd: c_int, cancel_fd: c_int, deadline: &Deadline) -> io::Result<Readiness> {
    wait_fd(fd, cancel_fd, libc::POLLOUT, deadline)
}

fn wait_fd(
    fd: c_int,
    cancel_fd: c_int,
    events: c_short,
    deadline: &Deadline,
) -> io::Result<Readiness> {
    let mut fds = [
        libc::pollfd {
            fd,
            events,
            revents: 0,
        },
        libc::pollfd {
            fd: cancel_fd,
            events: libc::POLLIN,
            revents: 0,
        },
    ];

    loop {
        let wait = do_poll(&mut fds, deadline.remaining(Instant::now()));

        if wait < 0 {
            let err = io::Error::last_os_error();

            // retried with the time left
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }

            return Err(err);
        }

        if fds[1].revents != 0 {
            return Ok(Readiness::Cancelled);
        }

        if wait == 0 {
            return Ok(Readiness::TimedOut);
        }

        let revents = fds[0].revents;

        if revents & libc::POLLNVAL != 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }

        // errors and hangups are reported by the read or write that follows
        if revents & (events | libc::POLLERR | libc::POLLHUP) != 0 {
            return Ok(Readiness::Ready);
        }

        if deadline.has_passed(Instant::now()) {
            return Ok(Readiness::TimedOut);
        }
    }
}

#[cfg(target_os = "linux")]
#[inline]
fn do_poll(fds: &mut [libc::pollfd], timeout: Option<Duration>) -> c_int {
    use std::ptr;

    let timeout_ts = timeout.map(|timeout| libc::timespec {
        tv_sec: timeout.as_secs() as _,
        tv_nsec: timeout.subsec_nanos() as _,
    });

    let timeout_ptr = match timeout_ts {
        Some(ref ts) => ts as *const libc::timespec,
        None => ptr::null(),
    };

    unsafe {
        libc::ppoll(
            fds.as_mut_ptr(),
            fds.len() as libc::nfds_t,
            timeout_ptr,
            ptr::null(),
        )
    }
}

#[cfg(not(target_os = "linux"))]
#[inline]
fn do_poll(fds: &mut [libc::pollfd], timeout: Option<Duration>) -> c_int {
    let milliseconds = match timeout {
        // rounded up so that the wait doesn't end before the deadline
        Some(timeout) => {
            let ms = timeout.as_nanos().div_ceil(1_000_000);
            ms.min(c_int::MAX as u128) as c_int
        }
        None => -1,
    };

    unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, milliseconds) }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::os::unix::prelude::*;

    use crate::posix::cancel::CancelSignal;

    fn pipe() -> (RawFd, RawFd) {
        let mut fds: [RawFd; 2] = [-1; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        (fds[0], fds[1])
    }

    fn close(fds: &[RawFd]) {
        for &fd in fds {
            unsafe { libc::close(fd) };
        }
    }

    #[test]
    fn times_out_without_data() {
        let (read, write) = pipe();
        let signal = CancelSignal::new().unwrap();

        let started = Instant::now();
        let deadline = Deadline::after(started, 50);
        let readiness = wait_read_fd(read, signal.as_raw_fd(), &deadline).unwrap();

        assert_eq!(readiness, Readiness::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(45));
        close(&[read, write]);
    }

    #[test]
    fn ready_when_data_is_available() {
        let (read, write) = pipe();
        let signal = CancelSignal::new().unwrap();
        assert_eq!(unsafe { libc::write(write, b"x".as_ptr() as *const _, 1) }, 1);

        let readiness = wait_read_fd(read, signal.as_raw_fd(), &Deadline::never()).unwrap();
        assert_eq!(readiness, Readiness::Ready);
        close(&[read, write]);
    }

    #[test]
    fn cancellation_wins_over_readiness() {
        let (read, write) = pipe();
        let signal = CancelSignal::new().unwrap();
        assert_eq!(unsafe { libc::write(write, b"x".as_ptr() as *const _, 1) }, 1);
        signal.arm().unwrap();

        let readiness = wait_read_fd(read, signal.as_raw_fd(), &Deadline::never()).unwrap();
        assert_eq!(readiness, Readiness::Cancelled);
        close(&[read, write]);
    }

    #[test]
    fn expired_deadline_polls_once() {
        let (read, write) = pipe();
        let signal = CancelSignal::new().unwrap();

        let deadline = Deadline::at(Instant::now());
        let readiness = wait_write_fd(write, signal.as_raw_fd(), &deadline).unwrap();
        assert_eq!(readiness, Readiness::Ready);

        let readiness = wait_read_fd(read, signal.as_raw_fd(), &deadline).unwrap();
        assert_eq!(readiness, Readiness::TimedOut);
        close(&[read, write]);
    }

    #[test]
    fn invalid_descriptor_is_an_error() {
        let signal = CancelSignal::new().unwrap();
        let (read, write) = pipe();
        close(&[read, write]);

        let err = wait_read_fd(read, signal.as_raw_fd(), &Deadline::never()).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }
}
