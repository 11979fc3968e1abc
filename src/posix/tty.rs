use std::ffi::CString;
use std::io;
use std::path::Path;
use std::time::Instant;

use std::os::unix::prelude::*;

use ioctl_rs as ioctl;
use libc::{c_int, c_void, size_t};
use tracing::{debug, trace, warn};

use super::cancel::CancelSignal;
use super::error::{cvt, cvt_len, from_open_error, retry};
use super::poll::{self, Readiness};
use super::settings::TTYSettings;
use crate::config::PortConfig;
use crate::device::SerialDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::timeout::{Deadline, TimeoutPolicy};
use crate::ModemStatusBits;

/// A TTY-based serial port implementation.
///
/// The descriptor is opened non-blocking and every read or write first waits in `poll(2)` on
/// the descriptor and a [`CancelSignal`] together, so blocked calls can be woken from another
/// thread. The port is released when the value is dropped.
#[derive(Debug)]
pub struct TTYPort {
    fd: RawFd,
    cancel: CancelSignal,
    timeouts: TimeoutPolicy,
}

impl TTYPort {
    /// Opens a TTY device as a serial port.
    ///
    /// `path` should be the path to a TTY device, e.g., `/dev/ttyS0`.
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use serial_line::posix::TTYPort;
    /// use serial_line::PortConfig;
    ///
    /// TTYPort::open(Path::new("/dev/ttyS0"), &PortConfig::default()).unwrap();
    /// ```
    ///
    /// ## Errors
    ///
    /// * `PortNotFound` if the device doesn't exist.
    /// * `PortBusy` if another process holds the device exclusively.
    /// * `PermissionDenied` if the device can't be opened for reading and writing.
    /// * `InvalidSerialPort` if the device isn't a terminal.
    /// * `InvalidSpeed`, `InvalidParity` or `InvalidStopBits` if `config` can't be represented.
    pub fn open(path: &Path, config: &PortConfig) -> Result<Self> {
        use libc::{O_CLOEXEC, O_NOCTTY, O_NONBLOCK, O_RDWR};

        let cstr = match CString::new(path.as_os_str().as_bytes()) {
            Ok(s) => s,
            Err(err) => {
                let cause = io::Error::new(io::ErrorKind::InvalidInput, err);
                return Err(Error::with_cause(ErrorKind::PortNotFound, cause));
            }
        };

        let cancel = CancelSignal::new().map_err(Error::os)?;

        let fd = unsafe {
            libc::open(cstr.as_ptr(), O_RDWR | O_NOCTTY | O_NONBLOCK | O_CLOEXEC, 0)
        };
        if fd < 0 {
            return Err(from_open_error(io::Error::last_os_error()));
        }

        // from here on, dropping `port` releases the descriptor
        let mut port = TTYPort {
            fd,
            cancel,
            timeouts: TimeoutPolicy::default(),
        };

        // get exclusive access to device
        if let Err(err) = ioctl::tiocexcl(port.fd) {
            return Err(Error::with_cause(ErrorKind::InvalidSerialPort, err));
        }

        port.configure(config)?;

        debug!(path = %path.display(), fd = port.fd, "opened tty");
        Ok(port)
    }

    fn set_pin(&self, pin: c_int, level: bool) -> Result<()> {
        let retval = if level {
            ioctl::tiocmbis(self.fd, pin)
        } else {
            ioctl::tiocmbic(self.fd, pin)
        };

        retval.map_err(Error::os)
    }

    fn read_fd(&self, buf: &mut [u8]) -> io::Result<usize> {
        retry(|| {
            cvt_len(unsafe {
                libc::read(self.fd, buf.as_mut_ptr() as *mut c_void, buf.len() as size_t)
            })
        })
    }

    fn write_fd(&self, buf: &[u8]) -> io::Result<usize> {
        let written = retry(|| {
            cvt_len(unsafe {
                libc::write(self.fd, buf.as_ptr() as *const c_void, buf.len() as size_t)
            })
        });

        match written {
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => Ok(0),
            result => result,
        }
    }

    // Waits for writability with no deadline, then writes once.
    fn write_once(&self, buf: &[u8]) -> Result<usize> {
        match poll::wait_write_fd(self.fd, self.cancel.as_raw_fd(), &Deadline::never()) {
            Ok(Readiness::Ready) | Ok(Readiness::TimedOut) => {}
            Ok(Readiness::Cancelled) => return Err(Error::new(ErrorKind::PortClosed)),
            Err(err) => return Err(Error::os(err)),
        }

        let written = self.write_fd(buf).map_err(Error::os)?;
        trace!(fd = self.fd, written, "write");
        Ok(written)
    }

    fn release(&mut self) -> Result<()> {
        if self.fd < 0 {
            return Ok(());
        }

        let fd = self.fd;
        self.fd = -1;

        if let Err(err) = ioctl::tiocnxcl(fd) {
            warn!(fd, error = %err, "failed to release exclusive access");
        }

        // not retried: the descriptor is gone even if close(2) reports EINTR
        match cvt(unsafe { libc::close(fd) }) {
            Ok(_) => {
                debug!(fd, "closed tty");
                Ok(())
            }
            Err(err) => Err(Error::os(err)),
        }
    }
}

impl Drop for TTYPort {
    fn drop(&mut self) {
        #![allow(unused_must_use)]
        self.release();
    }
}

impl AsRawFd for TTYPort {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl SerialDevice for TTYPort {
    fn open(name: &str, config: &PortConfig) -> Result<Self> {
        TTYPort::open(Path::new(name), config)
    }

    fn configure(&mut self, config: &PortConfig) -> Result<()> {
        let mut settings = TTYSettings::from_fd(self.fd)
            .map_err(|err| Error::with_cause(ErrorKind::InvalidSerialPort, err))?;

        settings.configure(config)?;

        settings
            .apply(self.fd)
            .map_err(|err| Error::with_cause(ErrorKind::InvalidSerialPort, err))
    }

    fn timeouts(&self) -> TimeoutPolicy {
        self.timeouts
    }

    fn set_timeouts(&mut self, timeouts: TimeoutPolicy) -> Result<()> {
        self.timeouts = timeouts;
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let deadline = self.timeouts.read_deadline(Instant::now());
        let mut wait_until = deadline;
        let mut read = 0;

        while read < buf.len() {
            match poll::wait_read_fd(self.fd, self.cancel.as_raw_fd(), &wait_until) {
                Ok(Readiness::Ready) => {}
                Ok(Readiness::Cancelled) => {
                    return Err(Error::new(ErrorKind::PortClosed).after(read));
                }
                Ok(Readiness::TimedOut) => break,
                Err(err) => return Err(Error::os(err).after(read)),
            }

            let n = match self.read_fd(&mut buf[read..]) {
                Ok(0) => return Err(Error::new(ErrorKind::ReadFailed).after(read)),
                Ok(n) => n,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => continue,
                Err(err) => return Err(Error::os(err).after(read)),
            };

            read += n;
            trace!(fd = self.fd, n, read, "read");

            let now = Instant::now();
            if self.timeouts.read_complete(&deadline, now) {
                break;
            }

            wait_until = self.timeouts.next_chunk_deadline(&deadline, now);
        }

        Ok(read)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let deadline = match self.timeouts.write_deadline(Instant::now()) {
            Some(deadline) => deadline,
            None => return self.write_once(buf),
        };

        let mut written = 0;

        while written < buf.len() {
            match self.write_fd(&buf[written..]) {
                Ok(n) => written += n,
                Err(err) => return Err(Error::os(err).after(written)),
            }

            trace!(fd = self.fd, written, "write");

            if written == buf.len() {
                break;
            }

            if deadline.has_passed(Instant::now()) {
                return Ok(written);
            }

            match poll::wait_write_fd(self.fd, self.cancel.as_raw_fd(), &deadline) {
                Ok(Readiness::Ready) => {}
                Ok(Readiness::Cancelled) => {
                    return Err(Error::new(ErrorKind::PortClosed).after(written));
                }
                Ok(Readiness::TimedOut) => {
                    return Err(Error::new(ErrorKind::WriteFailed).after(written));
                }
                Err(err) => return Err(Error::os(err).after(written)),
            }
        }

        Ok(written)
    }

    fn ready_to_read(&self) -> Result<u32> {
        let mut available: c_int = 0;

        cvt(unsafe { libc::ioctl(self.fd, libc::FIONREAD, &mut available) }).map_err(Error::os)?;

        Ok(available.max(0) as u32)
    }

    fn reset_input_buffer(&self) -> Result<()> {
        termios::tcflush(self.fd, termios::TCIFLUSH).map_err(Error::os)
    }

    fn reset_output_buffer(&self) -> Result<()> {
        termios::tcflush(self.fd, termios::TCOFLUSH).map_err(Error::os)
    }

    fn drain(&self) -> Result<()> {
        retry(|| termios::tcdrain(self.fd)).map_err(Error::os)
    }

    fn set_dtr(&self, level: bool) -> Result<()> {
        self.set_pin(ioctl::TIOCM_DTR as c_int, level)
    }

    fn set_rts(&self, level: bool) -> Result<()> {
        self.set_pin(ioctl::TIOCM_RTS as c_int, level)
    }

    fn modem_status_bits(&self) -> Result<ModemStatusBits> {
        let pins = ioctl::tiocmget(self.fd).map_err(Error::os)?;
        Ok(modem_status_from_pins(pins))
    }

    fn cancel(&self) -> Result<()> {
        self.cancel.arm().map_err(Error::os)
    }

    fn close(mut self) -> Result<()> {
        if !self.cancel.is_armed() {
            self.cancel.arm().map_err(Error::os)?;
        }

        self.release()
    }
}

// ioctl-rs declares the TIOCM_* masks as c_uint on Linux and c_int elsewhere
#[allow(clippy::unnecessary_cast)]
fn modem_status_from_pins(pins: c_int) -> ModemStatusBits {
    ModemStatusBits {
        cts: pins & ioctl::TIOCM_CTS as c_int != 0,
        dsr: pins & ioctl::TIOCM_DSR as c_int != 0,
        ri: pins & ioctl::TIOCM_RI as c_int != 0,
        dcd: pins & ioctl::TIOCM_CD as c_int != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_modem_status_pins() {
        let pins = ioctl::TIOCM_CTS as c_int | ioctl::TIOCM_CD as c_int;
        let status = modem_status_from_pins(pins);

        assert!(status.cts);
        assert!(status.dcd);
        assert!(!status.dsr);
        assert!(!status.ri);

        let status = modem_status_from_pins(ioctl::TIOCM_DSR as c_int | ioctl::TIOCM_RI as c_int);
        assert!(status.dsr);
        assert!(status.ri);
        assert!(!status.cts);
        assert!(!status.dcd);

        assert_eq!(modem_status_from_pins(0), ModemStatusBits::default());
    }

    #[test]
    fn control_line_masks_are_distinct() {
        let dtr = ioctl::TIOCM_DTR as c_int;
        let rts = ioctl::TIOCM_RTS as c_int;

        assert_ne!(dtr, 0);
        assert_ne!(rts, 0);
        assert_eq!(dtr & rts, 0);
    }

    #[test]
    fn open_reports_missing_device() {
        let err = TTYPort::open(Path::new("/dev/does-not-exist"), &PortConfig::default())
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PortNotFound);
        assert_eq!(
            err.cause().and_then(|cause| cause.raw_os_error()),
            Some(libc::ENOENT)
        );
    }

    #[test]
    fn open_rejects_interior_nul() {
        let err = TTYPort::open(Path::new("/dev/tty\0S0"), &PortConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PortNotFound);
    }

    #[test]
    fn open_rejects_non_terminals() {
        let err = TTYPort::open(Path::new("/dev/null"), &PortConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSerialPort);
        assert!(err.cause().is_some());
    }
}
