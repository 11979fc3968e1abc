use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::PortConfig;
use crate::device::SerialDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::timeout::TimeoutPolicy;
use crate::{ModemStatusBits, NativeDevice};

/// An open serial connection.
///
/// A port starts out unopened, becomes open through [`open()`](#method.open) and ends closed
/// through [`close()`](#method.close). A closed port can't be reopened; construct a new one
/// instead. Every operation validates the port first and fails with `PortClosed` when it isn't
/// open, without touching the device.
///
/// `read()`, `write()` and `close()` take `&self`, so a port shared between threads (e.g. in an
/// `Arc`) can be closed while another thread is blocked reading or writing it. The blocked call
/// returns `PortClosed` promptly and the device is released only after it has returned. All other
/// operations that change the port's state take `&mut self`.
pub struct Port<D: SerialDevice = NativeDevice> {
    name: String,
    config: PortConfig,
    opened: bool,
    live: AtomicBool,
    device: RwLock<Option<D>>,
}

impl Port<NativeDevice> {
    /// Creates an unopened port for the named native device.
    pub fn new(name: impl Into<String>, config: PortConfig) -> Self {
        Port::unopened(name, config)
    }
}

impl<D: SerialDevice> Port<D> {
    /// Creates an unopened port backed by device type `D`.
    pub fn unopened(name: impl Into<String>, config: PortConfig) -> Self {
        Port {
            name: name.into(),
            config,
            opened: false,
            live: AtomicBool::new(false),
            device: RwLock::new(None),
        }
    }

    /// Opens the device and applies the port's configuration.
    ///
    /// ## Errors
    ///
    /// * `PortBusy` if this port is already open.
    /// * `PortClosed` if this port has been closed.
    /// * Any error of [`serial_line::open()`](crate::open).
    pub fn open(&mut self) -> Result<()> {
        if self.opened {
            let kind = if self.is_open() {
                ErrorKind::PortBusy
            } else {
                ErrorKind::PortClosed
            };
            return Err(Error::new(kind));
        }

        let mut device = D::open(&self.name, &self.config)?;
        apply_timeouts(&mut device, &self.config)?;

        *self.device.get_mut() = Some(device);
        self.opened = true;
        self.live.store(true, Ordering::Release);

        debug!(port = %self.name, baud_rate = self.config.baud_rate, "opened serial port");
        Ok(())
    }

    /// Returns the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration most recently applied.
    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    /// Returns `true` if the port has been opened and not closed.
    pub fn is_open(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Applies a new configuration to the open port.
    ///
    /// Line settings that the device can't represent are rejected before anything is changed.
    pub fn reconfigure(&mut self, config: &PortConfig) -> Result<()> {
        let applied = self.with_device_mut(|device| {
            device.configure(config)?;
            apply_timeouts(device, config)
        });

        if let Err(ref err) = applied {
            if err.kind().is_configuration() {
                debug!(port = %self.name, error = %err, "rejected configuration");
            } else if err.kind() != ErrorKind::PortClosed {
                warn!(port = %self.name, error = %err, "failed to reconfigure serial port");
            }
        }

        applied?;

        self.config = *config;
        debug!(port = %self.name, ?config, "reconfigured serial port");
        Ok(())
    }

    /// Reads bytes into `buf`, blocking according to the port's timeout policy.
    ///
    /// Returns the number of bytes read. A timeout is not an error: it returns the bytes read so
    /// far, which may be none.
    ///
    /// ## Errors
    ///
    /// * `PortClosed` if the port isn't open or is closed while the read is blocked.
    /// * `ReadFailed` if the device signalled readiness but produced no data.
    /// * `OsError` if the native read failed.
    ///
    /// Bytes read before a failure are in `buf[..err.transferred()]`.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.with_device(|device| device.read(buf))
    }

    /// Writes bytes from `buf`, blocking according to the port's timeout policy.
    ///
    /// With a write timeout of 0 a single write is attempted and its result returned as-is, even
    /// if it is partial. Otherwise writing continues until everything is written or the timeout
    /// expires, in which case the partial count is returned without error.
    ///
    /// ## Errors
    ///
    /// * `PortClosed` if the port isn't open or is closed while the write is blocked.
    /// * `WriteFailed` if the device didn't become writable before the deadline.
    /// * `OsError` if the native write failed.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.with_device(|device| device.write(buf))
    }

    /// Returns the number of bytes that can be read without blocking.
    pub fn ready_to_read(&self) -> Result<u32> {
        self.with_device(|device| device.ready_to_read())
    }

    /// Discards data received but not yet read.
    pub fn reset_input_buffer(&self) -> Result<()> {
        self.with_device(|device| device.reset_input_buffer())
    }

    /// Discards data written but not yet transmitted.
    pub fn reset_output_buffer(&self) -> Result<()> {
        self.with_device(|device| device.reset_output_buffer())
    }

    /// Blocks until all written data has been transmitted.
    pub fn drain(&self) -> Result<()> {
        self.with_device(|device| device.drain())
    }

    /// Sets the DTR (Data Terminal Ready) control line.
    pub fn set_dtr(&self, level: bool) -> Result<()> {
        self.with_device(|device| device.set_dtr(level))
    }

    /// Sets the RTS (Request To Send) control line.
    pub fn set_rts(&self, level: bool) -> Result<()> {
        self.with_device(|device| device.set_rts(level))
    }

    /// Reads the modem status lines from the device.
    pub fn modem_status_bits(&self) -> Result<ModemStatusBits> {
        self.with_device(|device| device.modem_status_bits())
    }

    /// Returns the current timeout policy.
    pub fn timeouts(&self) -> Result<TimeoutPolicy> {
        self.with_device(|device| Ok(device.timeouts()))
    }

    /// Bounds the total duration of reads to `milliseconds` and clears the first-byte flag.
    ///
    /// A timeout of 0 makes reads return whatever is buffered without waiting.
    pub fn set_read_timeout(&mut self, milliseconds: u32) -> Result<()> {
        self.with_device_mut(|device| {
            let mut timeouts = device.timeouts();
            timeouts.set_read_timeout(milliseconds);
            device.set_timeouts(timeouts)
        })
    }

    /// Bounds reads by `total` milliseconds overall and ends them early once some bytes have
    /// arrived and no further byte follows within `interval` milliseconds. Clears the first-byte
    /// flag. A `total` of 0 waits for the first byte without limit.
    ///
    /// ## Errors
    ///
    /// `InvalidTimeoutValue` if `interval` is 0 or `MAX_TIMEOUT_MS`.
    pub fn set_read_timeout_ex(&mut self, total: u32, interval: u32) -> Result<()> {
        self.with_device_mut(|device| {
            let mut timeouts = device.timeouts();
            timeouts.set_read_timeout_ex(total, interval)?;
            device.set_timeouts(timeouts)
        })
    }

    /// Bounds the total duration of writes to `milliseconds`; 0 selects a single write attempt.
    pub fn set_write_timeout(&mut self, milliseconds: u32) -> Result<()> {
        self.with_device_mut(|device| {
            let mut timeouts = device.timeouts();
            timeouts.set_write_timeout(milliseconds);
            device.set_timeouts(timeouts)
        })
    }

    /// Waits at most `milliseconds` for the first byte of a read, then returns as soon as any
    /// data has been read.
    ///
    /// ## Errors
    ///
    /// `InvalidTimeoutValue` if `milliseconds` is 0 or `MAX_TIMEOUT_MS`.
    pub fn set_first_byte_read_timeout(&mut self, milliseconds: u32) -> Result<()> {
        self.with_device_mut(|device| {
            let mut timeouts = device.timeouts();
            timeouts.set_first_byte_read_timeout(milliseconds)?;
            device.set_timeouts(timeouts)
        })
    }

    /// Closes the port.
    ///
    /// Any read or write blocked on the port is woken and returns `PortClosed` before the device
    /// is released. A second call returns `PortClosed`.
    pub fn close(&self) -> Result<()> {
        self.check_valid()?;

        if !self.live.swap(false, Ordering::AcqRel) {
            return Err(Error::new(ErrorKind::PortClosed));
        }

        debug!(port = %self.name, "closing serial port");

        let cancelled = match self.device.read().as_ref() {
            Some(device) => device.cancel(),
            None => Ok(()),
        };

        if let Err(ref err) = cancelled {
            warn!(port = %self.name, error = %err, "failed to signal pending operations");
        }

        // waits for in-flight operations to observe the cancellation
        let device = self.device.write().take();

        let closed = match device {
            Some(device) => device.close(),
            None => Ok(()),
        };

        cancelled.and(closed)
    }

    fn check_valid(&self) -> Result<()> {
        if !self.opened {
            return Err(Error::with_cause(
                ErrorKind::PortClosed,
                io::Error::new(io::ErrorKind::InvalidInput, "invalid argument"),
            ));
        }

        if !self.is_open() {
            return Err(Error::new(ErrorKind::PortClosed));
        }

        Ok(())
    }

    fn with_device<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&D) -> Result<T>,
    {
        self.check_valid()?;

        match self.device.read().as_ref() {
            Some(device) => f(device),
            None => Err(Error::new(ErrorKind::PortClosed)),
        }
    }

    fn with_device_mut<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut D) -> Result<T>,
    {
        self.check_valid()?;

        match self.device.get_mut().as_mut() {
            Some(device) => f(device),
            None => Err(Error::new(ErrorKind::PortClosed)),
        }
    }
}

fn apply_timeouts<D: SerialDevice>(device: &mut D, config: &PortConfig) -> Result<()> {
    if config.read_timeout_ms.is_none() && config.write_timeout_ms.is_none() {
        return Ok(());
    }

    let mut timeouts = device.timeouts();

    if let Some(milliseconds) = config.read_timeout_ms {
        timeouts.set_read_timeout(milliseconds);
    }

    if let Some(milliseconds) = config.write_timeout_ms {
        timeouts.set_write_timeout(milliseconds);
    }

    device.set_timeouts(timeouts)
}

impl<D: SerialDevice> fmt::Debug for Port<D> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Port")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("open", &self.is_open())
            .finish()
    }
}

impl<D: SerialDevice> fmt::Display for Port<D> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.name)
    }
}

// A failure after a partial transfer is reported as the partial count; the next call on the
// closed port reports the error.
fn io_result(result: Result<usize>, requested: usize) -> io::Result<usize> {
    match result {
        Ok(0) if requested > 0 => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "operation timed out",
        )),
        Ok(n) => Ok(n),
        Err(ref err) if err.transferred() > 0 => Ok(err.transferred()),
        Err(err) => Err(err.into()),
    }
}

impl<D: SerialDevice> io::Read for &Port<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io_result(Port::<D>::read(*self, buf), buf.len())
    }
}

impl<D: SerialDevice> io::Read for Port<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io_result(Port::<D>::read(self, buf), buf.len())
    }
}

impl<D: SerialDevice> io::Write for &Port<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io_result(Port::<D>::write(*self, buf), buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(Port::<D>::drain(*self)?)
    }
}

impl<D: SerialDevice> io::Write for Port<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io_result(Port::<D>::write(self, buf), buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(Port::<D>::drain(self)?)
    }
}
