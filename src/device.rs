use crate::config::PortConfig;
use crate::error::Result;
use crate::timeout::TimeoutPolicy;
use crate::ModemStatusBits;

/// A trait for native serial port devices.
///
/// A device owns exactly one open OS handle together with the cancellation signal used to
/// interrupt blocked reads and writes. The handle is released by [`close()`](#tymethod.close)
/// or, failing that, when the device is dropped.
///
/// Devices don't track liveness; [`Port`](crate::Port) validates that before delegating to them.
/// Apart from `cancel()`, callers must not invoke a device after it has been cancelled.
///
/// Every blocking call waits on both the handle and the cancellation signal, so a concurrent
/// `cancel()` makes it return `PortClosed` promptly. Calls interrupted by a signal delivered to
/// the thread are retried internally and never surface as errors.
pub trait SerialDevice: Send + Sync + Sized {
    /// Opens the named device, puts it into raw mode and applies `config`'s line settings.
    ///
    /// Timeout fields of `config` are not applied here; the device starts with
    /// `TimeoutPolicy::default()`.
    fn open(name: &str, config: &PortConfig) -> Result<Self>;

    /// Applies the line settings of `config`.
    ///
    /// Settings that can't be represented are reported before anything is written to the
    /// device, so a failed call leaves the previous settings in place.
    fn configure(&mut self, config: &PortConfig) -> Result<()>;

    /// Returns the current timeout policy.
    fn timeouts(&self) -> TimeoutPolicy;

    /// Replaces the timeout policy, pushing it to the device where the platform requires it.
    fn set_timeouts(&mut self, timeouts: TimeoutPolicy) -> Result<()>;

    /// Reads into `buf` under the current timeout policy.
    ///
    /// Returns the number of bytes read, which is 0 if the read timed out. An error returned
    /// after some bytes were read carries that count in
    /// [`Error::transferred()`](crate::Error::transferred).
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Writes `buf` under the current timeout policy.
    ///
    /// Returns the number of bytes written, which is less than `buf.len()` if the write timed out.
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Returns the number of bytes waiting in the input buffer without consuming them.
    fn ready_to_read(&self) -> Result<u32>;

    /// Discards data received but not read.
    fn reset_input_buffer(&self) -> Result<()>;

    /// Discards data written but not transmitted.
    fn reset_output_buffer(&self) -> Result<()>;

    /// Waits until all written data has been transmitted.
    fn drain(&self) -> Result<()>;

    /// Sets the state of the DTR (Data Terminal Ready) control line.
    fn set_dtr(&self, level: bool) -> Result<()>;

    /// Sets the state of the RTS (Request To Send) control line.
    fn set_rts(&self, level: bool) -> Result<()>;

    /// Queries the modem status lines.
    fn modem_status_bits(&self) -> Result<ModemStatusBits>;

    /// Arms the cancellation signal.
    ///
    /// Wakes every read or write blocked on the device and makes all later waits return
    /// `PortClosed` immediately. Safe to call while other threads are inside `read()` or
    /// `write()`.
    fn cancel(&self) -> Result<()>;

    /// Releases the handle and the cancellation signal.
    fn close(self) -> Result<()>;
}
