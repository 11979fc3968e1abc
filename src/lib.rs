//! Cross-platform access to serial ports.
//!
//! A [`Port`] is opened from a device name and a [`PortConfig`]. Reads and writes are blocking
//! calls bounded by the port's [`TimeoutPolicy`]; a timeout is never an error but a short (possibly
//! empty) transfer. Closing a port from another thread wakes any read or write blocked on it,
//! which then fails with [`ErrorKind::PortClosed`].
//!
//! ```no_run
//! use serial_line::PortConfig;
//!
//! let port = serial_line::open("/dev/ttyUSB0", &PortConfig::default().with_baud_rate(115_200))?;
//!
//! port.write(b"AT\r\n")?;
//!
//! let mut buf = [0u8; 64];
//! let n = port.read(&mut buf)?;
//! println!("{:?}", &buf[..n]);
//! # Ok::<(), serial_line::Error>(())
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use crate::config::PortConfig;
pub use crate::device::SerialDevice;
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::port::Port;
pub use crate::timeout::{Deadline, TimeoutPolicy, MAX_TIMEOUT_MS};

mod config;
mod device;
mod error;
mod port;
mod timeout;

#[cfg(unix)]
pub mod posix;

#[cfg(windows)]
pub mod windows;

/// The serial device implementation for the target platform.
#[cfg(unix)]
pub type NativeDevice = posix::TTYPort;

/// The serial device implementation for the target platform.
#[cfg(windows)]
pub type NativeDevice = windows::COMPort;

/// Opens a native serial port.
///
/// The argument must be one that's understood by the target operating system to identify a serial
/// port. On Unix systems, it should be a path to a TTY device file. On Windows, it should be the
/// name of a COM port.
///
/// ## Examples
///
/// ```no_run
/// use serial_line::PortConfig;
///
/// let port = serial_line::open("/dev/ttyUSB0", &PortConfig::default()).unwrap();
/// ```
///
/// Hard-coding the device name diminishes the cross-platform utility of `serial_line::open()`. To
/// preserve cross-platform functionality, device names should come from external sources, such
/// as [`list_ports()`].
///
/// ## Errors
///
/// * `PortNotFound` if the device doesn't exist.
/// * `PortBusy` if the device is in use by another process.
/// * `PermissionDenied` if the user may not open the device.
/// * `InvalidSpeed`, `InvalidDataBits`, `InvalidParity`, `InvalidStopBits` if the configuration
///   can't be represented by the device.
/// * `InvalidSerialPort` if the device isn't a serial port.
/// * `OsError` for any other failure.
pub fn open<T: AsRef<str> + ?Sized>(port: &T, config: &PortConfig) -> Result<Port> {
    let mut port = Port::new(port.as_ref(), *config);
    port.open()?;
    Ok(port)
}

/// Lists the names of the serial ports present on the system.
///
/// ## Errors
///
/// `ErrorEnumeratingPorts` if the system's device list can't be read.
pub fn list_ports() -> Result<Vec<String>> {
    #[cfg(unix)]
    return posix::list_ports();

    #[cfg(windows)]
    return windows::list_ports();
}

/// Number of bits per character.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DataBits {
    /** 5 bits per character. */ Five,
    /** 6 bits per character. */ Six,
    /** 7 bits per character. */ Seven,
    /** 8 bits per character. */ Eight,
}

impl DataBits {
    /// Returns the number of bits per character.
    pub fn bits(self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = Error;

    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            _ => Err(Error::new(ErrorKind::InvalidDataBits)),
        }
    }
}

/// Parity checking modes.
///
/// When parity checking is enabled (`Odd` or `Even`) an extra bit is transmitted with each
/// character. The value of the parity bit is arranged so that the number of 1 bits in the
/// character (including the parity bit) is an even number (`Even`) or an odd number (`Odd`).
///
/// `Mark` and `Space` transmit a parity bit that is always 1 or always 0. Not every platform can
/// represent them; applying them there fails with `InvalidParity`.
///
/// Parity checking is disabled by setting `None`, in which case parity bits are not transmitted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Parity {
    /// No parity bit.
    None,

    /// Parity bit sets odd number of 1 bits.
    Odd,

    /// Parity bit sets even number of 1 bits.
    Even,

    /// Parity bit is always 1.
    Mark,

    /// Parity bit is always 0.
    Space,
}

/// Number of stop bits.
///
/// Stop bits are transmitted after every character. `OnePointFive` is accepted as a value, but
/// backends that can't represent it fail with `InvalidStopBits` when it is applied.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StopBits {
    /// One stop bit.
    One,

    /// One and a half stop bits.
    OnePointFive,

    /// Two stop bits.
    Two,
}

/// Flow control modes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FlowControl {
    /// No flow control.
    None,

    /// Flow control using XON/XOFF bytes.
    Software,

    /// Flow control using RTS/CTS signals.
    Hardware,
}

/// A snapshot of the modem status lines.
///
/// Produced fresh by every call to [`Port::modem_status_bits()`]; nothing is cached.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ModemStatusBits {
    /// Clear To Send.
    pub cts: bool,

    /// Data Set Ready.
    pub dsr: bool,

    /// Ring Indicator.
    pub ri: bool,

    /// Data Carrier Detect.
    pub dcd: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_bits_from_count() {
        assert_eq!(DataBits::try_from(5).unwrap(), DataBits::Five);
        assert_eq!(DataBits::try_from(8).unwrap(), DataBits::Eight);
        assert_eq!(DataBits::Seven.bits(), 7);
    }

    #[test]
    fn data_bits_rejects_other_counts() {
        for bits in [0u8, 4, 9, 255] {
            let err = DataBits::try_from(bits).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidDataBits);
        }
    }

    #[test]
    fn modem_status_bits_default_to_low() {
        let bits = ModemStatusBits::default();
        assert!(!bits.cts && !bits.dsr && !bits.ri && !bits.dcd);
    }
}
