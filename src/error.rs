use std::error::Error as StdError;
use std::fmt;
use std::io;

use thiserror::Error;

/// A type alias for results of serial port operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of errors that can occur when interacting with serial ports.
///
/// The kind is the stable, machine-readable part of an [`Error`]. Callers are expected to branch
/// on the kind, never on the message text.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    /// The serial port is already in use by another process.
    #[error("serial port busy")]
    PortBusy,

    /// The requested port doesn't exist.
    #[error("serial port not found")]
    PortNotFound,

    /// The requested device exists but is not a serial port.
    #[error("invalid serial port")]
    InvalidSerialPort,

    /// The user doesn't have enough privileges to open the device.
    #[error("permission denied")]
    PermissionDenied,

    /// The requested speed is not valid or not supported.
    #[error("port speed invalid or not supported")]
    InvalidSpeed,

    /// The number of data bits is not valid or not supported.
    #[error("port data bits invalid or not supported")]
    InvalidDataBits,

    /// The selected parity is not valid or not supported.
    #[error("port parity invalid or not supported")]
    InvalidParity,

    /// The selected number of stop bits is not valid or not supported.
    #[error("port stop bits invalid or not supported")]
    InvalidStopBits,

    /// A timeout value outside the accepted range was passed.
    #[error("timeout value invalid or not supported")]
    InvalidTimeoutValue,

    /// The list of serial ports could not be built.
    #[error("could not enumerate serial ports")]
    ErrorEnumeratingPorts,

    /// The port was never opened, has been closed, or was closed while the operation was in
    /// progress.
    #[error("port has been closed")]
    PortClosed,

    /// The requested function is not implemented on this platform.
    #[error("function not implemented")]
    FunctionNotImplemented,

    /// An operating system call failed. The cause carries the native error.
    #[error("operating system error")]
    OsError,

    /// The device reported readiness but the read produced no data.
    #[error("read failed")]
    ReadFailed,

    /// The device did not become writable before the write deadline.
    #[error("write failed")]
    WriteFailed,
}

impl ErrorKind {
    /// Returns `true` for the kinds produced by translating a portable configuration into
    /// platform line settings.
    pub fn is_configuration(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidSpeed
                | ErrorKind::InvalidDataBits
                | ErrorKind::InvalidParity
                | ErrorKind::InvalidStopBits
                | ErrorKind::InvalidTimeoutValue
        )
    }
}

/// An error type for serial port operations.
///
/// Besides its [`ErrorKind`] and optional native cause, an error records how many bytes were
/// transferred by the failing `read` or `write` before it failed. Those bytes are already in (or
/// gone from) the caller's buffer and are never silently dropped.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    cause: Option<io::Error>,
    transferred: usize,
}

impl Error {
    /// Creates an error of the given kind without a cause.
    pub fn new(kind: ErrorKind) -> Self {
        Error {
            kind,
            cause: None,
            transferred: 0,
        }
    }

    /// Creates an error of the given kind caused by a native error.
    pub fn with_cause(kind: ErrorKind, cause: io::Error) -> Self {
        Error {
            kind,
            cause: Some(cause),
            transferred: 0,
        }
    }

    /// Wraps a native failure as [`ErrorKind::OsError`].
    pub fn os(cause: io::Error) -> Self {
        Error::with_cause(ErrorKind::OsError, cause)
    }

    pub(crate) fn after(mut self, transferred: usize) -> Self {
        self.transferred = transferred;
        self
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the native error that caused this error, if any.
    pub fn cause(&self) -> Option<&io::Error> {
        self.cause.as_ref()
    }

    /// Returns the number of bytes transferred before the operation failed.
    pub fn transferred(&self) -> usize {
        self.transferred
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self.cause {
            Some(ref cause) => write!(fmt, "{}: {}", self.kind, cause),
            None => write!(fmt, "{}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_ref().map(|c| c as &(dyn StdError + 'static))
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> io::Error {
        let kind = match error.kind {
            ErrorKind::PortNotFound => io::ErrorKind::NotFound,
            ErrorKind::PermissionDenied => io::ErrorKind::PermissionDenied,
            ErrorKind::PortClosed => io::ErrorKind::BrokenPipe,
            ErrorKind::InvalidSpeed
            | ErrorKind::InvalidDataBits
            | ErrorKind::InvalidParity
            | ErrorKind::InvalidStopBits
            | ErrorKind::InvalidTimeoutValue
            | ErrorKind::InvalidSerialPort => io::ErrorKind::InvalidInput,
            ErrorKind::FunctionNotImplemented => io::ErrorKind::Unsupported,
            ErrorKind::OsError => match error.cause {
                Some(ref cause) => cause.kind(),
                None => io::ErrorKind::Other,
            },
            _ => io::ErrorKind::Other,
        };

        io::Error::new(kind, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_cause_is_kind_description() {
        let err = Error::new(ErrorKind::PortClosed);
        assert_eq!(err.to_string(), "port has been closed");
    }

    #[test]
    fn display_with_cause_appends_cause() {
        let err = Error::with_cause(
            ErrorKind::InvalidSerialPort,
            io::Error::new(io::ErrorKind::Other, "inappropriate ioctl for device"),
        );
        assert_eq!(
            err.to_string(),
            "invalid serial port: inappropriate ioctl for device"
        );
    }

    #[test]
    fn os_error_keeps_cause_as_source() {
        let err = Error::os(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(err.kind(), ErrorKind::OsError);
        assert!(err.source().is_some());
        assert_eq!(err.cause().map(|c| c.to_string()), Some("boom".to_string()));
    }

    #[test]
    fn transferred_defaults_to_zero() {
        assert_eq!(Error::new(ErrorKind::ReadFailed).transferred(), 0);
        assert_eq!(Error::new(ErrorKind::ReadFailed).after(7).transferred(), 7);
    }

    #[test]
    fn converts_to_io_error() {
        let io_err: io::Error = Error::new(ErrorKind::PortNotFound).into();
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);

        let io_err: io::Error = Error::new(ErrorKind::InvalidSpeed).into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidInput);

        let io_err: io::Error = Error::os(io::Error::from(io::ErrorKind::Interrupted)).into();
        assert_eq!(io_err.kind(), io::ErrorKind::Interrupted);
    }

    #[test]
    fn configuration_kinds() {
        assert!(ErrorKind::InvalidStopBits.is_configuration());
        assert!(!ErrorKind::PortBusy.is_configuration());
    }
}
