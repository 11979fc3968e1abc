use std::io;

use winapi::shared::minwindef::BOOL;
use winapi::shared::winerror::{
    ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_INVALID_NAME, ERROR_PATH_NOT_FOUND,
    ERROR_SHARING_VIOLATION,
};

use crate::error::{Error, ErrorKind};

/// Classifies a failure of `CreateFileW` on a COM device name.
///
/// COM ports are opened without sharing, so access denied means another handle holds the port.
pub fn from_open_error(err: io::Error) -> Error {
    let kind = match err.raw_os_error().map(|code| code as u32) {
        Some(ERROR_ACCESS_DENIED) | Some(ERROR_SHARING_VIOLATION) => ErrorKind::PortBusy,
        Some(ERROR_FILE_NOT_FOUND) | Some(ERROR_PATH_NOT_FOUND) | Some(ERROR_INVALID_NAME) => {
            ErrorKind::PortNotFound
        }
        _ => ErrorKind::OsError,
    };

    Error::with_cause(kind, err)
}

/// Converts a Win32 `BOOL` result to a `Result`, capturing `GetLastError()` on failure.
pub fn cvt(ret: BOOL) -> io::Result<()> {
    if ret == 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}
