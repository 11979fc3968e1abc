use std::io;

use libc::c_int;

use crate::error::{Error, ErrorKind};

/// Classifies a failure of `open(2)` on a device path.
pub fn from_open_error(err: io::Error) -> Error {
    use libc::{EACCES, EBUSY, EISDIR, ENODEV, ENOENT, ENOTDIR, ENXIO, EPERM};

    let kind = match err.raw_os_error() {
        Some(EBUSY) => ErrorKind::PortBusy,
        Some(EACCES) | Some(EPERM) => ErrorKind::PermissionDenied,
        Some(ENOENT) | Some(ENODEV) | Some(ENXIO) | Some(ENOTDIR) => ErrorKind::PortNotFound,
        Some(EISDIR) => ErrorKind::InvalidSerialPort,
        _ => ErrorKind::OsError,
    };

    Error::with_cause(kind, err)
}

/// Converts the return value of a libc call to a `Result`, capturing `errno` on failure.
pub fn cvt(ret: c_int) -> io::Result<c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// Converts the return value of `read(2)` or `write(2)` to a byte count.
pub fn cvt_len(ret: libc::ssize_t) -> io::Result<usize> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

/// Calls `f` until it fails with something other than `EINTR`.
pub fn retry<T, F>(mut f: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    loop {
        match f() {
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}
