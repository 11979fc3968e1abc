use std::fs;
use std::io;
use std::path::Path;

use regex::Regex;
use tracing::trace;

use super::tty::TTYPort;
use crate::config::PortConfig;
use crate::device::SerialDevice;
use crate::error::{Error, ErrorKind, Result};

const DEV_DIR: &str = "/dev";

#[cfg(target_os = "linux")]
const PORT_NAME_PATTERN: &str = r"^(ttyS|ttyHS|ttyUSB|ttyACM|ttyAMA|rfcomm|ttyO|ttymxc)[0-9]{1,3}$";

#[cfg(any(target_os = "macos", target_os = "ios"))]
const PORT_NAME_PATTERN: &str = r"^(cu|tty)\..*";

#[cfg(any(
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
const PORT_NAME_PATTERN: &str = r"^(cuad|cuau|cuaU|ttyd|ttyu|ttyU)[0-9]+(\.[0-9]+)?$";

#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
)))]
const PORT_NAME_PATTERN: &str = r"^(ttyS|ttyUSB|ttyACM)[0-9]{1,3}$";

/// Lists the serial devices present under `/dev`, sorted by path.
///
/// Legacy `ttyS*` nodes that the kernel creates whether or not a UART sits behind them are
/// probed and left out when they can't be configured.
pub fn list_ports() -> Result<Vec<String>> {
    let pattern = Regex::new(PORT_NAME_PATTERN).map_err(|err| {
        let cause = io::Error::new(io::ErrorKind::InvalidInput, err);
        Error::with_cause(ErrorKind::ErrorEnumeratingPorts, cause)
    })?;

    let entries = fs::read_dir(DEV_DIR)
        .map_err(|err| Error::with_cause(ErrorKind::ErrorEnumeratingPorts, err))?;

    let mut ports = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|err| Error::with_cause(ErrorKind::ErrorEnumeratingPorts, err))?;

        if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
            continue;
        }

        let file_name = entry.file_name();
        let name = match file_name.to_str() {
            Some(name) => name,
            None => continue,
        };

        if !pattern.is_match(name) {
            continue;
        }

        let path = entry.path();

        if name.starts_with("ttyS") && is_placeholder(&path) {
            trace!(path = %path.display(), "skipping placeholder port");
            continue;
        }

        ports.push(path.to_string_lossy().into_owned());
    }

    ports.sort();
    Ok(ports)
}

fn is_placeholder(path: &Path) -> bool {
    match TTYPort::open(path, &PortConfig::default()) {
        Ok(port) => {
            let _ = port.close();
            false
        }
        Err(err) => match err.kind() {
            ErrorKind::InvalidSerialPort => true,
            ErrorKind::OsError => err.cause().and_then(|c| c.raw_os_error()) == Some(libc::EIO),
            _ => false,
        },
    }
}
