//! Serial port implementation for Windows COM ports.

pub use self::com::COMPort;
pub use self::enumerate::list_ports;

mod cancel;
mod com;
mod enumerate;
mod error;
