//! Serial port implementation for POSIX-compliant operating systems.

pub use self::enumerate::list_ports;
pub use self::settings::TTYSettings;
pub use self::tty::TTYPort;

mod cancel;
mod enumerate;
mod error;
mod poll;
mod settings;
mod tty;
