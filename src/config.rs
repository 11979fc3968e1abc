#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{DataBits, FlowControl, Parity, StopBits};

/// A device-independent serial port configuration.
///
/// The line parameters are translated into the platform's native settings when a port is
/// opened or reconfigured. The timeout fields are optional; when they are `None` the port's
/// current timeout policy is left untouched.
///
/// Configurations are usually built from the default with the `with_*` methods:
///
/// ```
/// use serial_line::{Parity, PortConfig};
///
/// let config = PortConfig::default()
///     .with_baud_rate(115_200)
///     .with_parity(Parity::Even)
///     .with_read_timeout(500);
///
/// assert_eq!(config.baud_rate, 115_200);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PortConfig {
    /// Baud rate in bits per second. Must be positive.
    pub baud_rate: u32,

    /// Character size.
    pub data_bits: DataBits,

    /// Parity checking mode.
    pub parity: Parity,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Flow control mode.
    pub flow_control: FlowControl,

    /// Lower the modem control lines (DTR) when the port is closed.
    pub hangup_on_close: bool,

    /// Read timeout in milliseconds, applied with `Port::set_read_timeout` semantics.
    pub read_timeout_ms: Option<u32>,

    /// Write timeout in milliseconds.
    pub write_timeout_ms: Option<u32>,
}

impl Default for PortConfig {
    fn default() -> Self {
        PortConfig {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            hangup_on_close: false,
            read_timeout_ms: None,
            write_timeout_ms: None,
        }
    }
}

impl PortConfig {
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_data_bits(mut self, data_bits: DataBits) -> Self {
        self.data_bits = data_bits;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub fn with_flow_control(mut self, flow_control: FlowControl) -> Self {
        self.flow_control = flow_control;
        self
    }

    pub fn with_hangup_on_close(mut self, hangup_on_close: bool) -> Self {
        self.hangup_on_close = hangup_on_close;
        self
    }

    pub fn with_read_timeout(mut self, milliseconds: u32) -> Self {
        self.read_timeout_ms = Some(milliseconds);
        self
    }

    pub fn with_write_timeout(mut self, milliseconds: u32) -> Self {
        self.write_timeout_ms = Some(milliseconds);
        self
    }
}
