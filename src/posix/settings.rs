use std::io;
use std::os::unix::prelude::*;

use termios::os::target::speed_t;
use termios::Termios;

use crate::config::PortConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::{DataBits, FlowControl, Parity, StopBits};

/// Line settings of a TTY device.
///
/// Setters only change the in-memory `termios` structure. Nothing reaches the device until
/// [`apply()`](#method.apply) is called.
#[derive(Debug, Copy, Clone)]
pub struct TTYSettings {
    termios: Termios,
}

impl TTYSettings {
    /// Reads the current settings of the device.
    pub fn from_fd(fd: RawFd) -> io::Result<Self> {
        Ok(TTYSettings {
            termios: Termios::from_fd(fd)?,
        })
    }

    /// Writes the settings to the device, effective immediately.
    pub fn apply(&self, fd: RawFd) -> io::Result<()> {
        termios::tcsetattr(fd, termios::TCSANOW, &self.termios)
    }

    /// Translates every line setting of `config`.
    ///
    /// If any setting can't be represented, the error is returned and `self` is left unchanged.
    pub fn configure(&mut self, config: &PortConfig) -> Result<()> {
        let mut next = *self;

        next.set_raw_mode(config.hangup_on_close);
        next.set_baud_rate(config.baud_rate)?;
        next.set_data_bits(config.data_bits);
        next.set_parity(config.parity)?;
        next.set_stop_bits(config.stop_bits)?;
        next.set_flow_control(config.flow_control);

        *self = next;
        Ok(())
    }

    /// Disables all line processing so bytes pass through unchanged.
    ///
    /// With `hangup_on_close` set, the modem control lines are lowered when the last descriptor
    /// referring to the device is closed.
    pub fn set_raw_mode(&mut self, hangup_on_close: bool) {
        use termios::OPOST; // oflags
        use termios::{CLOCAL, CREAD, HUPCL}; // cflags
        use termios::{ECHO, ECHOE, ECHOK, ECHONL, ICANON, IEXTEN, ISIG}; // lflags
        use termios::{BRKINT, ICRNL, IGNBRK, IGNCR, INLCR}; // iflags
        use termios::{IGNPAR, INPCK, ISTRIP, IXANY, PARMRK}; // iflags
        use termios::{VMIN, VTIME}; // c_cc indexes

        self.termios.c_cflag |= CREAD | CLOCAL;

        if hangup_on_close {
            self.termios.c_cflag |= HUPCL;
        } else {
            self.termios.c_cflag &= !HUPCL;
        }

        self.termios.c_lflag &= !(ICANON | ECHO | ECHOE | ECHOK | ECHONL | ISIG | IEXTEN);
        self.termios.c_lflag &= !(libc::ECHOCTL | libc::ECHOPRT | libc::ECHOKE);
        self.termios.c_oflag &= !OPOST;
        self.termios.c_iflag &= !(IXANY | INPCK | IGNPAR | PARMRK | ISTRIP);
        self.termios.c_iflag &= !(IGNBRK | BRKINT | INLCR | IGNCR | ICRNL);

        #[cfg(target_os = "linux")]
        {
            self.termios.c_iflag &= !libc::IUCLC;
        }

        self.termios.c_cc[VMIN] = 1;
        self.termios.c_cc[VTIME] = 0;
    }

    /// Returns the baud rate, or `None` if input and output speeds differ or aren't in the
    /// table of supported rates.
    pub fn baud_rate(&self) -> Option<u32> {
        let ospeed = termios::cfgetospeed(&self.termios);
        let ispeed = termios::cfgetispeed(&self.termios);

        if ospeed != ispeed {
            return None;
        }

        rate_of_speed(ospeed)
    }

    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        let speed = match speed_of_rate(baud_rate) {
            Some(speed) => speed,
            None => return Err(Error::new(ErrorKind::InvalidSpeed)),
        };

        termios::cfsetspeed(&mut self.termios, speed)
            .map_err(|err| Error::with_cause(ErrorKind::InvalidSpeed, err))
    }

    pub fn data_bits(&self) -> Option<DataBits> {
        use termios::{CS5, CS6, CS7, CS8, CSIZE};

        match self.termios.c_cflag & CSIZE {
            CS8 => Some(DataBits::Eight),
            CS7 => Some(DataBits::Seven),
            CS6 => Some(DataBits::Six),
            CS5 => Some(DataBits::Five),

            _ => None,
        }
    }

    pub fn set_data_bits(&mut self, data_bits: DataBits) {
        use termios::{CS5, CS6, CS7, CS8, CSIZE};

        let size = match data_bits {
            DataBits::Five => CS5,
            DataBits::Six => CS6,
            DataBits::Seven => CS7,
            DataBits::Eight => CS8,
        };

        self.termios.c_cflag &= !CSIZE;
        self.termios.c_cflag |= size;
    }

    pub fn parity(&self) -> Option<Parity> {
        use termios::{PARENB, PARODD};

        if self.termios.c_cflag & PARENB == 0 {
            return Some(Parity::None);
        }

        let odd = self.termios.c_cflag & PARODD != 0;

        #[cfg(target_os = "linux")]
        {
            if self.termios.c_cflag & libc::CMSPAR != 0 {
                return Some(if odd { Parity::Mark } else { Parity::Space });
            }
        }

        Some(if odd { Parity::Odd } else { Parity::Even })
    }

    /// Sets the parity mode.
    ///
    /// Mark and space parity are only available where the platform supports sticky parity
    /// (`CMSPAR`); elsewhere they fail with `InvalidParity`.
    pub fn set_parity(&mut self, parity: Parity) -> Result<()> {
        use termios::{IGNPAR, INPCK, PARENB, PARODD};

        let sticky = match parity {
            Parity::Mark | Parity::Space if STICKY_PARITY == 0 => {
                return Err(Error::new(ErrorKind::InvalidParity));
            }
            Parity::Mark | Parity::Space => STICKY_PARITY,
            _ => 0,
        };

        self.termios.c_cflag &= !(PARENB | PARODD | STICKY_PARITY);

        match parity {
            Parity::None => {
                self.termios.c_iflag &= !INPCK;
                self.termios.c_iflag |= IGNPAR;
            }
            Parity::Odd | Parity::Mark => {
                self.termios.c_cflag |= PARENB | PARODD | sticky;
                self.termios.c_iflag |= INPCK;
                self.termios.c_iflag &= !IGNPAR;
            }
            Parity::Even | Parity::Space => {
                self.termios.c_cflag |= PARENB | sticky;
                self.termios.c_iflag |= INPCK;
                self.termios.c_iflag &= !IGNPAR;
            }
        };

        Ok(())
    }

    pub fn stop_bits(&self) -> StopBits {
        use termios::CSTOPB;

        if self.termios.c_cflag & CSTOPB != 0 {
            StopBits::Two
        } else {
            StopBits::One
        }
    }

    /// Sets the number of stop bits. TTY devices can't transmit 1.5 stop bits.
    pub fn set_stop_bits(&mut self, stop_bits: StopBits) -> Result<()> {
        use termios::CSTOPB;

        match stop_bits {
            StopBits::One => self.termios.c_cflag &= !CSTOPB,
            StopBits::Two => self.termios.c_cflag |= CSTOPB,
            StopBits::OnePointFive => return Err(Error::new(ErrorKind::InvalidStopBits)),
        };

        Ok(())
    }

    pub fn flow_control(&self) -> FlowControl {
        use termios::os::target::CRTSCTS;
        use termios::{IXOFF, IXON};

        if self.termios.c_cflag & CRTSCTS != 0 {
            FlowControl::Hardware
        } else if self.termios.c_iflag & (IXON | IXOFF) != 0 {
            FlowControl::Software
        } else {
            FlowControl::None
        }
    }

    pub fn set_flow_control(&mut self, flow_control: FlowControl) {
        use termios::os::target::CRTSCTS;
        use termios::{IXOFF, IXON};

        match flow_control {
            FlowControl::None => {
                self.termios.c_iflag &= !(IXON | IXOFF);
                self.termios.c_cflag &= !CRTSCTS;
            }
            FlowControl::Software => {
                self.termios.c_iflag |= IXON | IXOFF;
                self.termios.c_cflag &= !CRTSCTS;
            }
            FlowControl::Hardware => {
                self.termios.c_iflag &= !(IXON | IXOFF);
                self.termios.c_cflag |= CRTSCTS;
            }
        };
    }
}

#[cfg(target_os = "linux")]
const STICKY_PARITY: libc::tcflag_t = libc::CMSPAR;

#[cfg(not(target_os = "linux"))]
const STICKY_PARITY: libc::tcflag_t = 0;

fn speed_of_rate(baud_rate: u32) -> Option<speed_t> {
    use termios::os::target::{B115200, B230400, B57600};
    use termios::{
        B110, B1200, B134, B150, B1800, B19200, B200, B2400, B300, B38400, B4800, B50, B600, B75,
        B9600,
    };

    #[cfg(target_os = "linux")]
    use termios::os::linux::{
        B1000000, B1152000, B1500000, B2000000, B2500000, B3000000, B3500000, B4000000, B460800,
        B500000, B576000, B921600,
    };

    #[cfg(target_os = "macos")]
    use termios::os::macos::{B14400, B28800, B7200, B76800};

    #[cfg(target_os = "freebsd")]
    use termios::os::freebsd::{B14400, B28800, B460800, B7200, B76800, B921600};

    #[cfg(target_os = "openbsd")]
    use termios::os::openbsd::{B14400, B28800, B7200, B76800};

    let speed = match baud_rate {
        50 => B50,
        75 => B75,
        110 => B110,
        134 => B134,
        150 => B150,
        200 => B200,
        300 => B300,
        600 => B600,
        1200 => B1200,
        1800 => B1800,
        2400 => B2400,
        4800 => B4800,
        #[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd"))]
        7200 => B7200,
        9600 => B9600,
        #[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd"))]
        14400 => B14400,
        19200 => B19200,
        #[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd"))]
        28800 => B28800,
        38400 => B38400,
        57600 => B57600,
        #[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd"))]
        76800 => B76800,
        115200 => B115200,
        230400 => B230400,
        #[cfg(any(target_os = "linux", target_os = "freebsd"))]
        460800 => B460800,
        #[cfg(target_os = "linux")]
        500000 => B500000,
        #[cfg(target_os = "linux")]
        576000 => B576000,
        #[cfg(any(target_os = "linux", target_os = "freebsd"))]
        921600 => B921600,
        #[cfg(target_os = "linux")]
        1000000 => B1000000,
        #[cfg(target_os = "linux")]
        1152000 => B1152000,
        #[cfg(target_os = "linux")]
        1500000 => B1500000,
        #[cfg(target_os = "linux")]
        2000000 => B2000000,
        #[cfg(target_os = "linux")]
        2500000 => B2500000,
        #[cfg(target_os = "linux")]
        3000000 => B3000000,
        #[cfg(target_os = "linux")]
        3500000 => B3500000,
        #[cfg(target_os = "linux")]
        4000000 => B4000000,

        // includes 0, which would hang up the line
        _ => return None,
    };

    Some(speed)
}

fn rate_of_speed(speed: speed_t) -> Option<u32> {
    use termios::os::target::{B115200, B230400, B57600};
    use termios::{
        B110, B1200, B134, B150, B1800, B19200, B200, B2400, B300, B38400, B4800, B50, B600, B75,
        B9600,
    };

    #[cfg(target_os = "linux")]
    use termios::os::linux::{
        B1000000, B1152000, B1500000, B2000000, B2500000, B3000000, B3500000, B4000000, B460800,
        B500000, B576000, B921600,
    };

    #[cfg(target_os = "macos")]
    use termios::os::macos::{B14400, B28800, B7200, B76800};

    #[cfg(target_os = "freebsd")]
    use termios::os::freebsd::{B14400, B28800, B460800, B7200, B76800, B921600};

    #[cfg(target_os = "openbsd")]
    use termios::os::openbsd::{B14400, B28800, B7200, B76800};

    let rate = match speed {
        B50 => 50,
        B75 => 75,
        B110 => 110,
        B134 => 134,
        B150 => 150,
        B200 => 200,
        B300 => 300,
        B600 => 600,
        B1200 => 1200,
        B1800 => 1800,
        B2400 => 2400,
        B4800 => 4800,
        #[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd"))]
        B7200 => 7200,
        B9600 => 9600,
        #[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd"))]
        B14400 => 14400,
        B19200 => 19200,
        #[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd"))]
        B28800 => 28800,
        B38400 => 38400,
        B57600 => 57600,
        #[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd"))]
        B76800 => 76800,
        B115200 => 115200,
        B230400 => 230400,
        #[cfg(any(target_os = "linux", target_os = "freebsd"))]
        B460800 => 460800,
        #[cfg(target_os = "linux")]
        B500000 => 500000,
        #[cfg(target_os = "linux")]
        B576000 => 576000,
        #[cfg(any(target_os = "linux", target_os = "freebsd"))]
        B921600 => 921600,
        #[cfg(target_os = "linux")]
        B1000000 => 1000000,
        #[cfg(target_os = "linux")]
        B1152000 => 1152000,
        #[cfg(target_os = "linux")]
        B1500000 => 1500000,
        #[cfg(target_os = "linux")]
        B2000000 => 2000000,
        #[cfg(target_os = "linux")]
        B2500000 => 2500000,
        #[cfg(target_os = "linux")]
        B3000000 => 3000000,
        #[cfg(target_os = "linux")]
        B3500000 => 3500000,
        #[cfg(target_os = "linux")]
        B4000000 => 4000000,

        _ => return None,
    };

    Some(rate)
}
