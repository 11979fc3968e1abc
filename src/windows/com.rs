use std::ffi::OsStr;
use std::io;
use std::mem;
use std::ptr;

use std::os::windows::prelude::*;

use tracing::{debug, trace};
use winapi::shared::minwindef::{BOOL, DWORD, FALSE, TRUE};
use winapi::shared::winerror::{ERROR_IO_PENDING, WAIT_TIMEOUT};
use winapi::um::commapi::{
    ClearCommError, GetCommModemStatus, GetCommState, PurgeComm, SetCommMask, SetCommState,
    SetCommTimeouts,
};
use winapi::um::fileapi::{CreateFileW, FlushFileBuffers, ReadFile, WriteFile, OPEN_EXISTING};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::ioapiset::{CancelIoEx, GetOverlappedResult};
use winapi::um::minwinbase::OVERLAPPED;
use winapi::um::synchapi::{CreateEventW, WaitForMultipleObjects};
use winapi::um::winbase::{
    COMMTIMEOUTS, COMSTAT, DCB, DTR_CONTROL_DISABLE, DTR_CONTROL_ENABLE, EVENPARITY, EV_ERR,
    FILE_FLAG_OVERLAPPED, INFINITE, MARKPARITY, MS_CTS_ON, MS_DSR_ON, MS_RING_ON, MS_RLSD_ON,
    NOPARITY, ODDPARITY, ONE5STOPBITS, ONESTOPBIT, PURGE_RXABORT, PURGE_RXCLEAR, PURGE_TXABORT,
    PURGE_TXCLEAR, RTS_CONTROL_DISABLE, RTS_CONTROL_ENABLE, RTS_CONTROL_HANDSHAKE, SPACEPARITY,
    TWOSTOPBITS, WAIT_FAILED, WAIT_OBJECT_0,
};
use winapi::um::winnt::{FILE_ATTRIBUTE_NORMAL, GENERIC_READ, GENERIC_WRITE, HANDLE, MAXDWORD};

use super::cancel::CancelEvent;
use super::error::{cvt, from_open_error};
use crate::config::PortConfig;
use crate::device::SerialDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::timeout::TimeoutPolicy;
use crate::{DataBits, FlowControl, ModemStatusBits, Parity, StopBits};

const DEVICE_PREFIX: &str = "\\\\.\\";

/// A serial port implementation for Windows COM ports.
///
/// The handle is opened for overlapped I/O. Every transfer waits on its completion event and a
/// [`CancelEvent`] together, and a cancelled transfer is aborted with `CancelIoEx`. The port is
/// closed when the value is dropped.
#[derive(Debug)]
pub struct COMPort {
    handle: HANDLE,
    cancel: CancelEvent,
    timeouts: TimeoutPolicy,
}

unsafe impl Send for COMPort {}
unsafe impl Sync for COMPort {}

impl COMPort {
    /// Opens a COM port as a serial device.
    ///
    /// `port` should be the name of a COM port, e.g., `COM1`.
    ///
    /// ```no_run
    /// use serial_line::windows::COMPort;
    /// use serial_line::PortConfig;
    ///
    /// COMPort::open("COM1", &PortConfig::default()).unwrap();
    /// ```
    ///
    /// ## Errors
    ///
    /// * `PortNotFound` if no such COM port exists.
    /// * `PortBusy` if the port is already open.
    /// * `InvalidSerialPort` if the device rejects serial configuration.
    /// * `InvalidSpeed`, `InvalidDataBits` or `InvalidStopBits` if `config` can't be represented.
    pub fn open<T: AsRef<OsStr> + ?Sized>(port: &T, config: &PortConfig) -> Result<Self> {
        let port = port.as_ref();
        let mut name = Vec::<u16>::new();

        if !port.to_string_lossy().starts_with(DEVICE_PREFIX) {
            name.extend(OsStr::new(DEVICE_PREFIX).encode_wide());
        }
        name.extend(port.encode_wide());
        name.push(0);

        let cancel = CancelEvent::new().map_err(Error::os)?;

        let handle = unsafe {
            CreateFileW(
                name.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                0,
                ptr::null_mut(),
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL | FILE_FLAG_OVERLAPPED,
                ptr::null_mut(),
            )
        };

        if handle == INVALID_HANDLE_VALUE {
            return Err(from_open_error(io::Error::last_os_error()));
        }

        let mut com = COMPort {
            handle,
            cancel,
            timeouts: TimeoutPolicy::default(),
        };

        cvt(unsafe { SetCommMask(com.handle, EV_ERR) }).map_err(invalid_port)?;
        com.configure(config)?;
        com.push_timeouts(&TimeoutPolicy::default()).map_err(invalid_port)?;

        debug!(port = %port.to_string_lossy(), "opened com port");
        Ok(com)
    }

    fn comm_state(&self) -> io::Result<DCB> {
        let mut dcb: DCB = unsafe { mem::zeroed() };
        dcb.DCBlength = mem::size_of::<DCB>() as DWORD;

        cvt(unsafe { GetCommState(self.handle, &mut dcb) })?;
        Ok(dcb)
    }

    fn set_comm_state(&self, dcb: &mut DCB) -> io::Result<()> {
        cvt(unsafe { SetCommState(self.handle, dcb) })
    }

    fn push_timeouts(&self, timeouts: &TimeoutPolicy) -> io::Result<()> {
        let mut comm_timeouts = comm_timeouts(timeouts);
        cvt(unsafe { SetCommTimeouts(self.handle, &mut comm_timeouts) })
    }

    // Issues one overlapped transfer and waits for it to complete or be cancelled.
    fn transfer<F>(&self, start: F) -> Result<usize>
    where
        F: FnOnce(*mut OVERLAPPED) -> BOOL,
    {
        if self.cancel.is_armed() {
            return Err(Error::new(ErrorKind::PortClosed));
        }

        let mut overlapped = Overlapped::new().map_err(Error::os)?;

        if start(overlapped.as_mut_ptr()) == FALSE {
            let err = io::Error::last_os_error();

            if err.raw_os_error() != Some(ERROR_IO_PENDING as i32) {
                return Err(Error::os(err));
            }
        }

        let handles = [overlapped.event(), self.cancel.handle()];
        let wait = unsafe { WaitForMultipleObjects(2, handles.as_ptr(), FALSE, INFINITE) };

        let cancelled = wait == WAIT_OBJECT_0 + 1;
        let wait_error = match wait {
            WAIT_FAILED => Some(io::Error::last_os_error()),
            WAIT_TIMEOUT => Some(io::Error::from(io::ErrorKind::TimedOut)),
            _ => None,
        };

        if wait != WAIT_OBJECT_0 {
            unsafe { CancelIoEx(self.handle, overlapped.as_mut_ptr()) };
        }

        // collects the count even when the transfer was aborted
        let mut len: DWORD = 0;
        let completed =
            cvt(unsafe { GetOverlappedResult(self.handle, overlapped.as_mut_ptr(), &mut len, TRUE) });
        let len = len as usize;

        if cancelled {
            return Err(Error::new(ErrorKind::PortClosed).after(len));
        }

        if let Some(err) = wait_error {
            return Err(Error::os(err).after(len));
        }

        match completed {
            Ok(()) => Ok(len),
            Err(err) => Err(Error::os(err).after(len)),
        }
    }

    fn release(&mut self) -> Result<()> {
        if self.handle == INVALID_HANDLE_VALUE {
            return Ok(());
        }

        let handle = mem::replace(&mut self.handle, INVALID_HANDLE_VALUE);

        cvt(unsafe { CloseHandle(handle) }).map_err(Error::os)?;
        debug!("closed com port");
        Ok(())
    }
}

impl Drop for COMPort {
    fn drop(&mut self) {
        #![allow(unused_must_use)]
        self.release();
    }
}

impl AsRawHandle for COMPort {
    fn as_raw_handle(&self) -> RawHandle {
        self.handle as RawHandle
    }
}

impl SerialDevice for COMPort {
    fn open(name: &str, config: &PortConfig) -> Result<Self> {
        COMPort::open(name, config)
    }

    fn configure(&mut self, config: &PortConfig) -> Result<()> {
        let mut dcb = self.comm_state().map_err(invalid_port)?;
        translate(&mut dcb, config)?;
        self.set_comm_state(&mut dcb).map_err(invalid_port)
    }

    fn timeouts(&self) -> TimeoutPolicy {
        self.timeouts
    }

    fn set_timeouts(&mut self, timeouts: TimeoutPolicy) -> Result<()> {
        self.push_timeouts(&timeouts).map_err(Error::os)?;
        self.timeouts = timeouts;
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let len = buf.len().min(MAXDWORD as usize) as DWORD;
        let read = self.transfer(|overlapped| unsafe {
            ReadFile(self.handle, buf.as_mut_ptr() as *mut _, len, ptr::null_mut(), overlapped)
        })?;

        trace!(read, "read");
        Ok(read)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let len = buf.len().min(MAXDWORD as usize) as DWORD;
        let written = self.transfer(|overlapped| unsafe {
            WriteFile(self.handle, buf.as_ptr() as *const _, len, ptr::null_mut(), overlapped)
        })?;

        trace!(written, "write");
        Ok(written)
    }

    fn ready_to_read(&self) -> Result<u32> {
        let mut errors: DWORD = 0;
        let mut stat: COMSTAT = unsafe { mem::zeroed() };

        cvt(unsafe { ClearCommError(self.handle, &mut errors, &mut stat) }).map_err(Error::os)?;
        Ok(stat.cbInQue)
    }

    fn reset_input_buffer(&self) -> Result<()> {
        cvt(unsafe { PurgeComm(self.handle, PURGE_RXCLEAR | PURGE_RXABORT) }).map_err(Error::os)
    }

    fn reset_output_buffer(&self) -> Result<()> {
        cvt(unsafe { PurgeComm(self.handle, PURGE_TXCLEAR | PURGE_TXABORT) }).map_err(Error::os)
    }

    fn drain(&self) -> Result<()> {
        cvt(unsafe { FlushFileBuffers(self.handle) }).map_err(Error::os)
    }

    // DTR and RTS go through the DCB; EscapeCommFunction would be undone by the next
    // SetCommState.
    fn set_dtr(&self, level: bool) -> Result<()> {
        let mut dcb = self.comm_state().map_err(Error::os)?;
        dcb.set_fDtrControl(if level { DTR_CONTROL_ENABLE } else { DTR_CONTROL_DISABLE });
        self.set_comm_state(&mut dcb).map_err(Error::os)
    }

    fn set_rts(&self, level: bool) -> Result<()> {
        let mut dcb = self.comm_state().map_err(Error::os)?;
        dcb.set_fRtsControl(if level { RTS_CONTROL_ENABLE } else { RTS_CONTROL_DISABLE });
        self.set_comm_state(&mut dcb).map_err(Error::os)
    }

    fn modem_status_bits(&self) -> Result<ModemStatusBits> {
        let mut status: DWORD = 0;

        cvt(unsafe { GetCommModemStatus(self.handle, &mut status) }).map_err(Error::os)?;

        Ok(ModemStatusBits {
            cts: status & MS_CTS_ON != 0,
            dsr: status & MS_DSR_ON != 0,
            ri: status & MS_RING_ON != 0,
            dcd: status & MS_RLSD_ON != 0,
        })
    }

    fn cancel(&self) -> Result<()> {
        self.cancel.arm().map_err(Error::os)
    }

    fn close(mut self) -> Result<()> {
        self.cancel.arm().map_err(Error::os)?;
        self.release()
    }
}

/// An `OVERLAPPED` structure with its own completion event.
struct Overlapped(OVERLAPPED);

impl Overlapped {
    fn new() -> io::Result<Self> {
        let event = unsafe { CreateEventW(ptr::null_mut(), TRUE, FALSE, ptr::null()) };

        if event.is_null() {
            return Err(io::Error::last_os_error());
        }

        let mut overlapped: OVERLAPPED = unsafe { mem::zeroed() };
        overlapped.hEvent = event;

        Ok(Overlapped(overlapped))
    }

    fn event(&self) -> HANDLE {
        self.0.hEvent
    }

    fn as_mut_ptr(&mut self) -> *mut OVERLAPPED {
        &mut self.0
    }
}

impl Drop for Overlapped {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0.hEvent);
        }
    }
}

fn invalid_port(err: io::Error) -> Error {
    Error::with_cause(ErrorKind::InvalidSerialPort, err)
}

/// Maps a timeout policy onto the driver's `COMMTIMEOUTS`.
fn comm_timeouts(timeouts: &TimeoutPolicy) -> COMMTIMEOUTS {
    let read = timeouts.read_timeout();
    let gap = timeouts.read_interval_timeout();

    let (interval, multiplier, constant) = if timeouts.first_byte_timeout() {
        // returns as soon as a byte arrives; MAXDWORD here would mean "return immediately"
        let constant = if read == 0 { MAXDWORD - 1 } else { read };
        (MAXDWORD, MAXDWORD, constant)
    } else if gap > 0 {
        // a zero constant disables the total bound
        (gap, 0, read)
    } else if read > 0 {
        (0, 0, read)
    } else {
        // returns immediately with whatever is buffered
        (MAXDWORD, 0, 0)
    };

    COMMTIMEOUTS {
        ReadIntervalTimeout: interval,
        ReadTotalTimeoutMultiplier: multiplier,
        ReadTotalTimeoutConstant: constant,
        WriteTotalTimeoutMultiplier: 0,
        WriteTotalTimeoutConstant: timeouts.write_timeout(),
    }
}

/// Translates `config` into `dcb`. On error `dcb` is left unchanged.
fn translate(dcb: &mut DCB, config: &PortConfig) -> Result<()> {
    if config.baud_rate == 0 {
        return Err(Error::new(ErrorKind::InvalidSpeed));
    }

    let stop_bits = match (config.stop_bits, config.data_bits) {
        (StopBits::One, _) => ONESTOPBIT,
        (StopBits::OnePointFive, DataBits::Five) => ONE5STOPBITS,
        (StopBits::Two, DataBits::Five) | (StopBits::OnePointFive, _) => {
            return Err(Error::new(ErrorKind::InvalidStopBits));
        }
        (StopBits::Two, _) => TWOSTOPBITS,
    };

    let parity = match config.parity {
        Parity::None => NOPARITY,
        Parity::Odd => ODDPARITY,
        Parity::Even => EVENPARITY,
        Parity::Mark => MARKPARITY,
        Parity::Space => SPACEPARITY,
    };

    dcb.BaudRate = config.baud_rate;
    dcb.ByteSize = config.data_bits.bits();
    dcb.Parity = parity;
    dcb.StopBits = stop_bits;

    dcb.set_fBinary(1);
    dcb.set_fParity(if config.parity == Parity::None { 0 } else { 1 });
    dcb.set_fOutxDsrFlow(0);
    dcb.set_fDsrSensitivity(0);
    dcb.set_fTXContinueOnXoff(1);
    dcb.set_fErrorChar(0);
    dcb.set_fNull(0);
    dcb.set_fAbortOnError(0);
    dcb.set_fDtrControl(if config.hangup_on_close {
        DTR_CONTROL_ENABLE
    } else {
        DTR_CONTROL_DISABLE
    });

    match config.flow_control {
        FlowControl::None => {
            dcb.set_fOutxCtsFlow(0);
            dcb.set_fRtsControl(RTS_CONTROL_ENABLE);
            dcb.set_fOutX(0);
            dcb.set_fInX(0);
        }
        FlowControl::Software => {
            dcb.set_fOutxCtsFlow(0);
            dcb.set_fRtsControl(RTS_CONTROL_ENABLE);
            dcb.set_fOutX(1);
            dcb.set_fInX(1);
        }
        FlowControl::Hardware => {
            dcb.set_fOutxCtsFlow(1);
            dcb.set_fRtsControl(RTS_CONTROL_HANDSHAKE);
            dcb.set_fOutX(0);
            dcb.set_fInX(0);
        }
    }

    dcb.XonLim = 2048;
    dcb.XoffLim = 512;
    dcb.XonChar = 0x11;
    dcb.XoffChar = 0x13;

    Ok(())
}
