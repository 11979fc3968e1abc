use std::io;
use std::ptr;

use winapi::shared::minwindef::{FALSE, TRUE};
use winapi::um::handleapi::CloseHandle;
use winapi::um::synchapi::{CreateEventW, SetEvent, WaitForSingleObject};
use winapi::um::winbase::WAIT_OBJECT_0;
use winapi::um::winnt::HANDLE;

use super::error::cvt;

/// A manual-reset event used to wake overlapped waits.
///
/// Once set it is never reset, so every wait that includes it, current or future, returns
/// immediately.
#[derive(Debug)]
pub struct CancelEvent {
    handle: HANDLE,
}

unsafe impl Send for CancelEvent {}
unsafe impl Sync for CancelEvent {}

impl CancelEvent {
    pub fn new() -> io::Result<Self> {
        let handle = unsafe { CreateEventW(ptr::null_mut(), TRUE, FALSE, ptr::null()) };

        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }

        Ok(CancelEvent { handle })
    }

    pub fn arm(&self) -> io::Result<()> {
        cvt(unsafe { SetEvent(self.handle) })
    }

    pub fn is_armed(&self) -> bool {
        unsafe { WaitForSingleObject(self.handle, 0) == WAIT_OBJECT_0 }
    }

    pub fn handle(&self) -> HANDLE {
        self.handle
    }
}

impl Drop for CancelEvent {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_stays_armed() {
        let event = CancelEvent::new().unwrap();
        assert!(!event.is_armed());

        event.arm().unwrap();
        assert!(event.is_armed());
        assert!(event.is_armed());
    }
}
