use std::ffi::OsStr;
use std::io;
use std::ptr;

use std::os::windows::prelude::*;

use winapi::shared::minwindef::{DWORD, HKEY};
use winapi::shared::winerror::{ERROR_FILE_NOT_FOUND, ERROR_NO_MORE_ITEMS, ERROR_SUCCESS};
use winapi::um::winnt::{KEY_READ, REG_SZ};
use winapi::um::winreg::{RegCloseKey, RegEnumValueW, RegOpenKeyExW, HKEY_LOCAL_MACHINE};

use crate::error::{Error, ErrorKind, Result};

const SERIALCOMM_KEY: &str = "HARDWARE\\DEVICEMAP\\SERIALCOMM";

struct RegKey(HKEY);

impl Drop for RegKey {
    fn drop(&mut self) {
        unsafe {
            RegCloseKey(self.0);
        }
    }
}

/// Lists the COM ports registered under `HKLM\HARDWARE\DEVICEMAP\SERIALCOMM`, sorted by name.
///
/// The key only exists while at least one port is present, so a missing key yields an empty
/// list.
pub fn list_ports() -> Result<Vec<String>> {
    let key_name: Vec<u16> = OsStr::new(SERIALCOMM_KEY)
        .encode_wide()
        .chain(Some(0))
        .collect();

    let mut key: HKEY = ptr::null_mut();
    let status = unsafe { RegOpenKeyExW(HKEY_LOCAL_MACHINE, key_name.as_ptr(), 0, KEY_READ, &mut key) };

    match status as DWORD {
        ERROR_SUCCESS => {}
        ERROR_FILE_NOT_FOUND => return Ok(Vec::new()),
        _ => return Err(enumeration_error(status)),
    }

    let key = RegKey(key);
    let mut ports = Vec::new();

    for index in 0.. {
        let mut name = [0u16; 256];
        let mut name_len = name.len() as DWORD;
        let mut data = [0u16; 256];
        let mut data_len = (data.len() * 2) as DWORD;
        let mut value_type: DWORD = 0;

        let status = unsafe {
            RegEnumValueW(
                key.0,
                index,
                name.as_mut_ptr(),
                &mut name_len,
                ptr::null_mut(),
                &mut value_type,
                data.as_mut_ptr() as *mut u8,
                &mut data_len,
            )
        };

        match status as DWORD {
            ERROR_SUCCESS => {}
            ERROR_NO_MORE_ITEMS => break,
            _ => return Err(enumeration_error(status)),
        }

        if value_type != REG_SZ {
            continue;
        }

        let chars = &data[..(data_len as usize / 2).min(data.len())];
        let end = chars.iter().position(|&c| c == 0).unwrap_or(chars.len());

        ports.push(String::from_utf16_lossy(&chars[..end]));
    }

    ports.sort();
    Ok(ports)
}

fn enumeration_error(status: i32) -> Error {
    Error::with_cause(
        ErrorKind::ErrorEnumeratingPorts,
        io::Error::from_raw_os_error(status),
    )
}
