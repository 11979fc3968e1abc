//! Toggles RTS and DTR on each named port and prints the modem status lines.
//!
//! ```text
//! cargo run --example probe_pins -- /dev/ttyUSB0
//! ```

use std::env;
use std::thread;
use std::time::Duration;

use serial_line::{Port, PortConfig};

fn main() {
    let config = PortConfig::default().with_read_timeout(100);

    for arg in env::args().skip(1) {
        let port = match serial_line::open(&arg, &config) {
            Ok(port) => port,
            Err(err) => {
                eprintln!("{}: {}", arg, err);
                continue;
            }
        };

        println!("opened device {}", port);

        if let Err(err) = probe_pins(&port) {
            eprintln!("{}: {}", port, err);
        }
    }
}

fn probe_pins(port: &Port) -> serial_line::Result<()> {
    port.set_rts(false)?;
    port.set_dtr(false)?;

    let mut rts = false;
    let mut dtr = false;
    let mut toggle = true;

    loop {
        thread::sleep(Duration::from_secs(1));

        if toggle {
            rts = !rts;
            port.set_rts(rts)?;
        } else {
            dtr = !dtr;
            port.set_dtr(dtr)?;
        }

        let status = port.modem_status_bits()?;

        println!(
            "RTS={:5?} DTR={:5?} CTS={:5?} DSR={:5?} RI={:5?} CD={:?}",
            rts, dtr, status.cts, status.dsr, status.ri, status.dcd
        );

        toggle = !toggle;
    }
}
