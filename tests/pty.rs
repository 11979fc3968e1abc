//! End-to-end tests against a pseudo-terminal pair.
//!
//! The port under test opens the pty's slave side; the test drives the master side as the
//! remote end of the line.

#![cfg(unix)]

use std::ffi::CStr;
use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::prelude::*;
use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serial_test::serial;

use serial_line::{ErrorKind, Port, PortConfig, StopBits};

struct Pty {
    master: File,
    path: String,
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn pty() -> Pty {
    init_logging();

    unsafe {
        let fd = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
        assert!(fd >= 0, "posix_openpt failed");
        assert_eq!(libc::grantpt(fd), 0);
        assert_eq!(libc::unlockpt(fd), 0);

        // ptsname isn't reentrant; every test here runs serially
        let name = libc::ptsname(fd);
        assert!(!name.is_null(), "ptsname failed");

        Pty {
            master: File::from_raw_fd(fd),
            path: CStr::from_ptr(name).to_string_lossy().into_owned(),
        }
    }
}

fn open(pty: &Pty, config: &PortConfig) -> Port {
    serial_line::open(&pty.path, config).unwrap()
}

#[test]
#[serial]
fn round_trips_bytes() {
    let mut pty = pty();
    let port = open(&pty, &PortConfig::default().with_read_timeout(2000));

    let data: Vec<u8> = (0..64).collect();
    pty.master.write_all(&data).unwrap();

    let mut buf = [0u8; 64];
    let n = port.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], &data[..]);

    assert_eq!(port.write(b"pong").unwrap(), 4);

    let mut reply = [0u8; 4];
    pty.master.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"pong");

    port.close().unwrap();
}

#[test]
#[serial]
fn blocking_read_returns_after_first_bytes() {
    let mut pty = pty();
    let port = open(&pty, &PortConfig::default());

    let started = Instant::now();

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(100));
            pty.master.write_all(b"abc").unwrap();
        });

        let mut buf = [0u8; 64];
        let n = port.read(&mut buf).unwrap();

        assert!(n >= 1 && n <= 3);
        assert_eq!(&buf[..n], &b"abc"[..n]);
    });

    assert!(started.elapsed() >= Duration::from_millis(90));
    port.close().unwrap();
}

#[test]
#[serial]
fn read_timeout_returns_zero() {
    let pty = pty();
    let mut port = open(&pty, &PortConfig::default());
    port.set_read_timeout(100).unwrap();

    let started = Instant::now();
    let mut buf = [0u8; 16];

    assert_eq!(port.read(&mut buf).unwrap(), 0);

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(95), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "returned after {:?}", elapsed);

    port.close().unwrap();
}

#[test]
#[serial]
fn zero_read_timeout_polls() {
    let mut pty = pty();
    let port = open(&pty, &PortConfig::default().with_read_timeout(0));

    let mut buf = [0u8; 16];
    assert_eq!(port.read(&mut buf).unwrap(), 0);

    pty.master.write_all(b"xy").unwrap();
    thread::sleep(Duration::from_millis(50));

    assert_eq!(port.read(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"xy");
}

#[test]
#[serial]
fn first_byte_timeout_expires() {
    let pty = pty();
    let mut port = open(&pty, &PortConfig::default());
    port.set_first_byte_read_timeout(100).unwrap();

    let started = Instant::now();
    let mut buf = [0u8; 16];

    assert_eq!(port.read(&mut buf).unwrap(), 0);
    assert!(started.elapsed() >= Duration::from_millis(95));

    let timeouts = port.timeouts().unwrap();
    assert!(timeouts.first_byte_timeout());
    assert_eq!(timeouts.read_timeout(), 100);
}

#[test]
#[serial]
fn first_byte_timeout_rejects_sentinels() {
    let pty = pty();
    let mut port = open(&pty, &PortConfig::default());

    for &ms in &[0, serial_line::MAX_TIMEOUT_MS] {
        let err = port.set_first_byte_read_timeout(ms).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTimeoutValue);
    }
}

#[test]
#[serial]
fn close_wakes_blocked_reader() {
    let pty = pty();
    let port = open(&pty, &PortConfig::default());

    thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut buf = [0u8; 16];
            port.read(&mut buf)
        });

        thread::sleep(Duration::from_millis(100));
        let started = Instant::now();
        port.close().unwrap();

        let err = reader.join().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PortClosed);
        assert_eq!(err.transferred(), 0);
        assert!(started.elapsed() < Duration::from_secs(2));
    });

    assert!(!port.is_open());
}

#[test]
#[serial]
fn close_reports_bytes_already_read() {
    let mut pty = pty();
    let port = open(&pty, &PortConfig::default().with_read_timeout(10_000));

    thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut buf = [0u8; 64];
            port.read(&mut buf).map_err(|err| (err, buf))
        });

        pty.master.write_all(b"xy").unwrap();
        thread::sleep(Duration::from_millis(200));
        port.close().unwrap();

        let (err, buf) = reader.join().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PortClosed);
        assert_eq!(err.transferred(), 2);
        assert_eq!(&buf[..2], b"xy");
    });
}

#[test]
#[serial]
fn closed_port_rejects_operations() {
    let pty = pty();
    let port = open(&pty, &PortConfig::default());

    port.close().unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(port.read(&mut buf).unwrap_err().kind(), ErrorKind::PortClosed);
    assert_eq!(port.write(b"x").unwrap_err().kind(), ErrorKind::PortClosed);
    assert_eq!(port.ready_to_read().unwrap_err().kind(), ErrorKind::PortClosed);
    assert_eq!(port.set_dtr(true).unwrap_err().kind(), ErrorKind::PortClosed);
    assert_eq!(port.close().unwrap_err().kind(), ErrorKind::PortClosed);
}

#[test]
#[serial]
fn single_write_without_timeout() {
    let mut pty = pty();
    let port = open(&pty, &PortConfig::default());

    assert_eq!(port.write(b"hello").unwrap(), 5);

    let mut buf = [0u8; 5];
    pty.master.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"hello");
}

#[test]
#[serial]
fn single_write_returns_partial_count() {
    let pty = pty();
    let port = open(&pty, &PortConfig::default());

    // far more than the pty can buffer, with nobody reading the other end
    let data = vec![0xa5u8; 1 << 20];
    let started = Instant::now();

    let n = port.write(&data).unwrap();

    assert!(n > 0 && n < data.len(), "wrote {} bytes", n);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
#[serial]
fn timed_write_fails_when_device_stays_unwritable() {
    let pty = pty();
    let port = open(&pty, &PortConfig::default().with_write_timeout(200));

    let data = vec![0xa5u8; 1 << 20];
    let started = Instant::now();

    let err = port.write(&data).unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.kind(), ErrorKind::WriteFailed);
    assert!(err.transferred() > 0 && err.transferred() < data.len());
    assert!(elapsed >= Duration::from_millis(190), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "returned after {:?}", elapsed);
}

#[test]
#[serial]
fn timed_write_reports_partial_count_when_reader_stalls() {
    let mut pty = pty();
    let port = open(&pty, &PortConfig::default().with_write_timeout(300));

    let data = vec![0x5au8; 1 << 20];
    let mut received = vec![0u8; 4096];

    let sent = thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(50));
            pty.master.read_exact(&mut received).unwrap();
        });

        match port.write(&data) {
            Ok(n) => n,
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::WriteFailed);
                err.transferred()
            }
        }
    });

    assert!(sent > received.len() && sent < data.len(), "sent {} bytes", sent);
    assert!(received.iter().all(|&b| b == 0x5a));
}

#[test]
#[serial]
fn close_wakes_blocked_writer() {
    let pty = pty();
    let port = open(&pty, &PortConfig::default().with_write_timeout(10_000));

    let data = vec![0u8; 1 << 20];

    thread::scope(|scope| {
        let writer = scope.spawn(|| port.write(&data));

        thread::sleep(Duration::from_millis(100));
        let started = Instant::now();
        port.close().unwrap();

        let err = writer.join().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PortClosed);
        assert!(err.transferred() > 0 && err.transferred() < data.len());
        assert!(started.elapsed() < Duration::from_secs(2));
    });

    assert!(!port.is_open());
}

#[test]
#[serial]
fn timed_read_collects_chunks_until_full() {
    let mut pty = pty();
    let port = open(&pty, &PortConfig::default().with_read_timeout(1000));

    let started = Instant::now();

    thread::scope(|scope| {
        scope.spawn(|| {
            pty.master.write_all(b"ab").unwrap();
            thread::sleep(Duration::from_millis(150));
            pty.master.write_all(b"cd").unwrap();
        });

        let mut buf = [0u8; 4];
        assert_eq!(port.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
    });

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(140), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(900), "returned after {:?}", elapsed);
}

#[test]
#[serial]
fn inter_byte_timeout_ends_read_early() {
    let mut pty = pty();
    let mut port = open(&pty, &PortConfig::default());
    port.set_read_timeout_ex(2000, 100).unwrap();

    pty.master.write_all(b"ab").unwrap();

    let started = Instant::now();
    let mut buf = [0u8; 16];

    assert_eq!(port.read(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"ab");

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(95), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1500), "returned after {:?}", elapsed);
}

#[test]
#[serial]
fn inter_byte_timeout_waits_for_first_byte() {
    let mut pty = pty();
    let mut port = open(&pty, &PortConfig::default());
    port.set_read_timeout_ex(0, 50).unwrap();

    let started = Instant::now();

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(200));
            pty.master.write_all(b"xy").unwrap();
        });

        let mut buf = [0u8; 16];
        assert_eq!(port.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"xy");
    });

    assert!(started.elapsed() >= Duration::from_millis(190));
}

#[test]
#[serial]
fn inter_byte_timeout_rejects_sentinels() {
    let pty = pty();
    let mut port = open(&pty, &PortConfig::default());

    for &ms in &[0, serial_line::MAX_TIMEOUT_MS] {
        let err = port.set_read_timeout_ex(1000, ms).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTimeoutValue);
    }

    assert!(port.timeouts().unwrap().first_byte_timeout());
}

#[test]
#[serial]
fn write_with_timeout_sends_everything() {
    let mut pty = pty();
    let port = open(&pty, &PortConfig::default().with_write_timeout(1000));

    let data = [0x55u8; 256];
    assert_eq!(port.write(&data).unwrap(), data.len());

    let mut buf = [0u8; 256];
    pty.master.read_exact(&mut buf).unwrap();
    assert_eq!(&buf[..], &data[..]);
}

#[test]
#[serial]
fn reports_and_discards_pending_input() {
    let mut pty = pty();
    let port = open(&pty, &PortConfig::default());

    pty.master.write_all(b"1234").unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(port.ready_to_read().unwrap(), 4);

    port.reset_input_buffer().unwrap();
    assert_eq!(port.ready_to_read().unwrap(), 0);
}

#[test]
#[serial]
fn drain_returns_once_written() {
    let mut pty = pty();
    let port = open(&pty, &PortConfig::default().with_write_timeout(500));

    assert_eq!(port.write(b"abc").unwrap(), 3);

    let mut buf = [0u8; 3];
    pty.master.read_exact(&mut buf).unwrap();

    port.drain().unwrap();
    port.reset_output_buffer().unwrap();
}

#[test]
#[serial]
fn reconfigure_keeps_port_usable() {
    let mut pty = pty();
    let mut port = open(&pty, &PortConfig::default());

    port.reconfigure(&PortConfig::default().with_baud_rate(115200)).unwrap();
    assert_eq!(port.config().baud_rate, 115200);

    let err = port
        .reconfigure(&PortConfig::default().with_stop_bits(StopBits::OnePointFive))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStopBits);
    assert_eq!(port.config().baud_rate, 115200);

    pty.master.write_all(b"ok").unwrap();
    port.set_read_timeout(1000).unwrap();

    let mut buf = [0u8; 2];
    assert_eq!(port.read(&mut buf).unwrap(), 2);
}

#[test]
#[serial]
fn open_rejects_unrepresentable_settings() {
    let pty = pty();

    let config = PortConfig::default().with_stop_bits(StopBits::OnePointFive);
    let err = serial_line::open(&pty.path, &config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStopBits);

    let config = PortConfig::default().with_baud_rate(0);
    let err = serial_line::open(&pty.path, &config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSpeed);

    // the failed opens left nothing behind
    let port = serial_line::open(&pty.path, &PortConfig::default()).unwrap();
    port.close().unwrap();
}

#[test]
#[serial]
fn open_reports_missing_device() {
    init_logging();

    let err = serial_line::open("/dev/ttyDOES_NOT_EXIST0", &PortConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PortNotFound);
}

#[test]
#[serial]
fn io_traits_map_timeouts() {
    let mut pty = pty();
    let port = open(&pty, &PortConfig::default().with_read_timeout(50));

    let mut buf = [0u8; 8];
    let err = Read::read(&mut &port, &mut buf).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);

    Write::write_all(&mut &port, b"via io").unwrap();
    Write::flush(&mut &port).unwrap();

    let mut out = [0u8; 6];
    pty.master.read_exact(&mut out).unwrap();
    assert_eq!(&out, b"via io");
}

#[test]
fn lists_ports() {
    let ports = serial_line::list_ports().unwrap();
    assert!(ports.iter().all(|port| !port.is_empty()));
}
