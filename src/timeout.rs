//! Read and write timeout policy.
//!
//! The policy is pure state: it never touches a device. Platform engines ask it for deadlines
//! and either wait on them directly (readiness-based engines) or translate them into the
//! device's own timeout block (completion-based engines).

use std::time::{Duration, Instant};

use crate::error::{Error, ErrorKind, Result};

/// Sentinel value rejected by [`TimeoutPolicy::set_first_byte_read_timeout`].
pub const MAX_TIMEOUT_MS: u32 = u32::MAX;

/// Per-port timeout state.
///
/// | read timeout | first byte | `read()` behaviour |
/// |---|---|---|
/// | 0 | yes | blocks indefinitely for the first byte, then returns what has arrived |
/// | N | yes | waits up to N ms for the first byte, then returns what has arrived |
/// | N | no | keeps reading until the buffer is full or N ms have elapsed |
/// | 0 | no | returns whatever is buffered without waiting |
///
/// An inter-byte interval, set with [`set_read_timeout_ex`](#method.set_read_timeout_ex), also
/// ends a read once some bytes have arrived and the line stays quiet for that long. A total of 0
/// then leaves the wait for the first byte unbounded.
///
/// Windows has no unbounded first-byte wait: the driver's total timeout constant tops out at
/// `MAXDWORD - 1` ms, so a blocking first-byte read there gives up after about 49.7 days.
///
/// A write timeout of 0 means a single write attempt whose result is returned as-is. Any other
/// value bounds the total time spent writing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimeoutPolicy {
    read_timeout_ms: u32,
    write_timeout_ms: u32,
    read_interval_ms: u32,
    first_byte: bool,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        TimeoutPolicy {
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            read_interval_ms: 0,
            first_byte: true,
        }
    }
}

impl TimeoutPolicy {
    /// Returns the read timeout in milliseconds.
    pub fn read_timeout(&self) -> u32 {
        self.read_timeout_ms
    }

    /// Returns the write timeout in milliseconds.
    pub fn write_timeout(&self) -> u32 {
        self.write_timeout_ms
    }

    /// Returns the inter-byte read interval in milliseconds, 0 if there is none.
    pub fn read_interval_timeout(&self) -> u32 {
        self.read_interval_ms
    }

    /// Returns `true` if reads return as soon as any data has arrived.
    pub fn first_byte_timeout(&self) -> bool {
        self.first_byte
    }

    /// Bounds the total duration of a read. Clears the first-byte flag.
    pub fn set_read_timeout(&mut self, milliseconds: u32) {
        self.first_byte = false;
        self.read_timeout_ms = milliseconds;
        self.read_interval_ms = 0;
    }

    /// Bounds a read by `total` milliseconds overall and by `interval` milliseconds of silence
    /// between bytes once the first byte has arrived. Clears the first-byte flag.
    ///
    /// A `total` of 0 waits for the first byte without limit.
    ///
    /// ## Errors
    ///
    /// `InvalidTimeoutValue` if `interval` is 0 or [`MAX_TIMEOUT_MS`]. The policy is left
    /// unchanged in that case.
    pub fn set_read_timeout_ex(&mut self, total: u32, interval: u32) -> Result<()> {
        if interval == 0 || interval == MAX_TIMEOUT_MS {
            return Err(Error::new(ErrorKind::InvalidTimeoutValue));
        }

        self.first_byte = false;
        self.read_timeout_ms = total;
        self.read_interval_ms = interval;
        Ok(())
    }

    /// Bounds the total duration of a write. Zero selects a single unbounded write attempt.
    pub fn set_write_timeout(&mut self, milliseconds: u32) {
        self.write_timeout_ms = milliseconds;
    }

    /// Bounds only the wait for the first byte of a read.
    ///
    /// ## Errors
    ///
    /// `InvalidTimeoutValue` if `milliseconds` is 0 or [`MAX_TIMEOUT_MS`]. The policy is left
    /// unchanged in that case.
    pub fn set_first_byte_read_timeout(&mut self, milliseconds: u32) -> Result<()> {
        if milliseconds == 0 || milliseconds == MAX_TIMEOUT_MS {
            return Err(Error::new(ErrorKind::InvalidTimeoutValue));
        }

        self.first_byte = true;
        self.read_timeout_ms = milliseconds;
        self.read_interval_ms = 0;
        Ok(())
    }

    /// Returns the deadline of a read that starts at `now`.
    pub fn read_deadline(&self, now: Instant) -> Deadline {
        if self.read_timeout_ms == 0 && (self.first_byte || self.read_interval_ms > 0) {
            Deadline::never()
        } else {
            Deadline::after(now, self.read_timeout_ms)
        }
    }

    /// Returns the deadline of a write that starts at `now`, or `None` for a single write attempt.
    pub fn write_deadline(&self, now: Instant) -> Option<Deadline> {
        if self.write_timeout_ms == 0 {
            None
        } else {
            Some(Deadline::after(now, self.write_timeout_ms))
        }
    }

    /// Returns the deadline for the next chunk of a read that has already received some bytes:
    /// the read's own deadline, pulled in by the inter-byte interval if there is one.
    pub fn next_chunk_deadline(&self, deadline: &Deadline, now: Instant) -> Deadline {
        if self.read_interval_ms == 0 {
            *deadline
        } else {
            deadline.earliest(Deadline::after(now, self.read_interval_ms))
        }
    }

    /// Returns `true` if a read that has received some bytes should stop at `now`.
    pub fn read_complete(&self, deadline: &Deadline, now: Instant) -> bool {
        self.first_byte || deadline.has_passed(now)
    }
}

/// A point in time after which a blocking operation gives up.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn never() -> Self {
        Deadline(None)
    }

    pub fn at(instant: Instant) -> Self {
        Deadline(Some(instant))
    }

    pub fn after(now: Instant, milliseconds: u32) -> Self {
        Deadline(now.checked_add(Duration::from_millis(u64::from(milliseconds))))
    }

    /// Returns whichever of the two deadlines expires first.
    pub fn earliest(self, other: Deadline) -> Self {
        match (self.0, other.0) {
            (Some(a), Some(b)) => Deadline(Some(a.min(b))),
            (Some(a), None) | (None, Some(a)) => Deadline(Some(a)),
            (None, None) => Deadline(None),
        }
    }

    /// Time left until the deadline, or `None` if it never expires.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(now))
    }

    pub fn has_passed(&self, now: Instant) -> bool {
        match self.0 {
            Some(at) => now >= at,
            None => false,
        }
    }
}
