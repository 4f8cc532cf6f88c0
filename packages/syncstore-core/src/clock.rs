//! Centisecond timestamps and the clocks that issue them.
//!
//! Timestamps travel over the wire as fractional seconds with two decimals
//! and are compared with exact equality by clients, so they are kept as
//! integer centiseconds internally and never pass through a float on the
//! way in.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Centiseconds per second.
const CENTIS_PER_SEC: u64 = 100;

/// Point in time with centisecond resolution.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The Unix epoch.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Creates a timestamp from centiseconds since the epoch.
    pub const fn from_centis(centis: u64) -> Self {
        Self(centis)
    }

    /// Creates a timestamp from whole seconds since the epoch.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(CENTIS_PER_SEC))
    }

    /// Centiseconds since the epoch.
    pub const fn as_centis(self) -> u64 {
        self.0
    }

    /// Fractional seconds, as written into JSON bodies.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / CENTIS_PER_SEC as f64
    }

    /// Adds whole seconds, saturating at the maximum representable time.
    pub fn saturating_add_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs.saturating_mul(CENTIS_PER_SEC)))
    }

    /// The next representable timestamp.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Parses a decimal seconds value such as `1700000000.12` into a bound.
    ///
    /// Digits past the second decimal are not representable; `rounding`
    /// decides which neighbouring centisecond the bound snaps to so that a
    /// strict comparison against it stays exact.
    pub fn parse_bound(s: &str, rounding: Rounding) -> Result<Self, ParseTimestampError> {
        let s = s.trim();
        let (int_part, frac_part) = match s.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (s, ""),
        };

        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseTimestampError::new(s));
        }
        if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseTimestampError::new(s));
        }

        let secs: u64 = int_part.parse().map_err(|_| ParseTimestampError::new(s))?;
        let frac = frac_part.as_bytes();
        let digit = |i: usize| frac.get(i).map(|b| u64::from(b - b'0')).unwrap_or(0);
        let centis_frac = digit(0) * 10 + digit(1);
        let has_remainder = frac.iter().skip(2).any(|b| *b != b'0');

        let mut centis = secs
            .checked_mul(CENTIS_PER_SEC)
            .and_then(|c| c.checked_add(centis_frac))
            .ok_or_else(|| ParseTimestampError::new(s))?;
        if has_remainder && rounding == Rounding::Ceil {
            centis = centis
                .checked_add(1)
                .ok_or_else(|| ParseTimestampError::new(s))?;
        }
        Ok(Self(centis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02}",
            self.0 / CENTIS_PER_SEC,
            self.0 % CENTIS_PER_SEC
        )
    }
}

/// How a bound with sub-centisecond digits snaps to a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Round toward the past (used for `newer`, a strict lower bound)
    Floor,
    /// Round toward the future (used for `older`, a strict upper bound)
    Ceil,
}

/// Error returned for malformed timestamp strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimestampError {
    input: String,
}

impl ParseTimestampError {
    fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
        }
    }
}

impl fmt::Display for ParseTimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid timestamp '{}'", self.input)
    }
}

impl std::error::Error for ParseTimestampError {}

/// Source of the current time.
pub trait Clock: fmt::Debug + Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Wall clock backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp((elapsed.as_millis() / 10) as u64)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    centis: AtomicU64,
}

impl ManualClock {
    /// Creates a clock stopped at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            centis: AtomicU64::new(start.as_centis()),
        }
    }

    /// Moves the clock to `ts`.
    pub fn set(&self, ts: Timestamp) {
        self.centis.store(ts.as_centis(), Ordering::SeqCst);
    }

    /// Moves the clock forward by whole seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.centis
            .fetch_add(secs.saturating_mul(CENTIS_PER_SEC), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.centis.load(Ordering::SeqCst))
    }
}
