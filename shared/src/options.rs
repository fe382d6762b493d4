use std::time::Duration;

use crate::{
    result::{IocError, IocResult},
    time::now_micros,
};

/// Timeout value that aliases a non-blocking submission
pub const TIMEOUT_NONBLOCK: u64 = 0;

/// Timeout value that selects immediate semantics: attempt once, and report
/// `Timeout` where a non-blocking submission would report the would-block
/// condition (`BufferFull` / `NoData` / `Busy`)
pub const TIMEOUT_IMMEDIATE: u64 = 1_000;

/// Largest accepted bounded timeout: 24 hours, in microseconds
pub const TIMEOUT_MAX: u64 = 24 * 60 * 60 * 1_000_000;

/// Timeout value that aliases an indefinitely blocking submission
pub const TIMEOUT_INFINITE: u64 = u64::MAX;

/// Submission options accepted by every producer API. The default is a
/// may-block submission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Options {
    timeout_us: Option<u64>,
}

impl Options {
    /// Block until the operation can proceed
    pub fn may_block() -> Self {
        Self { timeout_us: None }
    }

    /// Never block: report the would-block condition instead
    pub fn non_block() -> Self {
        Self {
            timeout_us: Some(TIMEOUT_NONBLOCK),
        }
    }

    /// Attempt once; where the operation would block, report `Timeout`
    pub fn immediate() -> Self {
        Self {
            timeout_us: Some(TIMEOUT_IMMEDIATE),
        }
    }

    /// Wait up to the given number of microseconds
    pub fn timeout_us(us: u64) -> Self {
        Self { timeout_us: Some(us) }
    }

    /// Wait up to the given number of milliseconds
    pub fn timeout_ms(ms: u64) -> Self {
        Self {
            timeout_us: Some(ms.saturating_mul(1_000)),
        }
    }

    /// Decode into a concrete wait mode against the monotonic clock.
    ///
    /// `timeout_us(0)` aliases NonBlock and `timeout_us(TIMEOUT_IMMEDIATE)`
    /// aliases Immediate; the two are routed differently by every engine. A
    /// bounded timeout beyond `TIMEOUT_MAX` is rejected.
    pub fn decode(&self) -> IocResult<WaitMode> {
        match self.timeout_us {
            None => Ok(WaitMode::Blocking),
            Some(TIMEOUT_NONBLOCK) => Ok(WaitMode::NonBlock),
            Some(TIMEOUT_IMMEDIATE) => Ok(WaitMode::Immediate),
            Some(TIMEOUT_INFINITE) => Ok(WaitMode::Blocking),
            Some(us) if us <= TIMEOUT_MAX => Ok(WaitMode::Until(now_micros().saturating_add(us))),
            Some(_) => Err(IocError::InvalidParam {
                reason: "timeout exceeds TIMEOUT_MAX",
            }),
        }
    }
}

/// A decoded submission mode: how long a producer API may park the caller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitMode {
    /// Park indefinitely
    Blocking,
    /// Never park; surface the would-block condition
    NonBlock,
    /// Attempt once; surface `Timeout` where parking would be needed
    Immediate,
    /// Park until the deadline (monotonic microseconds), then `Timeout`
    Until(u64),
}

impl WaitMode {
    /// Whether the caller may be parked at all
    pub fn can_wait(&self) -> bool {
        matches!(self, WaitMode::Blocking | WaitMode::Until(_))
    }

    /// Time remaining before the deadline, if one applies. `None` means no
    /// deadline (park indefinitely); `Some(ZERO)` means the deadline has
    /// already passed.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            WaitMode::Blocking => None,
            WaitMode::NonBlock | WaitMode::Immediate => Some(Duration::ZERO),
            WaitMode::Until(deadline) => {
                Some(Duration::from_micros(deadline.saturating_sub(now_micros())))
            }
        }
    }

    /// Whether a bounded deadline has elapsed
    pub fn expired(&self) -> bool {
        match self {
            WaitMode::Blocking => false,
            WaitMode::NonBlock | WaitMode::Immediate => true,
            WaitMode::Until(deadline) => now_micros() >= *deadline,
        }
    }
}
