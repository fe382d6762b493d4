use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use ioc_shared::{now_micros, IocError, IocResult, WaitMode, TIMEOUT_INFINITE};

/// The initiator side of the CMD engine: a single in-flight slot with a
/// correlation sequence. The slot is acquired before the request frame goes
/// out and is released on every completion path, so it never leaks.
pub(crate) struct CmdInitiatorHalf {
    slot: Mutex<Slot>,
    slot_cv: Condvar,
    next_seq: AtomicU64,
}

enum Slot {
    Idle,
    Waiting { seq: u64 },
    Done { seq: u64, outcome: Outcome },
}

enum Outcome {
    Reply { status: u16, payload: Vec<u8> },
    Failed(IocError),
}

impl CmdInitiatorHalf {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Idle),
            slot_cv: Condvar::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Take the in-flight slot per the submission mode, returning the
    /// correlation sequence for the request.
    pub fn acquire(&self, mode: WaitMode) -> IocResult<u64> {
        let mut slot = self.lock();
        loop {
            if matches!(*slot, Slot::Idle) {
                let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
                *slot = Slot::Waiting { seq };
                return Ok(seq);
            }
            match mode {
                WaitMode::NonBlock => return Err(IocError::Busy),
                WaitMode::Immediate => return Err(IocError::Timeout),
                WaitMode::Blocking => {
                    slot = self
                        .slot_cv
                        .wait(slot)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                WaitMode::Until(_) => {
                    let remaining = match mode.remaining() {
                        Some(remaining) if !remaining.is_zero() => remaining,
                        _ => return Err(IocError::Timeout),
                    };
                    let (guard, _) = self
                        .slot_cv
                        .wait_timeout(slot, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    slot = guard;
                }
            }
        }
    }

    /// Park until the reply for `seq` lands, the command deadline passes, or
    /// the link fails. Releases the slot on every path.
    pub fn await_reply(&self, seq: u64, timeout_us: u64) -> IocResult<(u16, Vec<u8>)> {
        let deadline = if timeout_us == TIMEOUT_INFINITE {
            None
        } else {
            Some(now_micros().saturating_add(timeout_us))
        };

        let mut slot = self.lock();
        loop {
            if matches!(&*slot, Slot::Done { seq: s, .. } if *s == seq) {
                let done = std::mem::replace(&mut *slot, Slot::Idle);
                self.slot_cv.notify_all();
                let Slot::Done { outcome, .. } = done else {
                    return Err(IocError::Bug {
                        reason: "command slot changed shape mid-release",
                    });
                };
                return match outcome {
                    Outcome::Reply { status, payload } => Ok((status, payload)),
                    Outcome::Failed(err) => Err(err),
                };
            }
            if !matches!(&*slot, Slot::Waiting { seq: s } if *s == seq) {
                // the slot no longer belongs to this exchange
                return Err(IocError::Bug {
                    reason: "command slot lost while awaiting reply",
                });
            }
            match deadline {
                None => {
                    slot = self
                        .slot_cv
                        .wait(slot)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline_us) => {
                    let now = now_micros();
                    if now >= deadline_us {
                        *slot = Slot::Idle;
                        self.slot_cv.notify_all();
                        return Err(IocError::Timeout);
                    }
                    let remaining = std::time::Duration::from_micros(deadline_us - now);
                    let (guard, _) = self
                        .slot_cv
                        .wait_timeout(slot, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    slot = guard;
                }
            }
        }
    }

    /// Abandon a request whose frame never made it out
    pub fn release(&self, seq: u64) {
        let mut slot = self.lock();
        if matches!(&*slot, Slot::Waiting { seq: s } if *s == seq) {
            *slot = Slot::Idle;
        }
        self.slot_cv.notify_all();
    }

    /// Reply frame arrived: complete the matching exchange. A stale sequence
    /// (its initiator already timed out) is dropped silently.
    pub fn complete(&self, seq: u64, status: u16, payload: Vec<u8>) {
        let mut slot = self.lock();
        if matches!(&*slot, Slot::Waiting { seq: s } if *s == seq) {
            *slot = Slot::Done {
                seq,
                outcome: Outcome::Reply { status, payload },
            };
            self.slot_cv.notify_all();
        }
    }

    /// Link failure: fail whatever exchange is in flight
    pub fn fail_in_flight(&self, err: IocError) {
        let mut slot = self.lock();
        if let Slot::Waiting { seq } = &*slot {
            *slot = Slot::Done {
                seq: *seq,
                outcome: Outcome::Failed(err),
            };
            self.slot_cv.notify_all();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
