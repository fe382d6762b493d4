use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use ioc_shared::{IocError, IocResult, WaitMode, DAT_BATCH_MAX_BYTES};

/// The send side of the DAT engine for one link: a byte-accounted chunk
/// buffer drained by a dedicated sender thread. A full buffer exerts
/// backpressure on `send_dat` per its wait mode; the sender thread coalesces
/// whatever has accumulated into transport frames capped at
/// `DAT_BATCH_MAX_BYTES`, so delivery is never deferred past a flush.
pub(crate) struct DatSenderHalf {
    buf: Mutex<SendBuf>,
    not_full: Condvar,
    not_empty: Condvar,
    flushed: Condvar,
    capacity: usize,
}

struct SendBuf {
    chunks: VecDeque<Vec<u8>>,
    queued_bytes: usize,
    // a batch has been taken by the sender thread but not yet written out
    in_flight: bool,
    closed: bool,
}

impl DatSenderHalf {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Mutex::new(SendBuf {
                chunks: VecDeque::new(),
                queued_bytes: 0,
                in_flight: false,
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            flushed: Condvar::new(),
            capacity,
        }
    }

    /// Admit one chunk into the buffer per the submission mode. An empty
    /// buffer always admits, so a chunk larger than the configured capacity
    /// still drains through rather than wedging forever.
    pub fn submit(&self, chunk: Vec<u8>, mode: WaitMode) -> IocResult<()> {
        let len = chunk.len();
        let mut buf = self.lock();
        loop {
            if buf.closed {
                return Err(IocError::LinkBroken);
            }
            let idle = buf.queued_bytes == 0 && !buf.in_flight;
            if idle || buf.queued_bytes + len <= self.capacity {
                buf.queued_bytes += len;
                buf.chunks.push_back(chunk);
                self.not_empty.notify_one();
                return Ok(());
            }
            match mode {
                WaitMode::NonBlock => return Err(IocError::BufferFull),
                WaitMode::Immediate => return Err(IocError::Timeout),
                WaitMode::Blocking => {
                    buf = self
                        .not_full
                        .wait(buf)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                WaitMode::Until(_) => {
                    let remaining = match mode.remaining() {
                        Some(remaining) if !remaining.is_zero() => remaining,
                        _ => return Err(IocError::Timeout),
                    };
                    let (guard, _) = self
                        .not_full
                        .wait_timeout(buf, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    buf = guard;
                }
            }
        }
    }

    /// Park until everything submitted so far has been written to the
    /// transport, or the mode's deadline passes.
    pub fn wait_flushed(&self, mode: WaitMode) -> IocResult<()> {
        let mut buf = self.lock();
        loop {
            if buf.chunks.is_empty() && !buf.in_flight {
                return Ok(());
            }
            if buf.closed {
                return Err(IocError::LinkBroken);
            }
            match mode {
                WaitMode::NonBlock => return Err(IocError::BufferFull),
                WaitMode::Immediate => return Err(IocError::Timeout),
                WaitMode::Blocking => {
                    buf = self
                        .flushed
                        .wait(buf)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                WaitMode::Until(_) => {
                    let remaining = match mode.remaining() {
                        Some(remaining) if !remaining.is_zero() => remaining,
                        _ => return Err(IocError::Timeout),
                    };
                    let (guard, _) = self
                        .flushed
                        .wait_timeout(buf, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    buf = guard;
                }
            }
        }
    }

    /// Stop admitting new chunks. Pending chunks still drain; the sender
    /// thread exits once the buffer runs dry.
    pub fn close(&self) {
        let mut buf = self.lock();
        buf.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.flushed.notify_all();
    }

    /// Abandon pending chunks outright (transport already failed)
    pub fn abort(&self) {
        let mut buf = self.lock();
        buf.closed = true;
        buf.chunks.clear();
        buf.queued_bytes = 0;
        buf.in_flight = false;
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.flushed.notify_all();
    }

    /// Sender-thread side: wait for work, then take one coalesced batch.
    /// Returns `None` once the half is closed and fully drained.
    pub fn take_batch(&self) -> Option<Vec<u8>> {
        let mut buf = self.lock();
        loop {
            if !buf.chunks.is_empty() {
                let mut batch = Vec::new();
                while let Some(front) = buf.chunks.front() {
                    if !batch.is_empty() && batch.len() + front.len() > DAT_BATCH_MAX_BYTES {
                        break;
                    }
                    let chunk = match buf.chunks.pop_front() {
                        Some(chunk) => chunk,
                        None => break,
                    };
                    buf.queued_bytes -= chunk.len();
                    if batch.is_empty() {
                        batch = chunk;
                    } else {
                        batch.extend_from_slice(&chunk);
                    }
                    if batch.len() >= DAT_BATCH_MAX_BYTES {
                        break;
                    }
                }
                buf.in_flight = true;
                self.not_full.notify_all();
                return Some(batch);
            }
            if buf.closed {
                return None;
            }
            buf = self
                .not_empty
                .wait(buf)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Sender-thread side: the taken batch has been written out
    pub fn batch_written(&self) {
        let mut buf = self.lock();
        buf.in_flight = false;
        // producers waiting for a fully idle buffer park on not_full too
        self.not_full.notify_all();
        if buf.chunks.is_empty() {
            self.flushed.notify_all();
        }
    }

    pub fn queued_bytes(&self) -> usize {
        self.lock().queued_bytes
    }

    fn lock(&self) -> MutexGuard<'_, SendBuf> {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
