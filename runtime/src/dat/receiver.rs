use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use ioc_shared::{DatDesc, IocError, IocResult, WaitMode};

use super::DatHandler;

/// The receive side of the DAT engine for one link. The delivery mode is
/// fixed at link creation: callback when a handler was registered, polling
/// otherwise. The two are mutually exclusive per link.
pub(crate) enum DatReceiverHalf {
    Callback(Arc<dyn DatHandler>),
    Polling(DatParking),
}

/// Byte parking for polling delivery. Bounded: when it fills, the link's
/// reader thread stops pulling frames, which backpressures the transport and
/// ultimately the sender. Bytes are only ever appended in arrival order, so
/// stream integrity is a structural property here.
pub(crate) struct DatParking {
    inner: Mutex<Parking>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

struct Parking {
    bytes: VecDeque<u8>,
    closed: bool,
}

impl DatParking {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Parking {
                bytes: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Reader-thread side: park arrived bytes, blocking while the queue is
    /// full. Returns false once the parking is closed.
    pub fn park(&self, chunk: &[u8]) -> bool {
        let mut parking = self.lock();
        let mut offset = 0;
        while offset < chunk.len() {
            if parking.closed {
                return false;
            }
            let room = self.capacity.saturating_sub(parking.bytes.len());
            if room == 0 {
                parking = self
                    .not_full
                    .wait(parking)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            }
            let take = room.min(chunk.len() - offset);
            parking.bytes.extend(&chunk[offset..offset + take]);
            offset += take;
            self.not_empty.notify_all();
        }
        true
    }

    /// Polling side: move parked bytes into the descriptor's window. The
    /// receiver's chunking is whatever is available, independent of how the
    /// sender chunked its submissions.
    pub fn take(&self, desc: &mut DatDesc, mode: WaitMode) -> IocResult<()> {
        let mut parking = self.lock();
        loop {
            if !parking.bytes.is_empty() {
                let take = desc.window().min(parking.bytes.len());
                let drained: Vec<u8> = parking.bytes.drain(..take).collect();
                desc.fill(&drained);
                self.not_full.notify_all();
                return Ok(());
            }
            if parking.closed {
                // the stream ended; whatever was parked has been consumed
                return Err(IocError::NoData);
            }
            match mode {
                WaitMode::NonBlock => return Err(IocError::NoData),
                WaitMode::Immediate => return Err(IocError::Timeout),
                WaitMode::Blocking => {
                    parking = self
                        .not_empty
                        .wait(parking)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                WaitMode::Until(_) => {
                    let remaining = match mode.remaining() {
                        Some(remaining) if !remaining.is_zero() => remaining,
                        _ => return Err(IocError::Timeout),
                    };
                    let (guard, _) = self
                        .not_empty
                        .wait_timeout(parking, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    parking = guard;
                }
            }
        }
    }

    pub fn close(&self) {
        let mut parking = self.lock();
        parking.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn parked_bytes(&self) -> usize {
        self.lock().bytes.len()
    }

    fn lock(&self) -> MutexGuard<'_, Parking> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
