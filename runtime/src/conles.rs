use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::JoinHandle;

use log::warn;

use ioc_shared::{
    ConnState, LinkStateCell, SubState, DEPTH_EVT_DESC_QUEUE, MAX_EVT_CONSUMER,
};

use crate::evt::{run_dispatcher, EvtHalf};

/// The connectionless EVT fabric behind `LinkId::AUTO`: one shared queue,
/// one subscription table bounded by `MAX_EVT_CONSUMER`, one dispatcher.
/// Started lazily on first touch; torn down with its hub.
pub(crate) struct Conles {
    inner: OnceLock<ConlesInner>,
}

struct ConlesInner {
    half: Arc<EvtHalf>,
    shutdown: Arc<AtomicBool>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Conles {
    pub fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// The fabric's consumer half, starting the dispatcher on first use
    pub fn half(&self) -> &Arc<EvtHalf> {
        &self.inner().half
    }

    /// The fabric's half only if it has ever been touched
    pub fn started(&self) -> Option<&Arc<EvtHalf>> {
        self.inner.get().map(|inner| &inner.half)
    }

    pub fn shutdown(&self) {
        let Some(inner) = self.inner.get() else {
            return;
        };
        inner.shutdown.store(true, Ordering::Release);
        inner.half.wakeup();
        let handle = inner
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    fn inner(&self) -> &ConlesInner {
        self.inner.get_or_init(|| {
            // the auto link has no meaningful connection state; level-1
            // queries are rejected before they reach this cell
            let state = Arc::new(LinkStateCell::new(ConnState::Connected, SubState::Default));
            let half = Arc::new(EvtHalf::new(
                state,
                DEPTH_EVT_DESC_QUEUE,
                Some(MAX_EVT_CONSUMER),
            ));
            let shutdown = Arc::new(AtomicBool::new(false));
            let dispatcher = {
                let half = Arc::clone(&half);
                let shutdown = Arc::clone(&shutdown);
                std::thread::Builder::new()
                    .name("ioc-conles-dispatch".to_string())
                    .spawn(move || run_dispatcher(half, shutdown))
            };
            let dispatcher = match dispatcher {
                Ok(handle) => Some(handle),
                Err(err) => {
                    warn!("failed to spawn the conles dispatcher: {err}");
                    None
                }
            };
            ConlesInner {
                half,
                shutdown,
                dispatcher: Mutex::new(dispatcher),
            }
        })
    }
}
