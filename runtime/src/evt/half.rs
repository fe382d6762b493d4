use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use log::warn;

use ioc_shared::{
    BoundedQueue, DequeueError, EnqueueError, EvtDesc, IocError, IocResult, LinkStateCell,
    MainState, WaitMode,
};

use super::{handler_key, EvtHandler, SubEvtArgs};

/// The consumer side of the EVT engine for one link (or for the auto-link
/// fabric): the bounded event queue, the subscription table, and the
/// dispatch machinery guaranteeing at-most-one concurrent callback.
pub(crate) struct EvtHalf {
    queue: BoundedQueue<QueuedEvt>,
    table: Mutex<SubTable>,
    table_cv: Condvar,
    // serializes dispatch sessions; never held across a user callback by
    // more than the session that owns it
    proc: Mutex<()>,
    post_seq: AtomicU64,
    state: Arc<LinkStateCell>,
    max_consumers: Option<usize>,
}

struct SubTable {
    entries: Vec<Subscription>,
    // keys whose callbacks are on the stack right now
    in_flight: Vec<usize>,
    // thread currently inside a dispatch session
    dispatching_thread: Option<ThreadId>,
}

struct Subscription {
    key: usize,
    handler: Arc<dyn EvtHandler>,
    evt_ids: Vec<ioc_shared::EvtId>,
    // only entries posted after this sequence are delivered
    since_seq: u64,
}

struct QueuedEvt {
    desc: EvtDesc,
    seq: u64,
}

impl EvtHalf {
    pub fn new(state: Arc<LinkStateCell>, depth: usize, max_consumers: Option<usize>) -> Self {
        Self {
            queue: BoundedQueue::new(depth),
            table: Mutex::new(SubTable {
                entries: Vec::new(),
                in_flight: Vec::new(),
                dispatching_thread: None,
            }),
            table_cv: Condvar::new(),
            proc: Mutex::new(()),
            post_seq: AtomicU64::new(0),
            state,
            max_consumers,
        }
    }

    pub fn state(&self) -> &Arc<LinkStateCell> {
        &self.state
    }

    pub fn sub(&self, args: SubEvtArgs) -> IocResult<()> {
        if args.evt_ids.is_empty() {
            return Err(IocError::InvalidParam {
                reason: "subscription carries no event ids",
            });
        }
        let _busy = self.state.enter_main(MainState::BusySubEvt);
        let mut table = self.lock_table();
        let key = handler_key(&args.handler);
        if table.entries.iter().any(|sub| sub.key == key) {
            return Err(IocError::ConflictEvtConsumer);
        }
        if let Some(max) = self.max_consumers {
            if table.entries.len() >= max {
                return Err(IocError::TooManyEvtConsumer);
            }
        }
        table.entries.push(Subscription {
            key,
            handler: args.handler,
            evt_ids: args.evt_ids,
            since_seq: self.post_seq.load(Ordering::SeqCst),
        });
        Ok(())
    }

    /// Remove a subscription. After this returns, no callback for the key
    /// runs again: an in-flight invocation is waited out, unless the caller
    /// IS that invocation (unsubscribing from inside one's own callback).
    pub fn unsub(&self, handler: &Arc<dyn EvtHandler>) -> IocResult<()> {
        let key = handler_key(handler);
        let _busy = self.state.enter_main(MainState::BusyUnsubEvt);
        let mut table = self.lock_table();
        let index = table
            .entries
            .iter()
            .position(|sub| sub.key == key)
            .ok_or(IocError::NoEventConsumer)?;
        table.entries.remove(index);

        let me = thread::current().id();
        while table.in_flight.contains(&key) && table.dispatching_thread != Some(me) {
            table = self
                .table_cv
                .wait(table)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    /// Post an event toward this half's subscribers. An event no
    /// subscription matches is rejected without touching the queue. A post
    /// from inside a callback of this half is delivered inline: the
    /// dispatcher cannot drain the queue while it is running the caller.
    pub fn post(&self, desc: EvtDesc, mode: WaitMode) -> IocResult<()> {
        {
            let table = self.lock_table();
            if !table
                .entries
                .iter()
                .any(|sub| sub.evt_ids.contains(&desc.evt_id))
            {
                return Err(IocError::NoEventConsumer);
            }
        }
        let seq = self.post_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = QueuedEvt { desc, seq };

        if self.on_dispatching_thread() {
            self.dispatch_targets(&entry);
            return Ok(());
        }
        self.queue.enqueue(entry, mode).map_err(|err| match err {
            EnqueueError::Full => IocError::TooManyQueuingEvtDesc,
            EnqueueError::Timeout => IocError::Timeout,
        })
    }

    /// Drain and dispatch everything pending, synchronously on this thread
    pub fn force_proc(&self) {
        if self.on_dispatching_thread() {
            while let Ok(entry) = self.queue.dequeue(WaitMode::NonBlock) {
                self.dispatch_targets(&entry);
            }
            return;
        }
        let _proc = self.proc.lock().unwrap_or_else(PoisonError::into_inner);
        self.run_session();
    }

    /// Nudge a dispatcher parked on the empty queue
    pub fn wakeup(&self) {
        self.queue.wake_consumer();
    }

    /// Drop whatever is still queued and release parked producers. Used on
    /// link close, after the id stopped resolving, so nothing can refill.
    pub fn abandon_pending(&self) {
        let dropped = self.queue.drain();
        if !dropped.is_empty() {
            log::debug!("dropping {} queued events on close", dropped.len());
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    // One dispatch session: claim the thread marker, pop-and-dispatch until
    // the queue runs dry. The proc mutex is held by the caller.
    fn run_session(&self) {
        let me = thread::current().id();
        {
            let mut table = self.lock_table();
            table.dispatching_thread = Some(me);
        }
        while let Ok(entry) = self.queue.dequeue(WaitMode::NonBlock) {
            self.dispatch_targets(&entry);
        }
        {
            let mut table = self.lock_table();
            table.dispatching_thread = None;
        }
        self.table_cv.notify_all();
    }

    // Deliver one entry to every matching subscription exactly once. No lock
    // is held while a user callback runs.
    fn dispatch_targets(&self, entry: &QueuedEvt) {
        let targets: Vec<(usize, Arc<dyn EvtHandler>)> = {
            let table = self.lock_table();
            table
                .entries
                .iter()
                .filter(|sub| {
                    sub.since_seq < entry.seq && sub.evt_ids.contains(&entry.desc.evt_id)
                })
                .map(|sub| (sub.key, sub.handler.clone()))
                .collect()
        };
        if targets.is_empty() {
            return;
        }
        let _busy = self.state.enter_main(MainState::BusyCbProcEvt);
        for (key, handler) in targets {
            {
                let mut table = self.lock_table();
                if !table.entries.iter().any(|sub| sub.key == key) {
                    // unsubscribed between collection and invocation
                    continue;
                }
                table.in_flight.push(key);
            }
            if let Err(err) = handler.on_evt(&entry.desc) {
                warn!("event callback failed: {err}");
            }
            {
                let mut table = self.lock_table();
                if let Some(position) = table.in_flight.iter().position(|k| *k == key) {
                    table.in_flight.remove(position);
                }
            }
            self.table_cv.notify_all();
        }
    }

    fn on_dispatching_thread(&self) -> bool {
        self.lock_table().dispatching_thread == Some(thread::current().id())
    }

    fn lock_table(&self) -> MutexGuard<'_, SubTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Dispatcher loop: one per consumer half, on a dedicated thread
pub(crate) fn run_dispatcher(half: Arc<EvtHalf>, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        match half.queue.wait_nonempty(WaitMode::Blocking) {
            Ok(()) => {
                let _proc = half.proc.lock().unwrap_or_else(PoisonError::into_inner);
                half.run_session();
            }
            Err(DequeueError::Empty) | Err(DequeueError::Timeout) => {
                // woken or spurious; shutdown is re-checked at the loop top
            }
        }
    }
}
