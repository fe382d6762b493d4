use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::JoinHandle;

use log::{debug, warn};

use ioc_shared::{
    now_micros, ConnState, IocError, IocResult, LinkId, LinkStateCell, SrvId, SubState, WaitMode,
    DEPTH_EVT_DESC_QUEUE, MAX_DATA_QUEUE_SIZE,
};

use crate::cmd::{CmdExecutorHalf, CmdInitiatorHalf};
use crate::dat::{DatParking, DatReceiverHalf, DatSenderHalf};
use crate::evt::{run_dispatcher, EvtHalf};
use crate::link::run_reader;
use crate::service::{Usage, UsageArgs};
use crate::transport::{Frame, FrameReceiver, FrameSender, SendError};

// Bounded grace for the best-effort flush performed by an orderly close
const CLOSE_FLUSH_GRACE_US: u64 = 1_000_000;

/// One endpoint of a paired duplex link, carrying its engine halves per the
/// roles it plays. The runtime owns the link until `close_link` returns;
/// afterwards the id is dead and resolves to `NotExistLink`.
pub(crate) struct Link {
    pub id: LinkId,
    pub usage: Usage,
    pub state: Arc<LinkStateCell>,
    pub srv: Option<SrvId>,
    pub shutdown: Arc<AtomicBool>,
    peer: OnceLock<LinkId>,
    evt: Option<Arc<EvtHalf>>,
    cmd_initiator: Option<CmdInitiatorHalf>,
    cmd_executor: Option<CmdExecutorHalf>,
    dat_sender: Option<Arc<DatSenderHalf>>,
    dat_receiver: Option<DatReceiverHalf>,
    writer: Mutex<Option<Box<dyn FrameSender>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    // distinguishes a local orderly close from a detected transport failure
    closing: AtomicBool,
}

impl Link {
    /// Shape checks shared by connect and accept, run before a link id is
    /// minted for the endpoint.
    pub fn validate(usage: Usage, args: &UsageArgs) -> IocResult<()> {
        if usage.is_empty() {
            return Err(IocError::InvalidParam {
                reason: "link usage carries no roles",
            });
        }
        if usage.contains(Usage::CMD_EXECUTOR) && args.cmd.is_none() {
            return Err(IocError::InvalidParam {
                reason: "executor role requires a command executor callback",
            });
        }
        Ok(())
    }

    /// Assemble a link endpoint from its (validated) roles and engine
    /// arguments. The link starts in `Connecting`; pairing completes it.
    pub fn build(
        id: LinkId,
        usage: Usage,
        args: &UsageArgs,
        srv: Option<SrvId>,
        writer: Box<dyn FrameSender>,
    ) -> Arc<Link> {
        let dat_capacity = args.dat_queue_capacity.unwrap_or(MAX_DATA_QUEUE_SIZE);
        let state = Arc::new(LinkStateCell::new(
            ConnState::Connecting,
            resting_sub_state(usage),
        ));

        let evt = usage.contains(Usage::EVT_CONSUMER).then(|| {
            let half = Arc::new(EvtHalf::new(Arc::clone(&state), DEPTH_EVT_DESC_QUEUE, None));
            if let Some(sub) = &args.evt {
                if let Err(err) = half.sub(sub.clone()) {
                    warn!("initial subscription on link {id:?} failed: {err}");
                }
            }
            half
        });

        let cmd_executor = match (&args.cmd, usage.contains(Usage::CMD_EXECUTOR)) {
            (Some(cmd), true) => Some(CmdExecutorHalf::new(cmd.clone())),
            _ => None,
        };

        let dat_receiver = usage.contains(Usage::DAT_RECEIVER).then(|| match &args.dat {
            Some(dat) => DatReceiverHalf::Callback(Arc::clone(&dat.handler)),
            None => DatReceiverHalf::Polling(DatParking::new(dat_capacity)),
        });

        Arc::new(Link {
            id,
            usage,
            state,
            srv,
            shutdown: Arc::new(AtomicBool::new(false)),
            peer: OnceLock::new(),
            evt,
            cmd_initiator: usage
                .contains(Usage::CMD_INITIATOR)
                .then(CmdInitiatorHalf::new),
            cmd_executor,
            dat_sender: usage
                .contains(Usage::DAT_SENDER)
                .then(|| Arc::new(DatSenderHalf::new(dat_capacity))),
            dat_receiver,
            writer: Mutex::new(Some(writer)),
            threads: Mutex::new(Vec::new()),
            closing: AtomicBool::new(false),
        })
    }

    pub fn set_peer(&self, peer: LinkId) {
        let _ = self.peer.set(peer);
    }

    pub fn peer(&self) -> Option<LinkId> {
        self.peer.get().copied()
    }

    pub fn evt_half(&self) -> Option<&Arc<EvtHalf>> {
        self.evt.as_ref()
    }

    pub fn cmd_initiator(&self) -> Option<&CmdInitiatorHalf> {
        self.cmd_initiator.as_ref()
    }

    pub fn cmd_executor(&self) -> Option<&CmdExecutorHalf> {
        self.cmd_executor.as_ref()
    }

    pub fn dat_sender(&self) -> Option<&Arc<DatSenderHalf>> {
        self.dat_sender.as_ref()
    }

    pub fn dat_receiver(&self) -> Option<&DatReceiverHalf> {
        self.dat_receiver.as_ref()
    }

    /// Mark paired and spawn the link's threads: the frame reader, the event
    /// dispatcher (consumer role), and the data sender (sender role).
    pub fn start(self: &Arc<Self>, receiver: Box<dyn FrameReceiver>) {
        self.state.set_conn(ConnState::Connected);

        if let Some(evt) = &self.evt {
            let half = Arc::clone(evt);
            let shutdown = Arc::clone(&self.shutdown);
            self.spawn("ioc-evt-dispatch", move || run_dispatcher(half, shutdown));
        }

        {
            let link = Arc::clone(self);
            self.spawn("ioc-link-reader", move || run_reader(link, receiver));
        }

        if let Some(dat) = &self.dat_sender {
            let link = Arc::clone(self);
            let half = Arc::clone(dat);
            self.spawn("ioc-dat-sender", move || {
                while let Some(batch) = half.take_batch() {
                    if link.send_frame(Frame::Dat { bytes: batch }).is_err() {
                        half.abort();
                        link.mark_broken();
                        break;
                    }
                    half.batch_written();
                }
            });
        }
    }

    /// Write one frame to the transport. Serialized: the command, data, and
    /// close paths share the writer.
    pub fn send_frame(&self, frame: Frame) -> Result<(), SendError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        match writer.as_mut() {
            Some(writer) => writer.send_frame(frame),
            None => Err(SendError),
        }
    }

    /// Transport failure detected: fail in-flight work and settle state
    pub fn mark_broken(&self) {
        if self.closing.load(Ordering::Acquire) {
            return;
        }
        warn!("link {:?} broken", self.id);
        self.state.set_conn(ConnState::Broken);
        self.cancel_in_flight();
    }

    /// Peer sent an orderly Bye: no more traffic will arrive
    pub fn peer_closed(&self) {
        debug!("link {:?} peer closed", self.id);
        self.state.set_conn(ConnState::Disconnected);
        self.cancel_in_flight();
    }

    /// Orderly local close: drain the send side best-effort, notify the
    /// peer, stop and join this link's threads.
    pub fn close(&self) {
        self.closing.store(true, Ordering::Release);
        self.state.set_conn(ConnState::Disconnecting);

        if let Some(dat) = &self.dat_sender {
            dat.close();
            let grace = WaitMode::Until(now_micros().saturating_add(CLOSE_FLUSH_GRACE_US));
            if dat.wait_flushed(grace).is_err() {
                warn!("link {:?} closed with unflushed data", self.id);
                dat.abort();
            }
        }
        if self.send_frame(Frame::Bye).is_err() {
            debug!("link {:?} peer already gone at close", self.id);
        }
        *self.writer.lock().unwrap_or_else(PoisonError::into_inner) = None;

        self.shutdown.store(true, Ordering::Release);
        if let Some(evt) = &self.evt {
            evt.wakeup();
            evt.abandon_pending();
        }
        if let Some(cmd) = &self.cmd_initiator {
            cmd.fail_in_flight(IocError::LinkBroken);
        }
        if let Some(DatReceiverHalf::Polling(parking)) = &self.dat_receiver {
            parking.close();
        }

        self.state.set_conn(ConnState::Disconnected);
        self.join_threads();
    }

    fn cancel_in_flight(&self) {
        if let Some(cmd) = &self.cmd_initiator {
            cmd.fail_in_flight(IocError::LinkBroken);
        }
        if let Some(dat) = &self.dat_sender {
            dat.abort();
        }
        if let Some(DatReceiverHalf::Polling(parking)) = &self.dat_receiver {
            parking.close();
        }
    }

    fn spawn<F: FnOnce() + Send + 'static>(&self, name: &str, func: F) {
        match std::thread::Builder::new().name(name.to_string()).spawn(func) {
            Ok(handle) => self
                .threads
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(handle),
            Err(err) => warn!("failed to spawn {name} for link {:?}: {err}", self.id),
        }
    }

    fn join_threads(&self) {
        let me = std::thread::current().id();
        let handles: Vec<JoinHandle<()>> = self
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if handle.thread().id() == me {
                // closing from inside one of our own callbacks; detach
                continue;
            }
            let _ = handle.join();
        }
    }
}

fn resting_sub_state(usage: Usage) -> SubState {
    if usage.contains(Usage::CMD_INITIATOR) {
        SubState::CmdInitiatorReady
    } else if usage.contains(Usage::CMD_EXECUTOR) {
        SubState::CmdExecutorReady
    } else if usage.contains(Usage::DAT_SENDER) {
        SubState::DatSenderReady
    } else if usage.contains(Usage::DAT_RECEIVER) {
        SubState::DatReceiverReady
    } else {
        SubState::Default
    }
}
