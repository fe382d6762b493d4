use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock, PoisonError};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, SendTimeoutError, TryRecvError, TrySendError};
use log::{debug, info, warn};

use ioc_shared::{
    BigMapKey, Capability, CapabilityId, CmdDesc, ConnState, DatDesc, EvtDesc, IocError, IocResult,
    LinkId, LinkStateSnapshot, Options, SrvId, SubState, WaitMode, MAX_DATA_CHUNK_SIZE,
};

use crate::conles::Conles;
use crate::dat::DatReceiverHalf;
use crate::evt::{EvtHalf, EvtHandler, SubEvtArgs};
use crate::link::{Link, LinkTable};
use crate::service::{
    Acceptor, ConnArgs, PendingConn, Registry, Service, SrvArgs, SrvFlags, SrvState, Usage,
};
use crate::transport::{fifo, Frame};

// Longest an acceptor waits for the connector's Hello after the transport
// handed it a connection
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

// Grace given to non-waiting connect modes for the pairing round-trip
const HANDSHAKE_GRACE: Duration = Duration::from_millis(10);

// Poll granularity for waits that must observe a shutdown flag
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// The runtime facade: owns the service registry, the link table, and the
/// connectionless EVT fabric. Cheap to clone; every clone is a handle to the
/// same runtime. `Hub::process()` returns the lazily-created process-wide
/// instance; `Hub::new()` builds an isolated one (used heavily by tests).
#[derive(Clone)]
pub struct Hub {
    core: Arc<Core>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Hub {
        Hub {
            core: Arc::new(Core {
                registry: Registry::new(),
                links: LinkTable::new(),
                conles: Conles::new(),
            }),
        }
    }

    /// The process-wide instance, created on first touch and alive until
    /// process exit
    pub fn process() -> &'static Hub {
        static INSTANCE: OnceLock<Hub> = OnceLock::new();
        INSTANCE.get_or_init(Hub::new)
    }

    /// Static limits of this runtime
    pub fn capability(&self, id: CapabilityId) -> Capability {
        Capability::query(id)
    }

    // Services

    /// Reserve the URI and bring a service online
    pub fn online_service(&self, args: SrvArgs) -> IocResult<SrvId> {
        Core::online_service(&self.core, args)
    }

    /// Stop accepting, close every derived link, release the URI
    pub fn offline_service(&self, srv: SrvId) -> IocResult<()> {
        self.core.offline_service(srv)
    }

    /// Wait for a peer connect and pair it into a new link
    pub fn accept_client(&self, srv: SrvId, opts: &Options) -> IocResult<LinkId> {
        self.core.accept_client(srv, opts)
    }

    /// Connect to an online service and pair into a new link
    pub fn connect_service(&self, args: ConnArgs, opts: &Options) -> IocResult<LinkId> {
        self.core.connect_service(args, opts)
    }

    /// Orderly close: best-effort flush, notify the peer, release the id
    pub fn close_link(&self, link: LinkId) -> IocResult<()> {
        self.core.close_link(link)
    }

    // EVT

    pub fn sub_evt(&self, link: LinkId, args: SubEvtArgs) -> IocResult<()> {
        self.core.consumer_half(link)?.sub(args)
    }

    pub fn unsub_evt(&self, link: LinkId, handler: &Arc<dyn EvtHandler>) -> IocResult<()> {
        self.core.consumer_half(link)?.unsub(handler)
    }

    pub fn post_evt(&self, link: LinkId, evt: EvtDesc, opts: &Options) -> IocResult<()> {
        self.core.post_evt(link, evt, opts)
    }

    /// Post one event to every derived link of a broadcast service
    pub fn broadcast_evt(&self, srv: SrvId, evt: EvtDesc, opts: &Options) -> IocResult<()> {
        self.core.broadcast_evt(srv, evt, opts)
    }

    /// Drain and dispatch all pending events synchronously on this thread
    pub fn force_proc_evt(&self) {
        self.core.force_proc_evt()
    }

    /// Nudge dispatchers parked on empty queues
    pub fn wakeup_proc_evt(&self) {
        self.core.wakeup_proc_evt()
    }

    // CMD

    /// Run one request/response exchange; populates `cmd.result` and
    /// `cmd.status` when a reply arrives
    pub fn exec_cmd(&self, link: LinkId, cmd: &mut CmdDesc, opts: &Options) -> IocResult<()> {
        self.core.exec_cmd(link, cmd, opts)
    }

    // DAT

    pub fn send_dat(&self, link: LinkId, dat: DatDesc, opts: &Options) -> IocResult<()> {
        self.core.send_dat(link, dat, opts)
    }

    pub fn recv_dat(&self, link: LinkId, dat: &mut DatDesc, opts: &Options) -> IocResult<()> {
        self.core.recv_dat(link, dat, opts)
    }

    pub fn flush_dat(&self, link: LinkId, opts: &Options) -> IocResult<()> {
        self.core.flush_dat(link, opts)
    }

    // State

    /// All three state levels in one consistent snapshot
    pub fn link_state(&self, link: LinkId) -> IocResult<LinkStateSnapshot> {
        self.core.link_state(link)
    }

    /// Level-1 connection state; rejected for the auto link
    pub fn link_conn_state(&self, link: LinkId) -> IocResult<ConnState> {
        self.core.link_conn_state(link)
    }
}

struct Core {
    registry: Registry,
    links: LinkTable,
    conles: Conles,
}

impl Core {
    fn online_service(core: &Arc<Core>, args: SrvArgs) -> IocResult<SrvId> {
        if args.usage_capabilities.is_empty() {
            return Err(IocError::InvalidParam {
                reason: "service declares no usage capabilities",
            });
        }
        if args.usage_capabilities.contains(Usage::CMD_EXECUTOR) && args.usage_args.cmd.is_none() {
            return Err(IocError::InvalidParam {
                reason: "executor capability requires a command executor callback",
            });
        }
        let service = core.registry.online(&args)?;
        info!("service {:?} online at {}", service.id, service.uri);

        if service.flags.contains(SrvFlags::AUTO_ACCEPT) {
            let weak = Arc::downgrade(core);
            let srv = Arc::clone(&service);
            let spawned = std::thread::Builder::new()
                .name("ioc-auto-accept".to_string())
                .spawn(move || loop {
                    if srv.shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    let Some(core) = weak.upgrade() else {
                        break;
                    };
                    let window = WaitMode::Until(
                        ioc_shared::now_micros().saturating_add(100_000),
                    );
                    match core.accept_once(&srv, window) {
                        Ok(link) => debug!("service {:?} auto-accepted {:?}", srv.id, link),
                        Err(IocError::Timeout) => {}
                        Err(IocError::NotExistService) => break,
                        Err(err) => warn!("auto-accept on {:?} failed: {err}", srv.id),
                    }
                });
            match spawned {
                Ok(handle) => {
                    *service
                        .accept_thread
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(handle);
                }
                Err(err) => warn!("failed to spawn auto-accept for {:?}: {err}", service.id),
            }
        }
        Ok(service.id)
    }

    fn offline_service(&self, id: SrvId) -> IocResult<()> {
        let service = self.registry.get(id)?;
        {
            let mut state = service
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *state != SrvState::Online {
                return Err(IocError::NotExistService);
            }
            *state = SrvState::Draining;
        }
        service.shutdown.store(true, Ordering::Release);
        let accept_thread = service
            .accept_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = accept_thread {
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
        for link in service.take_links() {
            if let Err(err) = self.close_link(link) {
                debug!("closing derived link {link:?} during offline: {err}");
            }
        }
        self.registry.remove(id);
        service.set_state(SrvState::Offline);
        info!("service {:?} offline, URI {} released", id, service.uri);
        Ok(())
    }

    fn accept_client(&self, id: SrvId, opts: &Options) -> IocResult<LinkId> {
        let mode = opts.decode()?;
        let service = self.registry.get(id)?;
        if !service.is_online() {
            return Err(IocError::NotExistService);
        }
        if service.flags.contains(SrvFlags::AUTO_ACCEPT) {
            return Err(IocError::InvalidParam {
                reason: "service accepts connections automatically",
            });
        }
        self.accept_once(&service, mode)
    }

    // Pull one pending connection off the service's accept source, honoring
    // the wait mode, then pair it.
    fn accept_once(&self, service: &Arc<Service>, mode: WaitMode) -> IocResult<LinkId> {
        let pending = match &service.acceptor {
            Acceptor::Fifo { backlog_rx, .. } => match mode {
                WaitMode::NonBlock | WaitMode::Immediate => match backlog_rx.try_recv() {
                    Ok(pending) => pending,
                    Err(TryRecvError::Empty) => return Err(IocError::Timeout),
                    Err(TryRecvError::Disconnected) => return Err(IocError::NotExistService),
                },
                WaitMode::Blocking | WaitMode::Until(_) => loop {
                    if service.shutdown.load(Ordering::Acquire) {
                        return Err(IocError::NotExistService);
                    }
                    let slice = match mode.remaining() {
                        None => ACCEPT_POLL,
                        Some(remaining) if remaining.is_zero() => return Err(IocError::Timeout),
                        Some(remaining) => remaining.min(ACCEPT_POLL),
                    };
                    match backlog_rx.recv_timeout(slice) {
                        Ok(pending) => break pending,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => {
                            return Err(IocError::NotExistService)
                        }
                    }
                },
            },
            #[cfg(feature = "transport_tcp")]
            Acceptor::Tcp { listener } => loop {
                if service.shutdown.load(Ordering::Acquire) {
                    return Err(IocError::NotExistService);
                }
                match listener.accept() {
                    Ok((stream, _)) => {
                        stream
                            .set_nonblocking(false)
                            .map_err(|_| IocError::LinkBroken)?;
                        let (sender, receiver) = crate::transport::tcp::split(stream)?;
                        break PendingConn { sender, receiver };
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                        if mode.expired() {
                            return Err(IocError::Timeout);
                        }
                        std::thread::sleep(Duration::from_millis(2));
                    }
                    Err(_) => return Err(IocError::NotExistService),
                }
            },
        };
        self.finish_accept(service, pending)
    }

    // Complete the pairing handshake on the accept side
    fn finish_accept(&self, service: &Arc<Service>, pending: PendingConn) -> IocResult<LinkId> {
        let PendingConn {
            sender,
            mut receiver,
        } = pending;
        let hello = receiver
            .recv_frame_timeout(HANDSHAKE_TIMEOUT)
            .map_err(|_| IocError::LinkBroken)?
            .ok_or(IocError::Timeout)?;
        let Frame::Hello {
            token,
            link: peer_link,
            usage,
        } = hello
        else {
            return Err(IocError::DataCorrupted);
        };

        let peer_usage = Usage::from_bits(usage);
        let local_usage = peer_usage.complement();
        if !service.caps.contains(local_usage) {
            return Err(IocError::PermissionDenied);
        }
        Link::validate(local_usage, &service.usage_args)?;

        let id = self.links.insert_with(|id| {
            Link::build(id, local_usage, &service.usage_args, Some(service.id), sender)
        });
        let link = self.links.get(id)?;
        link.set_peer(LinkId::from_u64(peer_link));
        if link
            .send_frame(Frame::HelloAck {
                token,
                link: id.to_u64(),
            })
            .is_err()
        {
            self.links.remove(id);
            return Err(IocError::LinkBroken);
        }
        link.start(receiver);
        service.track_link(id);
        debug!("service {:?} paired link {:?} <-> {:?}", service.id, id, link.peer());
        Ok(id)
    }

    fn connect_service(&self, args: ConnArgs, opts: &Options) -> IocResult<LinkId> {
        let mode = opts.decode()?;
        Link::validate(args.usage, &args.usage_args)?;
        let service = self.registry.lookup(&args.uri)?;
        if !service.is_online() {
            return Err(IocError::NotExistService);
        }
        if !service.caps.contains(args.usage.complement()) {
            return Err(IocError::PermissionDenied);
        }

        // transport-level connect
        let (sender, mut receiver, backlog_entry) = match args.uri.protocol.as_str() {
            ioc_shared::SrvUri::PROTO_FIFO => {
                let ((local_tx, local_rx), (remote_tx, remote_rx)) = fifo::duplex();
                (
                    local_tx,
                    local_rx,
                    Some(PendingConn {
                        sender: remote_tx,
                        receiver: remote_rx,
                    }),
                )
            }
            #[cfg(feature = "transport_tcp")]
            ioc_shared::SrvUri::PROTO_TCP => {
                let stream =
                    std::net::TcpStream::connect((args.uri.host.as_str(), args.uri.port))
                        .map_err(|_| IocError::NotExistService)?;
                let (sender, receiver) = crate::transport::tcp::split(stream)?;
                (sender, receiver, None)
            }
            _ => {
                return Err(IocError::InvalidParam {
                    reason: "unsupported connect protocol",
                })
            }
        };

        let token = fastrand::u64(..);
        let id = self
            .links
            .insert_with(|id| Link::build(id, args.usage, &args.usage_args, None, sender));
        let link = self.links.get(id)?;

        if link
            .send_frame(Frame::Hello {
                token,
                link: id.to_u64(),
                usage: args.usage.bits(),
            })
            .is_err()
        {
            self.links.remove(id);
            return Err(IocError::LinkBroken);
        }

        // FIFO rendezvous: hand the remote halves to the service backlog
        if let Some(entry) = backlog_entry {
            let Acceptor::Fifo { backlog_tx, .. } = &service.acceptor else {
                self.links.remove(id);
                return Err(IocError::Bug {
                    reason: "FIFO connect reached a non-FIFO acceptor",
                });
            };
            let verdict = match mode {
                WaitMode::NonBlock => backlog_tx.try_send(entry).map_err(|err| match err {
                    TrySendError::Full(_) => IocError::Busy,
                    TrySendError::Disconnected(_) => IocError::NotExistService,
                }),
                WaitMode::Immediate => backlog_tx
                    .send_timeout(entry, HANDSHAKE_GRACE)
                    .map_err(|err| match err {
                        SendTimeoutError::Timeout(_) => IocError::Timeout,
                        SendTimeoutError::Disconnected(_) => IocError::NotExistService,
                    }),
                WaitMode::Blocking => backlog_tx
                    .send(entry)
                    .map_err(|_| IocError::NotExistService),
                WaitMode::Until(_) => {
                    let remaining = mode.remaining().unwrap_or(Duration::ZERO);
                    backlog_tx
                        .send_timeout(entry, remaining)
                        .map_err(|err| match err {
                            SendTimeoutError::Timeout(_) => IocError::Timeout,
                            SendTimeoutError::Disconnected(_) => IocError::NotExistService,
                        })
                }
            };
            if let Err(err) = verdict {
                self.links.remove(id);
                return Err(err);
            }
        }

        // await the acceptor's HelloAck
        loop {
            let slice = match mode {
                WaitMode::Blocking => ACCEPT_POLL,
                WaitMode::NonBlock | WaitMode::Immediate => HANDSHAKE_GRACE,
                WaitMode::Until(_) => match mode.remaining() {
                    Some(remaining) if !remaining.is_zero() => remaining.min(ACCEPT_POLL),
                    _ => {
                        self.links.remove(id);
                        return Err(IocError::Timeout);
                    }
                },
            };
            match receiver.recv_frame_timeout(slice) {
                Ok(Some(Frame::HelloAck {
                    token: echoed,
                    link: peer,
                })) => {
                    if echoed != token {
                        self.links.remove(id);
                        return Err(IocError::DataCorrupted);
                    }
                    link.set_peer(LinkId::from_u64(peer));
                    break;
                }
                Ok(Some(_)) => {
                    self.links.remove(id);
                    return Err(IocError::DataCorrupted);
                }
                Ok(None) => match mode {
                    WaitMode::Blocking | WaitMode::Until(_) => continue,
                    WaitMode::NonBlock | WaitMode::Immediate => {
                        self.links.remove(id);
                        return Err(IocError::Timeout);
                    }
                },
                Err(_) => {
                    // the acceptor dropped us before pairing completed
                    self.links.remove(id);
                    return Err(IocError::NotExistService);
                }
            }
        }

        link.start(receiver);
        info!("link {:?} connected to {}", id, args.uri);
        Ok(id)
    }

    fn close_link(&self, id: LinkId) -> IocResult<()> {
        if id.is_auto() {
            return Err(IocError::InvalidParam {
                reason: "the auto link cannot be closed",
            });
        }
        let link = self.links.remove(id).ok_or(IocError::NotExistLink)?;
        if let Some(srv) = link.srv {
            if let Ok(service) = self.registry.get(srv) {
                service.untrack_link(id);
            }
        }
        link.close();
        debug!("link {id:?} closed");
        Ok(())
    }

    // EVT

    // The half subscriptions act on: the auto fabric, or the link's own
    // consumer half.
    fn consumer_half(&self, id: LinkId) -> IocResult<Arc<EvtHalf>> {
        if id.is_auto() {
            return Ok(Arc::clone(self.conles.half()));
        }
        let link = self.links.get(id)?;
        link.evt_half()
            .map(Arc::clone)
            .ok_or(IocError::PermissionDenied)
    }

    fn post_evt(&self, id: LinkId, evt: EvtDesc, opts: &Options) -> IocResult<()> {
        if id.is_auto() {
            let mode = opts.decode()?;
            return self.conles.half().post(evt, mode);
        }
        let link = self.links.get(id)?;
        if !link.usage.contains(Usage::EVT_PRODUCER) {
            return Err(IocError::PermissionDenied);
        }
        let mode = opts.decode()?;
        let half = self.peer_consumer_half(&link)?;
        half.post(evt, mode)
    }

    fn peer_consumer_half(&self, link: &Arc<Link>) -> IocResult<Arc<EvtHalf>> {
        let peer = link.peer().ok_or(IocError::NoEventConsumer)?;
        let peer_link = self
            .links
            .get(peer)
            .map_err(|_| IocError::NoEventConsumer)?;
        peer_link
            .evt_half()
            .map(Arc::clone)
            .ok_or(IocError::NoEventConsumer)
    }

    fn broadcast_evt(&self, srv: SrvId, evt: EvtDesc, opts: &Options) -> IocResult<()> {
        let service = self.registry.get(srv)?;
        if !service.flags.contains(SrvFlags::BROADCAST_EVENT) {
            return Err(IocError::PermissionDenied);
        }
        let mode = opts.decode()?;
        let mut delivered = false;
        let mut last_err = IocError::NoEventConsumer;
        for link_id in service.linked_ids() {
            let Ok(link) = self.links.get(link_id) else {
                continue;
            };
            let Ok(half) = self.peer_consumer_half(&link) else {
                continue;
            };
            match half.post(evt.clone(), mode) {
                Ok(()) => delivered = true,
                Err(err) => last_err = err,
            }
        }
        if delivered {
            Ok(())
        } else {
            Err(last_err)
        }
    }

    fn force_proc_evt(&self) {
        if let Some(half) = self.conles.started() {
            half.force_proc();
        }
        for link in self.links.all() {
            if let Some(half) = link.evt_half() {
                half.force_proc();
            }
        }
    }

    fn wakeup_proc_evt(&self) {
        if let Some(half) = self.conles.started() {
            half.wakeup();
        }
        for link in self.links.all() {
            if let Some(half) = link.evt_half() {
                half.wakeup();
            }
        }
    }

    // CMD

    fn exec_cmd(&self, id: LinkId, cmd: &mut CmdDesc, opts: &Options) -> IocResult<()> {
        let link = self.links.get(id)?;
        let initiator = link.cmd_initiator().ok_or(IocError::PermissionDenied)?;
        let mode = opts.decode()?;
        if link.state.conn() != ConnState::Connected {
            return Err(IocError::LinkBroken);
        }

        let seq = initiator.acquire(mode)?;
        let _busy = link.state.enter_sub(SubState::CmdInitiatorBusyExecCmd);
        if link
            .send_frame(Frame::CmdReq {
                seq,
                cmd_id: cmd.cmd_id,
                payload: cmd.request.clone(),
            })
            .is_err()
        {
            initiator.release(seq);
            return Err(IocError::LinkBroken);
        }
        let (status, payload) = initiator.await_reply(seq, cmd.timeout_us)?;
        cmd.result = payload;
        cmd.status = Some(status);
        if status == 0 {
            Ok(())
        } else {
            Err(IocError::from_code(status).unwrap_or(IocError::Bug {
                reason: "executor returned an unknown status code",
            }))
        }
    }

    // DAT

    fn send_dat(&self, id: LinkId, dat: DatDesc, opts: &Options) -> IocResult<()> {
        let link = self.links.get(id)?;
        let sender = link.dat_sender().ok_or(IocError::PermissionDenied)?;
        let size = dat.effective_size();
        if size == 0 {
            return Err(IocError::ZeroData);
        }
        if size > MAX_DATA_CHUNK_SIZE {
            return Err(IocError::DataTooLarge {
                size,
                max: MAX_DATA_CHUNK_SIZE,
            });
        }
        let mode = opts.decode()?;
        let _busy = link.state.enter_sub(SubState::DatSenderBusySendDat);
        sender.submit(dat.to_payload(), mode)
    }

    fn recv_dat(&self, id: LinkId, dat: &mut DatDesc, opts: &Options) -> IocResult<()> {
        let link = self.links.get(id)?;
        let receiver = link.dat_receiver().ok_or(IocError::PermissionDenied)?;
        if dat.window() == 0 {
            return Err(IocError::BufferTooSmall { capacity: 0 });
        }
        let mode = opts.decode()?;
        match receiver {
            // callback and polling delivery are mutually exclusive per link
            DatReceiverHalf::Callback(_) => Err(IocError::NoData),
            DatReceiverHalf::Polling(parking) => {
                let _busy = link.state.enter_sub(SubState::DatReceiverBusyRecvDat);
                parking.take(dat, mode)
            }
        }
    }

    fn flush_dat(&self, id: LinkId, opts: &Options) -> IocResult<()> {
        let link = self.links.get(id)?;
        let sender = link.dat_sender().ok_or(IocError::PermissionDenied)?;
        let mode = opts.decode()?;
        sender.wait_flushed(mode)
    }

    // State

    fn link_state(&self, id: LinkId) -> IocResult<LinkStateSnapshot> {
        if id.is_auto() {
            return Ok(self.conles.half().state().snapshot());
        }
        Ok(self.links.get(id)?.state.snapshot())
    }

    fn link_conn_state(&self, id: LinkId) -> IocResult<ConnState> {
        if id.is_auto() {
            return Err(IocError::InvalidParam {
                reason: "the auto link has no connection state",
            });
        }
        Ok(self.links.get(id)?.state.conn())
    }

    fn teardown(&self) {
        for service in self.registry.all() {
            if let Err(err) = self.offline_service(service.id) {
                debug!("offline of {:?} during teardown: {err}", service.id);
            }
        }
        for link in self.links.all() {
            if let Err(err) = self.close_link(link.id) {
                debug!("close of {:?} during teardown: {err}", link.id);
            }
        }
        self.conles.shutdown();
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        self.teardown();
    }
}
