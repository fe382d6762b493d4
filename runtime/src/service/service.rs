use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};

use ioc_shared::{IocError, IocResult, LinkId, SrvId, SrvUri};

use crate::transport::{FrameReceiver, FrameSender};

use super::{SrvArgs, SrvFlags, Usage, UsageArgs};

/// A connection that reached the service but has not been accepted yet
pub(crate) struct PendingConn {
    pub sender: Box<dyn FrameSender>,
    pub receiver: Box<dyn FrameReceiver>,
}

/// Transport-specific accept source of a service
pub(crate) enum Acceptor {
    Fifo {
        backlog_tx: Sender<PendingConn>,
        backlog_rx: Receiver<PendingConn>,
    },
    #[cfg(feature = "transport_tcp")]
    Tcp { listener: std::net::TcpListener },
}

impl Acceptor {
    /// Open the accept source for the given service arguments. FIFO services
    /// get an in-process backlog channel; TCP services bind their listener.
    pub fn open(args: &SrvArgs) -> IocResult<Acceptor> {
        match args.uri.protocol.as_str() {
            SrvUri::PROTO_FIFO => {
                let (backlog_tx, backlog_rx) = bounded(args.backlog.max(1));
                Ok(Acceptor::Fifo {
                    backlog_tx,
                    backlog_rx,
                })
            }
            #[cfg(feature = "transport_tcp")]
            SrvUri::PROTO_TCP => {
                let listener =
                    std::net::TcpListener::bind((args.uri.host.as_str(), args.uri.port)).map_err(
                        |_| IocError::InvalidParam {
                            reason: "cannot bind the service's TCP listener",
                        },
                    )?;
                listener
                    .set_nonblocking(true)
                    .map_err(|_| IocError::InvalidParam {
                        reason: "cannot configure the service's TCP listener",
                    })?;
                Ok(Acceptor::Tcp { listener })
            }
            _ => Err(IocError::InvalidParam {
                reason: "unsupported service protocol",
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SrvState {
    Online,
    Draining,
    Offline,
}

/// An online service: the URI reservation, the capability set, the accept
/// source, and the links derived from it so far.
pub(crate) struct Service {
    pub id: SrvId,
    pub uri: SrvUri,
    pub caps: Usage,
    pub flags: SrvFlags,
    pub usage_args: UsageArgs,
    pub acceptor: Acceptor,
    pub links: Mutex<Vec<LinkId>>,
    pub state: Mutex<SrvState>,
    pub shutdown: Arc<AtomicBool>,
    pub accept_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Service {
    pub fn new(id: SrvId, args: &SrvArgs, acceptor: Acceptor) -> Service {
        Service {
            id,
            uri: args.uri.clone(),
            caps: args.usage_capabilities,
            flags: args.flags,
            usage_args: args.usage_args.clone(),
            acceptor,
            links: Mutex::new(Vec::new()),
            state: Mutex::new(SrvState::Online),
            shutdown: Arc::new(AtomicBool::new(false)),
            accept_thread: Mutex::new(None),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) == SrvState::Online
    }

    pub fn set_state(&self, state: SrvState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn track_link(&self, link: LinkId) {
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(link);
    }

    pub fn untrack_link(&self, link: LinkId) {
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tracked| *tracked != link);
    }

    pub fn take_links(&self) -> Vec<LinkId> {
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    pub fn linked_ids(&self) -> Vec<LinkId> {
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
