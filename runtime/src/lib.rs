//! # IOC Runtime
//! An in-process inter-object communication runtime. Named services accept
//! connections and produce paired duplex links; three engines are
//! multiplexed over every link: EVT (fire-and-forget events with fan-out),
//! CMD (request/response with correlation and timeouts), and DAT
//! (flow-controlled byte streams). A connectionless auto-link offers
//! process-wide EVT pub/sub without explicit link handles.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

#[macro_use]
extern crate cfg_if;

pub mod transport;

mod cmd;
mod conles;
mod dat;
mod evt;
mod hub;
mod link;
mod service;

pub use cmd::{CmdExecutor, CmdExecutorArgs};
pub use dat::{DatHandler, DatReceiverArgs};
pub use evt::{EvtHandler, SubEvtArgs};
pub use hub::Hub;
pub use service::{ConnArgs, SrvArgs, SrvFlags, Usage, UsageArgs};

pub use ioc_shared::{
    now_micros, BigMap, BigMapKey, Capability, CapabilityId, CmdDesc, CmdId, ConnState, DatDesc,
    EvtDesc, EvtId,
    IocError, IocResult, LinkId, LinkStateSnapshot, MainState, Options, SrvId, SrvUri, SubState,
    DAT_BATCH_MAX_BYTES, DAT_EMD_CAPACITY, DEPTH_EVT_DESC_QUEUE, MAX_DATA_CHUNK_SIZE,
    MAX_DATA_QUEUE_SIZE, MAX_EVT_CONSUMER, TIMEOUT_IMMEDIATE, TIMEOUT_INFINITE, TIMEOUT_MAX,
    TIMEOUT_NONBLOCK,
};
