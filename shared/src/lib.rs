//! # IOC Shared
//! Common functionality shared between the ioc-runtime crates: value types,
//! result codes, submission options, the bounded event queue, and the
//! 3-level link state model.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod bigmap;
mod capability;
mod constants;
mod options;
mod queue;
mod result;
mod state;
mod time;
mod types;
mod uri;

mod desc;

pub use bigmap::{BigMap, BigMapKey};
pub use capability::{Capability, CapabilityId};
pub use constants::{
    DAT_BATCH_MAX_BYTES, DAT_EMD_CAPACITY, DEPTH_EVT_DESC_QUEUE, MAX_DATA_CHUNK_SIZE,
    MAX_DATA_QUEUE_SIZE, MAX_EVT_CONSUMER,
};
pub use desc::{CmdDesc, DatDesc, EvtDesc};
pub use options::{
    Options, WaitMode, TIMEOUT_IMMEDIATE, TIMEOUT_INFINITE, TIMEOUT_MAX, TIMEOUT_NONBLOCK,
};
pub use queue::{BoundedQueue, DequeueError, EnqueueError};
pub use result::{IocError, IocResult};
pub use state::{BusyMainGuard, BusySubGuard, ConnState, LinkStateCell, LinkStateSnapshot, MainState, SubState};
pub use time::now_micros;
pub use types::{CmdId, EvtId, LinkId, SrvId};
pub use uri::SrvUri;
