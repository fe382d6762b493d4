mod args;
mod registry;
mod service;

pub use args::{ConnArgs, SrvArgs, SrvFlags, Usage, UsageArgs};

pub(crate) use registry::Registry;
pub(crate) use service::{Acceptor, PendingConn, Service, SrvState};
