use std::ops::BitOr;

use ioc_shared::SrvUri;

use crate::cmd::CmdExecutorArgs;
use crate::dat::DatReceiverArgs;
use crate::evt::SubEvtArgs;

/// Set of engine roles a link endpoint plays. A service declares the roles
/// it can serve; a connect declares the roles it wants to play. Pairing
/// requires the service set to contain the complement of the connector set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Usage(u8);

impl Usage {
    pub const NONE: Usage = Usage(0);
    pub const EVT_PRODUCER: Usage = Usage(1);
    pub const EVT_CONSUMER: Usage = Usage(1 << 1);
    pub const CMD_INITIATOR: Usage = Usage(1 << 2);
    pub const CMD_EXECUTOR: Usage = Usage(1 << 3);
    pub const DAT_SENDER: Usage = Usage(1 << 4);
    pub const DAT_RECEIVER: Usage = Usage(1 << 5);

    pub fn contains(&self, other: Usage) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// The roles a peer endpoint must play to pair with this set: producer
    /// pairs with consumer, initiator with executor, sender with receiver.
    pub fn complement(&self) -> Usage {
        let mut bits = 0;
        if self.contains(Usage::EVT_PRODUCER) {
            bits |= Usage::EVT_CONSUMER.0;
        }
        if self.contains(Usage::EVT_CONSUMER) {
            bits |= Usage::EVT_PRODUCER.0;
        }
        if self.contains(Usage::CMD_INITIATOR) {
            bits |= Usage::CMD_EXECUTOR.0;
        }
        if self.contains(Usage::CMD_EXECUTOR) {
            bits |= Usage::CMD_INITIATOR.0;
        }
        if self.contains(Usage::DAT_SENDER) {
            bits |= Usage::DAT_RECEIVER.0;
        }
        if self.contains(Usage::DAT_RECEIVER) {
            bits |= Usage::DAT_SENDER.0;
        }
        Usage(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Usage {
        Usage(bits & 0b11_1111)
    }
}

impl BitOr for Usage {
    type Output = Usage;

    fn bitor(self, rhs: Usage) -> Usage {
        Usage(self.0 | rhs.0)
    }
}

/// Behavior flags of a service
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SrvFlags(u8);

impl SrvFlags {
    pub const NONE: SrvFlags = SrvFlags(0);
    /// Run the accept loop on a service thread; `accept_client` is not used
    pub const AUTO_ACCEPT: SrvFlags = SrvFlags(1);
    /// Enable `broadcast_evt` across all derived links
    pub const BROADCAST_EVENT: SrvFlags = SrvFlags(1 << 1);

    pub fn contains(&self, other: SrvFlags) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl BitOr for SrvFlags {
    type Output = SrvFlags;

    fn bitor(self, rhs: SrvFlags) -> SrvFlags {
        SrvFlags(self.0 | rhs.0)
    }
}

/// Default engine arguments attached to a service or a connect. They
/// configure the links derived on that side: the initial EVT subscription
/// for consumer links, the CMD executor, the DAT receive handler (selecting
/// callback mode), and an optional DAT queue capacity override.
#[derive(Clone, Default)]
pub struct UsageArgs {
    pub evt: Option<SubEvtArgs>,
    pub cmd: Option<CmdExecutorArgs>,
    pub dat: Option<DatReceiverArgs>,
    pub dat_queue_capacity: Option<usize>,
}

/// Arguments to bring a service online
#[derive(Clone)]
pub struct SrvArgs {
    pub uri: SrvUri,
    pub usage_capabilities: Usage,
    pub flags: SrvFlags,
    pub backlog: usize,
    pub usage_args: UsageArgs,
}

impl SrvArgs {
    pub const DEFAULT_BACKLOG: usize = 8;

    pub fn new(uri: SrvUri, usage_capabilities: Usage) -> Self {
        Self {
            uri,
            usage_capabilities,
            flags: SrvFlags::NONE,
            backlog: Self::DEFAULT_BACKLOG,
            usage_args: UsageArgs::default(),
        }
    }

    pub fn with_flags(mut self, flags: SrvFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_backlog(mut self, backlog: usize) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_usage_args(mut self, usage_args: UsageArgs) -> Self {
        self.usage_args = usage_args;
        self
    }
}

/// Arguments to connect to an online service
#[derive(Clone)]
pub struct ConnArgs {
    pub uri: SrvUri,
    pub usage: Usage,
    pub usage_args: UsageArgs,
}

impl ConnArgs {
    pub fn new(uri: SrvUri, usage: Usage) -> Self {
        Self {
            uri,
            usage,
            usage_args: UsageArgs::default(),
        }
    }

    pub fn with_usage_args(mut self, usage_args: UsageArgs) -> Self {
        self.usage_args = usage_args;
        self
    }
}
