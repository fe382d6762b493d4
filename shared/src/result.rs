use thiserror::Error;

/// Result alias used by every fallible operation in the runtime
pub type IocResult<T> = Result<T, IocError>;

/// Errors surfaced by the runtime. Each variant carries a stable wire code so
/// an executor's status can travel back across a transport frame; see
/// [`IocError::code`] and [`IocError::from_code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IocError {
    /// A parameter failed shape validation
    #[error("invalid parameter: {reason}")]
    InvalidParam { reason: &'static str },

    /// The data descriptor carries no bytes in either carrier
    #[error("data descriptor carries zero bytes")]
    ZeroData,

    /// The data payload exceeds the maximum chunk size
    #[error("data chunk of {size} bytes exceeds the maximum of {max} bytes")]
    DataTooLarge { size: usize, max: usize },

    /// The receive window cannot hold any data
    #[error("receive buffer of {capacity} bytes is too small")]
    BufferTooSmall { capacity: usize },

    /// No online service matches the given id or URI
    #[error("service does not exist")]
    NotExistService,

    /// A service is already online at the given URI
    #[error("a service is already online at URI {uri}")]
    AlreadyExistService { uri: String },

    /// No live link matches the given id
    #[error("link does not exist")]
    NotExistLink,

    /// The link does not hold the role the operation requires
    #[error("operation not permitted for this link's usage")]
    PermissionDenied,

    /// A bounded buffer is full and the submission was non-blocking
    #[error("buffer is full")]
    BufferFull,

    /// The event description queue is full and the submission was non-blocking
    #[error("too many queuing event descriptions")]
    TooManyQueuingEvtDesc,

    /// The subscription table is at its consumer capacity
    #[error("too many event consumers")]
    TooManyEvtConsumer,

    /// The subscription key is already registered on this link
    #[error("conflicting event consumer: key already subscribed")]
    ConflictEvtConsumer,

    /// No data is currently available
    #[error("no data available")]
    NoData,

    /// No subscription matched the posted event
    #[error("no event consumer matched")]
    NoEventConsumer,

    /// The single in-flight command slot is occupied
    #[error("link is busy with an in-flight command")]
    Busy,

    /// The operation's deadline elapsed
    #[error("operation timed out")]
    Timeout,

    /// The link's transport failed or the peer went away mid-operation
    #[error("link broken")]
    LinkBroken,

    /// A frame failed integrity checks
    #[error("data corrupted on the wire")]
    DataCorrupted,

    /// An internal invariant was violated. Always a defect in the runtime.
    #[error("internal error: {reason}")]
    Bug { reason: &'static str },
}

impl IocError {
    /// Stable wire code for this error. Zero is reserved for success.
    pub fn code(&self) -> u16 {
        match self {
            IocError::InvalidParam { .. } => 1,
            IocError::ZeroData => 2,
            IocError::DataTooLarge { .. } => 3,
            IocError::BufferTooSmall { .. } => 4,
            IocError::NotExistService => 5,
            IocError::AlreadyExistService { .. } => 6,
            IocError::NotExistLink => 7,
            IocError::PermissionDenied => 8,
            IocError::BufferFull => 9,
            IocError::TooManyQueuingEvtDesc => 10,
            IocError::TooManyEvtConsumer => 11,
            IocError::ConflictEvtConsumer => 12,
            IocError::NoData => 13,
            IocError::NoEventConsumer => 14,
            IocError::Busy => 15,
            IocError::Timeout => 16,
            IocError::LinkBroken => 17,
            IocError::DataCorrupted => 18,
            IocError::Bug { .. } => 19,
        }
    }

    /// Reconstruct an error from its wire code. Field detail is not carried
    /// on the wire, so variants come back with placeholder fields.
    pub fn from_code(code: u16) -> Option<IocError> {
        match code {
            1 => Some(IocError::InvalidParam { reason: "remote" }),
            2 => Some(IocError::ZeroData),
            3 => Some(IocError::DataTooLarge { size: 0, max: 0 }),
            4 => Some(IocError::BufferTooSmall { capacity: 0 }),
            5 => Some(IocError::NotExistService),
            6 => Some(IocError::AlreadyExistService { uri: String::new() }),
            7 => Some(IocError::NotExistLink),
            8 => Some(IocError::PermissionDenied),
            9 => Some(IocError::BufferFull),
            10 => Some(IocError::TooManyQueuingEvtDesc),
            11 => Some(IocError::TooManyEvtConsumer),
            12 => Some(IocError::ConflictEvtConsumer),
            13 => Some(IocError::NoData),
            14 => Some(IocError::NoEventConsumer),
            15 => Some(IocError::Busy),
            16 => Some(IocError::Timeout),
            17 => Some(IocError::LinkBroken),
            18 => Some(IocError::DataCorrupted),
            19 => Some(IocError::Bug { reason: "remote" }),
            _ => None,
        }
    }
}
