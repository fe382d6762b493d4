/// Capacity of every event description queue (per consumer link, and the
/// auto-link fabric). Queryable via the ConlesModeEvent capability.
pub const DEPTH_EVT_DESC_QUEUE: usize = 64;

/// Upper bound on concurrent subscriptions in the auto-link fabric
pub const MAX_EVT_CONSUMER: usize = 16;

/// Largest payload a single send_dat call may carry
pub const MAX_DATA_CHUNK_SIZE: usize = 32 * 1024 * 1024;

/// Default byte capacity of a link's data send buffer and receive parking
/// queue. Overridable per service/connect for backpressure testing.
pub const MAX_DATA_QUEUE_SIZE: usize = 64 * 1024 * 1024;

/// Byte cap on a single coalesced data frame emitted by the sender thread
pub const DAT_BATCH_MAX_BYTES: usize = 64 * 1024;

/// Capacity of the embedded ("Emd") carrier inside a DatDesc
pub const DAT_EMD_CAPACITY: usize = 64;
