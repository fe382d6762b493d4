use crate::constants::{
    DEPTH_EVT_DESC_QUEUE, MAX_DATA_CHUNK_SIZE, MAX_DATA_QUEUE_SIZE, MAX_EVT_CONSUMER,
};

/// Selects which capability descriptor to query
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapabilityId {
    /// Connectionless (auto-link) event mode
    ConlesModeEvent,
    /// Connection-oriented data mode
    ConetModeData,
}

/// Static limits of the runtime, queryable by capability id
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    ConlesModeEvent {
        depth_evt_desc_queue: usize,
        max_evt_consumer: usize,
    },
    ConetModeData {
        max_data_queue_size: usize,
        max_data_chunk_size: usize,
    },
}

impl Capability {
    pub fn query(id: CapabilityId) -> Capability {
        match id {
            CapabilityId::ConlesModeEvent => Capability::ConlesModeEvent {
                depth_evt_desc_queue: DEPTH_EVT_DESC_QUEUE,
                max_evt_consumer: MAX_EVT_CONSUMER,
            },
            CapabilityId::ConetModeData => Capability::ConetModeData {
                max_data_queue_size: MAX_DATA_QUEUE_SIZE,
                max_data_chunk_size: MAX_DATA_CHUNK_SIZE,
            },
        }
    }
}
