use crate::types::EvtId;

/// Describes one posted event: an id, a small scalar value, and an opaque
/// payload. The core never interprets any of the three.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvtDesc {
    pub evt_id: EvtId,
    pub value: u64,
    pub payload: Vec<u8>,
}

impl EvtDesc {
    pub fn new(evt_id: EvtId) -> Self {
        Self {
            evt_id,
            value: 0,
            payload: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: u64) -> Self {
        self.value = value;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }
}
