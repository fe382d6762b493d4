use crate::options::TIMEOUT_INFINITE;
use crate::types::CmdId;

/// Describes one command exchange. The initiator fills `cmd_id`, `request`,
/// and the reply deadline; the runtime populates `result` and `status` in
/// place when the reply arrives. `status` is the executor's wire code
/// (`0` = success); it is set on every completed exchange, success or not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CmdDesc {
    pub cmd_id: CmdId,
    pub request: Vec<u8>,
    pub result: Vec<u8>,
    pub status: Option<u16>,
    pub timeout_us: u64,
}

impl CmdDesc {
    pub fn new(cmd_id: CmdId) -> Self {
        Self {
            cmd_id,
            request: Vec::new(),
            result: Vec::new(),
            status: None,
            timeout_us: TIMEOUT_INFINITE,
        }
    }

    pub fn with_request(mut self, request: Vec<u8>) -> Self {
        self.request = request;
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_us = ms.saturating_mul(1_000);
        self
    }
}
