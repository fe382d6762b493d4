use std::sync::Arc;

use ioc_shared::{CmdDesc, CmdId, IocError, LinkId, LinkStateCell, SubState};

use super::{CmdExecutor, CmdExecutorArgs};

/// The executor side of the CMD engine: the registered callback and its
/// accepted-command filter.
pub(crate) struct CmdExecutorHalf {
    executor: Arc<dyn CmdExecutor>,
    accepted: Vec<CmdId>,
}

impl CmdExecutorHalf {
    pub fn new(args: CmdExecutorArgs) -> Self {
        Self {
            executor: args.executor,
            accepted: args.accepted,
        }
    }

    /// Run one incoming request and produce the reply's (status, payload).
    /// Requests outside the accepted set are rejected without invoking the
    /// callback.
    pub fn handle(
        &self,
        state: &LinkStateCell,
        link: LinkId,
        cmd_id: CmdId,
        payload: Vec<u8>,
    ) -> (u16, Vec<u8>) {
        if !self.accepted.is_empty() && !self.accepted.contains(&cmd_id) {
            let rejected = IocError::InvalidParam {
                reason: "command id not accepted by this executor",
            };
            return (rejected.code(), Vec::new());
        }
        let mut desc = CmdDesc::new(cmd_id).with_request(payload);
        let _busy = state.enter_sub(SubState::CmdExecutorBusyExecCmd);
        match self.executor.exec_cmd(link, &mut desc) {
            Ok(()) => (0, desc.result),
            Err(err) => (err.code(), desc.result),
        }
    }
}
