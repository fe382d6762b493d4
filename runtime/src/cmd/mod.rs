use std::sync::Arc;

use ioc_shared::{CmdDesc, CmdId, IocResult, LinkId};

mod executor;
mod initiator;

pub(crate) use executor::CmdExecutorHalf;
pub(crate) use initiator::CmdInitiatorHalf;

/// Executes commands on the executor side of a link. The callback writes the
/// reply into `cmd.result`; its returned status travels back to the
/// initiator verbatim.
pub trait CmdExecutor: Send + Sync {
    fn exec_cmd(&self, link: LinkId, cmd: &mut CmdDesc) -> IocResult<()>;
}

impl<F> CmdExecutor for F
where
    F: Fn(LinkId, &mut CmdDesc) -> IocResult<()> + Send + Sync + 'static,
{
    fn exec_cmd(&self, link: LinkId, cmd: &mut CmdDesc) -> IocResult<()> {
        (self)(link, cmd)
    }
}

/// Executor registration: the callback and the command ids it accepts.
/// An empty accepted set accepts every id.
#[derive(Clone)]
pub struct CmdExecutorArgs {
    pub executor: Arc<dyn CmdExecutor>,
    pub accepted: Vec<CmdId>,
}

impl CmdExecutorArgs {
    pub fn new(executor: Arc<dyn CmdExecutor>, accepted: Vec<CmdId>) -> Self {
        Self { executor, accepted }
    }
}
