use std::sync::Arc;

use ioc_shared::{EvtDesc, EvtId, IocResult};

mod half;

pub(crate) use half::{run_dispatcher, EvtHalf};

/// Receives events a subscription matched. The handler instance is the
/// subscription key: the same `Arc` passed to `sub_evt` must be passed to
/// `unsub_evt`, and the callback always observes the exact instance it was
/// registered with.
pub trait EvtHandler: Send + Sync {
    fn on_evt(&self, evt: &EvtDesc) -> IocResult<()>;
}

impl<F> EvtHandler for F
where
    F: Fn(&EvtDesc) -> IocResult<()> + Send + Sync + 'static,
{
    fn on_evt(&self, evt: &EvtDesc) -> IocResult<()> {
        (self)(evt)
    }
}

/// Arguments to a subscription: the handler and the event ids it wants
#[derive(Clone)]
pub struct SubEvtArgs {
    pub handler: Arc<dyn EvtHandler>,
    pub evt_ids: Vec<EvtId>,
}

impl SubEvtArgs {
    pub fn new(handler: Arc<dyn EvtHandler>, evt_ids: Vec<EvtId>) -> Self {
        Self { handler, evt_ids }
    }
}

/// Stable identity of a handler instance, used as the subscription key
pub(crate) fn handler_key(handler: &Arc<dyn EvtHandler>) -> usize {
    Arc::as_ptr(handler) as *const () as usize
}
