use std::sync::Arc;

use ioc_shared::{IocResult, LinkId};

mod receiver;
mod sender;

pub(crate) use receiver::{DatParking, DatReceiverHalf};
pub(crate) use sender::DatSenderHalf;

/// Receives stream bytes on a callback-mode link. Registering a handler at
/// service-online (or connect) time selects callback delivery for the link;
/// polling via `recv_dat` is then disabled for it.
pub trait DatHandler: Send + Sync {
    fn on_dat(&self, link: LinkId, data: &[u8]) -> IocResult<()>;
}

impl<F> DatHandler for F
where
    F: Fn(LinkId, &[u8]) -> IocResult<()> + Send + Sync + 'static,
{
    fn on_dat(&self, link: LinkId, data: &[u8]) -> IocResult<()> {
        (self)(link, data)
    }
}

/// Receiver registration carried in service/connect usage args
#[derive(Clone)]
pub struct DatReceiverArgs {
    pub handler: Arc<dyn DatHandler>,
}

impl DatReceiverArgs {
    pub fn new(handler: Arc<dyn DatHandler>) -> Self {
        Self { handler }
    }
}
