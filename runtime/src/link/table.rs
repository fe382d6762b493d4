use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ioc_shared::{BigMap, IocError, IocResult, LinkId};

use super::Link;

/// All live links of a hub. Ids are minted once and never reused, so a
/// closed link's id keeps resolving to `NotExistLink` forever.
pub(crate) struct LinkTable {
    inner: Mutex<BigMap<LinkId, Arc<Link>>>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BigMap::new()),
        }
    }

    pub fn insert_with<F: FnOnce(LinkId) -> Arc<Link>>(&self, func: F) -> LinkId {
        self.lock().insert_with(func)
    }

    pub fn get(&self, id: LinkId) -> IocResult<Arc<Link>> {
        self.lock()
            .get(&id)
            .map(Arc::clone)
            .ok_or(IocError::NotExistLink)
    }

    pub fn remove(&self, id: LinkId) -> Option<Arc<Link>> {
        self.lock().remove(&id)
    }

    pub fn all(&self) -> Vec<Arc<Link>> {
        self.lock().iter().map(|(_, link)| Arc::clone(link)).collect()
    }

    fn lock(&self) -> MutexGuard<'_, BigMap<LinkId, Arc<Link>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
