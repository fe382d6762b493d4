use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ioc_shared::{BigMap, IocError, IocResult, SrvId, SrvUri};

use super::{Acceptor, Service, SrvArgs};

/// All online services of a hub. URI uniqueness is enforced under the
/// registry lock: a second online at the same URI fails while the first
/// still holds it.
pub(crate) struct Registry {
    inner: Mutex<RegistryInner>,
}

struct RegistryInner {
    services: BigMap<SrvId, Arc<Service>>,
    by_uri: HashMap<SrvUri, SrvId>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                services: BigMap::new(),
                by_uri: HashMap::new(),
            }),
        }
    }

    pub fn online(&self, args: &SrvArgs) -> IocResult<Arc<Service>> {
        let mut inner = self.lock();
        if inner.by_uri.contains_key(&args.uri) {
            return Err(IocError::AlreadyExistService {
                uri: args.uri.to_string(),
            });
        }
        let acceptor = Acceptor::open(args)?;
        let id = inner
            .services
            .insert_with(|id| Arc::new(Service::new(id, args, acceptor)));
        inner.by_uri.insert(args.uri.clone(), id);
        inner
            .services
            .get(&id)
            .map(Arc::clone)
            .ok_or(IocError::Bug {
                reason: "service vanished right after registration",
            })
    }

    pub fn get(&self, id: SrvId) -> IocResult<Arc<Service>> {
        self.lock()
            .services
            .get(&id)
            .map(Arc::clone)
            .ok_or(IocError::NotExistService)
    }

    pub fn lookup(&self, uri: &SrvUri) -> IocResult<Arc<Service>> {
        let inner = self.lock();
        let id = inner.by_uri.get(uri).ok_or(IocError::NotExistService)?;
        inner
            .services
            .get(id)
            .map(Arc::clone)
            .ok_or(IocError::NotExistService)
    }

    pub fn remove(&self, id: SrvId) -> Option<Arc<Service>> {
        let mut inner = self.lock();
        let service = inner.services.remove(&id)?;
        inner.by_uri.remove(&service.uri);
        Some(service)
    }

    pub fn all(&self) -> Vec<Arc<Service>> {
        self.lock()
            .services
            .iter()
            .map(|(_, service)| Arc::clone(service))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
