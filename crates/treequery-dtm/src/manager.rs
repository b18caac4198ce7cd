//! Tree model lifecycle: creation, handle dispatch, release into a bounded LRU pool.
//!
//! All pool state sits behind one mutex. Models are built outside of it; only the
//! registration of a finished model takes the lock again.
use core::fmt;
use core::num::NonZeroUsize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;

use crate::builder::EventProducer;
use crate::error::DtmError;
use crate::factory::{ArenaTreeFactory, FactoryRegistry, ImplementationSelector, TreeModelFactory};
use crate::handle::{DtmId, NodeHandle};
use crate::model::TreeModel;
use crate::source::{Source, SourceResolver};

pub const DEFAULT_POOL_CAPACITY: usize = 8;

#[derive(Clone)]
pub struct ManagerConfig {
    pub implementation: ImplementationSelector,
    pub registry: FactoryRegistry,
    /// Maximum number of released models kept for reuse; `0` disables pooling.
    pub pool_capacity: usize,
    pub resolver: Option<Arc<dyn SourceResolver>>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            implementation: ImplementationSelector::Default,
            registry: FactoryRegistry::default(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            resolver: None,
        }
    }
}

impl fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("implementation", &self.implementation)
            .field("registry", &self.registry.names())
            .field("pool_capacity", &self.pool_capacity)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

impl ManagerConfig {
    pub fn builder() -> ManagerConfigBuilder {
        ManagerConfigBuilder::new()
    }
}

#[derive(Debug, Default)]
pub struct ManagerConfigBuilder {
    cfg: ManagerConfig,
}

impl ManagerConfigBuilder {
    pub fn new() -> Self {
        Self { cfg: ManagerConfig::default() }
    }

    pub fn with_implementation(mut self, selector: ImplementationSelector) -> Self {
        self.cfg.implementation = selector;
        self
    }

    /// Registers an additional factory; select it with [`ImplementationSelector::Named`].
    pub fn with_factory(mut self, factory: Arc<dyn TreeModelFactory>) -> Self {
        self.cfg.registry.register(factory);
        self
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.cfg.pool_capacity = capacity;
        self
    }

    pub fn with_source_resolver(mut self, resolver: Arc<dyn SourceResolver>) -> Self {
        self.cfg.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> ManagerConfig {
        self.cfg
    }
}

struct PoolState {
    live: HashMap<DtmId, Arc<TreeModel>>,
    /// system id → the shared instance handed out for non-unique requests
    canonical: HashMap<String, DtmId>,
    pool: Option<LruCache<String, Arc<TreeModel>>>,
    pooled_ids: HashMap<DtmId, String>,
}

impl PoolState {
    fn pooled(&self, id: DtmId) -> Option<&Arc<TreeModel>> {
        let key = self.pooled_ids.get(&id)?;
        self.pool.as_ref()?.peek(key).filter(|m| m.id() == id)
    }
}

pub struct TreeModelManager {
    factory: Arc<dyn TreeModelFactory>,
    resolver: Option<Arc<dyn SourceResolver>>,
    next_id: AtomicU32,
    state: Mutex<PoolState>,
}

impl fmt::Debug for TreeModelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeModelManager")
            .field("factory", &self.factory.name())
            .field("live", &self.live_count())
            .field("pooled", &self.pooled_count())
            .finish_non_exhaustive()
    }
}

impl TreeModelManager {
    pub fn new(config: ManagerConfig) -> Result<Self, DtmError> {
        let factory = config.implementation.resolve(&config.registry)?;
        tracing::debug!(factory = factory.name(), pool_capacity = config.pool_capacity, "tree model manager created");
        Ok(Self::from_parts(factory, config.resolver, config.pool_capacity))
    }

    /// Manager with the default arena implementation and pool size.
    pub fn with_defaults() -> Self {
        Self::from_parts(Arc::new(ArenaTreeFactory), None, DEFAULT_POOL_CAPACITY)
    }

    fn from_parts(
        factory: Arc<dyn TreeModelFactory>,
        resolver: Option<Arc<dyn SourceResolver>>,
        pool_capacity: usize,
    ) -> Self {
        Self {
            factory,
            resolver,
            next_id: AtomicU32::new(0),
            state: Mutex::new(PoolState {
                live: HashMap::new(),
                canonical: HashMap::new(),
                pool: NonZeroUsize::new(pool_capacity).map(LruCache::new),
                pooled_ids: HashMap::new(),
            }),
        }
    }

    pub fn factory_name(&self) -> &str {
        self.factory.name()
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate_id(&self) -> Result<DtmId, DtmError> {
        self.next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
            .map(DtmId)
            .map_err(|_| DtmError::configuration("tree model id space exhausted"))
    }

    fn producer_for(&self, source: &Source) -> Result<Arc<dyn EventProducer>, DtmError> {
        if let Some(p) = source.producer() {
            return Ok(p.clone());
        }
        let Some(system_id) = source.system_id() else {
            return Err(DtmError::configuration("source has neither build events nor a system id"));
        };
        let Some(resolver) = &self.resolver else {
            return Err(DtmError::configuration(format!("no source resolver configured for '{system_id}'")));
        };
        resolver
            .resolve(system_id)?
            .ok_or_else(|| DtmError::configuration(format!("source resolver cannot supply '{system_id}'")))
    }

    /// Returns a model for `source`. Unless `unique` is set, a live or pooled model built
    /// from the same system id is reused instead of building a new one.
    pub fn create(&self, source: &Source, unique: bool) -> Result<Arc<TreeModel>, DtmError> {
        let shared_key = if unique { None } else { source.system_id() };
        if let Some(key) = shared_key {
            let mut state = self.lock();
            if let Some(model) = state.canonical.get(key).and_then(|id| state.live.get(id)) {
                tracing::debug!(system_id = key, model = %model.id(), "sharing live tree model");
                return Ok(model.clone());
            }
            if let Some(model) = state.pool.as_mut().and_then(|p| p.pop(key)) {
                state.pooled_ids.remove(&model.id());
                state.live.insert(model.id(), model.clone());
                state.canonical.insert(key.to_string(), model.id());
                tracing::debug!(system_id = key, model = %model.id(), "revived pooled tree model");
                return Ok(model);
            }
        }

        let producer = self.producer_for(source)?;
        let id = self.allocate_id()?;
        let model = Arc::new(self.factory.build(id, source, producer.as_ref())?);

        let mut state = self.lock();
        if let Some(key) = shared_key {
            // another thread may have registered the same document while this one was building
            if let Some(existing) = state.canonical.get(key).and_then(|id| state.live.get(id)) {
                tracing::debug!(system_id = key, model = %existing.id(), discarded = %id, "lost build race, sharing live tree model");
                return Ok(existing.clone());
            }
            state.canonical.insert(key.to_string(), id);
        }
        state.live.insert(id, model.clone());
        tracing::debug!(model = %id, system_id = source.system_id(), unique, nodes = model.size(), "created tree model");
        Ok(model)
    }

    pub fn create_fragment(&self) -> Result<Arc<TreeModel>, DtmError> {
        let id = self.allocate_id()?;
        let model = Arc::new(self.factory.build_fragment(id)?);
        self.lock().live.insert(id, model.clone());
        tracing::debug!(model = %id, "created fragment");
        Ok(model)
    }

    pub fn owner_of(&self, handle: NodeHandle) -> Result<Arc<TreeModel>, DtmError> {
        let id = handle.model_id();
        let state = self.lock();
        state
            .live
            .get(&id)
            .or_else(|| state.pooled(id))
            .filter(|m| m.contains(handle))
            .cloned()
            .ok_or(DtmError::InvalidHandle(handle))
    }

    /// Hands a model back. Returns `true` when the model was discarded and `false` when it
    /// was kept in the pool. Fragments and models without a system id are always discarded.
    pub fn release(&self, model: &Arc<TreeModel>, force_discard: bool) -> bool {
        let id = model.id();
        let mut state = self.lock();
        if state.live.remove(&id).is_none() {
            if state.pooled_ids.contains_key(&id) {
                return false;
            }
            tracing::warn!(model = %id, "release of a tree model this manager does not own");
            return true;
        }
        let system_id = model.system_id();
        if let Some(key) = system_id
            && state.canonical.get(key) == Some(&id)
        {
            state.canonical.remove(key);
        }

        let poolable = !force_discard && !model.is_fragment() && state.pool.is_some();
        let (Some(key), true) = (system_id, poolable) else {
            tracing::debug!(model = %id, system_id, force_discard, "discarded tree model");
            return true;
        };
        let Some(pool) = state.pool.as_mut() else {
            return true;
        };
        let displaced = pool.push(key.to_string(), model.clone());
        state.pooled_ids.insert(id, key.to_string());
        if let Some((evicted_key, evicted)) = displaced {
            state.pooled_ids.remove(&evicted.id());
            tracing::debug!(model = %evicted.id(), system_id = %evicted_key, "evicted tree model from pool");
        }
        tracing::debug!(model = %id, system_id = key, "pooled tree model");
        false
    }

    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    pub fn pooled_count(&self) -> usize {
        self.lock().pool.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_pooled(&self, id: DtmId) -> bool {
        self.lock().pooled(id).is_some()
    }
}

impl Default for TreeModelManager {
    fn default() -> Self {
        Self::with_defaults()
    }
}
