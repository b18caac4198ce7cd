use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use crate::builder::EventProducer;
use crate::error::DtmError;
use crate::handle::DtmId;
use crate::model::TreeModel;
use crate::source::Source;

pub const DEFAULT_IMPLEMENTATION: &str = "arena";

/// A tree model implementation the manager can be configured with.
pub trait TreeModelFactory: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn build(&self, id: DtmId, source: &Source, producer: &dyn EventProducer) -> Result<TreeModel, DtmError>;

    fn build_fragment(&self, id: DtmId) -> Result<TreeModel, DtmError>;
}

/// Default implementation: one node arena per model.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArenaTreeFactory;

impl TreeModelFactory for ArenaTreeFactory {
    fn name(&self) -> &str {
        DEFAULT_IMPLEMENTATION
    }

    fn build(&self, id: DtmId, source: &Source, producer: &dyn EventProducer) -> Result<TreeModel, DtmError> {
        TreeModel::build(id, source.system_id().map(str::to_string), producer, source.size_hint())
    }

    fn build_fragment(&self, id: DtmId) -> Result<TreeModel, DtmError> {
        Ok(TreeModel::fragment(id))
    }
}

/// Name → factory table consulted when a manager is configured by implementation name.
#[derive(Debug, Clone)]
pub struct FactoryRegistry {
    factories: HashMap<String, Arc<dyn TreeModelFactory>>,
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        let mut reg = Self::empty();
        reg.register(Arc::new(ArenaTreeFactory));
        reg
    }
}

impl FactoryRegistry {
    pub fn empty() -> Self {
        Self { factories: HashMap::new() }
    }

    /// Registers `factory` under its own name, replacing an earlier registration.
    pub fn register(&mut self, factory: Arc<dyn TreeModelFactory>) {
        self.factories.insert(factory.name().to_string(), factory);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TreeModelFactory>> {
        self.factories.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Clone, Default)]
pub enum ImplementationSelector {
    #[default]
    Default,
    Named(String),
    Factory(Arc<dyn TreeModelFactory>),
}

impl ImplementationSelector {
    pub fn resolve(&self, registry: &FactoryRegistry) -> Result<Arc<dyn TreeModelFactory>, DtmError> {
        let name = match self {
            ImplementationSelector::Factory(f) => return Ok(f.clone()),
            ImplementationSelector::Default => DEFAULT_IMPLEMENTATION,
            ImplementationSelector::Named(name) => name.as_str(),
        };
        registry.get(name).ok_or_else(|| {
            DtmError::configuration(format!(
                "no tree model implementation named '{name}' (registered: {})",
                registry.names().join(", ")
            ))
        })
    }
}
