//! Handle-addressed document tree models and their manager.
//!
//! A [`TreeModelManager`] builds [`TreeModel`]s from build-event [`Source`]s, hands out
//! shared instances for repeated requests of the same document, resolves
//! [`NodeHandle`]s back to their owning model and keeps released models in a bounded
//! LRU pool.
pub mod builder;
pub mod error;
pub mod factory;
pub mod handle;
pub mod manager;
pub mod model;
pub mod simple;
pub mod source;

pub use builder::{AttributeEvent, BuildEvent, EventProducer, NamespaceEvent, RecordedEvents, TreeEventSink};
pub use error::DtmError;
pub use factory::{ArenaTreeFactory, FactoryRegistry, ImplementationSelector, TreeModelFactory};
pub use handle::{DtmId, NodeHandle};
pub use manager::{ManagerConfig, ManagerConfigBuilder, TreeModelManager};
pub use model::{NodeKind, QName, TreeModel, UnparsedEntity, XML_NS, compare_document_order};
pub use source::{Source, SourceResolver};
