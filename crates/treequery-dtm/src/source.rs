use core::fmt;
use std::sync::Arc;

use crate::builder::{BuildEvent, EventProducer, RecordedEvents};
use crate::error::DtmError;

/// Input for [`TreeModelManager::create`](crate::TreeModelManager::create).
///
/// The system identifier is the source's stable identity: models built from sources
/// without one are never shared and never pooled.
#[derive(Clone, Default)]
pub struct Source {
    system_id: Option<String>,
    producer: Option<Arc<dyn EventProducer>>,
    size_hint: Option<usize>,
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("system_id", &self.system_id)
            .field("has_producer", &self.producer.is_some())
            .field("size_hint", &self.size_hint)
            .finish()
    }
}

impl Source {
    pub fn new(producer: impl EventProducer + 'static) -> Self {
        Self { system_id: None, producer: Some(Arc::new(producer)), size_hint: None }
    }

    pub fn from_events(events: Vec<BuildEvent>) -> Self {
        let size_hint = events.len();
        Self::new(RecordedEvents(events)).with_size_hint(size_hint)
    }

    /// A source known only by its identifier; the manager's [`SourceResolver`] has to
    /// supply the events.
    pub fn from_system_id(system_id: impl Into<String>) -> Self {
        Self { system_id: Some(system_id.into()), producer: None, size_hint: None }
    }

    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = Some(system_id.into());
        self
    }

    pub fn with_size_hint(mut self, nodes: usize) -> Self {
        self.size_hint = Some(nodes);
        self
    }

    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    pub fn producer(&self) -> Option<&Arc<dyn EventProducer>> {
        self.producer.as_ref()
    }

    pub fn size_hint(&self) -> Option<usize> {
        self.size_hint
    }
}

/// Maps a system identifier to the event stream of the document it names. This is
/// where an external parser plugs in.
pub trait SourceResolver: Send + Sync {
    fn resolve(&self, system_id: &str) -> Result<Option<Arc<dyn EventProducer>>, DtmError>;
}
