//! Tree-build events and the builder that turns them into a [`TreeModel`](crate::TreeModel).
//!
//! The text parser is an external collaborator: it reports start/end element, character
//! and declaration events to a [`TreeEventSink`]. [`EventProducer`]s replay such a stream on
//! demand, which is what the manager needs to (re)build a model from a [`Source`](crate::Source).
use smallvec::SmallVec;

use crate::error::DtmError;
use crate::model::{NodeKind, NodeRecord, QName, TreeData, UnparsedEntity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeEvent {
    pub name: QName,
    pub value: String,
    /// Declared with type `ID` in the DTD. `xml:id` counts as an id regardless.
    pub is_id: bool,
}

impl AttributeEvent {
    pub fn new(name: QName, value: impl Into<String>) -> Self {
        Self { name, value: value.into(), is_id: false }
    }

    pub fn id(name: QName, value: impl Into<String>) -> Self {
        Self { name, value: value.into(), is_id: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEvent {
    pub prefix: Option<String>,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    StartDocument { base_uri: Option<String> },
    EndDocument,
    StartElement { name: QName, attributes: Vec<AttributeEvent>, namespaces: Vec<NamespaceEvent> },
    EndElement,
    Characters(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
    UnparsedEntityDecl { name: String, public_id: Option<String>, system_id: String, notation: Option<String> },
}

/// Receiver of build events.
pub trait TreeEventSink {
    fn accept(&mut self, event: BuildEvent) -> Result<(), DtmError>;
}

/// Replays a build event stream into a sink. Implementations must be restartable: the
/// manager may ask for the same stream more than once.
pub trait EventProducer: Send + Sync {
    fn produce(&self, sink: &mut dyn TreeEventSink) -> Result<(), DtmError>;
}

/// A recorded event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedEvents(pub Vec<BuildEvent>);

impl From<Vec<BuildEvent>> for RecordedEvents {
    fn from(events: Vec<BuildEvent>) -> Self {
        RecordedEvents(events)
    }
}

impl EventProducer for RecordedEvents {
    fn produce(&self, sink: &mut dyn TreeEventSink) -> Result<(), DtmError> {
        for event in &self.0 {
            sink.accept(event.clone())?;
        }
        Ok(())
    }
}

impl TreeEventSink for RecordedEvents {
    fn accept(&mut self, event: BuildEvent) -> Result<(), DtmError> {
        self.0.push(event);
        Ok(())
    }
}

/// Appends nodes below an existing root node of a [`TreeData`] arena.
pub(crate) struct TreeBuilder<'a> {
    data: &'a mut TreeData,
    open: SmallVec<[u32; 32]>,
    started: bool,
    ended: bool,
}

impl<'a> TreeBuilder<'a> {
    pub(crate) fn new(data: &'a mut TreeData, root: u32) -> Self {
        let mut open = SmallVec::new();
        open.push(root);
        Self { data, open, started: false, ended: false }
    }

    fn current(&self) -> u32 {
        // the root stays on the stack until finish()
        self.open.last().copied().unwrap_or(0)
    }

    fn push_node(&mut self, rec: NodeRecord) -> Result<u32, DtmError> {
        let idx = u32::try_from(self.data.nodes.len())
            .map_err(|_| DtmError::malformed("tree model exceeds the node index space"))?;
        self.data.nodes.push(rec);
        Ok(idx)
    }

    fn ensure_open(&self, what: &str) -> Result<(), DtmError> {
        if self.ended {
            return Err(DtmError::malformed(format!("{what} after end of document")));
        }
        Ok(())
    }

    fn start_element(
        &mut self,
        name: QName,
        attributes: Vec<AttributeEvent>,
        namespaces: Vec<NamespaceEvent>,
    ) -> Result<(), DtmError> {
        self.ensure_open("start element")?;
        let parent = self.current();
        let element = self.push_node(NodeRecord::new(NodeKind::Element, Some(name), None, Some(parent)))?;
        self.data.nodes[parent as usize].children.push(element);
        for attr in attributes {
            let is_id = attr.is_id || attr.name.is_xml_id();
            let mut rec = NodeRecord::new(NodeKind::Attribute, Some(attr.name), Some(attr.value), Some(element));
            rec.is_id = is_id;
            let idx = self.push_node(rec)?;
            self.data.nodes[element as usize].attributes.push(idx);
            if is_id {
                self.data.id_attributes += 1;
            }
        }
        for ns in namespaces {
            let local = ns.prefix.clone().unwrap_or_default();
            let name = QName { prefix: ns.prefix, local, ns_uri: None };
            let idx = self.push_node(NodeRecord::new(NodeKind::Namespace, Some(name), Some(ns.uri), Some(element)))?;
            self.data.nodes[element as usize].namespaces.push(idx);
        }
        self.open.push(element);
        Ok(())
    }

    fn characters(&mut self, text: String) -> Result<(), DtmError> {
        self.ensure_open("characters")?;
        if text.is_empty() {
            return Ok(());
        }
        let parent = self.current();
        // adjacent character events form one text node
        if let Some(&last) = self.data.nodes[parent as usize].children.last() {
            let rec = &mut self.data.nodes[last as usize];
            if rec.kind == NodeKind::Text {
                rec.value.get_or_insert_with(String::new).push_str(&text);
                return Ok(());
            }
        }
        self.leaf(NodeKind::Text, None, text)
    }

    fn leaf(&mut self, kind: NodeKind, name: Option<QName>, value: String) -> Result<(), DtmError> {
        self.ensure_open("node")?;
        let parent = self.current();
        let idx = self.push_node(NodeRecord::new(kind, name, Some(value), Some(parent)))?;
        self.data.nodes[parent as usize].children.push(idx);
        Ok(())
    }

    fn entity(&mut self, name: String, public_id: Option<String>, system_id: String, notation: Option<String>) {
        let uri = resolve_against(self.data.base_uri.as_deref(), &system_id);
        let entity = UnparsedEntity { name: name.clone(), public_id, system_id, notation, uri };
        // the first declaration of an entity is binding
        self.data.entities.entry(name).or_insert(entity);
    }

    pub(crate) fn finish(self) -> Result<(), DtmError> {
        if self.open.len() > 1 {
            let idx = self.current() as usize;
            let name = self.data.nodes[idx].name.as_ref().map(ToString::to_string).unwrap_or_default();
            return Err(DtmError::malformed(format!("element <{name}> was never closed")));
        }
        Ok(())
    }
}

impl TreeEventSink for TreeBuilder<'_> {
    fn accept(&mut self, event: BuildEvent) -> Result<(), DtmError> {
        match event {
            BuildEvent::StartDocument { base_uri } => {
                if self.started || self.data.nodes.len() > 1 {
                    return Err(DtmError::malformed("start of document must be the first event"));
                }
                self.started = true;
                self.data.base_uri = base_uri;
                Ok(())
            }
            BuildEvent::EndDocument => {
                if self.open.len() > 1 {
                    return Err(DtmError::malformed("end of document with open elements"));
                }
                self.ended = true;
                Ok(())
            }
            BuildEvent::StartElement { name, attributes, namespaces } => {
                self.start_element(name, attributes, namespaces)
            }
            BuildEvent::EndElement => {
                if self.open.len() <= 1 {
                    return Err(DtmError::malformed("end element without matching start element"));
                }
                self.open.pop();
                Ok(())
            }
            BuildEvent::Characters(text) => self.characters(text),
            BuildEvent::Comment(text) => self.leaf(NodeKind::Comment, None, text),
            BuildEvent::ProcessingInstruction { target, data } => {
                self.leaf(NodeKind::ProcessingInstruction, Some(QName::local(target)), data)
            }
            BuildEvent::UnparsedEntityDecl { name, public_id, system_id, notation } => {
                self.entity(name, public_id, system_id, notation);
                Ok(())
            }
        }
    }
}

fn resolve_against(base: Option<&str>, system_id: &str) -> String {
    base.and_then(|b| url::Url::parse(b).ok())
        .and_then(|b| b.join(system_id).ok())
        .map_or_else(|| system_id.to_string(), |u| u.to_string())
}
