//! Arena-backed, handle-addressed tree model.
//!
//! Nodes live in one vector per model and are addressed by [`NodeHandle`]s whose index
//! part is the vector position. Build order is document order: every element is
//! followed by its attribute nodes, then its namespace nodes, then its descendants.
use core::cmp::Ordering;
use core::fmt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};

use crate::builder::{EventProducer, TreeBuilder};
use crate::error::DtmError;
use crate::handle::{DtmId, NodeHandle};

pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    DocumentFragment,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

impl NodeKind {
    pub fn is_root(self) -> bool {
        matches!(self, NodeKind::Document | NodeKind::DocumentFragment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub ns_uri: Option<String>,
}

impl QName {
    pub fn local(local: impl Into<String>) -> Self {
        Self { prefix: None, local: local.into(), ns_uri: None }
    }

    pub fn with_ns(prefix: Option<&str>, local: impl Into<String>, ns_uri: impl Into<String>) -> Self {
        Self { prefix: prefix.map(str::to_string), local: local.into(), ns_uri: Some(ns_uri.into()) }
    }

    /// Splits a lexical `prefix:local` name. Only the reserved `xml` prefix is bound to a
    /// namespace here; any other prefix is kept without a namespace URI.
    pub fn parse_lexical(lexical: &str) -> Self {
        match lexical.split_once(':') {
            Some(("xml", local)) => Self::with_ns(Some("xml"), local, XML_NS),
            Some((prefix, local)) => {
                Self { prefix: Some(prefix.to_string()), local: local.to_string(), ns_uri: None }
            }
            None => Self::local(lexical),
        }
    }

    /// Name equality as seen by node tests: local name and namespace URI, prefix ignored.
    pub fn matches(&self, other: &QName) -> bool {
        self.local == other.local && self.ns_uri == other.ns_uri
    }

    pub fn is_xml_id(&self) -> bool {
        self.local == "id" && (self.ns_uri.as_deref() == Some(XML_NS) || self.prefix.as_deref() == Some("xml"))
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) => write!(f, "{p}:{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// Unparsed (NDATA) entity declared in the document's DTD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnparsedEntity {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: String,
    pub notation: Option<String>,
    /// `system_id` resolved against the document base URI when that base is absolute.
    pub uri: String,
}

#[derive(Debug, Clone)]
pub(crate) struct NodeRecord {
    pub(crate) kind: NodeKind,
    pub(crate) name: Option<QName>,
    pub(crate) value: Option<String>,
    pub(crate) parent: Option<u32>,
    pub(crate) children: Vec<u32>,
    pub(crate) attributes: Vec<u32>,
    pub(crate) namespaces: Vec<u32>,
    pub(crate) is_id: bool,
}

impl NodeRecord {
    pub(crate) fn new(kind: NodeKind, name: Option<QName>, value: Option<String>, parent: Option<u32>) -> Self {
        Self {
            kind,
            name,
            value,
            parent,
            children: Vec::new(),
            attributes: Vec::new(),
            namespaces: Vec::new(),
            is_id: false,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct TreeData {
    pub(crate) nodes: Vec<NodeRecord>,
    pub(crate) base_uri: Option<String>,
    pub(crate) entities: HashMap<String, UnparsedEntity>,
    pub(crate) id_attributes: usize,
}

/// State of a fragment before an append, enough to undo a failed batch.
struct Checkpoint {
    nodes: usize,
    root_children: usize,
    root_text: Option<usize>,
    id_attributes: usize,
    base_uri: Option<String>,
    entities: Vec<String>,
}

impl TreeData {
    fn checkpoint(&self) -> Checkpoint {
        let root = &self.nodes[0];
        let root_text = root
            .children
            .last()
            .map(|&c| &self.nodes[c as usize])
            .filter(|rec| rec.kind == NodeKind::Text)
            .map(|rec| rec.value.as_ref().map_or(0, String::len));
        Checkpoint {
            nodes: self.nodes.len(),
            root_children: root.children.len(),
            root_text,
            id_attributes: self.id_attributes,
            base_uri: self.base_uri.clone(),
            entities: self.entities.keys().cloned().collect(),
        }
    }

    fn rollback(&mut self, cp: Checkpoint) {
        self.nodes.truncate(cp.nodes);
        self.nodes[0].children.truncate(cp.root_children);
        // a merged text batch extends the root's last text node in place
        if let Some(len) = cp.root_text
            && let Some(&last) = self.nodes[0].children.last()
            && let Some(value) = self.nodes[last as usize].value.as_mut()
        {
            value.truncate(len);
        }
        self.id_attributes = cp.id_attributes;
        self.base_uri = cp.base_uri;
        self.entities.retain(|name, _| cp.entities.contains(name));
    }
}

/// One parsed document or document fragment.
pub struct TreeModel {
    id: DtmId,
    system_id: Option<String>,
    fragment: bool,
    data: RwLock<TreeData>,
    /// Built on first lookup; fragment appends drop it.
    id_index: Mutex<Option<Arc<HashMap<String, NodeHandle>>>>,
}

impl fmt::Debug for TreeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeModel")
            .field("id", &self.id)
            .field("system_id", &self.system_id)
            .field("fragment", &self.fragment)
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

impl TreeModel {
    fn empty(id: DtmId, system_id: Option<String>, fragment: bool, capacity: usize) -> Self {
        let root_kind = if fragment { NodeKind::DocumentFragment } else { NodeKind::Document };
        let mut nodes = Vec::with_capacity(capacity.max(1));
        nodes.push(NodeRecord::new(root_kind, None, None, None));
        Self {
            id,
            system_id,
            fragment,
            data: RwLock::new(TreeData { nodes, ..TreeData::default() }),
            id_index: Mutex::new(None),
        }
    }

    /// Builds a document model by replaying `producer` into a fresh builder.
    pub fn build(
        id: DtmId,
        system_id: Option<String>,
        producer: &dyn EventProducer,
        size_hint: Option<usize>,
    ) -> Result<Self, DtmError> {
        let model = Self::empty(id, system_id, false, size_hint.unwrap_or(64));
        {
            let mut data = model.data.write().unwrap_or_else(PoisonError::into_inner);
            let mut builder = TreeBuilder::new(&mut data, 0);
            producer.produce(&mut builder)?;
            builder.finish()?;
        }
        Ok(model)
    }

    /// Empty fragment: only the fragment root exists until events are appended.
    pub fn fragment(id: DtmId) -> Self {
        Self::empty(id, None, true, 16)
    }

    /// Appends a batch of build events under the fragment root. A batch that fails
    /// leaves the fragment as it was.
    pub fn append(&self, producer: &dyn EventProducer) -> Result<(), DtmError> {
        if !self.fragment {
            return Err(DtmError::unsupported(format!("{} is not a fragment and cannot be extended", self.id)));
        }
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let checkpoint = data.checkpoint();
        let result = {
            let mut builder = TreeBuilder::new(&mut data, 0);
            producer.produce(&mut builder).and_then(|()| builder.finish())
        };
        if let Err(err) = result {
            data.rollback(checkpoint);
            tracing::debug!(model = %self.id, error = %err, "rolled back fragment append");
            return Err(err);
        }
        drop(data);
        *self.id_index.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, TreeData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> DtmId {
        self.id
    }

    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment
    }

    pub fn base_uri(&self) -> Option<String> {
        self.read().base_uri.clone()
    }

    /// Number of nodes, including the root and attribute/namespace nodes.
    pub fn size(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn document(&self) -> NodeHandle {
        NodeHandle::new(self.id, 0)
    }

    pub fn contains(&self, node: NodeHandle) -> bool {
        node.model_id() == self.id && (node.index() as usize) < self.size()
    }

    fn handle(&self, index: u32) -> NodeHandle {
        NodeHandle::new(self.id, index)
    }

    fn handles(&self, indices: &[u32]) -> Vec<NodeHandle> {
        indices.iter().map(|&i| self.handle(i)).collect()
    }

    fn with_node<R>(&self, node: NodeHandle, f: impl FnOnce(&TreeData, &NodeRecord) -> R) -> Result<R, DtmError> {
        if node.model_id() != self.id {
            return Err(DtmError::InvalidHandle(node));
        }
        let data = self.read();
        let rec = data.nodes.get(node.index() as usize).ok_or(DtmError::InvalidHandle(node))?;
        Ok(f(&data, rec))
    }

    pub fn kind(&self, node: NodeHandle) -> Result<NodeKind, DtmError> {
        self.with_node(node, |_, rec| rec.kind)
    }

    pub fn name(&self, node: NodeHandle) -> Result<Option<QName>, DtmError> {
        self.with_node(node, |_, rec| rec.name.clone())
    }

    pub fn string_value(&self, node: NodeHandle) -> Result<String, DtmError> {
        self.with_node(node, |data, rec| match rec.kind {
            NodeKind::Document | NodeKind::DocumentFragment | NodeKind::Element => {
                let mut out = String::new();
                collect_text(data, rec, &mut out);
                out
            }
            _ => rec.value.clone().unwrap_or_default(),
        })
    }

    pub fn parent(&self, node: NodeHandle) -> Result<Option<NodeHandle>, DtmError> {
        self.with_node(node, |_, rec| rec.parent.map(|p| self.handle(p)))
    }

    pub fn children(&self, node: NodeHandle) -> Result<Vec<NodeHandle>, DtmError> {
        self.with_node(node, |_, rec| self.handles(&rec.children))
    }

    pub fn attributes(&self, node: NodeHandle) -> Result<Vec<NodeHandle>, DtmError> {
        self.with_node(node, |_, rec| self.handles(&rec.attributes))
    }

    pub fn namespaces(&self, node: NodeHandle) -> Result<Vec<NodeHandle>, DtmError> {
        self.with_node(node, |_, rec| self.handles(&rec.namespaces))
    }

    pub fn attribute(&self, node: NodeHandle, name: &QName) -> Result<Option<NodeHandle>, DtmError> {
        self.with_node(node, |data, rec| {
            rec.attributes
                .iter()
                .copied()
                .find(|&a| data.nodes[a as usize].name.as_ref().is_some_and(|n| n.matches(name)))
                .map(|a| self.handle(a))
        })
    }

    fn sibling(&self, node: NodeHandle, forward: bool) -> Result<Option<NodeHandle>, DtmError> {
        self.with_node(node, |data, rec| {
            if matches!(rec.kind, NodeKind::Attribute | NodeKind::Namespace) {
                return None;
            }
            let parent = &data.nodes[rec.parent? as usize];
            let pos = parent.children.iter().position(|&c| c == node.index())?;
            let next = if forward { pos.checked_add(1)? } else { pos.checked_sub(1)? };
            parent.children.get(next).map(|&c| self.handle(c))
        })
    }

    pub fn next_sibling(&self, node: NodeHandle) -> Result<Option<NodeHandle>, DtmError> {
        self.sibling(node, true)
    }

    pub fn previous_sibling(&self, node: NodeHandle) -> Result<Option<NodeHandle>, DtmError> {
        self.sibling(node, false)
    }

    /// Descendants in document order (attributes and namespaces excluded).
    pub fn descendants(&self, node: NodeHandle, include_self: bool) -> Result<Vec<NodeHandle>, DtmError> {
        self.with_node(node, |data, rec| {
            let mut out = Vec::new();
            if include_self {
                out.push(node);
            }
            let mut stack: Vec<u32> = rec.children.iter().rev().copied().collect();
            while let Some(idx) = stack.pop() {
                out.push(self.handle(idx));
                stack.extend(data.nodes[idx as usize].children.iter().rev());
            }
            out
        })
    }

    pub fn ancestors(&self, node: NodeHandle, include_self: bool) -> Result<Vec<NodeHandle>, DtmError> {
        self.with_node(node, |data, rec| {
            let mut out = Vec::new();
            if include_self {
                out.push(node);
            }
            let mut cur = rec.parent;
            while let Some(p) = cur {
                out.push(self.handle(p));
                cur = data.nodes[p as usize].parent;
            }
            out
        })
    }

    /// Builds the `ID` attribute index unless it is current; returns the number of
    /// indexed ids.
    pub fn build_id_index(&self) -> usize {
        self.id_index().len()
    }

    fn id_index(&self) -> Arc<HashMap<String, NodeHandle>> {
        let mut slot = self.id_index.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(index) = slot.as_ref() {
            return Arc::clone(index);
        }
        let data = self.read();
        let mut index = HashMap::with_capacity(data.id_attributes);
        for rec in data.nodes.iter().filter(|r| r.kind == NodeKind::Attribute && r.is_id) {
            let (Some(owner), Some(value)) = (rec.parent, rec.value.as_deref()) else {
                continue;
            };
            // first declaration wins for duplicate ids
            index.entry(value.trim().to_string()).or_insert_with(|| self.handle(owner));
        }
        tracing::trace!(model = %self.id, ids = index.len(), "built id index");
        let index = Arc::new(index);
        *slot = Some(Arc::clone(&index));
        index
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeHandle> {
        self.id_index().get(id).copied()
    }

    pub fn unparsed_entity_uri(&self, name: &str) -> Option<String> {
        self.read().entities.get(name).map(|e| e.uri.clone())
    }

    pub fn unparsed_entities(&self) -> Vec<UnparsedEntity> {
        let mut out: Vec<UnparsedEntity> = self.read().entities.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

fn collect_text(data: &TreeData, rec: &NodeRecord, out: &mut String) {
    for &c in &rec.children {
        let child = &data.nodes[c as usize];
        match child.kind {
            NodeKind::Text => out.push_str(child.value.as_deref().unwrap_or_default()),
            NodeKind::Element => collect_text(data, child, out),
            _ => {}
        }
    }
}

/// Document order across models: by owning model id first, then by node index.
pub fn compare_document_order(a: NodeHandle, b: NodeHandle) -> Ordering {
    a.cmp(&b)
}
