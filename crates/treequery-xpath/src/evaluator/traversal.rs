//! Node sequences that need no expression: a kind-filtered descendant walk and a
//! sequence holding exactly one node.
use core::fmt;
use core::ops::BitOr;
use std::sync::Arc;

use treequery_dtm::{NodeHandle, NodeKind, TreeModel, TreeModelManager};

use crate::error::Error;
use crate::sequence::{VecSequence, XSequence};
use crate::xobject::XObject;

/// Set of node kinds a traversal shows. Bit values follow the DOM `SHOW_*` flags and
/// combine with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KindMask(u32);

impl KindMask {
    pub const ALL: Self = Self(u32::MAX);
    pub const NONE: Self = Self(0);
    pub const ELEMENT: Self = Self(0x1);
    pub const ATTRIBUTE: Self = Self(0x2);
    pub const TEXT: Self = Self(0x4);
    pub const PROCESSING_INSTRUCTION: Self = Self(0x40);
    pub const COMMENT: Self = Self(0x80);
    pub const DOCUMENT: Self = Self(0x100);
    pub const DOCUMENT_FRAGMENT: Self = Self(0x400);
    pub const NAMESPACE: Self = Self(0x1000);

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn of(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Document => Self::DOCUMENT,
            NodeKind::DocumentFragment => Self::DOCUMENT_FRAGMENT,
            NodeKind::Element => Self::ELEMENT,
            NodeKind::Attribute => Self::ATTRIBUTE,
            NodeKind::Text => Self::TEXT,
            NodeKind::Comment => Self::COMMENT,
            NodeKind::ProcessingInstruction => Self::PROCESSING_INSTRUCTION,
            NodeKind::Namespace => Self::NAMESPACE,
        }
    }

    pub fn shows(self, kind: NodeKind) -> bool {
        self.0 & Self::of(kind).0 != 0
    }
}

impl BitOr for KindMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Extra acceptance test applied to nodes the mask already shows.
pub type NodeFilter = Arc<dyn Fn(&TreeModel, NodeHandle) -> Result<bool, Error>>;

/// Walks `root` and its descendants in document order, yielding the nodes whose kind
/// is in the mask and which the optional filter accepts. Attribute and namespace nodes
/// are not part of the walk; they are only shown when `root` is one.
///
/// Forward-only and lazy: children are fetched as the walk reaches their parent.
#[derive(Clone)]
pub struct NodeIterator {
    model: Arc<TreeModel>,
    root: NodeHandle,
    mask: KindMask,
    filter: Option<NodeFilter>,
    pending: Vec<NodeHandle>,
    started: bool,
}

impl fmt::Debug for NodeIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIterator")
            .field("root", &self.root)
            .field("mask", &self.mask)
            .field("filtered", &self.filter.is_some())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl NodeIterator {
    pub fn new(model: Arc<TreeModel>, root: NodeHandle, mask: KindMask) -> Self {
        Self { model, root, mask, filter: None, pending: Vec::new(), started: false }
    }

    pub fn with_filter(mut self, filter: NodeFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn root(&self) -> NodeHandle {
        self.root
    }

    fn accepts(&self, node: NodeHandle) -> Result<bool, Error> {
        if !self.mask.shows(self.model.kind(node)?) {
            return Ok(false);
        }
        match &self.filter {
            Some(filter) => filter(self.model.as_ref(), node),
            None => Ok(true),
        }
    }
}

impl XSequence for NodeIterator {
    fn next(&mut self) -> Result<Option<XObject>, Error> {
        if !self.started {
            self.started = true;
            self.pending.push(self.root);
        }
        while let Some(node) = self.pending.pop() {
            self.pending.extend(self.model.children(node)?.into_iter().rev());
            if self.accepts(node)? {
                return Ok(Some(XObject::Node(node)));
            }
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.started = false;
    }

    fn boxed_clone(&self) -> Box<dyn XSequence> {
        let mut fresh = self.clone();
        fresh.reset();
        Box::new(fresh)
    }
}

/// Descendant walk from `root` over the model that owns it.
pub fn node_iterator(manager: &TreeModelManager, root: NodeHandle, mask: KindMask) -> Result<NodeIterator, Error> {
    Ok(NodeIterator::new(manager.owner_of(root)?, root, mask))
}

/// Sequence of exactly one node.
pub fn single_node(node: NodeHandle) -> VecSequence {
    VecSequence::new(vec![XObject::Node(node)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_combine_and_match_kinds() {
        let mask = KindMask::ELEMENT | KindMask::COMMENT;
        assert!(mask.shows(NodeKind::Element));
        assert!(mask.shows(NodeKind::Comment));
        assert!(!mask.shows(NodeKind::Text));
        assert_eq!(mask.bits(), 0x81);
        assert!(KindMask::ALL.shows(NodeKind::Namespace));
        assert!(!KindMask::NONE.shows(NodeKind::Document));
        assert_eq!(KindMask::from_bits(0x4), KindMask::TEXT);
    }
}
