//! Node handles in the manager-wide handle space.
//!
//! A handle packs the owning model's [`DtmId`] into the high 32 bits and the node's
//! index inside that model into the low 32 bits. Node indices are assigned in document
//! order, so for two handles of the same model `a < b` means `a` precedes `b`.
use core::fmt;

pub const NODE_INDEX_BITS: u32 = 32;
const NODE_INDEX_MASK: u64 = (1 << NODE_INDEX_BITS) - 1;

/// Identifier of one tree model instance, unique within its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DtmId(pub u32);

impl fmt::Display for DtmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dtm#{}", self.0)
    }
}

/// Opaque address of a node. Only meaningful relative to the manager that issued the
/// owning model; handles of different managers must not be compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle(u64);

impl NodeHandle {
    pub fn new(model: DtmId, index: u32) -> Self {
        NodeHandle((u64::from(model.0) << NODE_INDEX_BITS) | u64::from(index))
    }

    pub fn from_raw(raw: u64) -> Self {
        NodeHandle(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn model_id(self) -> DtmId {
        // the shift leaves exactly 32 significant bits
        #[allow(clippy::cast_possible_truncation)]
        let id = (self.0 >> NODE_INDEX_BITS) as u32;
        DtmId(id)
    }

    pub fn index(self) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let idx = (self.0 & NODE_INDEX_MASK) as u32;
        idx
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model_id().0, self.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_packs_model_and_index() {
        let h = NodeHandle::new(DtmId(7), 42);
        assert_eq!(h.model_id(), DtmId(7));
        assert_eq!(h.index(), 42);
        assert_eq!(NodeHandle::from_raw(h.raw()), h);
        assert_eq!(h.to_string(), "7:42");
    }

    #[test]
    fn handles_order_by_model_then_index() {
        let a = NodeHandle::new(DtmId(1), u32::MAX);
        let b = NodeHandle::new(DtmId(2), 0);
        assert!(a < b);
        assert!(NodeHandle::new(DtmId(2), 1) > b);
    }
}
