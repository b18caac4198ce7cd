use core::fmt;

use treequery_dtm::QName;

use crate::xobject::XS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    One,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl Occurrence {
    pub fn allows(self, count: usize) -> bool {
        match self {
            Occurrence::One => count == 1,
            Occurrence::ZeroOrOne => count <= 1,
            Occurrence::ZeroOrMore => true,
            Occurrence::OneOrMore => count >= 1,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Occurrence::One => "",
            Occurrence::ZeroOrOne => "?",
            Occurrence::ZeroOrMore => "*",
            Occurrence::OneOrMore => "+",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindTest {
    AnyKind,
    Document,
    Element(Option<QName>),
    Attribute(Option<QName>),
    Text,
    Comment,
    ProcessingInstruction(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemType {
    Kind(KindTest),
    Item,
    Atomic(QName),
}

/// Target of `cast as` and `treat as`. Shared between AST clones; never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceType {
    EmptySequence,
    Typed { item: ItemType, occ: Occurrence },
}

impl SequenceType {
    pub fn atomic(local: &str, occ: Occurrence) -> Self {
        SequenceType::Typed { item: ItemType::Atomic(QName::with_ns(Some("xs"), local, XS)), occ }
    }

    pub fn kind(test: KindTest, occ: Occurrence) -> Self {
        SequenceType::Typed { item: ItemType::Kind(test), occ }
    }

    pub fn item(occ: Occurrence) -> Self {
        SequenceType::Typed { item: ItemType::Item, occ }
    }
}

/// Atomic types understood by cast and treat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicType {
    AnyAtomic,
    String,
    UntypedAtomic,
    AnyUri,
    Boolean,
    Double,
    Float,
    Decimal,
    Integer,
}

impl AtomicType {
    /// `None` for names outside the XML Schema namespace or unknown locals.
    pub fn from_qname(q: &QName) -> Option<Self> {
        let in_xs = q.ns_uri.as_deref() == Some(XS) || (q.ns_uri.is_none() && q.prefix.as_deref() == Some("xs"));
        if !in_xs {
            return None;
        }
        Some(match q.local.as_str() {
            "anyAtomicType" => AtomicType::AnyAtomic,
            "string" => AtomicType::String,
            "untypedAtomic" => AtomicType::UntypedAtomic,
            "anyURI" => AtomicType::AnyUri,
            "boolean" => AtomicType::Boolean,
            "double" => AtomicType::Double,
            "float" => AtomicType::Float,
            "decimal" => AtomicType::Decimal,
            "integer" => AtomicType::Integer,
            _ => return None,
        })
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, AtomicType::Double | AtomicType::Float | AtomicType::Decimal | AtomicType::Integer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    Attribute,
    SelfAxis,
    DescendantOrSelf,
    FollowingSibling,
    Following,
    Namespace,
    Parent,
    Ancestor,
    PrecedingSibling,
    Preceding,
    AncestorOrSelf,
}

impl Axis {
    pub fn name(self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::Attribute => "attribute",
            Axis::SelfAxis => "self",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::FollowingSibling => "following-sibling",
            Axis::Following => "following",
            Axis::Namespace => "namespace",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::Preceding => "preceding",
            Axis::AncestorOrSelf => "ancestor-or-self",
        }
    }

    /// Reverse axes number their nodes nearest-first for predicates.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf | Axis::PrecedingSibling | Axis::Preceding
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    QName(QName),
    /// `*`
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    Name(NameTest),
    Kind(KindTest),
}

impl NodeTest {
    pub fn name(lexical: &str) -> Self {
        if lexical == "*" {
            NodeTest::Name(NameTest::Any)
        } else {
            NodeTest::Name(NameTest::QName(QName::parse_lexical(lexical)))
        }
    }
}

impl fmt::Display for KindTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KindTest::AnyKind => f.write_str("node()"),
            KindTest::Document => f.write_str("document-node()"),
            KindTest::Element(None) => f.write_str("element()"),
            KindTest::Element(Some(n)) => write!(f, "element({n})"),
            KindTest::Attribute(None) => f.write_str("attribute()"),
            KindTest::Attribute(Some(n)) => write!(f, "attribute({n})"),
            KindTest::Text => f.write_str("text()"),
            KindTest::Comment => f.write_str("comment()"),
            KindTest::ProcessingInstruction(None) => f.write_str("processing-instruction()"),
            KindTest::ProcessingInstruction(Some(t)) => write!(f, "processing-instruction({t})"),
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::Kind(k) => fmt::Display::fmt(k, f),
            ItemType::Item => f.write_str("item()"),
            ItemType::Atomic(q) => fmt::Display::fmt(q, f),
        }
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceType::EmptySequence => f.write_str("empty-sequence()"),
            SequenceType::Typed { item, occ } => write!(f, "{item}{}", occ.suffix()),
        }
    }
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTest::Name(NameTest::Any) => f.write_str("*"),
            NodeTest::Name(NameTest::QName(q)) => fmt::Display::fmt(q, f),
            NodeTest::Kind(k) => fmt::Display::fmt(k, f),
        }
    }
}
