//! Runtime values.
use core::fmt;

use treequery_dtm::{NodeHandle, QName};

use crate::sequence::{VecSequence, XSequence};

pub const FNS: &str = "http://www.w3.org/2005/xpath-functions";
pub const XS: &str = "http://www.w3.org/2001/XMLSchema";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpandedName {
    pub ns_uri: Option<String>,
    pub local: String,
}

impl ExpandedName {
    pub fn new(ns_uri: Option<String>, local: impl Into<String>) -> Self {
        Self { ns_uri, local: local.into() }
    }

    pub fn local(local: impl Into<String>) -> Self {
        Self::new(None, local)
    }
}

impl From<&QName> for ExpandedName {
    fn from(q: &QName) -> Self {
        let ns_uri = match (&q.ns_uri, q.prefix.as_deref()) {
            (Some(ns), _) => Some(ns.clone()),
            (None, Some("fn")) => Some(FNS.to_string()),
            (None, Some("xs")) => Some(XS.to_string()),
            _ => None,
        };
        Self { ns_uri, local: q.local.clone() }
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns_uri {
            Some(ns) => write!(f, "Q{{{ns}}}{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// A runtime value. Everything but `Sequence` is immutable; a sequence carries cursor
/// state, and cloning it yields a fresh cursor over the same producer.
pub enum XObject {
    String(String),
    Number(f64),
    Boolean(bool),
    Node(NodeHandle),
    Sequence(Box<dyn XSequence>),
}

impl Clone for XObject {
    fn clone(&self) -> Self {
        match self {
            XObject::String(s) => XObject::String(s.clone()),
            XObject::Number(n) => XObject::Number(*n),
            XObject::Boolean(b) => XObject::Boolean(*b),
            XObject::Node(h) => XObject::Node(*h),
            XObject::Sequence(s) => XObject::Sequence(s.boxed_clone()),
        }
    }
}

impl fmt::Debug for XObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XObject::String(s) => f.debug_tuple("String").field(s).finish(),
            XObject::Number(n) => f.debug_tuple("Number").field(n).finish(),
            XObject::Boolean(b) => f.debug_tuple("Boolean").field(b).finish(),
            XObject::Node(h) => f.debug_tuple("Node").field(h).finish(),
            XObject::Sequence(s) => {
                f.debug_struct("Sequence").field("cached", &s.is_cached()).field("size_hint", &s.size_hint()).finish()
            }
        }
    }
}

impl XObject {
    /// The empty sequence.
    pub fn empty() -> Self {
        XObject::Sequence(Box::new(VecSequence::empty()))
    }

    pub fn sequence(items: Vec<XObject>) -> Self {
        XObject::Sequence(Box::new(VecSequence::new(items)))
    }

    /// True for sequence values, which consumers iterate instead of using directly.
    pub fn is_sequence_proper(&self) -> bool {
        matches!(self, XObject::Sequence(_))
    }

    pub fn is_node(&self) -> bool {
        matches!(self, XObject::Node(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            XObject::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            XObject::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            XObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeHandle> {
        match self {
            XObject::Node(h) => Some(*h),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            XObject::String(_) => "xs:string",
            XObject::Number(_) => "xs:double",
            XObject::Boolean(_) => "xs:boolean",
            XObject::Node(_) => "node()",
            XObject::Sequence(_) => "item()*",
        }
    }
}

impl From<String> for XObject {
    fn from(s: String) -> Self {
        XObject::String(s)
    }
}

impl From<&str> for XObject {
    fn from(s: &str) -> Self {
        XObject::String(s.to_string())
    }
}

impl From<f64> for XObject {
    fn from(n: f64) -> Self {
        XObject::Number(n)
    }
}

impl From<i64> for XObject {
    fn from(n: i64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        XObject::Number(n as f64)
    }
}

impl From<bool> for XObject {
    fn from(b: bool) -> Self {
        XObject::Boolean(b)
    }
}

impl From<NodeHandle> for XObject {
    fn from(h: NodeHandle) -> Self {
        XObject::Node(h)
    }
}

impl From<Vec<XObject>> for XObject {
    fn from(items: Vec<XObject>) -> Self {
        XObject::sequence(items)
    }
}

/// XPath string form of a number: integral values print without a fraction.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e18 {
        #[allow(clippy::cast_possible_truncation)]
        let i = n as i64;
        i.to_string()
    } else {
        n.to_string()
    }
}

/// XPath number conversion of a string: surrounding whitespace is ignored, anything that
/// is not a plain decimal number is NaN.
pub fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    let body = t.strip_prefix('-').unwrap_or(t);
    let valid = !body.is_empty()
        && body.chars().all(|c| c.is_ascii_digit() || c == '.')
        && body.chars().filter(|&c| c == '.').count() <= 1
        && body != ".";
    if valid { t.parse().unwrap_or(f64::NAN) } else { f64::NAN }
}
