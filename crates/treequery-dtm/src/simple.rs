//! Ergonomic builders for small documents, used by tests and demos.
//!
//! The builders do not construct a tree themselves; they record the build events an
//! external parser would report, so the resulting tree goes through the same
//! [`TreeBuilder`](crate::builder) path as any other source.
//!
//! ```
//! use treequery_dtm::simple::{attr, doc, elem, id_attr, text};
//! use treequery_dtm::TreeModelManager;
//!
//! // <root id="r"><child xml:id="c1">Hello</child><child world="yes"/></root>
//! let source = doc()
//!     .child(
//!         elem("root")
//!             .attr(attr("id", "r"))
//!             .child(elem("child").attr(id_attr("xml:id", "c1")).child(text("Hello")))
//!             .child(elem("child").attr(attr("world", "yes"))),
//!     )
//!     .into_source("urn:example:simple");
//!
//! let manager = TreeModelManager::with_defaults();
//! let model = manager.create(&source, false).unwrap();
//! assert_eq!(model.string_value(model.document()).unwrap(), "Hello");
//! assert!(model.element_by_id("c1").is_some());
//! ```
use crate::builder::{AttributeEvent, BuildEvent, NamespaceEvent, RecordedEvents};
use crate::model::QName;
use crate::source::Source;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Element(ElementBuilder),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

impl From<ElementBuilder> for Content {
    fn from(e: ElementBuilder) -> Self {
        Content::Element(e)
    }
}

impl Content {
    fn record(self, out: &mut Vec<BuildEvent>) {
        match self {
            Content::Element(e) => e.record(out),
            Content::Text(t) => out.push(BuildEvent::Characters(t)),
            Content::Comment(c) => out.push(BuildEvent::Comment(c)),
            Content::ProcessingInstruction { target, data } => {
                out.push(BuildEvent::ProcessingInstruction { target, data });
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementBuilder {
    name: QName,
    attributes: Vec<AttributeEvent>,
    namespaces: Vec<NamespaceEvent>,
    children: Vec<Content>,
}

impl ElementBuilder {
    pub fn attr(mut self, attr: AttributeEvent) -> Self {
        self.attributes.push(attr);
        self
    }

    pub fn attrs<I: IntoIterator<Item = AttributeEvent>>(mut self, attrs: I) -> Self {
        self.attributes.extend(attrs);
        self
    }

    pub fn namespace(mut self, ns: NamespaceEvent) -> Self {
        self.namespaces.push(ns);
        self
    }

    pub fn child(mut self, child: impl Into<Content>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I, C>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Content>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    fn record(self, out: &mut Vec<BuildEvent>) {
        out.push(BuildEvent::StartElement {
            name: self.name,
            attributes: self.attributes,
            namespaces: self.namespaces,
        });
        for c in self.children {
            c.record(out);
        }
        out.push(BuildEvent::EndElement);
    }

    /// Events for this element alone, without document boundaries; suitable for
    /// appending to a fragment.
    pub fn events(self) -> RecordedEvents {
        let mut out = Vec::new();
        self.record(&mut out);
        RecordedEvents(out)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentBuilder {
    base_uri: Option<String>,
    entities: Vec<BuildEvent>,
    children: Vec<Content>,
}

impl DocumentBuilder {
    pub fn base_uri(mut self, uri: impl Into<String>) -> Self {
        self.base_uri = Some(uri.into());
        self
    }

    pub fn entity(mut self, decl: BuildEvent) -> Self {
        debug_assert!(matches!(decl, BuildEvent::UnparsedEntityDecl { .. }));
        self.entities.push(decl);
        self
    }

    pub fn child(mut self, child: impl Into<Content>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn build(self) -> RecordedEvents {
        let mut out = vec![BuildEvent::StartDocument { base_uri: self.base_uri }];
        out.extend(self.entities);
        for c in self.children {
            c.record(&mut out);
        }
        out.push(BuildEvent::EndDocument);
        RecordedEvents(out)
    }

    pub fn into_source(self, system_id: impl Into<String>) -> Source {
        self.into_anonymous_source().with_system_id(system_id)
    }

    /// Source without a system id: never shared, never pooled.
    pub fn into_anonymous_source(self) -> Source {
        Source::from_events(self.build().0)
    }
}

pub fn doc() -> DocumentBuilder {
    DocumentBuilder::default()
}

/// Element with a lexical name; an `xml:` prefix is bound to the XML namespace.
pub fn elem(name: &str) -> ElementBuilder {
    ElementBuilder {
        name: QName::parse_lexical(name),
        attributes: Vec::new(),
        namespaces: Vec::new(),
        children: Vec::new(),
    }
}

pub fn attr(name: &str, value: &str) -> AttributeEvent {
    AttributeEvent::new(QName::parse_lexical(name), value)
}

/// Attribute declared with type `ID`.
pub fn id_attr(name: &str, value: &str) -> AttributeEvent {
    AttributeEvent::id(QName::parse_lexical(name), value)
}

pub fn ns(prefix: &str, uri: &str) -> NamespaceEvent {
    NamespaceEvent { prefix: Some(prefix.to_string()), uri: uri.to_string() }
}

pub fn text(value: &str) -> Content {
    Content::Text(value.to_string())
}

pub fn comment(value: &str) -> Content {
    Content::Comment(value.to_string())
}

pub fn pi(target: &str, data: &str) -> Content {
    Content::ProcessingInstruction { target: target.to_string(), data: data.to_string() }
}

pub fn entity(name: &str, system_id: &str) -> BuildEvent {
    BuildEvent::UnparsedEntityDecl {
        name: name.to_string(),
        public_id: None,
        system_id: system_id.to_string(),
        notation: None,
    }
}
