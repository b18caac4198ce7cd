use rstest::{fixture, rstest};
use std::sync::Arc;
use treequery_dtm::simple::{attr, comment, doc, elem, entity, id_attr, pi, text};
use treequery_dtm::{
    AttributeEvent, BuildEvent, DtmError, NodeKind, QName, RecordedEvents, Source, TreeModel, TreeModelManager,
    compare_document_order,
};

#[fixture]
fn manager() -> TreeModelManager {
    TreeModelManager::with_defaults()
}

#[fixture]
fn library(manager: TreeModelManager) -> (TreeModelManager, Arc<TreeModel>) {
    // <library><book id="b1" xml:id="x1">Dune</book><!--c--><book id="b2">Emma</book><?pi data?></library>
    let source = doc()
        .base_uri("http://example.com/lib/catalog.xml")
        .entity(entity("cover", "img/cover.png"))
        .entity(entity("absolute", "file:///srv/a.png"))
        .child(
            elem("library")
                .child(elem("book").attr(id_attr("id", "b1")).attr(attr("xml:id", "x1")).child(text("Dune")))
                .child(comment("c"))
                .child(elem("book").attr(id_attr("id", " b2 ")).child(text("Emma")))
                .child(pi("pi", "data")),
        )
        .into_source("urn:test:library");
    let model = manager.create(&source, false).unwrap();
    (manager, model)
}

fn local(model: &TreeModel, node: treequery_dtm::NodeHandle) -> String {
    model.name(node).unwrap().map(|q| q.local).unwrap_or_default()
}

#[rstest]
fn navigation_follows_document_order(library: (TreeModelManager, Arc<TreeModel>)) {
    let (_m, model) = library;
    let root = model.document();
    assert_eq!(model.kind(root).unwrap(), NodeKind::Document);
    let lib = model.children(root).unwrap()[0];
    assert_eq!(local(&model, lib), "library");
    let kids = model.children(lib).unwrap();
    let kinds: Vec<NodeKind> = kids.iter().map(|&k| model.kind(k).unwrap()).collect();
    assert_eq!(
        kinds,
        vec![NodeKind::Element, NodeKind::Comment, NodeKind::Element, NodeKind::ProcessingInstruction]
    );
    assert!(kids.windows(2).all(|w| compare_document_order(w[0], w[1]).is_lt()));
    assert_eq!(model.next_sibling(kids[0]).unwrap(), Some(kids[1]));
    assert_eq!(model.previous_sibling(kids[0]).unwrap(), None);
    assert_eq!(model.parent(kids[2]).unwrap(), Some(lib));
    assert_eq!(model.string_value(lib).unwrap(), "DuneEmma");

    let attrs = model.attributes(kids[0]).unwrap();
    assert_eq!(attrs.len(), 2);
    // attributes sit between their element and its children
    assert!(attrs.iter().all(|&a| a > kids[0] && a < model.children(kids[0]).unwrap()[0]));
    assert_eq!(model.next_sibling(attrs[0]).unwrap(), None);
    assert_eq!(model.ancestors(attrs[0], false).unwrap(), vec![kids[0], lib, root]);
}

#[rstest]
fn descendants_exclude_attributes(library: (TreeModelManager, Arc<TreeModel>)) {
    let (_m, model) = library;
    let all = model.descendants(model.document(), false).unwrap();
    assert!(all.iter().all(|&n| model.kind(n).unwrap() != NodeKind::Attribute));
    assert_eq!(all.len(), 7);
    let mut sorted = all.clone();
    sorted.sort();
    assert_eq!(all, sorted);
}

#[rstest]
fn id_index_resolves_declared_and_xml_ids(library: (TreeModelManager, Arc<TreeModel>)) {
    let (_m, model) = library;
    assert_eq!(model.build_id_index(), 3);
    let b1 = model.element_by_id("b1").unwrap();
    assert_eq!(model.element_by_id("x1"), Some(b1));
    let b2 = model.element_by_id("b2").unwrap();
    assert_eq!(model.string_value(b2).unwrap(), "Emma");
    assert_eq!(model.element_by_id("missing"), None);
    // a second build is a no-op
    assert_eq!(model.build_id_index(), 3);
}

#[rstest]
fn plain_attribute_named_id_is_not_indexed(manager: TreeModelManager) {
    let source = doc().child(elem("a").attr(attr("id", "nope"))).into_anonymous_source();
    let model = manager.create(&source, false).unwrap();
    assert_eq!(model.element_by_id("nope"), None);
}

#[rstest]
fn unparsed_entities_resolve_against_base_uri(library: (TreeModelManager, Arc<TreeModel>)) {
    let (_m, model) = library;
    assert_eq!(model.unparsed_entity_uri("cover").as_deref(), Some("http://example.com/lib/img/cover.png"));
    assert_eq!(model.unparsed_entity_uri("absolute").as_deref(), Some("file:///srv/a.png"));
    assert_eq!(model.unparsed_entity_uri("nothing"), None);
    let names: Vec<String> = model.unparsed_entities().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["absolute", "cover"]);
}

#[rstest]
fn attribute_lookup_matches_namespace(library: (TreeModelManager, Arc<TreeModel>)) {
    let (_m, model) = library;
    let lib = model.children(model.document()).unwrap()[0];
    let book = model.children(lib).unwrap()[0];
    let xml_id = model.attribute(book, &QName::parse_lexical("xml:id")).unwrap().unwrap();
    assert_eq!(model.string_value(xml_id).unwrap(), "x1");
    assert_eq!(model.attribute(book, &QName::local("lang")).unwrap(), None);
}

#[rstest]
fn adjacent_characters_merge_into_one_text_node(manager: TreeModelManager) {
    let events = vec![
        BuildEvent::StartElement { name: QName::local("p"), attributes: vec![], namespaces: vec![] },
        BuildEvent::Characters("Hello, ".into()),
        BuildEvent::Characters(String::new()),
        BuildEvent::Characters("world".into()),
        BuildEvent::EndElement,
    ];
    let model = manager.create(&Source::from_events(events), false).unwrap();
    let p = model.children(model.document()).unwrap()[0];
    let texts = model.children(p).unwrap();
    assert_eq!(texts.len(), 1);
    assert_eq!(model.string_value(texts[0]).unwrap(), "Hello, world");
}

#[rstest]
#[case::unbalanced_end(vec![BuildEvent::EndElement])]
#[case::unclosed(vec![BuildEvent::StartElement { name: QName::local("a"), attributes: vec![], namespaces: vec![] }])]
#[case::late_start_document(vec![
    BuildEvent::Comment("x".into()),
    BuildEvent::StartDocument { base_uri: None },
])]
#[case::content_after_end(vec![BuildEvent::EndDocument, BuildEvent::Characters("x".into())])]
#[case::end_with_open_element(vec![
    BuildEvent::StartElement { name: QName::local("a"), attributes: vec![], namespaces: vec![] },
    BuildEvent::EndDocument,
])]
fn malformed_event_streams_are_rejected(manager: TreeModelManager, #[case] events: Vec<BuildEvent>) {
    let err = manager.create(&Source::from_events(events), false).unwrap_err();
    assert!(matches!(err, DtmError::MalformedEvents(_)), "got {err:?}");
    assert_eq!(manager.live_count(), 0);
}

#[rstest]
fn fragments_accept_appended_events(manager: TreeModelManager) {
    let frag = manager.create_fragment().unwrap();
    frag.append(&elem("a").child(text("one")).events()).unwrap();
    frag.append(&RecordedEvents(vec![
        BuildEvent::StartElement {
            name: QName::local("b"),
            attributes: vec![AttributeEvent::id(QName::local("key"), "k")],
            namespaces: vec![],
        },
        BuildEvent::EndElement,
    ]))
    .unwrap();
    let root = frag.document();
    assert_eq!(frag.kind(root).unwrap(), NodeKind::DocumentFragment);
    let kids = frag.children(root).unwrap();
    assert_eq!(kids.len(), 2);
    assert_eq!(frag.string_value(root).unwrap(), "one");
    assert!(manager.owner_of(kids[1]).is_ok());
}

#[rstest]
#[case::unclosed_element(vec![
    BuildEvent::StartElement { name: QName::local("a"), attributes: vec![], namespaces: vec![] },
    BuildEvent::Characters("x".into()),
])]
#[case::stray_end(vec![BuildEvent::Characters(" more".into()), BuildEvent::EndElement])]
#[case::entity_then_error(vec![
    BuildEvent::UnparsedEntityDecl { name: "e".into(), public_id: None, system_id: "e.png".into(), notation: None },
    BuildEvent::EndElement,
])]
fn failed_append_leaves_the_fragment_unchanged(manager: TreeModelManager, #[case] events: Vec<BuildEvent>) {
    let frag = manager.create_fragment().unwrap();
    frag.append(&RecordedEvents(vec![BuildEvent::Characters("kept".into())])).unwrap();
    let size = frag.size();

    let err = frag.append(&RecordedEvents(events)).unwrap_err();
    assert!(matches!(err, DtmError::MalformedEvents(_)), "got {err:?}");
    assert_eq!(frag.size(), size);
    let root = frag.document();
    assert_eq!(frag.children(root).unwrap().len(), 1);
    assert_eq!(frag.string_value(root).unwrap(), "kept");
    assert!(frag.unparsed_entities().is_empty());

    frag.append(&elem("b").child(text("next")).events()).unwrap();
    assert_eq!(frag.string_value(root).unwrap(), "keptnext");
}

#[rstest]
fn appended_ids_become_visible_after_an_earlier_lookup(manager: TreeModelManager) {
    let frag = manager.create_fragment().unwrap();
    frag.append(&elem("a").attr(id_attr("id", "first")).events()).unwrap();
    assert!(frag.element_by_id("first").is_some());
    assert_eq!(frag.element_by_id("k"), None);

    frag.append(&elem("b").attr(id_attr("id", "k")).child(text("late")).events()).unwrap();
    let k = frag.element_by_id("k").unwrap();
    assert_eq!(frag.string_value(k).unwrap(), "late");
    assert_eq!(frag.build_id_index(), 2);
}

#[rstest]
fn documents_reject_append(library: (TreeModelManager, Arc<TreeModel>)) {
    let (_m, model) = library;
    let err = model.append(&elem("x").events()).unwrap_err();
    assert!(matches!(err, DtmError::UnsupportedOperation(_)));
}
