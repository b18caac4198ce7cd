use std::sync::Arc;

use rstest::{fixture, rstest};
use treequery_dtm::simple::{attr, comment, doc, elem, pi, text};
use treequery_dtm::{DtmId, NodeHandle, TreeModel, TreeModelManager};
use treequery_xpath::{
    CachedSequence, Error, ErrorCode, KindMask, NodeFilter, XObject, XSequence, node_iterator, single_node,
};

struct Shelf {
    manager: TreeModelManager,
    model: Arc<TreeModel>,
}

impl Shelf {
    fn describe(&self, seq: &mut dyn XSequence) -> Vec<String> {
        seq.materialize()
            .unwrap()
            .into_iter()
            .map(|item| {
                let node = item.as_node().unwrap();
                match self.model.name(node).unwrap() {
                    Some(q) => q.local,
                    None => format!("{:?}:{}", self.model.kind(node).unwrap(), self.model.string_value(node).unwrap()),
                }
            })
            .collect()
    }

    fn shelf_element(&self) -> NodeHandle {
        self.model.children(self.model.document()).unwrap()[0]
    }
}

#[fixture]
fn shelf() -> Shelf {
    // <shelf kind="fiction"><book>Dune</book><!--gap--><book>Momo</book><?sort asc?></shelf>
    let manager = TreeModelManager::with_defaults();
    let source = doc()
        .child(
            elem("shelf")
                .attr(attr("kind", "fiction"))
                .child(elem("book").child(text("Dune")))
                .child(comment("gap"))
                .child(elem("book").child(text("Momo")))
                .child(pi("sort", "asc")),
        )
        .into_source("urn:test:shelf");
    let model = manager.create(&source, false).unwrap();
    Shelf { manager, model }
}

#[rstest]
#[case::elements(KindMask::ELEMENT, vec!["shelf", "book", "book"])]
#[case::text_and_comments(KindMask::TEXT | KindMask::COMMENT, vec!["Text:Dune", "Comment:gap", "Text:Momo"])]
#[case::document_only(KindMask::DOCUMENT, vec!["Document:DuneMomo"])]
#[case::nothing(KindMask::NONE, vec![])]
fn walk_shows_only_masked_kinds(shelf: Shelf, #[case] mask: KindMask, #[case] expected: Vec<&str>) {
    let mut walk = node_iterator(&shelf.manager, shelf.model.document(), mask).unwrap();
    assert_eq!(shelf.describe(&mut walk), expected);
}

#[rstest]
fn walk_covers_root_and_descendants_in_document_order(shelf: Shelf) {
    let walk = node_iterator(&shelf.manager, shelf.shelf_element(), KindMask::ALL).unwrap();
    let nodes: Vec<NodeHandle> =
        walk.boxed_clone().materialize().unwrap().iter().filter_map(XObject::as_node).collect();
    assert_eq!(nodes.first(), Some(&shelf.shelf_element()));
    assert_eq!(nodes.len(), 7);
    assert!(nodes.windows(2).all(|w| w[0] < w[1]));
    // attributes are not part of the walk
    let names = shelf.describe(walk.boxed_clone().as_mut());
    assert!(!names.iter().any(|n| n == "kind"));
    assert_eq!(names.last().map(String::as_str), Some("sort"));
}

#[rstest]
fn filter_narrows_the_masked_nodes(shelf: Shelf) {
    let long_text: NodeFilter = Arc::new(|model: &TreeModel, node: NodeHandle| -> Result<bool, Error> {
        Ok(model.string_value(node)?.len() > 4)
    });
    let mut walk = node_iterator(&shelf.manager, shelf.model.document(), KindMask::ELEMENT | KindMask::DOCUMENT)
        .unwrap()
        .with_filter(long_text);
    assert_eq!(shelf.describe(&mut walk), ["Document:DuneMomo", "shelf"]);
}

#[rstest]
fn walk_is_forward_only_and_restartable(shelf: Shelf) {
    let mut walk = node_iterator(&shelf.manager, shelf.model.document(), KindMask::ELEMENT).unwrap();
    assert!(!walk.is_cached());
    assert!(walk.next().unwrap().is_some());
    assert_eq!(walk.previous().unwrap_err().code, ErrorCode::TQSQ0001);
    let mut copy = walk.boxed_clone();
    assert_eq!(shelf.describe(copy.as_mut()), ["shelf", "book", "book"]);
    assert_eq!(shelf.describe(&mut walk), ["book", "book"]);
    assert!(walk.next().unwrap().is_none());
    assert!(walk.next().unwrap().is_none());
    walk.reset();
    assert_eq!(shelf.describe(&mut walk), ["shelf", "book", "book"]);

    let mut cached = CachedSequence::new(walk.boxed_clone());
    assert!(cached.next().unwrap().is_some());
    assert!(cached.previous().unwrap().is_some());
}

#[rstest]
fn unknown_roots_are_rejected(shelf: Shelf) {
    let err = node_iterator(&shelf.manager, NodeHandle::new(DtmId(77), 0), KindMask::ALL).unwrap_err();
    assert_eq!(err.code, ErrorCode::TQDM0002);
}

#[rstest]
fn single_node_holds_exactly_one_node(shelf: Shelf) {
    let node = shelf.shelf_element();
    let mut one = single_node(node);
    assert_eq!(one.next().unwrap().and_then(|v| v.as_node()), Some(node));
    assert!(one.next().unwrap().is_none());
    assert_eq!(one.previous().unwrap().and_then(|v| v.as_node()), Some(node));
    one.reset();
    assert_eq!(shelf.describe(&mut one), ["shelf"]);
}
