use rstest::rstest;
use std::sync::Arc;
use std::thread;
use treequery_dtm::simple::{doc, elem, text};
use treequery_dtm::{ManagerConfig, Source, TreeModelManager};

fn named(i: usize) -> Source {
    doc().child(elem("doc").child(text(&i.to_string()))).into_source(format!("urn:doc:{i}"))
}

#[rstest]
fn concurrent_create_of_one_document_yields_one_canonical_instance() {
    let manager = TreeModelManager::with_defaults();
    let ids: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8).map(|_| s.spawn(|| manager.create(&named(1), false).unwrap().id())).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(manager.live_count(), 1);
}

#[rstest]
fn concurrent_create_and_release_keep_pool_consistent() {
    let manager = Arc::new(TreeModelManager::new(ManagerConfig::builder().with_pool_capacity(4).build()).unwrap());
    thread::scope(|s| {
        for t in 0..6 {
            let manager = manager.clone();
            s.spawn(move || {
                for round in 0..50 {
                    let source = named((t + round) % 10);
                    let unique = round % 3 == 0;
                    let model = manager.create(&source, unique).unwrap();
                    if unique {
                        // nobody else can release a unique instance
                        let owner = manager.owner_of(model.document()).unwrap();
                        assert_eq!(owner.id(), model.id());
                    }
                    manager.release(&model, round % 7 == 0);
                }
            });
        }
    });
    assert!(manager.pooled_count() <= 4);
}
