//! Structural edits through the mutation service.

use crate::integration::test_utils::{Harness, USER};
use serde_json::json;
use study_tree::notification::UpdateType;
use study_tree::status::BuildStatus;
use study_tree::tree::{InsertMode, NewNode};
use study_tree::ApiError;

#[test]
fn security_node_cannot_precede_root_level_construction() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let before = h.study.tree.read().len();

    let err = h
        .api
        .mutations()
        .insert(h.study_id(), NewNode::security("s1"), n1, InsertMode::Before, USER)
        .unwrap_err();

    assert!(matches!(err, ApiError::InvalidNodeInsertion(_)));
    assert!(err.is_forbidden());
    assert_eq!(h.study.tree.read().len(), before);
    assert_eq!(h.children(h.root()), vec![n1]);
}

#[test]
fn security_chain_below_construction_is_accepted() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let s1 = h.security(n1, "s1");
    let s2 = h.insert(NewNode::security("s2"), s1, InsertMode::After);

    assert_eq!(h.children(n1), vec![s1]);
    assert_eq!(h.children(s1), vec![s2]);
}

#[test]
fn insert_after_adopts_former_children() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let n2 = h.construction(n1, "n2");
    let n3 = h.construction(n1, "n3");

    let mid = h.insert(NewNode::construction("mid"), n1, InsertMode::After);

    assert_eq!(h.children(n1), vec![mid]);
    assert_eq!(h.children(mid), vec![n2, n3]);
}

#[test]
fn stash_without_cascade_requires_a_leaf() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    h.construction(n1, "n2");

    let err = h
        .api
        .mutations()
        .stash(h.study_id(), n1, false, USER)
        .unwrap_err();
    assert!(matches!(err, ApiError::NodeHasChildren(id) if id == n1));
    assert!(h.study.tree.read().is_live(n1));
}

#[test]
fn stash_and_restore_round_trip() {
    let mut h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let n2 = h.construction(n1, "n2");
    let other = h.construction(h.root(), "other");
    h.mark(n1, BuildStatus::Built);
    h.mark(n2, BuildStatus::Built);
    h.rx.drain_studies();

    let report = h
        .api
        .mutations()
        .stash(h.study_id(), n1, true, USER)
        .unwrap();
    assert_eq!(report.stashed, vec![n1, n2]);
    assert_eq!(report.invalidation.invalidated_on(h.rn), &[n1, n2]);
    assert!(!h.study.tree.read().is_live(n2));
    assert_eq!(h.children(h.root()), vec![other]);
    assert_eq!(h.updates_of(UpdateType::NodesStashed).len(), 1);

    let stashed = h.api.mutations().list_stashed(h.study_id()).unwrap();
    assert_eq!(stashed.len(), 1);
    assert_eq!(stashed[0].node.id, n1);
    assert_eq!(stashed[0].descendants, 1);

    let restored = h
        .api
        .mutations()
        .restore(h.study_id(), &[n1], other, USER)
        .unwrap();
    assert_eq!(restored, vec![n1, n2]);
    assert_eq!(h.children(other), vec![n1]);
    assert_eq!(h.children(n1), vec![n2]);
    assert!(h.study.tree.read().is_live(n2));
    assert!(!h.status(n1).is_built());
    assert!(h.api.mutations().list_stashed(h.study_id()).unwrap().is_empty());
}

#[test]
fn restoring_a_live_node_is_rejected() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");

    let err = h
        .api
        .mutations()
        .restore(h.study_id(), &[n1], h.root(), USER)
        .unwrap_err();
    assert!(matches!(err, ApiError::NodeNotStashed(id) if id == n1));
}

#[test]
fn stash_clears_alias_targets() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let n2 = h.construction(n1, "n2");
    h.api
        .create_alias(h.study_id(), "contingency base", Some(n2), USER)
        .unwrap();

    let report = h
        .api
        .mutations()
        .stash(h.study_id(), n1, true, USER)
        .unwrap();

    assert_eq!(report.cleared_aliases, vec!["contingency base".to_string()]);
    let aliases = h.api.list_aliases(h.study_id()).unwrap();
    assert_eq!(aliases.len(), 1);
    assert!(aliases[0].target.is_none());
    assert!(h
        .api
        .resolve_alias(h.study_id(), "contingency base")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn delete_reparents_children_in_place() {
    let h = Harness::new();
    let first = h.construction(h.root(), "first");
    let n1 = h.construction(h.root(), "n1");
    let last = h.construction(h.root(), "last");
    let c1 = h.construction(n1, "c1");
    let c2 = h.construction(n1, "c2");
    h.mark(n1, BuildStatus::Built);
    h.mark(c1, BuildStatus::Built);

    let report = h
        .api
        .mutations()
        .delete(h.study_id(), &[n1], false, USER)
        .unwrap();

    assert_eq!(report.deleted, vec![n1]);
    assert_eq!(h.children(h.root()), vec![first, c1, c2, last]);
    assert!(!h.status(c1).is_built());
    assert!(h.study.overlays.get(n1, h.rn).is_none());
    report.cleanup.wait().await;
    assert!(h.remote.calls().iter().any(|call| matches!(
        call,
        study_tree::remote::RemoteCall::DeleteGroup(_)
    )));
}

#[test]
fn delete_with_children_removes_the_subtree() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let n2 = h.construction(n1, "n2");

    let report = h
        .api
        .mutations()
        .delete(h.study_id(), &[n1], true, USER)
        .unwrap();

    let mut deleted = report.deleted.clone();
    deleted.sort();
    let mut expected = vec![n1, n2];
    expected.sort();
    assert_eq!(deleted, expected);
    assert!(h.children(h.root()).is_empty());
    assert!(!h.study.tree.read().contains(&n2));
}

#[test]
fn root_cannot_be_deleted_or_stashed() {
    let h = Harness::new();

    let err = h
        .api
        .mutations()
        .delete(h.study_id(), &[h.root()], true, USER)
        .unwrap_err();
    assert!(matches!(err, ApiError::RootMutationForbidden(_)));

    let err = h
        .api
        .mutations()
        .stash(h.study_id(), h.root(), true, USER)
        .unwrap_err();
    assert!(matches!(err, ApiError::RootMutationForbidden(_)));
}

#[test]
fn node_names_stay_unique() {
    let h = Harness::new();
    h.construction(h.root(), "n1");

    let err = h
        .api
        .mutations()
        .insert(h.study_id(), NewNode::construction("n1"), h.root(), InsertMode::Child, USER)
        .unwrap_err();
    assert!(matches!(err, ApiError::NodeNameInvalid(_)));
    assert_eq!(
        h.api.mutations().unique_node_name(h.study_id(), "n1").unwrap(),
        "n1 1"
    );
}

#[tokio::test]
async fn duplicate_subtree_copies_groups_and_renames() {
    let mut h = Harness::new();
    let a = h.construction(h.root(), "a");
    let b = h.construction(a, "b");
    let anchor = h.construction(h.root(), "anchor");
    h.rx.drain_studies();

    let copy = h
        .api
        .mutations()
        .duplicate_subtree(h.study_id(), a, anchor, USER)
        .await
        .unwrap();

    assert_eq!(copy.name, "a 1");
    assert_eq!(h.children(anchor), vec![copy.id]);
    let copied_child = h.children(copy.id)[0];
    assert_eq!(h.name(copied_child), "b 1");
    assert_ne!(h.group(copy.id), h.group(a));
    assert_ne!(h.group(copied_child), h.group(b));
    assert!(!h.status(copied_child).is_built());
    assert_eq!(h.updates_of(UpdateType::SubtreeDuplicated).len(), 1);
}

#[test]
fn move_subtree_invalidates_the_moved_nodes() {
    let mut h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let n2 = h.construction(n1, "n2");
    let other = h.construction(h.root(), "other");
    h.mark(n1, BuildStatus::Built);
    h.mark(n2, BuildStatus::Built);

    let report = h
        .api
        .mutations()
        .move_subtree(h.study_id(), n2, other, InsertMode::Child, USER)
        .unwrap();

    assert_eq!(report.invalidated_on(h.rn), &[n2]);
    assert_eq!(h.children(other), vec![n2]);
    assert!(h.children(n1).is_empty());
    assert!(h.status(n1).is_built());
    assert!(!h.status(n2).is_built());
    let moved = h.updates_of(UpdateType::NodeMoved);
    assert_eq!(moved.len(), 1);
    let payload = moved[0].payload.as_ref().unwrap();
    assert_eq!(payload["origin"], json!(n1));
    assert_eq!(payload["target"], json!(other));

    let err = h
        .api
        .mutations()
        .move_subtree(h.study_id(), other, n2, InsertMode::Child, USER)
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidNodeInsertion(_)));
}
