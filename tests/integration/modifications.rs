//! Modification list edits relayed to the modification service.

use crate::integration::test_utils::{Harness, USER};
use serde_json::json;
use study_tree::notification::UpdateType;
use study_tree::remote::ModificationAction;
use study_tree::status::BuildStatus;
use study_tree::types::NodeId;
use study_tree::ApiError;
use uuid::Uuid;

async fn create(h: &Harness, node: NodeId, kind: &str) -> Uuid {
    h.api
        .modifications()
        .create_modification(h.study_id(), node, json!({ "type": kind }), USER)
        .await
        .unwrap()
        .0
}

#[tokio::test]
async fn create_is_bracketed_by_update_notifications() {
    let mut h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    h.rx.drain_studies();

    let id = create(&h, n1, "LOAD_MODIFICATION").await;

    let updates = h.rx.drain_studies();
    let started = updates
        .iter()
        .position(|u| u.update_type == UpdateType::UpdateStarted)
        .unwrap();
    let finished = updates
        .iter()
        .position(|u| u.update_type == UpdateType::UpdateFinished)
        .unwrap();
    assert!(started < finished);
    assert_eq!(updates[started].node_ids, vec![n1]);
    assert_eq!(
        h.api
            .modifications()
            .list_modifications(h.study_id(), n1)
            .await
            .unwrap(),
        vec![id]
    );
}

#[tokio::test]
async fn root_has_no_modification_list() {
    let h = Harness::new();

    let err = h
        .api
        .modifications()
        .create_modification(h.study_id(), h.root(), json!({}), USER)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::RootMutationForbidden(_)));
}

#[tokio::test]
async fn reorder_and_delete_edit_the_group() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let first = create(&h, n1, "LINE_CREATION").await;
    let second = create(&h, n1, "LOAD_CREATION").await;

    h.api
        .modifications()
        .reorder_modification(h.study_id(), n1, second, Some(first), USER)
        .await
        .unwrap();
    assert_eq!(h.remote.group(h.group(n1)), vec![second, first]);

    h.mark(n1, BuildStatus::Built);
    let report = h
        .api
        .modifications()
        .delete_modifications(h.study_id(), n1, &[second], USER)
        .await
        .unwrap();
    assert_eq!(report.invalidated_on(h.rn), &[n1]);
    assert_eq!(h.remote.group(h.group(n1)), vec![first]);

    let err = h
        .api
        .modifications()
        .delete_modifications(h.study_id(), n1, &[], USER)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
}

#[tokio::test]
async fn moving_modifications_invalidates_target_and_origin_descendants() {
    let h = Harness::new();
    let a = h.construction(h.root(), "a");
    let a_child = h.construction(a, "a child");
    let b = h.construction(h.root(), "b");
    let moved = create(&h, a, "GENERATOR_CREATION").await;
    h.mark(a, BuildStatus::Built);
    h.mark(a_child, BuildStatus::Built);

    let report = h
        .api
        .modifications()
        .move_modifications(h.study_id(), a, b, &[moved], ModificationAction::Move, USER)
        .await
        .unwrap();

    assert_eq!(report.target_modifications, vec![moved]);
    assert!(h.remote.group(h.group(a)).is_empty());
    assert_eq!(h.status(b).local, BuildStatus::NotBuilt);
    assert!(h.status(a).is_built());
    assert_eq!(h.status(a_child).local, BuildStatus::NotBuilt);
    let mut invalidated = report.invalidation.invalidated_on(h.rn).to_vec();
    invalidated.sort();
    let mut expected = vec![b, a_child];
    expected.sort();
    assert_eq!(invalidated, expected);
}

#[tokio::test]
async fn copying_modifications_keeps_the_origin_built() {
    let h = Harness::new();
    let a = h.construction(h.root(), "a");
    let a_child = h.construction(a, "a child");
    let b = h.construction(h.root(), "b");
    let copied = create(&h, a, "GENERATOR_CREATION").await;
    h.mark(a, BuildStatus::Built);
    h.mark(a_child, BuildStatus::Built);
    h.mark(b, BuildStatus::Built);

    let report = h
        .api
        .modifications()
        .move_modifications(h.study_id(), a, b, &[copied], ModificationAction::Copy, USER)
        .await
        .unwrap();

    assert_eq!(report.invalidation.invalidated_on(h.rn), &[b]);
    assert!(h.status(a_child).is_built());
    assert_eq!(h.remote.group(h.group(a)), vec![copied]);
    assert_eq!(h.remote.group(h.group(b)).len(), 1);
}
