//! Invalidation triggered by modification edits and structural changes.

use crate::integration::test_utils::{Harness, USER};
use serde_json::json;
use std::collections::BTreeSet;
use study_tree::notification::UpdateType;
use study_tree::remote::RemoteCall;
use study_tree::status::BuildStatus;
use study_tree::types::ComputationType;
use uuid::Uuid;

async fn modification_on(h: &Harness, node: study_tree::types::NodeId) -> Uuid {
    let (id, _) = h
        .api
        .modifications()
        .create_modification(h.study_id(), node, json!({ "type": "LINE_CREATION" }), USER)
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn editing_a_node_resets_its_built_subtree_once() {
    let mut h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let n2 = h.construction(n1, "n2");
    let n3 = h.construction(n2, "n3");
    let modification = modification_on(&h, n1).await;
    for node in [n1, n2, n3] {
        h.mark(node, BuildStatus::Built);
    }
    h.rx.drain_studies();

    let report = h
        .api
        .modifications()
        .update_modification(h.study_id(), n1, modification, json!({ "r": 2.5 }), USER)
        .await
        .unwrap();

    let updates = h.updates_of(UpdateType::NodeBuildStatusUpdated);
    assert_eq!(updates.len(), 1);
    let notified: BTreeSet<_> = updates[0].node_ids.iter().copied().collect();
    assert_eq!(notified, BTreeSet::from([n1, n2, n3]));
    assert_eq!(report.invalidated_on(h.rn), &[n1, n2, n3]);
    for node in [n1, n2, n3] {
        assert_eq!(h.status(node).local, BuildStatus::NotBuilt);
    }
}

#[tokio::test]
async fn idle_descendants_are_left_alone() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let idle = h.construction(n1, "idle");
    let below = h.construction(idle, "below");
    let modification = modification_on(&h, n1).await;
    h.mark(n1, BuildStatus::Built);
    h.mark(below, BuildStatus::Built);
    let n1_result = Uuid::new_v4();
    let below_result = Uuid::new_v4();
    h.api
        .set_computation_result(
            h.study_id(),
            n1,
            h.rn,
            ComputationType::Loadflow,
            n1_result,
            None,
            USER,
        )
        .unwrap();
    h.api
        .set_computation_result(
            h.study_id(),
            below,
            h.rn,
            ComputationType::SecurityAnalysis,
            below_result,
            None,
            USER,
        )
        .unwrap();
    h.remote.clear_calls();

    let report = h
        .api
        .modifications()
        .update_modification(h.study_id(), n1, modification, json!({ "p": 10 }), USER)
        .await
        .unwrap();
    assert_eq!(report.invalidated_on(h.rn), &[n1, below]);
    report.cleanup.wait().await;

    let mut deleted = h.remote.deleted_results();
    deleted.sort();
    let mut expected = vec![n1_result, below_result];
    expected.sort();
    assert_eq!(deleted, expected);
    assert!(h
        .api
        .computation_result(h.study_id(), below, h.rn, ComputationType::SecurityAnalysis)
        .unwrap()
        .is_none());
    assert_eq!(h.status(idle).local, BuildStatus::NotBuilt);
}

#[tokio::test]
async fn failed_edit_invalidates_nothing() {
    let mut h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    h.mark(n1, BuildStatus::Built);
    h.rx.drain_studies();

    let err = h
        .api
        .modifications()
        .update_modification(h.study_id(), n1, Uuid::new_v4(), json!({}), USER)
        .await
        .unwrap_err();

    assert!(matches!(err, study_tree::ApiError::BadRequest(_)));
    assert!(h.status(n1).is_built());
    let finished = h.updates_of(UpdateType::UpdateFinished);
    assert_eq!(finished.len(), 1);
    assert!(finished[0].payload.as_ref().unwrap().get("error").is_some());
}

#[tokio::test]
async fn invalidation_cancels_the_running_build() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let n2 = h.construction(n1, "n2");
    let modification = modification_on(&h, n1).await;
    let ticket = h.builds().build(h.study_id(), n2, h.rn, USER).await.unwrap();
    ticket.dispatched.await.unwrap();

    let report = h
        .api
        .modifications()
        .update_modification(h.study_id(), n1, modification, json!({}), USER)
        .await
        .unwrap();
    report.cleanup.wait().await;

    assert_eq!(report.cancelled_builds.len(), 1);
    assert_eq!(report.cancelled_builds[0].node_id, n2);
    assert!(!h.study.build_slot.is_busy());
    assert_eq!(h.status(n2).local, BuildStatus::NotBuilt);
    assert!(h
        .remote
        .calls()
        .contains(&RemoteCall::StopBuild(ticket.build.build_id)));
}

#[test]
fn excluding_modifications_only_touches_one_root_network() {
    let h = Harness::with_root_networks(&["winter", "summer"]);
    let summer = h.study.root_network_ids()[1];
    let n1 = h.construction(h.root(), "n1");
    h.mark(n1, BuildStatus::Built);
    h.builds()
        .set_build_status(h.study_id(), n1, summer, BuildStatus::Built)
        .unwrap();
    let excluded = BTreeSet::from([Uuid::new_v4()]);

    let report = h
        .api
        .modifications()
        .set_excluded_modifications(h.study_id(), n1, h.rn, excluded.clone(), USER)
        .unwrap();
    assert_eq!(report.invalidated_on(h.rn), &[n1]);
    assert!(report.invalidated_on(summer).is_empty());
    assert!(h.study.overlays.build_status(n1, summer).unwrap().is_built());

    let unchanged = h
        .api
        .modifications()
        .set_excluded_modifications(h.study_id(), n1, h.rn, excluded, USER)
        .unwrap();
    assert!(unchanged.is_empty());
}
