//! Build acceptance, dispatch, result handling and cancellation.

use crate::integration::test_utils::{Harness, USER};
use study_tree::build::{
    build_result_channel, BuildResult, BuildResultListener, BuildResultMessage, BuildTicket,
    ResultDisposition,
};
use study_tree::notification::UpdateType;
use study_tree::remote::RemoteCall;
use study_tree::status::{ApplicationOutcome, ApplicationStatus, BuildStatus};
use study_tree::ApiError;

fn succeeded(h: &Harness, ticket: &BuildTicket, outcome: ApplicationOutcome) -> BuildResultMessage {
    BuildResultMessage {
        build_id: ticket.build.build_id,
        study_id: h.study_id(),
        node_id: ticket.build.node_id,
        root_network_id: ticket.build.root_network_id,
        result: BuildResult::Succeeded {
            outcome,
            impacted_element_ids: vec!["LINE-1".to_string()],
        },
    }
}

#[test]
fn plan_replays_from_nearest_built_ancestor() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let n2 = h.construction(n1, "n2");
    h.mark(n1, BuildStatus::Built);

    let plan = h.builds().plan(h.study_id(), n2, h.rn).unwrap();

    let v1 = h.study.overlays.get(n1, h.rn).unwrap().variant_id;
    let v2 = h.study.overlays.get(n2, h.rn).unwrap().variant_id.unwrap();
    assert_eq!(plan.origin_node, n1);
    assert_eq!(plan.origin_variant, v1);
    assert_eq!(plan.destination_variant, v2);
    assert_eq!(plan.group_refs(), vec![h.group(n2)]);
}

#[test]
fn plan_from_root_replays_the_whole_chain() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let n2 = h.construction(n1, "n2");
    let n3 = h.construction(n2, "n3");

    let plan = h.builds().plan(h.study_id(), n3, h.rn).unwrap();

    assert_eq!(plan.origin_node, h.root());
    assert!(plan.origin_variant.is_none());
    assert_eq!(
        plan.group_refs(),
        vec![h.group(n1), h.group(n2), h.group(n3)]
    );
}

#[tokio::test]
async fn build_success_marks_node_built() {
    let mut h = Harness::new();
    let n1 = h.construction(h.root(), "n1");

    let ticket = h.builds().build(h.study_id(), n1, h.rn, USER).await.unwrap();
    assert_eq!(h.status(n1).local, BuildStatus::Building);
    ticket_dispatched(&h, &ticket).await;

    let disposition = h
        .builds()
        .on_build_result(succeeded(&h, &ticket, ApplicationOutcome::all_ok()))
        .unwrap();

    assert!(matches!(disposition, ResultDisposition::Applied(s) if s.is_built()));
    assert_eq!(h.status(n1).local, BuildStatus::Built);
    assert!(!h.study.build_slot.is_busy());
    assert_eq!(h.updates_of(UpdateType::BuildCompleted).len(), 1);
}

async fn ticket_dispatched(h: &Harness, ticket: &BuildTicket) {
    for _ in 0..50 {
        if h
            .remote
            .build_requests()
            .iter()
            .any(|request| request.build_id == ticket.build.build_id)
        {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("build {} never reached the build service", ticket.build.build_id);
}

#[tokio::test]
async fn second_build_in_the_study_is_refused() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let n2 = h.construction(h.root(), "n2");

    let _ticket = h.builds().build(h.study_id(), n1, h.rn, USER).await.unwrap();
    let err = h
        .builds()
        .build(h.study_id(), n2, h.rn, USER)
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::BuildInProgress { node_id, .. } if node_id == n1));
    assert_eq!(h.status(n2).local, BuildStatus::NotBuilt);
}

#[tokio::test]
async fn built_node_is_not_rebuilt() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    h.mark(n1, BuildStatus::BuiltWithWarning);

    let err = h
        .builds()
        .build(h.study_id(), n1, h.rn, USER)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NodeAlreadyBuilt(id) if id == n1));
}

#[tokio::test]
async fn warnings_in_the_replayed_chain_reach_global_status() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");

    let ticket = h.builds().build(h.study_id(), n1, h.rn, USER).await.unwrap();
    let outcome = ApplicationOutcome {
        local: ApplicationStatus::AllOk,
        global: ApplicationStatus::WithWarnings,
    };
    h.builds()
        .on_build_result(succeeded(&h, &ticket, outcome))
        .unwrap();

    let status = h.status(n1);
    assert_eq!(status.local, BuildStatus::Built);
    assert_eq!(status.global, BuildStatus::BuiltWithWarning);
}

#[tokio::test]
async fn stopped_build_ignores_late_result() {
    let mut h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let ticket = h.builds().build(h.study_id(), n1, h.rn, USER).await.unwrap();

    assert!(h
        .builds()
        .stop_build(h.study_id(), n1, h.rn, USER)
        .await
        .unwrap());
    assert_eq!(h.status(n1).local, BuildStatus::NotBuilt);
    assert_eq!(h.updates_of(UpdateType::BuildCancelled).len(), 1);

    let disposition = h
        .builds()
        .on_build_result(succeeded(&h, &ticket, ApplicationOutcome::all_ok()))
        .unwrap();
    assert_eq!(disposition, ResultDisposition::Superseded);
    assert_eq!(h.status(n1).local, BuildStatus::NotBuilt);
}

#[tokio::test]
async fn stopping_an_idle_node_is_a_no_op() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");

    assert!(!h
        .builds()
        .stop_build(h.study_id(), n1, h.rn, USER)
        .await
        .unwrap());
}

#[tokio::test]
async fn explicit_building_is_refused() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let n2 = h.construction(h.root(), "n2");

    let err = h
        .builds()
        .set_build_status(h.study_id(), n1, h.rn, BuildStatus::Building)
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
    assert_eq!(h.status(n1).local, BuildStatus::NotBuilt);

    let _ticket = h.builds().build(h.study_id(), n2, h.rn, USER).await.unwrap();
    assert_eq!(h.status(n1).local, BuildStatus::NotBuilt);
    assert_eq!(h.status(n2).local, BuildStatus::Building);
}

#[tokio::test]
async fn explicit_reset_releases_the_running_build() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let n2 = h.construction(h.root(), "n2");
    let ticket = h.builds().build(h.study_id(), n1, h.rn, USER).await.unwrap();
    ticket_dispatched(&h, &ticket).await;

    h.mark(n1, BuildStatus::NotBuilt);
    assert!(!h.study.build_slot.is_busy());

    let second = h.builds().build(h.study_id(), n2, h.rn, USER).await.unwrap();
    let disposition = h
        .builds()
        .on_build_result(succeeded(&h, &ticket, ApplicationOutcome::all_ok()))
        .unwrap();
    assert_eq!(disposition, ResultDisposition::Superseded);
    assert_eq!(h.status(n1).local, BuildStatus::NotBuilt);
    assert_eq!(h.study.build_slot.current().unwrap().build_id, second.build.build_id);

    let stopped = RemoteCall::StopBuild(ticket.build.build_id);
    for _ in 0..50 {
        if h.remote.calls().contains(&stopped) {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("build {} was never stopped remotely", ticket.build.build_id);
}

#[tokio::test]
async fn explicit_outcome_on_a_building_node_supersedes_its_build() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let ticket = h.builds().build(h.study_id(), n1, h.rn, USER).await.unwrap();

    let outcome = ApplicationOutcome {
        local: ApplicationStatus::WithWarnings,
        global: ApplicationStatus::WithWarnings,
    };
    let status = h
        .builds()
        .set_application_outcome(h.study_id(), n1, h.rn, outcome)
        .unwrap();
    assert_eq!(status.local, BuildStatus::BuiltWithWarning);
    assert!(!h.study.build_slot.is_busy());

    let failed = BuildResultMessage {
        result: BuildResult::Failed {
            error: "late failure".to_string(),
        },
        ..succeeded(&h, &ticket, ApplicationOutcome::all_ok())
    };
    assert_eq!(
        h.builds().on_build_result(failed).unwrap(),
        ResultDisposition::Superseded
    );
    assert_eq!(h.status(n1).local, BuildStatus::BuiltWithWarning);
}

#[tokio::test]
async fn quota_counts_built_nodes_on_the_root_network() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let n2 = h.construction(n1, "n2");
    h.mark(n1, BuildStatus::Built);
    h.remote.set_max_builds(Some(1));

    let err = h
        .builds()
        .build(h.study_id(), n2, h.rn, USER)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::MaxNodeBuildsExceeded { limit: 1, built: 1 }
    ));

    h.remote.set_profile_unreadable(true);
    assert!(h.builds().build(h.study_id(), n2, h.rn, USER).await.is_ok());
}

#[tokio::test]
async fn rejected_dispatch_resets_node_and_reports_failure() {
    let mut h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    h.remote
        .reject_builds(Some(r#"{"message":"network not found"}"#.to_string()));

    let ticket = h.builds().build(h.study_id(), n1, h.rn, USER).await.unwrap();
    ticket.dispatched.await.unwrap();

    assert_eq!(h.status(n1).local, BuildStatus::NotBuilt);
    assert!(!h.study.build_slot.is_busy());
    let failures = h.updates_of(UpdateType::BuildFailed);
    assert_eq!(failures.len(), 1);
    assert_eq!(
        failures[0].payload.as_ref().unwrap()["error"],
        "network not found"
    );
}

#[tokio::test]
async fn failed_result_resets_node() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let ticket = h.builds().build(h.study_id(), n1, h.rn, USER).await.unwrap();

    let disposition = h
        .builds()
        .on_build_result(BuildResultMessage {
            build_id: ticket.build.build_id,
            study_id: h.study_id(),
            node_id: n1,
            root_network_id: h.rn,
            result: BuildResult::Failed {
                error: String::new(),
            },
        })
        .unwrap();

    assert!(matches!(disposition, ResultDisposition::Applied(s) if !s.is_built()));
    assert_eq!(h.status(n1).local, BuildStatus::NotBuilt);
}

#[tokio::test]
async fn listener_applies_results_from_the_channel() {
    let h = Harness::new();
    let n1 = h.construction(h.root(), "n1");
    let ticket = h.builds().build(h.study_id(), n1, h.rn, USER).await.unwrap();

    let (tx, rx) = build_result_channel();
    let listener = BuildResultListener::spawn(h.builds().clone(), rx);
    tx.send(succeeded(&h, &ticket, ApplicationOutcome::all_ok()))
        .unwrap();
    drop(tx);
    listener.await.unwrap();

    assert_eq!(h.status(n1).local, BuildStatus::Built);
    assert!(!h.study.build_slot.is_busy());
}

#[tokio::test]
async fn builds_on_other_root_networks_are_independent() {
    let h = Harness::with_root_networks(&["winter", "summer"]);
    let summer = h.study.root_network_ids()[1];
    let n1 = h.construction(h.root(), "n1");

    let ticket = h.builds().build(h.study_id(), n1, h.rn, USER).await.unwrap();
    h.builds()
        .on_build_result(succeeded(&h, &ticket, ApplicationOutcome::all_ok()))
        .unwrap();

    assert!(h.status(n1).is_built());
    assert!(!h
        .study
        .overlays
        .build_status(n1, summer)
        .unwrap()
        .is_built());
    assert_eq!(
        h.builds().plan(h.study_id(), n1, summer).unwrap().origin_node,
        h.root()
    );
}
