//! Study snapshots saved to and loaded from the sled store.

use std::sync::Arc;
use study_tree::config::BuildConfig;
use study_tree::notification::NotificationBus;
use study_tree::remote::{InMemoryRemote, RemoteClients};
use study_tree::status::BuildStatus;
use study_tree::store::{SledStudyStore, SnapshotStore};
use study_tree::study::RootNetwork;
use study_tree::tree::{InsertMode, NewNode};
use study_tree::{ApiError, StorageError, StudyTreeApi};
use tempfile::TempDir;
use uuid::Uuid;

const USER: &str = "bob";

fn api_with_store(path: &std::path::Path) -> StudyTreeApi {
    let store: Arc<dyn SnapshotStore> = Arc::new(SledStudyStore::new(path).unwrap());
    StudyTreeApi::new(
        RemoteClients::from_shared(Arc::new(InMemoryRemote::new())),
        NotificationBus::detached(),
        BuildConfig::default(),
    )
    .with_store(store)
}

#[tokio::test]
async fn saved_study_survives_a_restart() {
    let temp_dir = TempDir::new().unwrap();
    let (study_id, rn, built, building) = {
        let api = api_with_store(temp_dir.path());
        let study = api
            .create_study(vec![RootNetwork::new("winter peak")], USER)
            .unwrap();
        let rn = study.root_network_ids()[0];
        let built = api
            .mutations()
            .insert(study.id, NewNode::construction("n1"), study.root_id(), InsertMode::Child, USER)
            .unwrap()
            .id;
        let building = api
            .mutations()
            .insert(study.id, NewNode::security("s1"), built, InsertMode::Child, USER)
            .unwrap()
            .id;
        api.builds()
            .set_build_status(study.id, built, rn, BuildStatus::BuiltWithWarning)
            .unwrap();
        let ticket = api.builds().build(study.id, building, rn, USER).await.unwrap();
        ticket.dispatched.await.unwrap();
        api.create_alias(study.id, "N-1", Some(building), USER).unwrap();

        api.save_study(study.id).unwrap();
        (study.id, rn, built, building)
    };

    let api = api_with_store(temp_dir.path());
    assert_eq!(api.load_all().unwrap(), 1);
    let study = api.studies().get(study_id).unwrap();

    assert_eq!(study.tree.read().node(building).unwrap().parent, Some(built));
    assert_eq!(
        study.overlays.build_status(built, rn).unwrap().local,
        BuildStatus::BuiltWithWarning
    );
    assert_eq!(
        study.overlays.build_status(building, rn).unwrap().local,
        BuildStatus::NotBuilt
    );
    assert!(!study.build_slot.is_busy());
    assert_eq!(
        api.resolve_alias(study_id, "N-1").unwrap().unwrap().node_id,
        building
    );
    assert!(api.builds().build(study_id, building, rn, USER).await.is_ok());
}

#[test]
fn loading_an_unknown_study_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let api = api_with_store(temp_dir.path());

    let err = api.load_study(Uuid::new_v4()).unwrap_err();
    assert!(matches!(
        err,
        ApiError::StorageError(StorageError::SnapshotNotFound(_))
    ));
    assert_eq!(err.kind(), study_tree::ErrorKind::NotFound);
}

#[test]
fn saving_without_a_store_is_a_config_error() {
    let api = StudyTreeApi::new(
        RemoteClients::from_shared(Arc::new(InMemoryRemote::new())),
        NotificationBus::detached(),
        BuildConfig::default(),
    );
    let study = api
        .create_study(vec![RootNetwork::new("base")], USER)
        .unwrap();

    assert!(matches!(
        api.save_study(study.id),
        Err(ApiError::ConfigError(_))
    ));
    assert_eq!(api.export_study(study.id).unwrap().tree.len(), 1);
}
