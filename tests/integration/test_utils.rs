//! Shared fixture: one study with one root network, an in-memory remote and the event
//! receivers.

use std::sync::Arc;
use study_tree::build::BuildOrchestrator;
use study_tree::config::BuildConfig;
use study_tree::notification::{NotificationBus, NotificationReceivers, StudyUpdate, UpdateType};
use study_tree::remote::{InMemoryRemote, RemoteClients};
use study_tree::status::{BuildStatus, NodeBuildStatus};
use study_tree::study::{RootNetwork, Study};
use study_tree::tree::{InsertMode, NewNode};
use study_tree::types::{NodeId, RootNetworkId, StudyId};
use study_tree::StudyTreeApi;

pub const USER: &str = "alice";

pub struct Harness {
    pub api: StudyTreeApi,
    pub remote: Arc<InMemoryRemote>,
    pub rx: NotificationReceivers,
    pub study: Arc<Study>,
    pub rn: RootNetworkId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_root_networks(&["base case"])
    }

    pub fn with_root_networks(names: &[&str]) -> Self {
        let remote = Arc::new(InMemoryRemote::new());
        let (bus, mut rx) = NotificationBus::new_pair();
        let api = StudyTreeApi::new(
            RemoteClients::from_shared(Arc::clone(&remote)),
            bus,
            BuildConfig::default(),
        );
        let networks = names.iter().map(|name| RootNetwork::new(*name)).collect();
        let study = api.create_study(networks, USER).unwrap();
        let rn = study.root_network_ids()[0];
        rx.drain_studies();
        rx.drain_elements();
        Self {
            api,
            remote,
            rx,
            study,
            rn,
        }
    }

    pub fn study_id(&self) -> StudyId {
        self.study.id
    }

    pub fn root(&self) -> NodeId {
        self.study.root_id()
    }

    pub fn builds(&self) -> &BuildOrchestrator {
        self.api.builds()
    }

    pub fn insert(&self, node: NewNode, reference: NodeId, mode: InsertMode) -> NodeId {
        self.api
            .mutations()
            .insert(self.study_id(), node, reference, mode, USER)
            .unwrap()
            .id
    }

    pub fn construction(&self, parent: NodeId, name: &str) -> NodeId {
        self.insert(NewNode::construction(name), parent, InsertMode::Child)
    }

    pub fn security(&self, parent: NodeId, name: &str) -> NodeId {
        self.insert(NewNode::security(name), parent, InsertMode::Child)
    }

    pub fn mark(&self, node: NodeId, status: BuildStatus) {
        self.builds()
            .set_build_status(self.study_id(), node, self.rn, status)
            .unwrap();
    }

    pub fn status(&self, node: NodeId) -> NodeBuildStatus {
        self.study.overlays.build_status(node, self.rn).unwrap()
    }

    pub fn name(&self, node: NodeId) -> String {
        self.study.tree.read().node(node).unwrap().name.clone()
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.study.tree.read().node(node).unwrap().children.clone()
    }

    pub fn group(&self, node: NodeId) -> uuid::Uuid {
        self.study
            .tree
            .read()
            .node(node)
            .unwrap()
            .group_ref()
            .unwrap()
    }

    /// Study updates of one type published since the last drain.
    pub fn updates_of(&mut self, update_type: UpdateType) -> Vec<StudyUpdate> {
        self.rx
            .drain_studies()
            .into_iter()
            .filter(|u| u.update_type == update_type)
            .collect()
    }
}
