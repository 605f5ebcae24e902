//! Property-based tests over status merging and tree edits.

mod invalidation_scope;
mod stash_restore;
mod status_merge;

use std::sync::Arc;
use study_tree::config::BuildConfig;
use study_tree::notification::NotificationBus;
use study_tree::remote::{InMemoryRemote, RemoteClients};
use study_tree::status::BuildStatus;
use study_tree::study::{RootNetwork, Study};
use study_tree::tree::{InsertMode, NewNode};
use study_tree::types::NodeId;
use study_tree::StudyTreeApi;

pub const USER: &str = "prop";

pub const STATUSES: [BuildStatus; 5] = [
    BuildStatus::NotBuilt,
    BuildStatus::Building,
    BuildStatus::Built,
    BuildStatus::BuiltWithWarning,
    BuildStatus::BuiltWithError,
];

/// A study grown from `(parent choice, status choice)` pairs. Every node picks its parent
/// among the nodes created before it, the root included.
pub struct RandomStudy {
    pub api: StudyTreeApi,
    pub study: Arc<Study>,
    pub nodes: Vec<NodeId>,
}

impl RandomStudy {
    pub fn grow(shape: &[(usize, usize)]) -> Self {
        let api = StudyTreeApi::new(
            RemoteClients::from_shared(Arc::new(InMemoryRemote::new())),
            NotificationBus::detached(),
            BuildConfig::default(),
        );
        let study = api
            .create_study(vec![RootNetwork::new("base")], USER)
            .unwrap();
        let rn = study.root_network_ids()[0];
        let mut nodes = vec![study.root_id()];
        for (index, (parent, status)) in shape.iter().enumerate() {
            let parent = nodes[parent % nodes.len()];
            let id = api
                .mutations()
                .insert(
                    study.id,
                    NewNode::construction(format!("n{}", index)),
                    parent,
                    InsertMode::Child,
                    USER,
                )
                .unwrap()
                .id;
            api.builds()
                .set_build_status(study.id, id, rn, STATUSES[status % STATUSES.len()])
                .unwrap();
            nodes.push(id);
        }
        Self { api, study, nodes }
    }

    pub fn local(&self, node: NodeId) -> BuildStatus {
        let rn = self.study.root_network_ids()[0];
        self.study.overlays.build_status(node, rn).unwrap().local
    }
}
