//! Stash then restore keeps every subtree intact

use super::{RandomStudy, USER};
use proptest::prelude::*;
use study_tree::tree::walker;

#[test]
fn test_stash_restore_preserves_subtree() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(
                prop::collection::vec((0..16usize, 0..5usize), 1..16),
                any::<prop::sample::Index>(),
            ),
            |(shape, pick)| {
                let random = RandomStudy::grow(&shape);
                let study_id = random.study.id;
                let root = random.study.root_id();
                let target = random.nodes[1 + pick.index(random.nodes.len() - 1)];

                let (before, node_count) = {
                    let tree = random.study.tree.read();
                    let subtree = walker::subtree(&tree, target);
                    let shape: Vec<_> = subtree
                        .iter()
                        .map(|id| tree.node(*id).unwrap().children.clone())
                        .collect();
                    (shape, tree.len())
                };

                let report = random
                    .api
                    .mutations()
                    .stash(study_id, target, true, USER)
                    .unwrap();
                prop_assert_eq!(report.stashed.len(), before.len());
                prop_assert!(!random.study.tree.read().is_live(target));

                let restored = random
                    .api
                    .mutations()
                    .restore(study_id, &[target], root, USER)
                    .unwrap();
                prop_assert_eq!(restored.len(), before.len());

                let tree = random.study.tree.read();
                prop_assert_eq!(tree.len(), node_count);
                prop_assert_eq!(tree.node(target).unwrap().parent, Some(root));
                let after: Vec<_> = walker::subtree(&tree, target)
                    .iter()
                    .map(|id| tree.node(*id).unwrap().children.clone())
                    .collect();
                prop_assert_eq!(after, before);
                for id in &restored {
                    prop_assert!(tree.is_live(*id));
                }
                Ok(())
            },
        )
        .unwrap();
}
