//! Invalidation only ever touches the origin's subtree

use super::RandomStudy;
use proptest::prelude::*;
use std::collections::HashSet;
use study_tree::invalidation::InvalidationScope;
use study_tree::status::BuildStatus;
use study_tree::tree::walker;

#[test]
fn test_invalidation_resets_subtree_only() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(
                prop::collection::vec((0..16usize, 0..5usize), 1..16),
                any::<prop::sample::Index>(),
                any::<bool>(),
            ),
            |(shape, pick, include_origin)| {
                let random = RandomStudy::grow(&shape);
                let origin = random.nodes[1 + pick.index(random.nodes.len() - 1)];
                let scope = if include_origin {
                    InvalidationScope::NodeAndDescendants
                } else {
                    InvalidationScope::DescendantsOnly
                };
                let before: Vec<BuildStatus> =
                    random.nodes.iter().map(|id| random.local(*id)).collect();
                let subtree: HashSet<_> = {
                    let tree = random.study.tree.read();
                    walker::subtree(&tree, origin).into_iter().collect()
                };

                let report = random.api.invalidation().invalidate(
                    &random.study,
                    &[origin],
                    scope,
                    None,
                );

                let rn = random.study.root_network_ids()[0];
                let invalidated = report.invalidated_on(rn);
                let unique: HashSet<_> = invalidated.iter().copied().collect();
                prop_assert_eq!(unique.len(), invalidated.len());

                for (index, id) in random.nodes.iter().enumerate().skip(1) {
                    let now = random.local(*id);
                    let touched = subtree.contains(id) && (include_origin || *id != origin);
                    if touched {
                        prop_assert_eq!(now, BuildStatus::NotBuilt);
                        if before[index] != BuildStatus::NotBuilt {
                            prop_assert!(unique.contains(id));
                        }
                    } else {
                        prop_assert_eq!(now, before[index]);
                        prop_assert!(!unique.contains(id));
                    }
                }
                Ok(())
            },
        )
        .unwrap();
}
