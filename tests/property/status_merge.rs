//! Severity merge of build statuses

use super::STATUSES;
use proptest::prelude::*;
use study_tree::status::{ApplicationOutcome, ApplicationStatus, BuildStatus, NodeBuildStatus};

const APPLICATION: [ApplicationStatus; 3] = [
    ApplicationStatus::AllOk,
    ApplicationStatus::WithWarnings,
    ApplicationStatus::WithErrors,
];

/// Global status never drops below a built local status, and resets clear both halves.
#[test]
fn test_apply_keeps_most_severe_global() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(0..5usize, 0..5usize, prop::collection::vec(0..5usize, 1..12)),
            |(local, global, sequence)| {
                let mut status = NodeBuildStatus {
                    local: STATUSES[local],
                    global: STATUSES[global],
                };
                for step in sequence {
                    let applied = STATUSES[step];
                    let before = status;
                    status = status.apply(applied);

                    prop_assert_eq!(status.local, applied);
                    if applied.forces_reset() {
                        prop_assert_eq!(status.global, applied);
                    } else {
                        prop_assert_eq!(status.global, applied.max(before.global));
                        prop_assert!(status.global >= status.local);
                    }
                    prop_assert_eq!(status.is_built(), applied >= BuildStatus::Built);
                }
                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn test_outcome_merge_matches_explicit_apply() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(0..5usize, 0..3usize, 0..3usize),
            |(prior, local, global)| {
                let start = NodeBuildStatus::forced(STATUSES[prior]);
                let outcome = ApplicationOutcome {
                    local: APPLICATION[local],
                    global: APPLICATION[global],
                };
                let merged = start.apply_outcome(outcome);

                prop_assert_eq!(merged.local, BuildStatus::from(APPLICATION[local]));
                prop_assert!(merged.global >= BuildStatus::from(APPLICATION[global]));
                prop_assert!(merged.global >= start.global);
                prop_assert!(merged.is_built());
                Ok(())
            },
        )
        .unwrap();
}
