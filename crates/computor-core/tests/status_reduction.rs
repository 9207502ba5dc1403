//! Property tests for the grading-status reduction.

use computor_core::aggregate::reduce_grading_status;
use computor_core::model::GradingStatus;
use proptest::prelude::*;

proptest! {
    /// For every non-empty multiset of status codes the reduction returns
    /// exactly one status, obeying the priority order, independent of input
    /// order.
    #[test]
    fn reduction_is_total_and_obeys_priority(
        codes in proptest::collection::vec(0i32..4, 1..50)
    ) {
        let statuses: Vec<GradingStatus> =
            codes.iter().map(|code| GradingStatus::from_code(*code)).collect();

        let reduced = reduce_grading_status(&statuses)
            .expect("non-empty input always reduces");

        if statuses.contains(&GradingStatus::CorrectionNecessary) {
            prop_assert_eq!(reduced, GradingStatus::CorrectionNecessary);
        } else if statuses.contains(&GradingStatus::ImprovementPossible) {
            prop_assert_eq!(reduced, GradingStatus::ImprovementPossible);
        } else if statuses.iter().all(|s| *s == GradingStatus::Corrected) {
            prop_assert_eq!(reduced, GradingStatus::Corrected);
        } else {
            prop_assert_eq!(reduced, GradingStatus::NotReviewed);
        }

        // The reduction is a function of the multiset, not the order.
        let mut sorted = statuses.clone();
        sorted.sort();
        prop_assert_eq!(reduce_grading_status(&sorted), Some(reduced));
    }

    /// Duplicating the input never changes the outcome.
    #[test]
    fn reduction_is_idempotent_under_duplication(
        codes in proptest::collection::vec(0i32..4, 1..20)
    ) {
        let statuses: Vec<GradingStatus> =
            codes.iter().map(|code| GradingStatus::from_code(*code)).collect();
        let doubled: Vec<GradingStatus> =
            statuses.iter().chain(statuses.iter()).copied().collect();

        prop_assert_eq!(
            reduce_grading_status(&statuses),
            reduce_grading_status(&doubled)
        );
    }
}

#[test]
fn empty_input_has_no_status() {
    assert_eq!(reduce_grading_status(&[]), None);
}
