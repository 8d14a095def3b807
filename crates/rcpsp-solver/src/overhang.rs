//! Overhang penalty (§4.4, §4.5): an admissible tail-bound on how far a
//! candidate schedule's activities run past an incumbent baseline,
//! computed from each activity's right-to-left longest path to the sink.
//!
//! Added to a candidate's raw makespan during neighborhood evaluation so
//! that moves whose *tail* must overshoot the incumbent are discouraged
//! even when their visible head looks no worse.

use rcpsp_core::Instance;

/// `bestCost - 1` resolves an edge case the distilled algorithm left open:
/// using `bestCost` itself as the baseline makes the penalty zero for any
/// candidate that merely matches the incumbent, masking ties that are
/// actually worse once their tail is accounted for. Subtracting one makes
/// the baseline strict, so only candidates that are genuinely at least as
/// good end up with a zero penalty.
pub const OVERHANG_BASELINE_OFFSET: u32 = 1;

/// `Σ_a max(0, starts[a] + duration[a] + rightLeftLongestPath[a] - baseline)`.
pub fn overhang_penalty(instance: &Instance, baseline: u32, start_by_id: &[u32]) -> u32 {
    (0..instance.num_activities())
        .map(|activity| {
            let tail_bound = start_by_id[activity as usize]
                + instance.duration(activity)
                + instance.right_left_longest_path(activity);
            tail_bound.saturating_sub(baseline)
        })
        .sum()
}

/// Convenience wrapper applying the documented baseline convention to
/// `best_cost`.
pub fn overhang_penalty_against_best(instance: &Instance, best_cost: u32, start_by_id: &[u32]) -> u32 {
    let baseline = best_cost.saturating_sub(OVERHANG_BASELINE_OFFSET);
    overhang_penalty(instance, baseline, start_by_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{evaluate_order, EvaluatorKind};
    use rcpsp_core::InstanceBuilder;

    fn chain_instance() -> Instance {
        InstanceBuilder::new(4, 1)
            .duration(0, 0)
            .duration(1, 3)
            .duration(2, 5)
            .duration(3, 0)
            .capacity(0, 1)
            .demand(1, 0, 1)
            .demand(2, 0, 1)
            .successor(0, 1)
            .successor(1, 2)
            .successor(2, 3)
            .build()
            .unwrap()
    }

    #[test]
    fn zero_penalty_when_schedule_fits_baseline() {
        let instance = chain_instance();
        let schedule = evaluate_order(&instance, &[0, 1, 2, 3], EvaluatorKind::CapacityResolution);
        let penalty = overhang_penalty_against_best(&instance, schedule.makespan, &schedule.start_by_id);
        assert_eq!(penalty, 0);
    }

    #[test]
    fn penalty_grows_with_tighter_baseline() {
        let instance = chain_instance();
        let schedule = evaluate_order(&instance, &[0, 1, 2, 3], EvaluatorKind::CapacityResolution);
        let tight = overhang_penalty(&instance, schedule.makespan - 2, &schedule.start_by_id);
        assert!(tight > 0);
    }
}
