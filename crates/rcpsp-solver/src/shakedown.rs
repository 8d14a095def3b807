//! Shake-down refinement (§4.5): an iterative forward/backward
//! sort-and-reevaluate loop that compacts a feasible schedule by
//! alternately packing activities against their earliest and latest
//! feasible positions.
//!
//! Runs on the time-resolution evaluator throughout — the better fit for
//! this sort-and-pack structure, since it tracks exact start times rather
//! than per-slot capacity counters.

use rcpsp_core::{ActivityId, Instance};

use crate::evaluator::{evaluate_order, EvaluatorKind, ResourceLoad, TimeResolutionLoad};

/// Repeatedly forward-evaluates `order`, stable-sorts by finish time,
/// backward-evaluates, stable-sorts by adjusted latest start, and repeats
/// until a forward pass fails to improve on the previous one. Returns the
/// best makespan found; `order` is left holding the order that achieved it.
///
/// Monotone by construction (§8, "shake-down monotonicity"): the loop only
/// ever replaces `order` with the result of a forward pass that strictly
/// improved on the last recorded best.
pub fn shake_down(instance: &Instance, order: &mut Vec<ActivityId>) -> u32 {
    let mut best_order = order.clone();
    let mut best_len = u32::MAX;

    loop {
        let forward = evaluate_order(instance, order, EvaluatorKind::TimeResolution);
        if forward.makespan >= best_len {
            break;
        }
        best_len = forward.makespan;
        best_order = order.clone();

        let mut by_finish = order.clone();
        by_finish.sort_by_key(|&a| forward.start_by_id[a as usize] + instance.duration(a));

        let (len_b, start_b) = backward_schedule(instance, &by_finish);
        let shift = forward.makespan.saturating_sub(len_b);

        let mut by_latest_start = by_finish;
        by_latest_start.sort_by_key(|&a| {
            let latest_start = len_b - start_b[a as usize] - instance.duration(a);
            latest_start + shift
        });
        *order = by_latest_start;
    }

    *order = best_order;
    best_len
}

/// Evaluates `order` against the reversed precedence graph (successors act
/// as the forward evaluator's predecessors do), producing the backward
/// makespan and each activity's backward start time.
fn backward_schedule(instance: &Instance, order: &[ActivityId]) -> (u32, Vec<u32>) {
    let n = instance.num_activities() as usize;
    let mut start_by_id = vec![0u32; n];
    let mut makespan = 0u32;
    let mut load = TimeResolutionLoad::new(instance, instance.upper_bound_makespan() + 1);

    for &activity in order.iter().rev() {
        let mut earliest = 0u32;
        for &successor in instance.successors(activity) {
            earliest = earliest.max(start_by_id[successor as usize] + instance.duration(successor));
        }
        let duration = instance.duration(activity);
        let demand = instance.demands(activity);
        let start = load.earliest_start(demand, earliest, duration).max(earliest);
        load.commit(start, start + duration, demand);

        makespan = makespan.max(start + duration);
        start_by_id[activity as usize] = start;
    }

    (makespan, start_by_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcpsp_core::InstanceBuilder;

    /// N=6 chain-with-fork where the seed (level) order leaves slack that
    /// shake-down should compact away.
    fn fork_instance() -> Instance {
        InstanceBuilder::new(6, 1)
            .duration(0, 0)
            .duration(1, 4)
            .duration(2, 4)
            .duration(3, 2)
            .duration(4, 2)
            .duration(5, 0)
            .capacity(0, 1)
            .demand(1, 0, 1)
            .demand(2, 0, 1)
            .demand(3, 0, 1)
            .demand(4, 0, 1)
            .successor(0, 1)
            .successor(0, 2)
            .successor(1, 3)
            .successor(2, 4)
            .successor(3, 5)
            .successor(4, 5)
            .build()
            .unwrap()
    }

    #[test]
    fn shake_down_never_worsens_makespan() {
        let instance = fork_instance();
        let mut order = instance.seed_order().to_vec();
        let before = evaluate_order(&instance, &order, EvaluatorKind::TimeResolution).makespan;
        let after = shake_down(&instance, &mut order);
        assert!(after <= before);
    }

    #[test]
    fn shake_down_result_matches_reevaluation() {
        let instance = fork_instance();
        let mut order = instance.seed_order().to_vec();
        let reported = shake_down(&instance, &mut order);
        let recomputed = evaluate_order(&instance, &order, EvaluatorKind::TimeResolution).makespan;
        assert_eq!(reported, recomputed);
    }
}
