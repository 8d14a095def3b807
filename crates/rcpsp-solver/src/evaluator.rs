//! Resource-feasible schedule evaluators.
//!
//! Both evaluators generate a serial schedule from an activity order under
//! the earliest-start rule and must agree on the makespan they produce for
//! any precedence-feasible order (§8, "evaluator agreement"). They differ
//! only in how they track remaining resource capacity over time, which is
//! what makes one or the other faster depending on instance shape.

use rcpsp_core::{ActivityId, Instance};

/// Per-resource load tracker used while generating a serial schedule.
///
/// `earliest_start` must return the earliest time at or after
/// `precedence_earliest` at which `demand` units of every resource are
/// simultaneously available for `duration` time units; `commit` then
/// reserves that capacity.
pub trait ResourceLoad {
    fn earliest_start(&self, demand: &[u32], precedence_earliest: u32, duration: u32) -> u32;
    fn commit(&mut self, start: u32, stop: u32, demand: &[u32]);
}

/// Tracks, per resource, the `capacity` points in time at which one unit of
/// that resource next becomes free. Kept sorted ascending so the `demand`-th
/// smallest entry is the earliest time `demand` units are simultaneously
/// free. Each commit simply assigns the `demand` soonest-free units their
/// new release time and re-sorts, rather than tracking partial overlaps in
/// place.
pub struct CapacityResolutionLoad {
    resource_count: usize,
    release_times: Vec<Vec<u32>>,
}

impl CapacityResolutionLoad {
    pub fn new(instance: &Instance) -> Self {
        let release_times = (0..instance.num_resources())
            .map(|r| vec![0u32; instance.capacity(r) as usize])
            .collect();
        Self {
            resource_count: instance.num_resources() as usize,
            release_times,
        }
    }
}

impl ResourceLoad for CapacityResolutionLoad {
    fn earliest_start(&self, demand: &[u32], precedence_earliest: u32, _duration: u32) -> u32 {
        let mut best_start = precedence_earliest;
        for r in 0..self.resource_count {
            let requirement = demand[r] as usize;
            if requirement == 0 {
                continue;
            }
            let slots = &self.release_times[r];
            best_start = best_start.max(slots[requirement - 1]);
        }
        best_start
    }

    fn commit(&mut self, start: u32, stop: u32, demand: &[u32]) {
        for r in 0..self.resource_count {
            let requirement = demand[r] as usize;
            if requirement == 0 {
                continue;
            }
            let slots = &mut self.release_times[r];
            for slot in slots.iter_mut().take(requirement) {
                debug_assert!(*slot <= start, "capacity evaluator double-booked a slot");
            }
            for slot in slots.iter_mut().take(requirement) {
                *slot = stop;
            }
            slots.sort_unstable();
        }
    }
}

/// Tracks remaining resource capacity at each discrete time step up to a
/// makespan upper bound.
pub struct TimeResolutionLoad {
    horizon: usize,
    remaining: Vec<Vec<u32>>,
}

impl TimeResolutionLoad {
    pub fn new(instance: &Instance, horizon: u32) -> Self {
        let horizon = horizon as usize;
        let remaining = (0..instance.num_resources())
            .map(|r| vec![instance.capacity(r); horizon])
            .collect();
        Self { horizon, remaining }
    }
}

impl ResourceLoad for TimeResolutionLoad {
    fn earliest_start(&self, demand: &[u32], precedence_earliest: u32, duration: u32) -> u32 {
        if duration == 0 {
            return precedence_earliest;
        }
        let mut run = 0u32;
        let mut t = precedence_earliest as usize;
        while t < self.horizon && run < duration {
            let available = self
                .remaining
                .iter()
                .enumerate()
                .all(|(r, profile)| profile[t] >= demand[r]);
            if available {
                run += 1;
            } else {
                run = 0;
            }
            t += 1;
        }
        t as u32 - run
    }

    fn commit(&mut self, start: u32, stop: u32, demand: &[u32]) {
        for (r, profile) in self.remaining.iter_mut().enumerate() {
            for slot in &mut profile[start as usize..stop as usize] {
                *slot -= demand[r];
            }
        }
    }
}

/// The evaluator variant the driver currently prefers, adaptively chosen
/// per macro-cycle (§4.2.3) by measured wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluatorKind {
    CapacityResolution,
    TimeResolution,
}

/// A resolved, resource-feasible schedule: per-position start times
/// (indexed like `order`) and per-activity start times (indexed by
/// activity id).
#[derive(Debug, Clone)]
pub struct Schedule {
    pub makespan: u32,
    pub start_by_position: Vec<u32>,
    pub start_by_id: Vec<u32>,
}

/// Generates the serial schedule for `order` under the earliest-start rule:
/// each activity starts at the latest of (a) its predecessors' finish times
/// and (b) the earliest time its resource demand is simultaneously
/// satisfiable.
pub fn evaluate_order(instance: &Instance, order: &[ActivityId], kind: EvaluatorKind) -> Schedule {
    let n = instance.num_activities() as usize;
    let mut start_by_id = vec![0u32; n];
    let mut start_by_position = Vec::with_capacity(n);
    let mut makespan = 0u32;

    match kind {
        EvaluatorKind::CapacityResolution => {
            let mut load = CapacityResolutionLoad::new(instance);
            run_serial_schedule(
                instance,
                order,
                &mut load,
                &mut start_by_id,
                &mut start_by_position,
                &mut makespan,
            );
        }
        EvaluatorKind::TimeResolution => {
            let mut load = TimeResolutionLoad::new(instance, instance.upper_bound_makespan() + 1);
            run_serial_schedule(
                instance,
                order,
                &mut load,
                &mut start_by_id,
                &mut start_by_position,
                &mut makespan,
            );
        }
    }

    Schedule {
        makespan,
        start_by_position,
        start_by_id,
    }
}

fn run_serial_schedule(
    instance: &Instance,
    order: &[ActivityId],
    load: &mut impl ResourceLoad,
    start_by_id: &mut [u32],
    start_by_position: &mut Vec<u32>,
    makespan: &mut u32,
) {
    for &activity in order {
        let mut earliest = 0u32;
        for &predecessor in instance.predecessors(activity) {
            earliest = earliest.max(start_by_id[predecessor as usize] + instance.duration(predecessor));
        }
        let duration = instance.duration(activity);
        let demand = instance.demands(activity);
        let start = load.earliest_start(demand, earliest, duration).max(earliest);
        load.commit(start, start + duration, demand);

        *makespan = (*makespan).max(start + duration);
        start_by_position.push(start);
        start_by_id[activity as usize] = start;
    }
}

/// Sum of the broken-precedence overhangs (§4 "precedence penalty"): for
/// every edge `i -> j`, how far activity `i`'s finish time runs past `j`'s
/// start time. Zero for any order produced by [`evaluate_order`], since the
/// neighborhood generator only proposes precedence-safe moves; kept as a
/// standalone diagnostic for callers that want to sanity-check an order
/// from outside the search loop.
pub fn precedence_penalty(instance: &Instance, start_by_id: &[u32]) -> u32 {
    let mut penalty = 0u32;
    for activity in 0..instance.num_activities() {
        let finish = start_by_id[activity as usize] + instance.duration(activity);
        for &successor in instance.successors(activity) {
            let successor_start = start_by_id[successor as usize];
            if finish > successor_start {
                penalty += finish - successor_start;
            }
        }
    }
    penalty
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn parallel_conflict_instance(capacity: u32) -> Instance {
        InstanceBuilder::new(4, 1)
            .duration(0, 0)
            .duration(1, 4)
            .duration(2, 3)
            .duration(3, 0)
            .capacity(0, capacity)
            .demand(1, 0, 1)
            .demand(2, 0, 1)
            .successor(0, 1)
            .successor(0, 2)
            .successor(1, 3)
            .successor(2, 3)
            .build()
            .unwrap()
    }

    #[test]
    fn chain_makespan_matches_critical_path_both_evaluators() {
        let instance = chain_instance();
        let order = [0, 1, 2, 3];
        let capacity = evaluate_order(&instance, &order, EvaluatorKind::CapacityResolution);
        let time = evaluate_order(&instance, &order, EvaluatorKind::TimeResolution);
        assert_eq!(capacity.makespan, 8);
        assert_eq!(time.makespan, 8);
    }

    #[test]
    fn parallel_capacity_conflict_serializes_activities() {
        let instance = parallel_conflict_instance(1);
        let order = [0, 1, 2, 3];
        let capacity = evaluate_order(&instance, &order, EvaluatorKind::CapacityResolution);
        let time = evaluate_order(&instance, &order, EvaluatorKind::TimeResolution);
        assert_eq!(capacity.makespan, 7);
        assert_eq!(time.makespan, 7);
    }

    #[test]
    fn parallel_with_enough_capacity_runs_concurrently() {
        let instance = parallel_conflict_instance(2);
        let order = [0, 1, 2, 3];
        let capacity = evaluate_order(&instance, &order, EvaluatorKind::CapacityResolution);
        let time = evaluate_order(&instance, &order, EvaluatorKind::TimeResolution);
        assert_eq!(capacity.makespan, 4);
        assert_eq!(time.makespan, 4);
    }

    #[test]
    fn precedence_penalty_is_zero_for_feasible_schedule() {
        let instance = chain_instance();
        let schedule = evaluate_order(&instance, &[0, 1, 2, 3], EvaluatorKind::CapacityResolution);
        assert_eq!(precedence_penalty(&instance, &schedule.start_by_id), 0);
    }
}
