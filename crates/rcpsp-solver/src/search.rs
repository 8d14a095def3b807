//! The parallel tabu-search driver (§4.4, §5): the outer iteration loop is
//! sequential, but each iteration's neighborhood is explored data-parallel
//! across workers via `rayon`, with no cross-worker communication during
//! the parallel region.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rcpsp_core::{ActivityId, Instance, MoveKind};

use crate::evaluator::{evaluate_order, precedence_penalty, EvaluatorKind};
use crate::overhang::overhang_penalty_against_best;
use crate::shakedown::shake_down;
use crate::tabu::TabuMemory;

/// Tunables exposed at the CLI boundary (§6).
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub max_iterations: u32,
    pub max_iter_since_best: u32,
    pub swap_range: u32,
    pub shift_range: u32,
    pub diversification_swaps: u32,
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            max_iter_since_best: 300,
            swap_range: 60,
            shift_range: 0,
            diversification_swaps: 10,
            seed: 0,
        }
    }
}

/// One row of the optional makespan-progress log (§6).
#[derive(Debug, Clone, Copy)]
pub struct IterationRecord {
    pub iteration: u64,
    pub iteration_cost: u32,
    pub best_cost: u32,
}

/// Result of a completed (or early-terminated) search run.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub best_order: Vec<ActivityId>,
    pub best_cost: u32,
    pub start_time_by_id: Vec<u32>,
    pub iterations_run: u32,
    pub evaluations: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct CandidateKey {
    cost: u32,
    kind: MoveKind,
    i: u32,
    j: u32,
    shift_target: u32,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    key: CandidateKey,
}

/// Runs tabu search from `instance`'s seed order until `config.max_iterations`
/// iterations elapse, the critical-path lower bound is reached, the
/// neighborhood goes empty, or `cancel` is observed set between iterations.
///
/// `on_iteration`, if present, is invoked once per completed iteration with
/// an [`IterationRecord`] for the makespan-progress sink (§6).
pub fn solve(
    instance: &Instance,
    tabu: &mut dyn TabuMemory,
    config: &SearchConfig,
    evaluator_kind_override: Option<EvaluatorKind>,
    cancel: &AtomicBool,
    mut on_iteration: impl FnMut(IterationRecord),
) -> SolveOutcome {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut order = instance.seed_order().to_vec();

    let initial = evaluate_order(instance, &order, EvaluatorKind::CapacityResolution);
    let mut best_cost = initial.makespan;
    let mut best_order = order.clone();
    let mut best_start_by_id = initial.start_by_id;

    let mut preferred_evaluator = EvaluatorKind::CapacityResolution;
    let mut macro_cycle_capacity_elapsed: Option<std::time::Duration> = None;
    let mut iter_since_best: u32 = 0;
    let mut evaluations: u64 = 0;
    let mut iterations_run: u32 = 0;

    for iter in 0..config.max_iterations {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        iterations_run = iter + 1;

        // At the start of each 100-iteration macro-cycle, iterations 0 and 1
        // each time one real (parallel) neighborhood pass with one evaluator;
        // iterations 2..99 reuse whichever evaluator measured faster (§4.2.3).
        let macro_cycle_pos = iter % 100;
        let (kind, timing_this_iteration) = if let Some(forced) = evaluator_kind_override {
            (forced, None)
        } else if macro_cycle_pos == 0 {
            (EvaluatorKind::CapacityResolution, Some(0u8))
        } else if macro_cycle_pos == 1 {
            (EvaluatorKind::TimeResolution, Some(1u8))
        } else {
            (preferred_evaluator, None)
        };

        let baseline = evaluate_order(instance, &order, kind);
        let timer = timing_this_iteration.map(|_| Instant::now());
        let (best_candidate, neighborhood_size, evaluated) =
            explore_neighborhood(instance, &order, &baseline.start_by_position, kind, tabu, best_cost, config);
        if let (Some(start), Some(slot)) = (timer, timing_this_iteration) {
            let elapsed = start.elapsed();
            if slot == 0 {
                macro_cycle_capacity_elapsed = Some(elapsed);
            } else {
                let capacity_elapsed = macro_cycle_capacity_elapsed.take().unwrap_or(elapsed);
                preferred_evaluator = if capacity_elapsed <= elapsed {
                    EvaluatorKind::CapacityResolution
                } else {
                    EvaluatorKind::TimeResolution
                };
            }
        }
        evaluations += evaluated;

        let Some(candidate) = best_candidate else {
            tracing::warn!(iteration = iter, "expanded neighborhood is empty, ending search early");
            break;
        };
        debug_assert!(neighborhood_size > 0);

        apply_move(&mut order, candidate.key);
        // An aspiration-admitted move may already be tabu; recording it again
        // would trip the duplicate-entry guard, so only record moves that
        // weren't already forbidden.
        if tabu.is_allowed(candidate.key.i, candidate.key.j, candidate.key.kind) {
            tabu.record(candidate.key.i, candidate.key.j, candidate.key.kind)
                .expect("move was just confirmed allowed, so it cannot already be present");
        }

        let mut iteration_cost = candidate.key.cost;

        if iteration_cost < best_cost {
            let mut shaken = order.clone();
            let shaken_cost = shake_down(instance, &mut shaken);
            if shaken_cost < iteration_cost {
                order = shaken;
                iteration_cost = shaken_cost;
            }

            best_cost = iteration_cost;
            best_order = order.clone();
            best_start_by_id = evaluate_order(instance, &order, kind).start_by_id;
            tabu.on_new_best();
            iter_since_best = 0;
        } else {
            iter_since_best += 1;
        }

        if iter_since_best > config.max_iter_since_best {
            diversify(instance, &mut order, config.diversification_swaps, &mut rng);
            tabu.prune(&mut rng);
            iter_since_best = 0;
        }

        tabu.advance_iteration(&mut rng);

        on_iteration(IterationRecord {
            iteration: u64::from(iter),
            iteration_cost,
            best_cost,
        });

        if best_cost <= instance.critical_path_makespan() {
            break;
        }
    }

    debug_assert_eq!(precedence_penalty(instance, &best_start_by_id), 0);

    SolveOutcome {
        best_order,
        best_cost,
        start_time_by_id: best_start_by_id,
        iterations_run,
        evaluations,
    }
}

/// Explores the full swap/shift neighborhood of `order` in parallel,
/// returning the globally best admissible candidate (if any) and the total
/// number of candidates that were admissible somewhere.
fn explore_neighborhood(
    instance: &Instance,
    order: &[ActivityId],
    current_start_by_position: &[u32],
    kind: EvaluatorKind,
    tabu: &dyn TabuMemory,
    best_cost: u32,
    config: &SearchConfig,
) -> (Option<Candidate>, u64, u64) {
    let n = order.len();
    if n < 3 {
        return (None, 0, 0);
    }

    let results: Vec<(Option<Candidate>, u64, u64)> = (1..n - 1)
        .into_par_iter()
        .map(|i| {
            let mut local_order = order.to_vec();
            let mut best: Option<Candidate> = None;
            let mut admissible_count = 0u64;
            let mut evaluated = 0u64;

            let swap_upper = (i + 1 + config.swap_range as usize).min(n - 1);
            for j in (i + 1)..swap_upper {
                if precedence_blocks_range(instance, order, i, j) {
                    break;
                }
                if current_start_by_position[i] == current_start_by_position[j] {
                    continue;
                }

                local_order.swap(i, j);
                let schedule = evaluate_order(instance, &local_order, kind);
                evaluated += 1;
                let cost = schedule.makespan
                    + overhang_penalty_against_best(instance, best_cost, &schedule.start_by_id);
                local_order.swap(i, j);

                consider(
                    &mut best,
                    &mut admissible_count,
                    tabu,
                    best_cost,
                    cost,
                    CandidateKey {
                        cost,
                        kind: MoveKind::Swap,
                        i: i as u32,
                        j: j as u32,
                        shift_target: i as u32,
                    },
                );
            }

            let shift_lower = i.saturating_sub(config.shift_range as usize).max(1);
            let shift_upper = (i + 1 + config.shift_range as usize).min(n - 1);
            for s in shift_lower..shift_upper {
                if s + 1 == i || s == i || s == i + 1 {
                    continue;
                }
                if shift_blocked(instance, order, i, s) {
                    continue;
                }

                apply_shift(&mut local_order, i, s);
                let schedule = evaluate_order(instance, &local_order, kind);
                evaluated += 1;
                let cost = schedule.makespan
                    + overhang_penalty_against_best(instance, best_cost, &schedule.start_by_id);
                apply_shift(&mut local_order, s, i);

                consider(
                    &mut best,
                    &mut admissible_count,
                    tabu,
                    best_cost,
                    cost,
                    CandidateKey {
                        cost,
                        kind: MoveKind::Shift,
                        i: i as u32,
                        j: i as u32,
                        shift_target: s as u32,
                    },
                );
            }

            (best, admissible_count, evaluated)
        })
        .collect();

    let mut global_best: Option<Candidate> = None;
    let mut total_admissible = 0u64;
    let mut total_evaluated = 0u64;
    for (candidate, admissible_count, evaluated) in results {
        total_admissible += admissible_count;
        total_evaluated += evaluated;
        if let Some(c) = candidate {
            if global_best.map_or(true, |g: Candidate| c.key < g.key) {
                global_best = Some(c);
            }
        }
    }

    (global_best, total_admissible, total_evaluated)
}

fn consider(
    best: &mut Option<Candidate>,
    admissible_count: &mut u64,
    tabu: &dyn TabuMemory,
    best_cost: u32,
    cost: u32,
    key: CandidateKey,
) {
    let local_threshold = best.map_or(u32::MAX, |c| c.key.cost);
    let tabu_allowed = tabu.is_allowed(key.i, key.j, key.kind);
    let admissible = (tabu_allowed && cost < local_threshold) || cost < best_cost;
    if admissible {
        *admissible_count += 1;
        if best.map_or(true, |c: Candidate| key < c.key) {
            *best = Some(Candidate { key });
        }
    }
}

/// Rejects `(i, j)` if any activity in `order[i..j)` is a direct successor
/// of `order[j]` — swapping would move a predecessor past its own
/// successor.
fn precedence_blocks_range(instance: &Instance, order: &[ActivityId], i: usize, j: usize) -> bool {
    (i..j).any(|k| instance.is_direct_successor(order[k], order[j]))
}

/// Rejects shifting the activity at `i` to `s`: shifting right must not
/// cross one of its own direct successors, shifting left must not cross one
/// of its own direct predecessors.
fn shift_blocked(instance: &Instance, order: &[ActivityId], i: usize, s: usize) -> bool {
    let activity = order[i];
    if s > i + 1 {
        (i + 1..=s).any(|k| instance.is_direct_successor(activity, order[k]))
    } else if s + 1 < i {
        (s..i).any(|k| instance.is_direct_successor(order[k], activity))
    } else {
        false
    }
}

fn apply_move(order: &mut [ActivityId], key: CandidateKey) {
    match key.kind {
        MoveKind::Swap => order.swap(key.i as usize, key.j as usize),
        MoveKind::Shift => apply_shift(order, key.i as usize, key.shift_target as usize),
    }
}

/// Moves the element at `from` to index `to`, shifting the activities
/// between them by one position.
fn apply_shift(order: &mut [ActivityId], from: usize, to: usize) {
    use std::cmp::Ordering as CmpOrdering;
    match from.cmp(&to) {
        CmpOrdering::Less => order[from..=to].rotate_left(1),
        CmpOrdering::Greater => order[to..=from].rotate_right(1),
        CmpOrdering::Equal => {}
    }
}

/// Performs `swaps` random precedence-feasible swaps on `order` (§4.5).
fn diversify(instance: &Instance, order: &mut [ActivityId], swaps: u32, rng: &mut StdRng) {
    let n = order.len();
    if n < 3 {
        return;
    }
    let mut attempted = 0u32;
    let mut guard = 0u32;
    while attempted < swaps && guard < swaps * 20 + 100 {
        guard += 1;
        let i = rng.gen_range(1..n - 1);
        let j = rng.gen_range(1..n - 1);
        if i == j {
            continue;
        }
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        if precedence_blocks_range(instance, order, lo, hi) {
            continue;
        }
        order.swap(lo, hi);
        attempted += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabu::SimpleTabu;
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
    fn trivial_chain_converges_to_critical_path() {
        let instance = chain_instance();
        let mut tabu = SimpleTabu::new(instance.num_activities(), 10);
        let cancel = AtomicBool::new(false);
        let config = SearchConfig {
            max_iterations: 20,
            ..SearchConfig::default()
        };
        let outcome = solve(&instance, &mut tabu, &config, None, &cancel, |_| {});
        assert_eq!(outcome.best_cost, 8);
        assert_eq!(outcome.best_order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn parallel_conflict_respects_capacity() {
        let instance = parallel_conflict_instance(1);
        let mut tabu = SimpleTabu::new(instance.num_activities(), 10);
        let cancel = AtomicBool::new(false);
        let config = SearchConfig {
            max_iterations: 20,
            ..SearchConfig::default()
        };
        let outcome = solve(&instance, &mut tabu, &config, None, &cancel, |_| {});
        assert_eq!(outcome.best_cost, 7);
    }

    #[test]
    fn parallel_with_capacity_reaches_critical_path() {
        let instance = parallel_conflict_instance(2);
        let mut tabu = SimpleTabu::new(instance.num_activities(), 10);
        let cancel = AtomicBool::new(false);
        let config = SearchConfig {
            max_iterations: 20,
            ..SearchConfig::default()
        };
        let outcome = solve(&instance, &mut tabu, &config, None, &cancel, |_| {});
        assert_eq!(outcome.best_cost, 4);
    }

    #[test]
    fn aspiration_admits_tabu_move_that_strictly_improves_best() {
        let instance = parallel_conflict_instance(2);
        let mut tabu = SimpleTabu::new(instance.num_activities(), 10);
        // Preload the only improving move (swap of positions 1,2) as tabu.
        tabu.record(1, 2, MoveKind::Swap).unwrap();
        let cancel = AtomicBool::new(false);
        let config = SearchConfig {
            max_iterations: 5,
            ..SearchConfig::default()
        };
        let outcome = solve(&instance, &mut tabu, &config, None, &cancel, |_| {});
        assert_eq!(outcome.best_cost, 4);
    }

    #[test]
    fn cancellation_stops_search_early() {
        let instance = chain_instance();
        let mut tabu = SimpleTabu::new(instance.num_activities(), 10);
        let cancel = AtomicBool::new(true);
        let config = SearchConfig {
            max_iterations: 1000,
            ..SearchConfig::default()
        };
        let outcome = solve(&instance, &mut tabu, &config, None, &cancel, |_| {});
        assert_eq!(outcome.iterations_run, 0);
    }

    /// N=6 chain-with-fork where the seed order leaves compactable slack;
    /// shake-down, invoked from inside `solve` whenever a move improves on
    /// the running best, must pack the schedule down to its critical path.
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
    fn shake_down_compacts_past_the_first_improving_move() {
        let instance = fork_instance();
        let mut tabu = SimpleTabu::new(instance.num_activities(), 10);
        let cancel = AtomicBool::new(false);
        let config = SearchConfig {
            max_iterations: 30,
            ..SearchConfig::default()
        };
        let outcome = solve(&instance, &mut tabu, &config, None, &cancel, |_| {});
        assert_eq!(outcome.best_cost, instance.critical_path_makespan());
    }

    #[test]
    fn diversification_on_every_stall_still_reaches_critical_path() {
        let instance = parallel_conflict_instance(2);
        let mut tabu = SimpleTabu::new(instance.num_activities(), 10);
        let cancel = AtomicBool::new(false);
        let config = SearchConfig {
            max_iterations: 200,
            max_iter_since_best: 0,
            diversification_swaps: 2,
            seed: 7,
            ..SearchConfig::default()
        };
        let outcome = solve(&instance, &mut tabu, &config, None, &cancel, |_| {});
        assert_eq!(outcome.best_cost, instance.critical_path_makespan());
    }
}
