//! Parallel tabu-search engine for the resource-constrained project
//! scheduling problem.
//!
//! This crate turns an [`rcpsp_core::Instance`] into a resource- and
//! precedence-feasible schedule by iteratively perturbing an activity order
//! with swap/shift moves, guided by a pluggable [`tabu::TabuMemory`] and two
//! interchangeable resource-feasibility [`evaluator::EvaluatorKind`]s. See
//! [`search::solve`] for the driver entry point.
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use rcpsp_core::InstanceBuilder;
//! use rcpsp_solver::search::{solve, SearchConfig};
//! use rcpsp_solver::tabu::SimpleTabu;
//!
//! let instance = InstanceBuilder::new(2, 1)
//!     .duration(0, 0)
//!     .duration(1, 0)
//!     .capacity(0, 1)
//!     .successor(0, 1)
//!     .build()
//!     .unwrap();
//! let mut tabu = SimpleTabu::new(instance.num_activities(), 40);
//! let cancel = AtomicBool::new(false);
//! let outcome = solve(&instance, &mut tabu, &SearchConfig::default(), None, &cancel, |_| {});
//! assert_eq!(outcome.best_cost, 0);
//! ```

pub mod evaluator;
pub mod overhang;
pub mod search;
pub mod shakedown;
pub mod tabu;

pub use evaluator::{evaluate_order, EvaluatorKind, Schedule};
pub use overhang::{overhang_penalty, overhang_penalty_against_best, OVERHANG_BASELINE_OFFSET};
pub use search::{solve, IterationRecord, SearchConfig, SolveOutcome};
pub use shakedown::shake_down;
pub use tabu::{AgingTabu, SimpleTabu, TabuMemory};

/// Which [`tabu::TabuMemory`] implementation to build, chosen once at
/// startup from the CLI flag (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabuKind {
    Simple { capacity: usize },
    Aging {
        swap_life: u32,
        shift_life: u32,
        max_iter_since_best: u32,
        randomize_erase_amount_millis: u32,
    },
}

impl TabuKind {
    /// Builds the configured tabu memory for an instance of `num_activities`
    /// activities.
    pub fn build(self, num_activities: u32) -> Box<dyn TabuMemory> {
        match self {
            TabuKind::Simple { capacity } => Box::new(SimpleTabu::new(num_activities, capacity)),
            TabuKind::Aging {
                swap_life,
                shift_life,
                max_iter_since_best,
                randomize_erase_amount_millis,
            } => Box::new(AgingTabu::new(
                swap_life,
                shift_life,
                max_iter_since_best,
                f64::from(randomize_erase_amount_millis) / 1000.0,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use rcpsp_core::InstanceBuilder;

    #[test]
    fn tabu_kind_builds_simple_and_aging() {
        let simple = TabuKind::Simple { capacity: 20 }.build(10);
        assert!(simple.is_allowed(0, 1, rcpsp_core::MoveKind::Swap));

        let aging = TabuKind::Aging {
            swap_life: 80,
            shift_life: 120,
            max_iter_since_best: 300,
            randomize_erase_amount_millis: 300,
        }
        .build(10);
        assert!(aging.is_allowed(0, 1, rcpsp_core::MoveKind::Swap));
    }

    #[test]
    fn public_solve_reexport_runs_end_to_end() {
        let instance = InstanceBuilder::new(2, 1)
            .duration(0, 0)
            .duration(1, 0)
            .capacity(0, 1)
            .successor(0, 1)
            .build()
            .unwrap();
        let mut tabu = SimpleTabu::new(instance.num_activities(), 40);
        let cancel = AtomicBool::new(false);
        let outcome = solve(&instance, &mut tabu, &SearchConfig::default(), None, &cancel, |_| {});
        assert_eq!(outcome.best_cost, 0);
    }
}
