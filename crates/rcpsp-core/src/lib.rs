//! # rcpsp-core
//!
//! Core domain model and error types for the RCPSP tabu-search engine.
//!
//! This crate provides:
//! - `Instance`: the immutable, preprocessed project description (activities,
//!   resources, precedence graph, and the derived closures/bounds the solver
//!   needs on every iteration).
//! - `Solution`: the mutable activity ordering the search operates on.
//! - `MoveKind`: the two neighborhood move kinds (swap, shift) shared by the
//!   tabu memories and the search driver.
//! - Error types for instance construction and invariant violations.
//!
//! ## Example
//!
//! ```rust
//! use rcpsp_core::{Instance, InstanceBuilder};
//!
//! let instance = InstanceBuilder::new(4, 1)
//!     .duration(0, 0).duration(1, 3).duration(2, 5).duration(3, 0)
//!     .capacity(0, 1)
//!     .demand(1, 0, 1).demand(2, 0, 1)
//!     .successor(0, 1).successor(1, 2).successor(2, 3)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(instance.critical_path_makespan(), 8);
//! ```

use std::collections::VecDeque;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of an activity. Activity 0 is always the source dummy,
/// activity `num_activities() - 1` is always the sink dummy.
pub type ActivityId = u32;

/// Identifier of a renewable resource.
pub type ResourceId = u32;

// ============================================================================
// Errors
// ============================================================================

/// Fatal problems discovered while building an [`Instance`].
///
/// Corresponds to `InstanceError` in the error design: a semantically
/// inconsistent graph or demand that cannot fit capacity. Surfaced by
/// callers as a runtime failure (exit code 2 at the CLI boundary).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InstanceError {
    #[error("successor graph is not a DAG: cycle reachable from activity {0}")]
    NotADag(ActivityId),

    #[error("activity {activity} demand {demand} for resource {resource} exceeds capacity {capacity}")]
    DemandExceedsCapacity {
        activity: ActivityId,
        resource: ResourceId,
        demand: u32,
        capacity: u32,
    },

    #[error("instance must have at least 2 activities, got {0}")]
    TooFewActivities(u32),

    #[error("successor {successor} of activity {activity} is out of range (num_activities = {num_activities})")]
    SuccessorOutOfRange {
        activity: ActivityId,
        successor: ActivityId,
        num_activities: u32,
    },

    #[error("resource {0} has zero capacity")]
    ZeroCapacity(ResourceId),

    #[error("source activity 0 cannot reach sink activity {sink}, or sink cannot reach source: disconnected graph")]
    Disconnected { sink: ActivityId },
}

/// A programming error: an invariant the engine relies on was violated.
///
/// These never originate from user input; they indicate a bug in the
/// driver, evaluator, or tabu memory. The process aborts with this
/// diagnostic rather than attempting to continue (exit code 2).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("tabu memory: duplicate insertion of move ({0}, {1}, {2:?})")]
    DuplicateTabuEntry(u32, u32, MoveKind),

    #[error("evaluator asked to commit negative remaining capacity for resource {0} at time {1}")]
    NegativeRemainingCapacity(ResourceId, u32),

    #[error("search driver applied unknown move kind")]
    UnknownMoveKind,

    #[error("order of length {0} is not a permutation of 0..{1}")]
    NotAPermutation(usize, usize),
}

// ============================================================================
// Move kind
// ============================================================================

/// The two neighborhood move kinds generated by the search driver.
///
/// Ordering matters: the deterministic iteration-best tie-break (§5) sorts
/// lexicographically on `(MoveKind, i, j, shift_target)` with `Swap` before
/// `Shift`, which is why this derives `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MoveKind {
    Swap,
    Shift,
}

impl std::fmt::Display for MoveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MoveKind::Swap => write!(f, "swap"),
            MoveKind::Shift => write!(f, "shift"),
        }
    }
}

// ============================================================================
// Instance
// ============================================================================

/// Immutable, preprocessed description of an RCPSP project.
///
/// Built once via [`InstanceBuilder`]; every derived field (predecessors,
/// transitive closures, critical path, right-to-left longest paths, the
/// disjunctive matrix) is computed at construction time and frozen.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Instance {
    num_activities: u32,
    num_resources: u32,
    duration: Vec<u32>,
    capacity: Vec<u32>,
    /// `demand[a * num_resources + r]`
    demand: Vec<u32>,
    successors: Vec<Vec<ActivityId>>,
    predecessors: Vec<Vec<ActivityId>>,
    /// `successor_matrix[i * n + j] == true` iff `j` is a direct successor of `i`.
    successor_matrix: Vec<bool>,
    all_successors: Vec<Vec<ActivityId>>,
    all_predecessors: Vec<Vec<ActivityId>>,
    critical_path_makespan: u32,
    right_left_longest_path: Vec<u32>,
    upper_bound_makespan: u32,
    /// `disjunctive_matrix[i * n + j] == true` iff `i`,`j` cannot run concurrently.
    disjunctive_matrix: Vec<bool>,
    seed_order: Vec<ActivityId>,
}

impl Instance {
    #[inline]
    pub fn num_activities(&self) -> u32 {
        self.num_activities
    }

    #[inline]
    pub fn num_resources(&self) -> u32 {
        self.num_resources
    }

    #[inline]
    pub fn source(&self) -> ActivityId {
        0
    }

    #[inline]
    pub fn sink(&self) -> ActivityId {
        self.num_activities - 1
    }

    #[inline]
    pub fn duration(&self, activity: ActivityId) -> u32 {
        self.duration[activity as usize]
    }

    #[inline]
    pub fn capacity(&self, resource: ResourceId) -> u32 {
        self.capacity[resource as usize]
    }

    #[inline]
    pub fn demand(&self, activity: ActivityId, resource: ResourceId) -> u32 {
        self.demand[(activity * self.num_resources + resource) as usize]
    }

    /// Per-activity demand row, one entry per resource.
    pub fn demands(&self, activity: ActivityId) -> &[u32] {
        let start = (activity * self.num_resources) as usize;
        &self.demand[start..start + self.num_resources as usize]
    }

    pub fn successors(&self, activity: ActivityId) -> &[ActivityId] {
        &self.successors[activity as usize]
    }

    pub fn predecessors(&self, activity: ActivityId) -> &[ActivityId] {
        &self.predecessors[activity as usize]
    }

    pub fn all_successors(&self, activity: ActivityId) -> &[ActivityId] {
        &self.all_successors[activity as usize]
    }

    pub fn all_predecessors(&self, activity: ActivityId) -> &[ActivityId] {
        &self.all_predecessors[activity as usize]
    }

    #[inline]
    pub fn is_direct_successor(&self, i: ActivityId, j: ActivityId) -> bool {
        self.successor_matrix[(i * self.num_activities + j) as usize]
    }

    /// True iff `i` and `j` are either precedence-ordered (either direction)
    /// or jointly over-demand some resource, i.e. they can never run at the
    /// same instant in a feasible schedule.
    #[inline]
    pub fn is_disjunctive(&self, i: ActivityId, j: ActivityId) -> bool {
        self.disjunctive_matrix[(i * self.num_activities + j) as usize]
    }

    #[inline]
    pub fn critical_path_makespan(&self) -> u32 {
        self.critical_path_makespan
    }

    #[inline]
    pub fn right_left_longest_path(&self, activity: ActivityId) -> u32 {
        self.right_left_longest_path[activity as usize]
    }

    #[inline]
    pub fn upper_bound_makespan(&self) -> u32 {
        self.upper_bound_makespan
    }

    /// A feasible topological linearisation used as the search's starting
    /// point: BFS level labeling from the source, ties broken by ascending id.
    pub fn seed_order(&self) -> &[ActivityId] {
        &self.seed_order
    }

    /// Per-resource area-based lower bound (§4.6): `ceil(sum(duration[a] *
    /// demand[a][r]) / capacity[r])`, ignoring precedence entirely.
    pub fn resource_lower_bound(&self, resource: ResourceId) -> u32 {
        let cap = self.capacity(resource);
        let area: u64 = (0..self.num_activities)
            .map(|a| u64::from(self.duration(a)) * u64::from(self.demand(a, resource)))
            .sum();
        ((area + u64::from(cap) - 1) / u64::from(cap)) as u32
    }

    /// `max(critical_path_makespan, max over r of resource_lower_bound(r))`.
    /// Diagnostic only; the search terminates on `critical_path_makespan`
    /// alone, per §4.4.
    pub fn lower_bound(&self) -> u32 {
        (0..self.num_resources)
            .map(|r| self.resource_lower_bound(r))
            .fold(self.critical_path_makespan, u32::max)
    }

    /// Checks that `order` is a topologically valid permutation of
    /// `0..num_activities`: for every edge `i -> j`,
    /// `position(i) < position(j)`.
    pub fn is_topological(&self, order: &[ActivityId]) -> bool {
        if order.len() != self.num_activities as usize {
            return false;
        }
        let mut position = vec![0u32; self.num_activities as usize];
        for (idx, &activity) in order.iter().enumerate() {
            position[activity as usize] = idx as u32;
        }
        for i in 0..self.num_activities {
            for &j in self.successors(i) {
                if position[i as usize] >= position[j as usize] {
                    return false;
                }
            }
        }
        true
    }
}

// ============================================================================
// InstanceBuilder
// ============================================================================

/// Builds an [`Instance`], validating and deriving all frozen structures.
///
/// Mirrors the two-phase construction the loader needs: fill in raw
/// activity/resource data (durations, demands, capacities, successors),
/// then [`build`](InstanceBuilder::build) runs preprocessing (§4.1) and
/// either returns a ready-to-search `Instance` or an [`InstanceError`].
pub struct InstanceBuilder {
    num_activities: u32,
    num_resources: u32,
    duration: Vec<u32>,
    capacity: Vec<u32>,
    demand: Vec<u32>,
    successors: Vec<Vec<ActivityId>>,
}

impl InstanceBuilder {
    pub fn new(num_activities: u32, num_resources: u32) -> Self {
        Self {
            num_activities,
            num_resources,
            duration: vec![0; num_activities as usize],
            capacity: vec![0; num_resources as usize],
            demand: vec![0; (num_activities * num_resources) as usize],
            successors: vec![Vec::new(); num_activities as usize],
        }
    }

    pub fn duration(mut self, activity: ActivityId, duration: u32) -> Self {
        self.duration[activity as usize] = duration;
        self
    }

    pub fn capacity(mut self, resource: ResourceId, capacity: u32) -> Self {
        self.capacity[resource as usize] = capacity;
        self
    }

    pub fn demand(mut self, activity: ActivityId, resource: ResourceId, demand: u32) -> Self {
        self.demand[(activity * self.num_resources + resource) as usize] = demand;
        self
    }

    pub fn successor(mut self, activity: ActivityId, successor: ActivityId) -> Self {
        self.successors[activity as usize].push(successor);
        self
    }

    pub fn build(self) -> Result<Instance, InstanceError> {
        let n = self.num_activities;
        if n < 2 {
            return Err(InstanceError::TooFewActivities(n));
        }
        for (activity, succs) in self.successors.iter().enumerate() {
            for &s in succs {
                if s >= n {
                    return Err(InstanceError::SuccessorOutOfRange {
                        activity: activity as u32,
                        successor: s,
                        num_activities: n,
                    });
                }
            }
        }
        for r in 0..self.num_resources {
            if self.capacity[r as usize] == 0 {
                return Err(InstanceError::ZeroCapacity(r));
            }
        }
        for a in 0..n {
            for r in 0..self.num_resources {
                let d = self.demand[(a * self.num_resources + r) as usize];
                let cap = self.capacity[r as usize];
                if d > cap {
                    return Err(InstanceError::DemandExceedsCapacity {
                        activity: a,
                        resource: r,
                        demand: d,
                        capacity: cap,
                    });
                }
            }
        }

        let predecessors = build_predecessors(n, &self.successors);
        check_is_dag(n, &self.successors)?;

        let successor_matrix = build_adjacency_matrix(n, &self.successors);
        let all_successors = transitive_closure(n, &self.successors);
        let all_predecessors = transitive_closure(n, &predecessors);

        let seed_order = level_order(n, &self.successors);
        let critical_path_makespan = longest_path(n, &seed_order, &self.successors, &self.duration);
        let right_left_longest_path =
            right_left_longest_paths(&seed_order, &predecessors, &self.duration);
        let upper_bound_makespan: u32 = self.duration.iter().sum();

        let sink = n - 1;
        if !all_successors[0].contains(&sink) {
            return Err(InstanceError::Disconnected { sink });
        }

        let disjunctive_matrix = build_disjunctive_matrix(
            n,
            self.num_resources,
            &all_successors,
            &all_predecessors,
            &self.demand,
            &self.capacity,
        );

        Ok(Instance {
            num_activities: n,
            num_resources: self.num_resources,
            duration: self.duration,
            capacity: self.capacity,
            demand: self.demand,
            successors: self.successors,
            predecessors,
            successor_matrix,
            all_successors,
            all_predecessors,
            critical_path_makespan,
            right_left_longest_path,
            upper_bound_makespan,
            disjunctive_matrix,
            seed_order,
        })
    }
}

fn build_predecessors(n: u32, successors: &[Vec<ActivityId>]) -> Vec<Vec<ActivityId>> {
    let mut predecessors = vec![Vec::new(); n as usize];
    for (activity, succs) in successors.iter().enumerate() {
        for &s in succs {
            predecessors[s as usize].push(activity as u32);
        }
    }
    predecessors
}

fn build_adjacency_matrix(n: u32, successors: &[Vec<ActivityId>]) -> Vec<bool> {
    let mut matrix = vec![false; (n * n) as usize];
    for (activity, succs) in successors.iter().enumerate() {
        for &s in succs {
            matrix[activity * n as usize + s as usize] = true;
        }
    }
    matrix
}

/// Kahn's algorithm; returns `Err` naming an activity still unvisited if a
/// cycle remains, i.e. the graph is not a DAG.
fn check_is_dag(n: u32, successors: &[Vec<ActivityId>]) -> Result<(), InstanceError> {
    let mut in_degree = vec![0u32; n as usize];
    for succs in successors {
        for &s in succs {
            in_degree[s as usize] += 1;
        }
    }
    let mut queue: VecDeque<ActivityId> = (0..n).filter(|&a| in_degree[a as usize] == 0).collect();
    let mut visited = 0u32;
    while let Some(a) = queue.pop_front() {
        visited += 1;
        for &s in &successors[a as usize] {
            in_degree[s as usize] -= 1;
            if in_degree[s as usize] == 0 {
                queue.push_back(s);
            }
        }
    }
    if visited != n {
        let stuck = (0..n).find(|&a| in_degree[a as usize] > 0).unwrap_or(0);
        return Err(InstanceError::NotADag(stuck));
    }
    Ok(())
}

/// BFS level labeling from the source; returns activities ordered by
/// ascending level, ties broken by ascending id (§4.1).
fn level_order(n: u32, successors: &[Vec<ActivityId>]) -> Vec<ActivityId> {
    let mut level = vec![0u32; n as usize];
    let mut current: Vec<ActivityId> = vec![0];
    let mut seen = vec![false; n as usize];
    seen[0] = true;
    let mut depth = 0u32;
    while !current.is_empty() {
        let mut next = Vec::new();
        for &a in &current {
            level[a as usize] = depth;
            for &s in &successors[a as usize] {
                if !seen[s as usize] {
                    seen[s as usize] = true;
                    next.push(s);
                }
            }
        }
        current = next;
        depth += 1;
    }
    let mut order: Vec<ActivityId> = (0..n).collect();
    order.sort_by_key(|&a| (level[a as usize], a));
    order
}

/// Longest path source -> sink over a topological order, edges weighted by
/// tail duration (Kahn-style relaxation).
fn longest_path(
    n: u32,
    topo_order: &[ActivityId],
    successors: &[Vec<ActivityId>],
    duration: &[u32],
) -> u32 {
    let mut finish = vec![0u32; n as usize];
    for &a in topo_order {
        let a_finish = finish[a as usize] + duration[a as usize];
        for &s in &successors[a as usize] {
            finish[s as usize] = finish[s as usize].max(a_finish);
        }
        finish[a as usize] = finish[a as usize].max(duration[a as usize]);
    }
    finish.into_iter().max().unwrap_or(0)
}

/// Longest path from each activity to the sink on the edge-reversed graph,
/// used as the admissible tail bound in the overhang penalty (§4.5).
fn right_left_longest_paths(
    topo_order: &[ActivityId],
    predecessors: &[Vec<ActivityId>],
    duration: &[u32],
) -> Vec<u32> {
    let mut tail = vec![0u32; predecessors.len()];
    // A longest path from `a` to the sink is the longest path on the
    // edge-reversed graph rooted at the sink. Processing activities in
    // reverse topological order and propagating from successor to
    // predecessor computes this in one backward pass over the original
    // graph, without materializing the reversed adjacency lists.
    for &a in topo_order.iter().rev() {
        for &p in &predecessors[a as usize] {
            let candidate = tail[a as usize] + duration[p as usize];
            tail[p as usize] = tail[p as usize].max(candidate);
        }
    }
    tail
}

fn transitive_closure(n: u32, adjacency: &[Vec<ActivityId>]) -> Vec<Vec<ActivityId>> {
    let mut closure = vec![Vec::new(); n as usize];
    for start in 0..n {
        let mut visited = vec![false; n as usize];
        let mut stack: Vec<ActivityId> = adjacency[start as usize].clone();
        while let Some(a) = stack.pop() {
            if !visited[a as usize] {
                visited[a as usize] = true;
                stack.extend(adjacency[a as usize].iter().copied());
            }
        }
        let mut reached: Vec<ActivityId> = (0..n).filter(|&a| visited[a as usize]).collect();
        reached.sort_unstable();
        closure[start as usize] = reached;
    }
    closure
}

fn build_disjunctive_matrix(
    n: u32,
    num_resources: u32,
    all_successors: &[Vec<ActivityId>],
    all_predecessors: &[Vec<ActivityId>],
    demand: &[u32],
    capacity: &[u32],
) -> Vec<bool> {
    let mut matrix = vec![false; (n * n) as usize];
    for i in 0..n {
        for j in (i + 1)..n {
            let precedence_ordered =
                all_successors[i as usize].binary_search(&j).is_ok()
                    || all_predecessors[i as usize].binary_search(&j).is_ok();
            let resource_conflict = (0..num_resources).any(|r| {
                let di = demand[(i * num_resources + r) as usize];
                let dj = demand[(j * num_resources + r) as usize];
                di + dj > capacity[r as usize]
            });
            if precedence_ordered || resource_conflict {
                matrix[(i * n + j) as usize] = true;
                matrix[(j * n + i) as usize] = true;
            }
        }
    }
    matrix
}

// ============================================================================
// Solution
// ============================================================================

/// A mutable activity ordering: a topologically valid permutation of
/// `0..num_activities`, plus the best ordering and cost seen so far.
#[derive(Debug, Clone)]
pub struct Solution {
    pub order: Vec<ActivityId>,
    pub best_order: Vec<ActivityId>,
    pub best_cost: u32,
}

impl Solution {
    /// Seeds a solution from the instance's initial level-order linearisation.
    pub fn seeded(instance: &Instance, initial_cost: u32) -> Self {
        let order = instance.seed_order().to_vec();
        Self {
            best_order: order.clone(),
            order,
            best_cost: initial_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_instance() -> Instance {
        // S1 in the testable-properties scenarios: 0 -> 1 -> 2 -> 3.
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
    fn critical_path_matches_chain_length() {
        let instance = chain_instance();
        assert_eq!(instance.critical_path_makespan(), 8);
    }

    #[test]
    fn seed_order_is_topological() {
        let instance = chain_instance();
        assert!(instance.is_topological(instance.seed_order()));
        assert_eq!(instance.seed_order(), &[0, 1, 2, 3]);
    }

    #[test]
    fn direct_successor_matrix_matches_edges() {
        let instance = chain_instance();
        assert!(instance.is_direct_successor(0, 1));
        assert!(!instance.is_direct_successor(0, 2));
        assert!(instance.is_direct_successor(2, 3));
    }

    #[test]
    fn transitive_closure_includes_indirect_successors() {
        let instance = chain_instance();
        assert_eq!(instance.all_successors(0), &[1, 2, 3]);
        assert_eq!(instance.all_predecessors(3), &[0, 1, 2]);
    }

    #[test]
    fn disjunctive_matrix_flags_precedence_pairs() {
        let instance = chain_instance();
        assert!(instance.is_disjunctive(0, 3));
        assert!(instance.is_disjunctive(1, 2));
    }

    #[test]
    fn right_left_longest_path_is_zero_at_sink() {
        let instance = chain_instance();
        assert_eq!(instance.right_left_longest_path(3), 0);
        assert_eq!(instance.right_left_longest_path(2), 0);
        assert_eq!(instance.right_left_longest_path(0), 8);
    }

    #[test]
    fn resource_lower_bound_is_area_based() {
        let instance = chain_instance();
        // Total area = 3*1 + 5*1 = 8, capacity 1 -> lower bound 8.
        assert_eq!(instance.resource_lower_bound(0), 8);
        assert_eq!(instance.lower_bound(), 8);
    }

    #[test]
    fn demand_exceeding_capacity_is_rejected() {
        let result = InstanceBuilder::new(2, 1)
            .capacity(0, 1)
            .demand(0, 0, 5)
            .successor(0, 1)
            .build();
        assert!(matches!(
            result,
            Err(InstanceError::DemandExceedsCapacity { .. })
        ));
    }

    #[test]
    fn cyclic_graph_is_rejected() {
        let result = InstanceBuilder::new(3, 1)
            .capacity(0, 1)
            .successor(0, 1)
            .successor(1, 2)
            .successor(2, 1)
            .build();
        assert!(matches!(result, Err(InstanceError::NotADag(_))));
    }

    #[test]
    fn parallel_with_capacity_conflict_disjunctive() {
        // S2: 0 -> 1, 0 -> 2, 1 -> 3, 2 -> 3; capacity 1 forces disjunction of 1,2.
        let instance = InstanceBuilder::new(4, 1)
            .duration(0, 0)
            .duration(1, 4)
            .duration(2, 3)
            .duration(3, 0)
            .capacity(0, 1)
            .demand(1, 0, 1)
            .demand(2, 0, 1)
            .successor(0, 1)
            .successor(0, 2)
            .successor(1, 3)
            .successor(2, 3)
            .build()
            .unwrap();
        assert!(instance.is_disjunctive(1, 2));
        assert_eq!(instance.critical_path_makespan(), 4);
    }
}
