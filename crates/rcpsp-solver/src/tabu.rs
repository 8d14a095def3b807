//! Tabu memory variants (§4.3).
//!
//! Both variants answer the same two questions — "is this move currently
//! forbidden" and "remember that this move was just taken" — but trade off
//! memory shape and adaptivity differently: [`SimpleTabu`] is a fixed-size
//! FIFO ring buffer backed by a dense forbidden-move matrix; [`AgingTabu`]
//! is a variable-length list whose entries decay at a rate that steepens
//! the longer the search goes without improving, with elite-restart
//! snapshots of the best and second-best tabu states.

use std::collections::{HashSet, VecDeque};

use rand::RngCore;
use rcpsp_core::{InvariantViolation, MoveKind};

/// Shared contract for tabu memory implementations. Object-safe (`&mut dyn
/// RngCore` rather than a generic) so the driver can hold a
/// `Box<dyn TabuMemory>` chosen once at startup from the CLI flag.
pub trait TabuMemory {
    /// Whether `(i, j, kind)` may currently be applied.
    fn is_allowed(&self, i: u32, j: u32, kind: MoveKind) -> bool;

    /// Records that `(i, j, kind)` was just applied.
    fn record(&mut self, i: u32, j: u32, kind: MoveKind) -> Result<(), InvariantViolation>;

    /// Removes a fraction of entries to escape an over-constrained memory
    /// state (§4.5, diversification).
    fn prune(&mut self, rng: &mut dyn RngCore);

    /// Called when a strictly-improving solution has just been accepted;
    /// only [`AgingTabu`] uses this for elite snapshotting.
    fn on_new_best(&mut self) {}

    /// Called once per completed iteration; only [`AgingTabu`] ages and
    /// potentially restarts from an elite snapshot here.
    fn advance_iteration(&mut self, rng: &mut dyn RngCore) {
        let _ = rng;
    }
}

/// Fixed-size circular buffer of the last `capacity` moves, backed by an
/// `n x n` forbidden-move matrix for O(1) lookup. The move kind is ignored;
/// any swap or shift touching the same pair of positions is equally tabu.
pub struct SimpleTabu {
    n: usize,
    capacity: usize,
    ring: VecDeque<(u32, u32)>,
    forbidden: Vec<bool>,
}

impl SimpleTabu {
    pub fn new(num_activities: u32, capacity: usize) -> Self {
        let n = num_activities as usize;
        Self {
            n,
            capacity,
            ring: VecDeque::with_capacity(capacity),
            forbidden: vec![false; n * n],
        }
    }

    fn index(&self, i: u32, j: u32) -> usize {
        i as usize * self.n + j as usize
    }
}

impl TabuMemory for SimpleTabu {
    fn is_allowed(&self, i: u32, j: u32, _kind: MoveKind) -> bool {
        !self.forbidden[self.index(i, j)]
    }

    fn record(&mut self, i: u32, j: u32, _kind: MoveKind) -> Result<(), InvariantViolation> {
        if self.ring.len() == self.capacity {
            if let Some((old_i, old_j)) = self.ring.pop_front() {
                let idx = self.index(old_i, old_j);
                self.forbidden[idx] = false;
            }
        }
        let idx = self.index(i, j);
        self.forbidden[idx] = true;
        self.ring.push_back((i, j));
        Ok(())
    }

    fn prune(&mut self, rng: &mut dyn RngCore) {
        let remove_count = (self.ring.len() as f64 * 0.3) as usize;
        let mut indices: Vec<usize> = (0..self.ring.len()).collect();
        shuffle(&mut indices, rng);
        let mut removed: Vec<usize> = indices.into_iter().take(remove_count).collect();
        removed.sort_unstable_by(|a, b| b.cmp(a));
        for idx in removed {
            if let Some((i, j)) = self.ring.remove(idx) {
                let flat = self.index(i, j);
                self.forbidden[flat] = false;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Move {
    i: u32,
    j: u32,
    kind: MoveKind,
}

#[derive(Clone)]
struct AgedMove {
    mv: Move,
    life: u32,
}

/// Variable-size list with a sigmoidal aging schedule and elite restart.
///
/// Entries carry a `life` counter seeded from `swap_life`/`shift_life`; each
/// iteration erases `ptl * len` entries from the front, where `ptl` grows
/// from ~0 to ~1 as the fraction of iterations since the last best solution
/// approaches 1 (`ptl = 1 / (1 + e^{-8*phase + 4})`). When the driver decides
/// the search has stagnated, [`AgingTabu::prune`] replaces the memory
/// snapshot with the second-best (falling back to best) snapshot and erases
/// a random fraction of it, a soft restart that nudges the search away from
/// its current neighborhood without losing all memory. The driver owns the
/// single stagnation counter that gates this; `AgingTabu` keeps its own
/// mirror only to drive the aging-rate phase, reset in lockstep via
/// [`TabuMemory::on_new_best`] and [`AgingTabu::prune`].
pub struct AgingTabu {
    swap_life: u32,
    shift_life: u32,
    max_iter_since_best: u32,
    randomize_erase_amount: f64,
    iter_since_best: u32,
    ptl: f64,
    ptl_remainder: f64,
    moves: VecDeque<AgedMove>,
    present: HashSet<Move>,
    best_snapshot: Option<(VecDeque<AgedMove>, HashSet<Move>)>,
    second_best_snapshot: Option<(VecDeque<AgedMove>, HashSet<Move>)>,
}

impl AgingTabu {
    pub fn new(
        swap_life: u32,
        shift_life: u32,
        max_iter_since_best: u32,
        randomize_erase_amount: f64,
    ) -> Self {
        let mut tabu = Self {
            swap_life,
            shift_life,
            max_iter_since_best,
            randomize_erase_amount,
            iter_since_best: 0,
            ptl: 0.0,
            ptl_remainder: 0.0,
            moves: VecDeque::new(),
            present: HashSet::new(),
            best_snapshot: None,
            second_best_snapshot: None,
        };
        tabu.recompute_ptl();
        tabu
    }

    fn recompute_ptl(&mut self) {
        let phase = self.iter_since_best as f64 / self.max_iter_since_best.max(1) as f64;
        self.ptl = 1.0 / (1.0 + (-8.0 * phase + 4.0).exp());
    }

    fn life_for(&self, kind: MoveKind) -> u32 {
        match kind {
            MoveKind::Swap => self.swap_life,
            MoveKind::Shift => self.shift_life,
        }
    }
}

impl TabuMemory for AgingTabu {
    fn is_allowed(&self, i: u32, j: u32, kind: MoveKind) -> bool {
        !self.present.contains(&Move { i, j, kind })
    }

    fn record(&mut self, i: u32, j: u32, kind: MoveKind) -> Result<(), InvariantViolation> {
        let mv = Move { i, j, kind };
        if !self.present.insert(mv) {
            return Err(InvariantViolation::DuplicateTabuEntry(i, j, kind));
        }
        self.moves.push_back(AgedMove {
            mv,
            life: self.life_for(kind),
        });
        Ok(())
    }

    /// Replaces the current tabu state with the second-best (or best)
    /// snapshot, then randomly erases `ceil(f * |tabu|)` of its entries and
    /// resets the aging cursors. Called by the driver alone, when its own
    /// stagnation counter crosses `max_iter_since_best`.
    fn prune(&mut self, rng: &mut dyn RngCore) {
        let snapshot = self
            .second_best_snapshot
            .clone()
            .or_else(|| self.best_snapshot.clone());
        if let Some((moves, present)) = snapshot {
            self.moves = moves;
            self.present = present;
        }

        let erase_count = (self.moves.len() as f64 * self.randomize_erase_amount).ceil() as usize;
        let mut indices: Vec<usize> = (0..self.moves.len()).collect();
        shuffle(&mut indices, rng);
        let mut removed: Vec<usize> = indices.into_iter().take(erase_count).collect();
        removed.sort_unstable_by(|a, b| b.cmp(a));
        for idx in removed {
            if let Some(aged) = self.moves.remove(idx) {
                self.present.remove(&aged.mv);
            }
        }

        self.iter_since_best = 0;
        self.recompute_ptl();
        self.ptl_remainder = 0.0;
    }

    fn on_new_best(&mut self) {
        if let Some(best) = self.best_snapshot.clone() {
            self.second_best_snapshot = Some(best);
        }
        self.best_snapshot = Some((self.moves.clone(), self.present.clone()));
        self.iter_since_best = 0;
    }

    fn advance_iteration(&mut self, rng: &mut dyn RngCore) {
        let _ = rng;
        let size_of_range = self.ptl * self.moves.len() as f64 + self.ptl_remainder;
        let erase_count = size_of_range as usize;
        for _ in 0..erase_count.min(self.moves.len()) {
            if let Some(front) = self.moves.front_mut() {
                front.life = front.life.saturating_sub(1);
                if front.life == 0 {
                    let aged = self.moves.pop_front().unwrap();
                    self.present.remove(&aged.mv);
                } else {
                    let aged = self.moves.pop_front().unwrap();
                    self.moves.push_back(aged);
                }
            }
        }

        self.recompute_ptl();
        self.ptl_remainder = size_of_range - erase_count as f64;
        self.iter_since_best += 1;
    }
}

fn shuffle<T>(items: &mut [T], rng: &mut dyn RngCore) {
    for i in (1..items.len()).rev() {
        let j = (rng.next_u32() as usize) % (i + 1);
        items.swap(i, j);
    }
}
