//! Depth-first branch-and-bound over slot assignments.
//!
//! Workloads are placed in index order. Each workload is tried on every open
//! slot in slot order, then on one freshly opened slot; slots are therefore
//! numbered by first use, which is the same canonical labelling the
//! increasing slot costs of the decision model select. Exploring children in
//! that order makes the first optimal packing found the lexicographically
//! smallest one, so ties go to the lowest workload index first.
//!
//! Pruning:
//! - a slot is only entered if the workload fits in every dimension
//! - a new slot is only opened if that still beats the incumbent
//! - a node is dropped when its open slots plus the slots needed for the
//!   remaining demand that cannot fit in the free space of open slots
//!   cannot beat the incumbent
//!
//! The incumbent is seeded with the first-fit packing (the leftmost dive of
//! the tree) and the search stops as soon as it meets the instance lower
//! bound.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::Result;
use crate::instance::slot_lower_bound;
use crate::model::{DecisionModel, VariableValues};
use crate::resources::ResourceVector;
use crate::solver::{SolveStatus, SolverEngine, SolverResult};

/// How many nodes to expand between clock reads.
const CLOCK_CHECK_INTERVAL: u64 = 256;

#[derive(Debug, Clone, Default)]
pub struct BranchAndBound {
    pub time_limit: Option<Duration>,
    pub node_limit: Option<u64>,
}

impl SolverEngine for BranchAndBound {
    fn solve(&self, model: &DecisionModel) -> Result<SolverResult> {
        let started = Instant::now();
        let mut search = Search::new(model, self, started);
        search.run();

        let proven = search.best_count == search.lower_bound || !search.cut_off;
        let status = if proven {
            SolveStatus::Optimal
        } else {
            SolveStatus::Feasible
        };
        info!(
            slots = search.best_count,
            lower_bound = search.lower_bound,
            nodes = search.nodes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ?status,
            "branch-and-bound finished"
        );

        Ok(SolverResult {
            values: VariableValues::from_slots(model, &search.best),
            status,
        })
    }
}

struct Search<'a> {
    demands: &'a [ResourceVector],
    capacity: &'a ResourceVector,
    /// Load of each open slot, in slot order.
    loads: Vec<ResourceVector>,
    /// Demand of the workloads not placed yet, widened so the total of all
    /// workloads cannot overflow.
    remaining: Vec<u128>,
    slot_of: Vec<usize>,
    best: Vec<usize>,
    best_count: usize,
    lower_bound: usize,
    nodes: u64,
    node_limit: Option<u64>,
    deadline: Option<Instant>,
    cut_off: bool,
}

impl<'a> Search<'a> {
    fn new(model: &'a DecisionModel, engine: &BranchAndBound, started: Instant) -> Self {
        let demands = model.demands();
        let capacity = model.capacity();

        let mut remaining = vec![0u128; capacity.dims()];
        for demand in demands {
            add_demand(&mut remaining, demand);
        }

        let best = first_fit(demands, capacity);
        let best_count = best.iter().max().map_or(0, |last| last + 1);
        let lower_bound = slot_lower_bound(capacity, demands);
        debug!(slots = best_count, lower_bound, "first-fit incumbent");

        Self {
            demands,
            capacity,
            loads: Vec::new(),
            remaining,
            slot_of: vec![0; demands.len()],
            best,
            best_count,
            lower_bound,
            nodes: 0,
            node_limit: engine.node_limit,
            deadline: engine.time_limit.map(|limit| started + limit),
            cut_off: false,
        }
    }

    fn run(&mut self) {
        self.branch(0);
    }

    fn done(&self) -> bool {
        self.cut_off || self.best_count <= self.lower_bound
    }

    fn should_stop(&self) -> bool {
        if self.node_limit.is_some_and(|limit| self.nodes >= limit) {
            return true;
        }
        match self.deadline {
            Some(deadline) if self.nodes % CLOCK_CHECK_INTERVAL == 0 => {
                Instant::now() >= deadline
            }
            _ => false,
        }
    }

    fn branch(&mut self, workload: usize) {
        if self.done() {
            return;
        }
        if self.should_stop() {
            debug!(nodes = self.nodes, slots = self.best_count, "search cut off");
            self.cut_off = true;
            return;
        }
        self.nodes += 1;

        if workload == self.demands.len() {
            if self.loads.len() < self.best_count {
                self.best_count = self.loads.len();
                self.best.clone_from(&self.slot_of);
                debug!(slots = self.best_count, nodes = self.nodes, "improved incumbent");
            }
            return;
        }

        if self.bound() >= self.best_count {
            return;
        }

        let demands = self.demands;
        let demand = &demands[workload];
        remove_demand(&mut self.remaining, demand);

        for slot in 0..self.loads.len() {
            if !self.loads[slot].fits_with(demand, self.capacity) {
                continue;
            }
            self.loads[slot] += demand;
            self.slot_of[workload] = slot;
            self.branch(workload + 1);
            self.loads[slot] -= demand;
            if self.done() {
                break;
            }
        }

        if !self.done() && self.loads.len() + 1 < self.best_count {
            self.slot_of[workload] = self.loads.len();
            self.loads.push(demand.clone());
            self.branch(workload + 1);
            self.loads.pop();
        }

        add_demand(&mut self.remaining, demand);
    }

    /// Open slots plus the extra slots the unplaced demand needs beyond the
    /// free space already open, in the tightest dimension.
    fn bound(&self) -> usize {
        let extra = (0..self.capacity.dims())
            .filter(|&d| self.capacity.get(d) > 0)
            .map(|d| {
                let limit = u128::from(self.capacity.get(d));
                let free: u128 = self
                    .loads
                    .iter()
                    .map(|load| limit - u128::from(load.get(d)))
                    .sum();
                self.remaining[d].saturating_sub(free).div_ceil(limit)
            })
            .max()
            .unwrap_or(0);
        self.loads
            .len()
            .saturating_add(usize::try_from(extra).unwrap_or(usize::MAX))
    }
}

fn add_demand(totals: &mut [u128], demand: &ResourceVector) {
    for (total, amount) in totals.iter_mut().zip(demand.values()) {
        *total += u128::from(*amount);
    }
}

fn remove_demand(totals: &mut [u128], demand: &ResourceVector) {
    for (total, amount) in totals.iter_mut().zip(demand.values()) {
        *total -= u128::from(*amount);
    }
}

/// Each workload, in index order, goes to the lowest slot it fits on.
fn first_fit(demands: &[ResourceVector], capacity: &ResourceVector) -> Vec<usize> {
    let mut loads: Vec<ResourceVector> = Vec::new();
    demands
        .iter()
        .map(|demand| {
            match loads
                .iter()
                .position(|load| load.fits_with(demand, capacity))
            {
                Some(slot) => {
                    loads[slot] += demand;
                    slot
                }
                None => {
                    loads.push(demand.clone());
                    loads.len() - 1
                }
            }
        })
        .collect()
}
