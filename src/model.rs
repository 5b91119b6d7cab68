//! The 0/1 integer program behind a packing instance, and the conversion of
//! its solved indicators back into server assignments.
//!
//! For `n` workloads the model has `n` candidate slots, `n * n` assignment
//! indicators `x[i][j]` and `n` usage indicators `y[j]`. Slot costs grow with
//! the slot index so that, among packings with the same number of servers,
//! the one filling the lowest slots is strictly cheapest.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{PackError, Result};
use crate::instance::Instance;
use crate::resources::ResourceVector;

/// Index of a variable in a [`DecisionModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Equal,
    LessOrEqual,
}

/// Which family of rows a constraint belongs to.
///
/// Part of the surface a custom [`SolverEngine`](crate::SolverEngine) reads
/// through [`DecisionModel::constraints`], e.g. to handle capacity rows apart
/// from the assignment structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Workload `i` sits on exactly one slot.
    SingleAssignment { workload: usize },
    /// Slot `j` is marked used if anything sits on it.
    UsageLink { slot: usize },
    /// Slot `j` stays within capacity in one dimension.
    Capacity { slot: usize, dimension: usize },
}

/// `sum(coefficient * variable) <relation> bound`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub kind: ConstraintKind,
    pub terms: Vec<(VariableId, f64)>,
    pub relation: Relation,
    pub bound: f64,
}

impl LinearConstraint {
    pub fn is_satisfied_by(&self, values: &VariableValues) -> bool {
        let lhs: f64 = self
            .terms
            .iter()
            .filter(|(var, _)| values.is_set(*var))
            .map(|(_, coefficient)| coefficient)
            .sum();
        match self.relation {
            Relation::Equal => (lhs - self.bound).abs() < 1e-9,
            Relation::LessOrEqual => lhs <= self.bound + 1e-9,
        }
    }
}

/// The integer program for one instance. Owned by a single solve and
/// discarded after extraction.
#[derive(Debug, Clone)]
pub struct DecisionModel {
    slots: usize,
    dimensions: Vec<String>,
    capacity: ResourceVector,
    demands: Vec<ResourceVector>,
    constraints: Vec<LinearConstraint>,
    objective: Vec<(VariableId, f64)>,
}

impl DecisionModel {
    /// Builds the model for a validated instance. An instance that fails
    /// [`Instance::validate`] is refused with the same error.
    pub fn build(instance: &Instance) -> Result<Self> {
        instance.validate()?;

        let n = instance.len();
        let demands: Vec<ResourceVector> = instance
            .workloads()
            .iter()
            .map(|w| w.demand.clone())
            .collect();

        let mut model = Self {
            slots: n,
            dimensions: instance.dimensions().to_vec(),
            capacity: instance.capacity().clone(),
            demands,
            constraints: Vec::new(),
            objective: Vec::new(),
        };

        model.constrain_single_assignment();
        model.constrain_usage_links();
        model.constrain_capacities();
        model.objective = (0..n)
            .map(|slot| (model.usage_var(slot), (slot + 1) as f64))
            .collect();

        debug!(
            workloads = n,
            variables = model.variable_count(),
            constraints = model.constraints.len(),
            "built decision model"
        );
        Ok(model)
    }

    fn constrain_single_assignment(&mut self) {
        for workload in 0..self.workloads() {
            let terms = (0..self.slots)
                .map(|slot| (self.assign_var(workload, slot), 1.0))
                .collect();
            self.constraints.push(LinearConstraint {
                kind: ConstraintKind::SingleAssignment { workload },
                terms,
                relation: Relation::Equal,
                bound: 1.0,
            });
        }
    }

    /// `sum_i x[i][j] - n * y[j] <= 0`. `n` is the most any slot can hold.
    fn constrain_usage_links(&mut self) {
        let big_m = self.workloads() as f64;
        for slot in 0..self.slots {
            let mut terms: Vec<_> = (0..self.workloads())
                .map(|workload| (self.assign_var(workload, slot), 1.0))
                .collect();
            terms.push((self.usage_var(slot), -big_m));
            self.constraints.push(LinearConstraint {
                kind: ConstraintKind::UsageLink { slot },
                terms,
                relation: Relation::LessOrEqual,
                bound: 0.0,
            });
        }
    }

    /// `sum_i demand[i][d] * x[i][j] <= capacity[d]`, each dimension divided
    /// through by the gcd of its capacity and demands so the coefficients
    /// stay as small as the data allows.
    fn constrain_capacities(&mut self) {
        let scales: Vec<u64> = (0..self.dimensions.len())
            .map(|d| self.capacity_scale(d))
            .collect();
        for slot in 0..self.slots {
            for (dimension, &scale) in scales.iter().enumerate() {
                let terms = self
                    .demands
                    .iter()
                    .enumerate()
                    .filter(|(_, demand)| demand.get(dimension) > 0)
                    .map(|(workload, demand)| {
                        let amount = demand.get(dimension) / scale;
                        (self.assign_var(workload, slot), amount as f64)
                    })
                    .collect();
                self.constraints.push(LinearConstraint {
                    kind: ConstraintKind::Capacity { slot, dimension },
                    terms,
                    relation: Relation::LessOrEqual,
                    bound: (self.capacity.get(dimension) / scale) as f64,
                });
            }
        }
    }

    fn capacity_scale(&self, dimension: usize) -> u64 {
        let scale = self
            .demands
            .iter()
            .map(|demand| demand.get(dimension))
            .fold(self.capacity.get(dimension), gcd);
        scale.max(1)
    }

    pub fn workloads(&self) -> usize {
        self.demands.len()
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn capacity(&self) -> &ResourceVector {
        &self.capacity
    }

    pub fn demands(&self) -> &[ResourceVector] {
        &self.demands
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &[(VariableId, f64)] {
        &self.objective
    }

    pub fn variable_count(&self) -> usize {
        self.workloads() * self.slots + self.slots
    }

    /// `x[workload][slot]`
    pub fn assign_var(&self, workload: usize, slot: usize) -> VariableId {
        VariableId(workload * self.slots + slot)
    }

    /// `y[slot]`
    pub fn usage_var(&self, slot: usize) -> VariableId {
        VariableId(self.workloads() * self.slots + slot)
    }

    pub fn objective_value(&self, values: &VariableValues) -> f64 {
        self.objective
            .iter()
            .filter(|(var, _)| values.is_set(*var))
            .map(|(_, cost)| cost)
            .sum()
    }

    /// Every row of the model holds for `values`.
    pub fn is_satisfied_by(&self, values: &VariableValues) -> bool {
        self.constraints.iter().all(|c| c.is_satisfied_by(values))
    }

    /// Turns solved indicators into a slot → workloads map. Slots holding
    /// nothing are left out; a workload placed zero or several times means
    /// the solver broke the model and is reported as such.
    pub fn extract(&self, values: &VariableValues) -> Result<Assignment> {
        if values.len() != self.variable_count() {
            return Err(PackError::InvalidArgument(format!(
                "expected {} variable values, got {}",
                self.variable_count(),
                values.len()
            )));
        }

        let mut placed = vec![false; self.workloads()];
        let mut slots = BTreeMap::new();
        for slot in 0..self.slots {
            let mut members = Vec::new();
            for workload in 0..self.workloads() {
                if !values.is_set(self.assign_var(workload, slot)) {
                    continue;
                }
                if placed[workload] {
                    return Err(PackError::WorkloadPlacedTwice(workload));
                }
                placed[workload] = true;
                members.push(workload);
            }
            if members.is_empty() {
                continue;
            }
            if !values.is_set(self.usage_var(slot)) {
                warn!(slot, "slot holds workloads but is not marked used");
            }
            slots.insert(slot, members);
        }

        if let Some(workload) = placed.iter().position(|p| !p) {
            return Err(PackError::WorkloadNotPlaced(workload));
        }
        Ok(Assignment { slots })
    }
}

/// 0/1 values for every variable of a [`DecisionModel`], indexed by
/// [`VariableId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableValues(Vec<bool>);

impl VariableValues {
    pub fn new(values: Vec<bool>) -> Self {
        Self(values)
    }

    /// Indicators for placing workload `i` on `slot_of[i]`.
    pub fn from_slots(model: &DecisionModel, slot_of: &[usize]) -> Self {
        let mut values = vec![false; model.variable_count()];
        for (workload, &slot) in slot_of.iter().enumerate() {
            values[model.assign_var(workload, slot).0] = true;
            values[model.usage_var(slot).0] = true;
        }
        Self(values)
    }

    pub fn is_set(&self, var: VariableId) -> bool {
        self.0.get(var.0).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Used slot → workloads on it, ascending by workload index.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Assignment {
    slots: BTreeMap<usize, Vec<usize>>,
}

impl Assignment {
    pub fn slots(&self) -> &BTreeMap<usize, Vec<usize>> {
        &self.slots
    }

    pub fn used_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[usize])> {
        self.slots.iter().map(|(slot, ws)| (*slot, ws.as_slice()))
    }

    pub fn slot_of(&self, workload: usize) -> Option<usize> {
        self.iter()
            .find(|(_, workloads)| workloads.contains(&workload))
            .map(|(slot, _)| slot)
    }

    /// The groups of workloads, ignoring which slot holds them.
    pub fn groups(&self) -> Vec<Vec<usize>> {
        let mut groups: Vec<_> = self.slots.values().cloned().collect();
        groups.sort();
        groups
    }
}

impl From<BTreeMap<usize, Vec<usize>>> for Assignment {
    fn from(slots: BTreeMap<usize, Vec<usize>>) -> Self {
        Self { slots }
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
