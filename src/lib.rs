//! Pack virtual machines onto the fewest identical servers.
//!
//! The pipeline is validate → build the 0/1 model → solve → extract →
//! verify, each stage finishing before the next starts:
//!
//! - **`instance`**: workloads, the server template and instance validation
//! - **`model`**: the integer program and extraction of its solution
//! - **`solver`**: branch-and-bound and MILP-backed engines
//! - **`verify`**: capacity and completeness re-check, utilization report

pub mod error;
pub mod instance;
pub mod model;
pub mod resources;
pub mod solver;
pub mod verify;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::read_to_string;
use std::path::Path;
use tracing::info;

pub use error::{PackError, Result};
pub use instance::{Instance, Workload};
pub use model::{
    Assignment, ConstraintKind, DecisionModel, LinearConstraint, Relation, VariableId,
    VariableValues,
};
pub use resources::ResourceVector;
pub use solver::{SolveOptions, SolveStatus, SolverEngine, Strategy, solve_model};
pub use verify::{UtilizationReport, verify};

/// A packing problem as written in a YAML file.
#[derive(Debug, Serialize, Deserialize)]
pub struct Problem {
    /// Capacity of every server, one entry per resource dimension. The order
    /// of the keys fixes the dimension order.
    pub server: IndexMap<String, u64>,
    #[serde(default)]
    pub workloads: Vec<WorkloadSpec>,
    #[serde(default)]
    pub options: SolveOptions,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub demand: IndexMap<String, u64>,
    /// Number of identical workloads, given consecutive indices.
    #[serde(default = "default_count")]
    pub count: u32,
}
fn default_count() -> u32 {
    1
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Solution {
    pub status: SolveStatus,
    pub lower_bound: usize,
    /// Slot → workload indices placed on it.
    pub servers: BTreeMap<usize, Vec<usize>>,
    /// Slot → dimension → `"used/capacity"`.
    pub utilization: BTreeMap<usize, IndexMap<String, String>>,
}

/// A verified assignment together with how it was obtained.
#[derive(Debug, Clone)]
pub struct Packing {
    pub assignment: Assignment,
    pub status: SolveStatus,
    pub lower_bound: usize,
    pub report: UtilizationReport,
}

/// Runs the whole pipeline on one instance.
///
/// Fails with [`PackError::InfeasibleInstance`] before any solving if a
/// workload cannot fit on an empty server. Any assignment that comes back is
/// verified; a failed verification is returned as an error, never patched.
pub fn pack(instance: &Instance, options: &SolveOptions) -> Result<Packing> {
    let model = DecisionModel::build(instance)?;
    let result = solve_model(&model, options)?;
    let assignment = model.extract(&result.values)?;
    let report = verify(&assignment, instance)?;
    let lower_bound = instance.lower_bound();

    info!(
        workloads = instance.len(),
        servers = assignment.used_slots(),
        lower_bound,
        status = ?result.status,
        "packing verified"
    );

    Ok(Packing {
        assignment,
        status: result.status,
        lower_bound,
        report,
    })
}

impl Problem {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let buf = read_to_string(path)?;
        Ok(serde_yaml::from_str(&buf)?)
    }

    /// Uses the options from the problem file.
    pub fn solve(&self) -> Result<Solution> {
        self.solve_with(&self.options)
    }

    pub fn solve_with(&self, options: &SolveOptions) -> Result<Solution> {
        let instance = self.to_instance()?;
        let packing = pack(&instance, options)?;

        Ok(Solution {
            status: packing.status,
            lower_bound: packing.lower_bound,
            servers: packing.assignment.slots().clone(),
            utilization: packing.report.to_table(),
        })
    }

    /// Expands workload counts and checks every demand names exactly the
    /// server's dimensions.
    pub fn to_instance(&self) -> Result<Instance> {
        let dimensions: Vec<String> = self.server.keys().cloned().collect();
        let capacity = ResourceVector::new(self.server.values().copied().collect());

        let mut demands = Vec::new();
        for (spec_index, spec) in self.workloads.iter().enumerate() {
            let demand = demand_vector(spec, &dimensions).map_err(|reason| {
                PackError::InvalidArgument(format!("workload entry {spec_index}: {reason}"))
            })?;
            demands.extend(std::iter::repeat_n(demand, spec.count as usize));
        }

        Instance::new(dimensions, capacity, demands)
    }
}

fn demand_vector(
    spec: &WorkloadSpec,
    dimensions: &[String],
) -> std::result::Result<ResourceVector, String> {
    if let Some(unknown) = spec.demand.keys().find(|k| !dimensions.contains(k)) {
        return Err(format!("unknown resource `{unknown}`"));
    }
    dimensions
        .iter()
        .map(|name| {
            spec.demand
                .get(name)
                .copied()
                .ok_or_else(|| format!("missing resource `{name}`"))
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(ResourceVector::new)
}
