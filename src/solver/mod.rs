//! Solver engines for a [`DecisionModel`].
//!
//! Two engines solve the same model:
//! - **`branch_bound`**: a self-contained depth-first search over slot
//!   assignments (default)
//! - **`milp`**: hands the model to a MILP backend through `good_lp`

pub mod branch_bound;
pub mod milp;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PackError, Result};
use crate::model::{DecisionModel, VariableValues};

pub use branch_bound::BranchAndBound;
pub use milp::Milp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    BranchAndBound,
    Milp,
}

/// Knobs for a single solve. Limits are only honored where an engine can
/// stop early and still hand back a feasible incumbent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    pub strategy: Strategy,
    pub time_limit_secs: Option<f64>,
    pub node_limit: Option<u64>,
}

impl SolveOptions {
    pub fn time_limit(&self) -> Result<Option<Duration>> {
        self.time_limit_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs).map_err(|_| {
                    PackError::InvalidArgument(format!("invalid time limit: {secs} seconds"))
                })
            })
            .transpose()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// The search finished, or the incumbent meets the lower bound.
    Optimal,
    /// The search was cut off; the assignment is valid but may use more
    /// servers than necessary.
    Feasible,
}

#[derive(Debug, Clone)]
pub struct SolverResult {
    pub values: VariableValues,
    pub status: SolveStatus,
}

/// Something that can solve a [`DecisionModel`]. An infeasible model is
/// reported as [`PackError::SolverInfeasible`].
pub trait SolverEngine {
    fn solve(&self, model: &DecisionModel) -> Result<SolverResult>;
}

pub fn engine_for(options: &SolveOptions) -> Result<Box<dyn SolverEngine>> {
    let time_limit = options.time_limit()?;
    let engine: Box<dyn SolverEngine> = match options.strategy {
        Strategy::BranchAndBound => Box::new(BranchAndBound {
            time_limit,
            node_limit: options.node_limit,
        }),
        Strategy::Milp => Box::new(Milp { time_limit }),
    };
    Ok(engine)
}

pub fn solve_model(model: &DecisionModel, options: &SolveOptions) -> Result<SolverResult> {
    engine_for(options)?.solve(model)
}
