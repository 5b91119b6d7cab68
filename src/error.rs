//! Error types for the packing pipeline.

use thiserror::Error;

/// Everything that can go wrong between reading a problem and returning a
/// verified assignment.
#[derive(Debug, Error)]
pub enum PackError {
    /// A workload cannot fit on an empty server.
    #[error(
        "workload {workload} demands {demand} {dimension} but a server only has {capacity}"
    )]
    InfeasibleInstance {
        workload: usize,
        dimension: String,
        demand: u64,
        capacity: u64,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The solver reported no feasible assignment for a validated instance.
    #[error("solver found the decision model infeasible")]
    SolverInfeasible,

    #[error("solver error: {0}")]
    Solver(String),

    #[error("slot {slot} uses {used} {dimension} but capacity is {capacity}")]
    CapacityExceeded {
        slot: usize,
        dimension: String,
        /// Summed in `u128` so an overflowing total is still reported.
        used: u128,
        capacity: u64,
    },

    #[error("workload {0} is not placed on any slot")]
    WorkloadNotPlaced(usize),

    #[error("workload {0} is placed on more than one slot")]
    WorkloadPlacedTwice(usize),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PackError>;
