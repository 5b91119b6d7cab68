//! Independent re-check of an assignment against the instance it came from.

use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::error::{PackError, Result};
use crate::instance::Instance;
use crate::model::Assignment;
use crate::resources::ResourceVector;

/// Load of one used slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotUtilization {
    pub slot: usize,
    pub used: ResourceVector,
}

/// Per-slot, per-dimension load of a verified assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtilizationReport {
    dimensions: Vec<String>,
    capacity: ResourceVector,
    slots: Vec<SlotUtilization>,
}

impl UtilizationReport {
    pub fn slots(&self) -> &[SlotUtilization] {
        &self.slots
    }

    pub fn get(&self, slot: usize) -> Option<&SlotUtilization> {
        self.slots.iter().find(|s| s.slot == slot)
    }

    /// `used / capacity` for one dimension of one slot; zero-capacity
    /// dimensions count as empty. For library callers that want numbers
    /// rather than the `"used/capacity"` strings of [`to_table`](Self::to_table).
    pub fn fraction(&self, slot: usize, dimension: usize) -> Option<f64> {
        let used = self.get(slot)?.used.get(dimension);
        let capacity = self.capacity.get(dimension);
        Some(if capacity == 0 {
            0.0
        } else {
            used as f64 / capacity as f64
        })
    }

    /// slot → dimension → `"used/capacity"`
    pub fn to_table(&self) -> BTreeMap<usize, IndexMap<String, String>> {
        self.slots
            .iter()
            .map(|s| {
                let row = self
                    .dimensions
                    .iter()
                    .enumerate()
                    .map(|(d, name)| {
                        (name.clone(), format!("{}/{}", s.used.get(d), self.capacity.get(d)))
                    })
                    .collect();
                (s.slot, row)
            })
            .collect()
    }
}

impl fmt::Display for UtilizationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.slots {
            write!(f, "slot {}:", s.slot)?;
            for (d, name) in self.dimensions.iter().enumerate() {
                let sep = if d == 0 { " " } else { ", " };
                write!(f, "{sep}{}/{} {name}", s.used.get(d), self.capacity.get(d))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Checks that every workload of `instance` is placed exactly once and that
/// no slot exceeds the server capacity in any dimension.
pub fn verify(assignment: &Assignment, instance: &Instance) -> Result<UtilizationReport> {
    let capacity = instance.capacity();
    let mut seen = vec![false; instance.len()];
    let mut slots = Vec::with_capacity(assignment.used_slots());

    for (slot, workloads) in assignment.iter() {
        let mut used = vec![0u128; capacity.dims()];
        for &workload in workloads {
            let Some(w) = instance.workloads().get(workload) else {
                return Err(PackError::InvalidArgument(format!(
                    "slot {slot} holds unknown workload {workload}"
                )));
            };
            if std::mem::replace(&mut seen[workload], true) {
                return Err(PackError::WorkloadPlacedTwice(workload));
            }
            for (total, amount) in used.iter_mut().zip(w.demand.values()) {
                *total += u128::from(*amount);
            }
        }

        let over = used
            .iter()
            .zip(capacity.values())
            .position(|(total, limit)| *total > u128::from(*limit));
        if let Some(d) = over {
            return Err(PackError::CapacityExceeded {
                slot,
                dimension: instance.dimensions()[d].clone(),
                used: used[d],
                capacity: capacity.get(d),
            });
        }
        // every total is within a u64 capacity here
        let used = used.into_iter().map(|total| total as u64).collect::<Vec<_>>();
        slots.push(SlotUtilization {
            slot,
            used: ResourceVector::new(used),
        });
    }

    if let Some(workload) = seen.iter().position(|s| !s) {
        return Err(PackError::WorkloadNotPlaced(workload));
    }

    debug!(slots = slots.len(), "assignment verified");
    Ok(UtilizationReport {
        dimensions: instance.dimensions().to_vec(),
        capacity: capacity.clone(),
        slots,
    })
}
