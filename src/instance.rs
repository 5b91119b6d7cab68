use tracing::debug;

use crate::error::{PackError, Result};
use crate::resources::ResourceVector;

/// A virtual machine to place, identified by its position in the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub id: usize,
    pub demand: ResourceVector,
}

/// A one-SKU fleet: every server has `capacity`, and `workloads` must all be
/// placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    dimensions: Vec<String>,
    capacity: ResourceVector,
    workloads: Vec<Workload>,
}

impl Instance {
    /// Checks the shape of the instance: at least one named dimension, and the
    /// capacity and every demand having exactly that many components.
    ///
    /// Whether the workloads actually fit is checked by [`Instance::validate`].
    pub fn new(
        dimensions: Vec<String>,
        capacity: ResourceVector,
        demands: Vec<ResourceVector>,
    ) -> Result<Self> {
        if dimensions.is_empty() {
            return Err(PackError::InvalidArgument(
                "at least one resource dimension is required".into(),
            ));
        }
        if capacity.dims() != dimensions.len() {
            return Err(PackError::InvalidArgument(format!(
                "server capacity has {} dimensions, expected {}",
                capacity.dims(),
                dimensions.len()
            )));
        }
        if let Some(id) = demands.iter().position(|d| d.dims() != dimensions.len()) {
            return Err(PackError::InvalidArgument(format!(
                "workload {id} has {} dimensions, expected {}",
                demands[id].dims(),
                dimensions.len()
            )));
        }

        let workloads = demands
            .into_iter()
            .enumerate()
            .map(|(id, demand)| Workload { id, demand })
            .collect();

        Ok(Self {
            dimensions,
            capacity,
            workloads,
        })
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn capacity(&self) -> &ResourceVector {
        &self.capacity
    }

    pub fn workloads(&self) -> &[Workload] {
        &self.workloads
    }

    pub fn len(&self) -> usize {
        self.workloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workloads.is_empty()
    }

    /// Rejects the instance if any workload exceeds the server capacity in
    /// any dimension. Must pass before a model is built.
    pub fn validate(&self) -> Result<()> {
        for workload in &self.workloads {
            if let Some(d) = workload.demand.first_exceeding(&self.capacity) {
                debug!(
                    workload = workload.id,
                    dimension = %self.dimensions[d],
                    "workload does not fit on an empty server"
                );
                return Err(PackError::InfeasibleInstance {
                    workload: workload.id,
                    dimension: self.dimensions[d].clone(),
                    demand: workload.demand.get(d),
                    capacity: self.capacity.get(d),
                });
            }
        }
        Ok(())
    }

    pub fn is_feasible(&self) -> bool {
        self.validate().is_ok()
    }

    /// `max_d ceil(sum_i demand[i][d] / capacity[d])`, and at least one
    /// server whenever there is something to place.
    ///
    /// Dimensions with zero capacity are skipped; on a validated instance
    /// nobody demands them.
    pub fn lower_bound(&self) -> usize {
        slot_lower_bound(&self.capacity, self.workloads.iter().map(|w| &w.demand))
    }
}

/// Fewest servers of `capacity` that could hold `demands`, counting each
/// dimension on its own.
pub(crate) fn slot_lower_bound<'a>(
    capacity: &ResourceVector,
    demands: impl IntoIterator<Item = &'a ResourceVector>,
) -> usize {
    let mut totals = vec![0u128; capacity.dims()];
    let mut any = false;
    for demand in demands {
        any = true;
        for (total, amount) in totals.iter_mut().zip(demand.values()) {
            *total += u128::from(*amount);
        }
    }
    if !any {
        return 0;
    }

    let bound = totals
        .iter()
        .zip(capacity.values())
        .filter(|(_, limit)| **limit > 0)
        .map(|(total, limit)| total.div_ceil(u128::from(*limit)))
        .max()
        .unwrap_or(0);
    usize::try_from(bound).unwrap_or(usize::MAX).max(1)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn dims() -> Vec<String> {
        vec!["ram".into(), "cpu".into(), "net".into()]
    }

    /// 10 small, 5 medium and 2 big VMs on (ram=256, cpu=32, net=100) servers.
    pub(crate) fn reference_instance() -> Instance {
        let mut demands = vec![ResourceVector::from([8, 1, 10]); 10];
        demands.extend(vec![ResourceVector::from([16, 4, 15]); 5]);
        demands.extend(vec![ResourceVector::from([128, 8, 40]); 2]);
        Instance::new(dims(), ResourceVector::from([256, 32, 100]), demands).unwrap()
    }

    #[test]
    fn reference_instance_is_feasible() {
        let instance = reference_instance();
        assert_eq!(instance.len(), 17);
        assert!(instance.is_feasible());
    }

    #[test]
    fn oversized_workload_is_rejected() {
        let instance = Instance::new(
            dims(),
            ResourceVector::from([1, 1, 1]),
            vec![ResourceVector::from([2, 2, 2])],
        )
        .unwrap();

        assert!(!instance.is_feasible());
        match instance.validate() {
            Err(PackError::InfeasibleInstance {
                workload,
                dimension,
                demand,
                capacity,
            }) => {
                assert_eq!(workload, 0);
                assert_eq!(dimension, "ram");
                assert_eq!((demand, capacity), (2, 1));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn single_dimension_overflow_is_enough_to_reject() {
        let instance = Instance::new(
            dims(),
            ResourceVector::from([256, 32, 100]),
            vec![
                ResourceVector::from([8, 1, 10]),
                ResourceVector::from([8, 1, 101]),
            ],
        )
        .unwrap();
        match instance.validate() {
            Err(PackError::InfeasibleInstance {
                workload, dimension, ..
            }) => assert_eq!((workload, dimension.as_str()), (1, "net")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn mismatched_dimensions_are_invalid() {
        let result = Instance::new(
            dims(),
            ResourceVector::from([256, 32, 100]),
            vec![ResourceVector::from([8, 1])],
        );
        assert!(matches!(result, Err(PackError::InvalidArgument(_))));

        let result = Instance::new(dims(), ResourceVector::from([256, 32]), vec![]);
        assert!(matches!(result, Err(PackError::InvalidArgument(_))));

        let result = Instance::new(vec![], ResourceVector::zeros(0), vec![]);
        assert!(matches!(result, Err(PackError::InvalidArgument(_))));
    }

    #[test]
    fn lower_bound_takes_tightest_dimension() {
        // ram 416/256 -> 2, cpu 46/32 -> 2, net 255/100 -> 3
        assert_eq!(reference_instance().lower_bound(), 3);
    }

    #[test]
    fn lower_bound_edge_cases() {
        let empty = Instance::new(dims(), ResourceVector::from([1, 1, 1]), vec![]).unwrap();
        assert_eq!(empty.lower_bound(), 0);

        let weightless = Instance::new(
            dims(),
            ResourceVector::from([0, 4, 4]),
            vec![ResourceVector::zeros(3); 3],
        )
        .unwrap();
        assert_eq!(weightless.lower_bound(), 1);
    }
}
