use good_lp::Solution as LpSolution;
use good_lp::{
    Constraint, Expression, ProblemVariables, ResolutionError, SolverModel, Variable, variable,
    variables,
};
use std::time::{Duration, Instant};
use tracing::info;

use crate::error::{PackError, Result};
use crate::model::{DecisionModel, LinearConstraint, Relation, VariableValues};
use crate::solver::{SolveStatus, SolverEngine, SolverResult};

#[cfg(not(any(feature = "microlp", feature = "cbc")))]
compile_error!("enable a MILP backend: the `microlp` or `cbc` feature");

/// Backends work in `f64`; integers from here on are no longer all
/// representable, so two different loads could compare equal.
const MAX_EXACT_INTEGER: f64 = (1u64 << 53) as f64;

/// Solves the decision model with a general-purpose MILP backend.
#[derive(Debug, Clone, Default)]
pub struct Milp {
    pub time_limit: Option<Duration>,
}

impl SolverEngine for Milp {
    fn solve(&self, model: &DecisionModel) -> Result<SolverResult> {
        if model.variable_count() == 0 {
            return Ok(SolverResult {
                values: VariableValues::new(Vec::new()),
                status: SolveStatus::Optimal,
            });
        }

        check_exact_range(model)?;

        let started = Instant::now();
        let (problem_vars, vars) = init_variables(model);
        let objective = create_objective_function(model, &vars);
        let lp = create_model(problem_vars, objective, self.time_limit);
        let lp = add_constraints(lp, model, &vars);

        let solution = lp.solve().map_err(map_resolution_error)?;
        let values = VariableValues::new(vars.iter().map(|&v| solution.value(v) > 0.5).collect());

        // Backends stopped by a time limit do not tell us whether they proved
        // optimality.
        let status = if self.time_limit.is_some() && cfg!(feature = "cbc") {
            SolveStatus::Feasible
        } else {
            SolveStatus::Optimal
        };
        info!(
            variables = vars.len(),
            constraints = model.constraints().len(),
            objective = model.objective_value(&values),
            elapsed_ms = started.elapsed().as_millis() as u64,
            ?status,
            "milp solve finished"
        );

        Ok(SolverResult { values, status })
    }
}

/// Refuses models whose rows the backend could not evaluate exactly.
fn check_exact_range(model: &DecisionModel) -> Result<()> {
    let too_large = |value: f64| value.abs() >= MAX_EXACT_INTEGER;
    match model
        .constraints()
        .iter()
        .find(|row| too_large(row.bound) || row.terms.iter().any(|&(_, c)| too_large(c)))
    {
        Some(row) => Err(PackError::InvalidArgument(format!(
            "{:?} row exceeds 2^53 after scaling, too large for the MILP backend; \
             use the branch_and_bound strategy",
            row.kind
        ))),
        None => Ok(()),
    }
}

/// One binary `good_lp` variable per model variable, indexed by `VariableId`.
fn init_variables(model: &DecisionModel) -> (ProblemVariables, Vec<Variable>) {
    let mut problem_vars = variables!();
    let vars = (0..model.variable_count())
        .map(|_| problem_vars.add(variable().binary()))
        .collect();
    (problem_vars, vars)
}

fn create_objective_function(model: &DecisionModel, vars: &[Variable]) -> Expression {
    model
        .objective()
        .iter()
        .fold(Expression::from(0.0), |sum, &(var, cost)| {
            sum + vars[var.0] * cost
        })
}

#[cfg(feature = "cbc")]
fn create_model(
    variables: ProblemVariables,
    objective: Expression,
    time_limit: Option<Duration>,
) -> impl SolverModel<Error = ResolutionError> {
    use good_lp::solvers::coin_cbc::coin_cbc;

    let mut model = variables.minimise(objective).using(coin_cbc);
    #[cfg(not(debug_assertions))]
    model.set_parameter("loglevel", "0");
    if let Some(limit) = time_limit {
        model.set_parameter("seconds", &limit.as_secs_f64().to_string());
    }
    model
}

#[cfg(all(feature = "microlp", not(feature = "cbc")))]
fn create_model(
    variables: ProblemVariables,
    objective: Expression,
    time_limit: Option<Duration>,
) -> impl SolverModel<Error = ResolutionError> {
    use good_lp::solvers::microlp::microlp;

    if let Some(limit) = time_limit {
        tracing::warn!(?limit, "microlp backend has no time limit, solving to completion");
    }
    variables.minimise(objective).using(microlp)
}

/// Add every row of the decision model to the backend model
fn add_constraints<Model: SolverModel>(
    lp: Model,
    model: &DecisionModel,
    vars: &[Variable],
) -> Model {
    model
        .constraints()
        .iter()
        .fold(lp, |m, row| m.with(to_lp_constraint(row, vars)))
}

fn to_lp_constraint(row: &LinearConstraint, vars: &[Variable]) -> Constraint {
    let lhs = row
        .terms
        .iter()
        .fold(Expression::from(0.0), |sum, &(var, coefficient)| {
            sum + vars[var.0] * coefficient
        });
    match row.relation {
        Relation::Equal => lhs.eq(row.bound),
        Relation::LessOrEqual => lhs.leq(row.bound),
    }
}

fn map_resolution_error(error: ResolutionError) -> PackError {
    match error {
        ResolutionError::Infeasible => PackError::SolverInfeasible,
        other => PackError::Solver(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Instance;
    use crate::instance::tests::dims;
    use crate::resources::ResourceVector;
    use crate::solver::{BranchAndBound, SolveStatus};

    fn instance(capacity: [u64; 3], demands: &[[u64; 3]]) -> Instance {
        Instance::new(
            dims(),
            ResourceVector::from(capacity),
            demands.iter().map(|&d| ResourceVector::from(d)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn matches_branch_and_bound_on_small_instance() {
        let instance = instance(
            [10, 10, 10],
            &[[1, 4, 1], [1, 3, 1], [1, 6, 1], [1, 7, 1]],
        );
        let model = DecisionModel::build(&instance).unwrap();

        let result = Milp::default().solve(&model).unwrap();
        assert_eq!(result.status, SolveStatus::Optimal);
        assert!(model.is_satisfied_by(&result.values));
        let assignment = model.extract(&result.values).unwrap();

        let exact = BranchAndBound::default().solve(&model).unwrap();
        let expected = model.extract(&exact.values).unwrap();
        assert_eq!(assignment.used_slots(), expected.used_slots());
        assert_eq!(assignment.used_slots(), 2);
    }

    #[test]
    fn increasing_slot_costs_fill_the_lowest_slots() {
        let instance = instance([4, 4, 4], &[[3, 3, 3], [3, 3, 3], [1, 1, 1]]);
        let model = DecisionModel::build(&instance).unwrap();
        let result = Milp::default().solve(&model).unwrap();
        let assignment = model.extract(&result.values).unwrap();

        let used: Vec<usize> = assignment.slots().keys().copied().collect();
        assert_eq!(used, vec![0, 1]);
        assert_eq!(model.objective_value(&result.values), 3.0);
    }

    #[test]
    fn empty_model_needs_no_backend() {
        let instance = instance([1, 1, 1], &[]);
        let model = DecisionModel::build(&instance).unwrap();
        let result = Milp::default().solve(&model).unwrap();
        assert!(result.values.is_empty());
        assert_eq!(result.status, SolveStatus::Optimal);
    }

    fn single_dimension(capacity: u64, demands: &[u64]) -> DecisionModel {
        let instance = Instance::new(
            vec!["cpu".into()],
            ResourceVector::from([capacity]),
            demands.iter().map(|&d| ResourceVector::from([d])).collect(),
        )
        .unwrap();
        DecisionModel::build(&instance).unwrap()
    }

    #[test]
    fn amounts_beyond_f64_precision_are_refused() {
        // 2^59 + 1 rounds to 2^59 in f64, so both would look like they fit
        let model = single_dimension(1 << 60, &[1 << 59, (1 << 59) + 1]);
        assert!(matches!(
            Milp::default().solve(&model),
            Err(PackError::InvalidArgument(_))
        ));

        let exact = BranchAndBound::default().solve(&model).unwrap();
        assert_eq!(model.extract(&exact.values).unwrap().used_slots(), 2);
    }

    #[test]
    fn large_amounts_with_common_factor_are_solved() {
        let model = single_dimension(1 << 60, &[1 << 59, 1 << 59]);
        let result = Milp::default().solve(&model).unwrap();
        let assignment = model.extract(&result.values).unwrap();
        assert_eq!(assignment.groups(), vec![vec![0, 1]]);
    }

    #[test]
    fn infeasibility_is_surfaced() {
        assert!(matches!(
            map_resolution_error(ResolutionError::Infeasible),
            PackError::SolverInfeasible
        ));
        assert!(matches!(
            map_resolution_error(ResolutionError::Unbounded),
            PackError::Solver(_)
        ));
    }
}
