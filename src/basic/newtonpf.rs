use tracing::{debug, info};

use super::{
    error::PowerFlowError,
    formulation::{IterationOutcome, PfProblem, Termination},
    options::PowerFlowOptions,
    solver::{Solve, solve_csc},
};

/// Newton-Raphson iteration on a prepared [`PfProblem`].
///
/// Solves `J·dx = f` and applies `x ← x − dx` until the infinity norm of the
/// mismatch drops below `options.tolerance`. Discrete controls run whenever
/// the mismatch is under the control threshold; a control pass that changes
/// the problem only refreshes the mismatch and does not count as an iteration.
pub fn newton_pf(
    problem: &mut PfProblem,
    options: &PowerFlowOptions,
    solver: &mut dyn Solve,
) -> IterationOutcome {
    let tol = options.tolerance;
    let mut iterations = 0;
    loop {
        if problem.is_diverged(options.max_voltage_magnitude) {
            let err = PowerFlowError::NumericalOverflow {
                iteration: iterations,
            };
            return IterationOutcome::new(Termination::Diverged(err), iterations);
        }
        if problem.run_controls(options).structure_changed {
            solver.reset();
        }
        if problem.error < tol {
            return IterationOutcome::new(Termination::Converged, iterations);
        }
        if iterations >= options.max_iter {
            return IterationOutcome::new(Termination::MaxIterReached, iterations);
        }

        let (rows, cols) = (problem.roles.n_equations(), problem.roles.n_unknowns());
        if rows != cols {
            let err = PowerFlowError::NonSquareJacobian { rows, cols };
            return IterationOutcome::new(Termination::Failed(err), iterations);
        }
        let jacobian = problem.jacobian();
        let mut dx = problem.f.clone();
        if let Err(e) = solve_csc(solver, jacobian, &mut dx) {
            let err = PowerFlowError::singular(iterations, e);
            return IterationOutcome::new(Termination::Failed(err), iterations);
        }
        problem.step(&dx, -1.0);
        iterations += 1;

        if options.verbose > 0 {
            info!(iteration = iterations, error = problem.error, "newton-raphson");
        } else {
            debug!(iteration = iterations, error = problem.error, "newton-raphson");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::{
        admittance::AdmittanceMatrices,
        island::{IslandData, split_islands},
        scenario::Scenario,
        solver::DefaultSolver,
    };
    use crate::testcases::{ieee9_case, two_bus_case};

    fn prepare(nc: &crate::basic::circuit::NumericalCircuit, opts: &PowerFlowOptions) -> (IslandData, AdmittanceMatrices) {
        let sc = Scenario::new(nc);
        let island = &split_islands(&sc, false).islands[0];
        let data = island.compile(&sc, opts);
        let adm = AdmittanceMatrices::build(data.n_bus(), &data.branches, &data.yshunt, opts.min_impedance);
        (data, adm)
    }

    #[test]
    fn test_two_bus_newton() {
        let nc = two_bus_case();
        let opts = PowerFlowOptions::default();
        let (data, adm) = prepare(&nc, &opts);
        let mut pb = PfProblem::new(&adm, &data, &data.v0, &opts);
        let out = newton_pf(&mut pb, &opts, &mut DefaultSolver::default());
        assert!(out.converged());
        assert!(out.iterations <= 10);
        assert!(pb.error < 1e-6);
        let vm = pb.v[1].norm();
        assert!(vm > 0.95 && vm < 0.97, "|V| = {vm}");
    }

    #[test]
    fn test_newton_is_idempotent_at_solution() {
        let nc = ieee9_case();
        let opts = PowerFlowOptions::default();
        let (data, adm) = prepare(&nc, &opts);
        let mut pb = PfProblem::new(&adm, &data, &data.v0, &opts);
        assert!(newton_pf(&mut pb, &opts, &mut DefaultSolver::default()).converged());

        let x0 = pb.x();
        let mut again = PfProblem::new(&adm, &data, &pb.v, &opts);
        let mut one_step = opts.clone();
        one_step.tolerance = 0.0;
        one_step.max_iter = 1;
        let out = newton_pf(&mut again, &one_step, &mut DefaultSolver::default());
        assert_eq!(out.termination, Termination::MaxIterReached);
        let dx = (again.x() - x0).amax();
        assert!(dx < opts.tolerance, "step at solution was {dx}");
    }

    #[test]
    fn test_max_iter_is_not_fatal() {
        let nc = ieee9_case();
        let mut opts = PowerFlowOptions::default();
        opts.max_iter = 1;
        let (data, adm) = prepare(&nc, &opts);
        let mut pb = PfProblem::new(&adm, &data, &data.v0, &opts);
        let out = newton_pf(&mut pb, &opts, &mut DefaultSolver::default());
        assert_eq!(out.termination, Termination::MaxIterReached);
        assert_eq!(out.iterations, 1);
        assert!(pb.error.is_finite());
    }
}
