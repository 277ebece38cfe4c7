use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use tracing::{debug, info};

use super::{
    error::PowerFlowError,
    formulation::{IterationOutcome, PfProblem, Termination},
    options::PowerFlowOptions,
    solver::{Solve, solve_csc},
};

/// Levenberg-Marquardt iteration on a prepared [`PfProblem`].
///
/// Each step solves `(JᵀJ + λI)·dx = Jᵀf`. A trial step is kept when the
/// gain ratio `ρ` is non-negative; otherwise it is undone and the damping
/// grows. The Jacobian is only rebuilt after an accepted step.
pub fn levenberg_marquardt_pf(
    problem: &mut PfProblem,
    options: &PowerFlowOptions,
    solver: &mut dyn Solve,
) -> IterationOutcome {
    let tol = options.tolerance;
    let mut iterations = 0;
    let mut lambda: Option<f64> = None;
    let mut nu = 2.0;
    let mut jacobian: Option<CscMatrix<f64>> = None;

    loop {
        if problem.is_diverged(options.max_voltage_magnitude) {
            let err = PowerFlowError::NumericalOverflow {
                iteration: iterations,
            };
            return IterationOutcome::new(Termination::Diverged(err), iterations);
        }
        let controls = problem.run_controls(options);
        if controls.structure_changed {
            solver.reset();
            jacobian = None;
            lambda = None;
        }
        if problem.error < tol {
            return IterationOutcome::new(Termination::Converged, iterations);
        }
        if iterations >= options.max_iter {
            return IterationOutcome::new(Termination::MaxIterReached, iterations);
        }

        let j = match jacobian.take() {
            Some(j) => j,
            None => problem.jacobian(),
        };
        let jt = j.transpose();
        let h = &jt * &j;
        let n = h.ncols();
        let lam = *lambda.get_or_insert_with(|| {
            let max_diag = (0..n)
                .filter_map(|i| h.get_entry(i, i).map(|e| e.into_value()))
                .fold(0.0_f64, f64::max);
            let l = options.lm_initial_lambda_factor * max_diag;
            if l > 0.0 { l } else { options.lm_initial_lambda_factor }
        });
        let rhs: DVector<f64> = &jt * &problem.f;
        let system = &h + &(CscMatrix::identity(n) * lam);
        let mut dx = rhs.clone();
        if let Err(e) = solve_csc(solver, system, &mut dx) {
            let err = PowerFlowError::singular(iterations, e);
            return IterationOutcome::new(Termination::Failed(err), iterations);
        }

        let obj_prev = problem.objective();
        let saved = problem.save_state();
        problem.step(&dx, -1.0);
        iterations += 1;

        let predicted = 0.5 * dx.dot(&(dx.scale(lam) + &rhs));
        let obj_new = problem.objective();
        let rho = if predicted > 0.0 {
            (obj_prev - obj_new) / predicted
        } else {
            -1.0
        };

        if rho >= 0.0 && obj_new.is_finite() {
            lambda = Some(lam * (1.0 / 3.0_f64).max(1.0 - (2.0 * rho - 1.0).powi(3)));
            nu = 2.0;
        } else {
            problem.restore_state(saved);
            lambda = Some(lam * nu);
            nu *= 2.0;
            jacobian = Some(j);
        }

        if options.verbose > 0 {
            info!(iteration = iterations, error = problem.error, lambda = lam, rho, "levenberg-marquardt");
        } else {
            debug!(iteration = iterations, error = problem.error, lambda = lam, rho, "levenberg-marquardt");
        }
    }
}
