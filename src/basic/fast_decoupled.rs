use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use tracing::{debug, info, trace};

use super::{
    bus_types::BusRoles,
    error::PowerFlowError,
    formulation::{IterationOutcome, PfProblem, Termination},
    island::IslandBranches,
    options::PowerFlowOptions,
    solver::{Solve, solve_csc},
    sparse::{conj::RealImage, select::csc_select},
};

/// Series susceptance matrix `B'` built from `1/x` of every branch,
/// ignoring resistance, charging and taps (XB scheme).
pub(crate) fn b_prime(n: usize, branches: &IslandBranches, min_impedance: f64) -> CscMatrix<f64> {
    let mut coo = CooMatrix::new(n, n);
    for i in 0..n {
        coo.push(i, i, 0.0);
    }
    for k in 0..branches.len() {
        let x = if branches.x[k].abs() < min_impedance {
            min_impedance
        } else {
            branches.x[k]
        };
        let b = 1.0 / x;
        let (f, t) = (branches.from[k], branches.to[k]);
        coo.push(f, f, b);
        coo.push(t, t, b);
        coo.push(f, t, -b);
        coo.push(t, f, -b);
    }
    CscMatrix::from(&coo)
}

/// Reduced `B'` and `B''` for the current bus roles.
struct DecoupledMatrices {
    bp: CscMatrix<f64>,
    bpp: CscMatrix<f64>,
}

impl DecoupledMatrices {
    fn new(full_bp: &CscMatrix<f64>, full_bpp: &CscMatrix<f64>, roles: &BusRoles) -> Self {
        Self {
            bp: csc_select(full_bp, roles.idx_dp(), &roles.idx_dva),
            bpp: csc_select(full_bpp, &roles.idx_dq, &roles.idx_dvm),
        }
    }
}

/// Fast decoupled power flow on a prepared [`PfProblem`].
///
/// Alternates a P–θ half iteration with `B'` and a Q–V half iteration with
/// `B'' = −Im(Ybus)`, both factorized once per set of bus roles. One P/Q pair
/// counts as one iteration.
pub fn fast_decoupled_pf(
    problem: &mut PfProblem,
    options: &PowerFlowOptions,
    solver_p: &mut dyn Solve,
    solver_q: &mut dyn Solve,
) -> IterationOutcome {
    let tol = options.tolerance;
    let full_bp = b_prime(problem.n_bus(), &problem.data.branches, options.min_impedance);
    let full_bpp = problem.adm.ybus.neg_imag();
    let mut mats = DecoupledMatrices::new(&full_bp, &full_bpp, &problem.roles);
    let mut iterations = 0;

    loop {
        if problem.is_diverged(options.max_voltage_magnitude) {
            let err = PowerFlowError::NumericalOverflow {
                iteration: iterations,
            };
            return IterationOutcome::new(Termination::Diverged(err), iterations);
        }
        if problem.run_controls(options).structure_changed {
            solver_p.reset();
            solver_q.reset();
            mats = DecoupledMatrices::new(&full_bp, &full_bpp, &problem.roles);
            trace!(bp = mats.bp.nrows(), bpp = mats.bpp.nrows(), "decoupled matrices rebuilt");
        }
        if problem.error < tol {
            return IterationOutcome::new(Termination::Converged, iterations);
        }
        if iterations >= options.max_iter {
            return IterationOutcome::new(Termination::MaxIterReached, iterations);
        }
        let (rows, cols) = (mats.bpp.nrows(), mats.bpp.ncols());
        if rows != cols {
            let err = PowerFlowError::NonSquareJacobian { rows, cols };
            return IterationOutcome::new(Termination::Failed(err), iterations);
        }

        // P–θ
        let idx_dp = problem.roles.idx_dp().to_vec();
        let mut dva = DVector::from_iterator(
            idx_dp.len(),
            idx_dp.iter().map(|&i| problem.mismatch[i].re / problem.vm[i]),
        );
        if let Err(e) = solve_csc(solver_p, mats.bp.clone(), &mut dva) {
            let err = PowerFlowError::singular(iterations, e);
            return IterationOutcome::new(Termination::Failed(err), iterations);
        }
        for (k, &i) in problem.roles.idx_dva.iter().enumerate() {
            problem.va[i] -= dva[k];
        }
        problem.refresh();

        // Q–V
        let idx_dq = problem.roles.idx_dq.clone();
        let mut dvm = DVector::from_iterator(
            idx_dq.len(),
            idx_dq.iter().map(|&i| problem.mismatch[i].im / problem.vm[i]),
        );
        if let Err(e) = solve_csc(solver_q, mats.bpp.clone(), &mut dvm) {
            let err = PowerFlowError::singular(iterations, e);
            return IterationOutcome::new(Termination::Failed(err), iterations);
        }
        for (k, &i) in problem.roles.idx_dvm.iter().enumerate() {
            problem.vm[i] -= dvm[k];
        }
        problem.refresh();
        iterations += 1;

        if options.verbose > 0 {
            info!(iteration = iterations, error = problem.error, "fast decoupled");
        } else {
            debug!(iteration = iterations, error = problem.error, "fast decoupled");
        }
    }
}
