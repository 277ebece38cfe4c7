use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use tracing::debug;

use super::{
    error::PowerFlowError,
    formulation::{IterationOutcome, PfProblem, Termination},
    island::IslandBranches,
    solver::{Solve, solve_csc},
    sparse::select::csc_select,
};

/// DC susceptance matrix with `b = 1/(x·m)` and the bus injection
/// equivalent of the phase shifters.
pub(crate) fn dc_matrices(
    n: usize,
    branches: &IslandBranches,
    min_impedance: f64,
) -> (CscMatrix<f64>, DVector<f64>) {
    let mut coo = CooMatrix::new(n, n);
    let mut p_shift = DVector::zeros(n);
    for i in 0..n {
        coo.push(i, i, 0.0);
    }
    for k in 0..branches.len() {
        let x = if branches.x[k].abs() < min_impedance {
            min_impedance
        } else {
            branches.x[k]
        };
        let m = if branches.tap_module[k] > 0.0 {
            branches.tap_module[k]
        } else {
            1.0
        };
        let b = 1.0 / (x * m);
        let (f, t) = (branches.from[k], branches.to[k]);
        coo.push(f, f, b);
        coo.push(t, t, b);
        coo.push(f, t, -b);
        coo.push(t, f, -b);
        let shift = b * branches.tap_angle[k];
        p_shift[f] += shift;
        p_shift[t] -= shift;
    }
    (CscMatrix::from(&coo), p_shift)
}

/// Linearized (DC) power flow: `B·θ = P + Pτ` with the slack angles fixed.
///
/// Voltage magnitudes of non-controlled buses are set to 1 p.u. The solve is
/// direct, so a successful run reports zero error and zero iterations.
pub fn dc_pf(problem: &mut PfProblem, min_impedance: f64, solver: &mut dyn Solve) -> IterationOutcome {
    let n = problem.n_bus();
    let data = problem.data;
    let (b, p_shift) = dc_matrices(n, &data.branches, min_impedance);
    let p = DVector::from_iterator(n, (0..n).map(|i| problem.s0[i].re - data.yshunt[i].re)) + p_shift;

    let roles = &problem.roles;
    let theta_slack = DVector::from_iterator(roles.slack.len(), roles.slack.iter().map(|&i| problem.va[i]));
    let b_slack = csc_select(&b, &roles.idx_dva, &roles.slack);
    let b_red = csc_select(&b, &roles.idx_dva, &roles.idx_dva);
    let mut theta = DVector::from_iterator(roles.idx_dva.len(), roles.idx_dva.iter().map(|&i| p[i]));
    theta -= &b_slack * &theta_slack;

    if let Err(e) = solve_csc(solver, b_red, &mut theta) {
        return IterationOutcome::new(Termination::Failed(PowerFlowError::singular(0, e)), 0);
    }
    let idx_dva = problem.roles.idx_dva.clone();
    for (k, &i) in idx_dva.iter().enumerate() {
        problem.va[i] = theta[k];
    }
    let idx_dvm = problem.roles.idx_dvm.clone();
    for &i in &idx_dvm {
        problem.vm[i] = 1.0;
    }
    problem.refresh();
    problem.error = 0.0;
    debug!(buses = n, "dc power flow solved");
    IterationOutcome::new(Termination::Converged, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::{
        admittance::AdmittanceMatrices,
        circuit::{BusType, NumericalCircuit},
        island::split_islands,
        options::PowerFlowOptions,
        scenario::Scenario,
        solver::DefaultSolver,
    };

    #[test]
    fn test_dc_three_bus_angles() {
        // 100 MW from the slack to bus 2 over two equal parallel paths
        let mut nc = NumericalCircuit::new(100.0);
        let a = nc.add_bus("a", BusType::Slack, 110.0);
        let b = nc.add_bus("b", BusType::Pq, 110.0);
        let c = nc.add_bus("c", BusType::Pq, 110.0);
        nc.add_line(a, b, 0.0, 0.1, 0.0, 0.0);
        nc.add_line(a, c, 0.0, 0.1, 0.0, 0.0);
        nc.add_line(b, c, 0.0, 0.1, 0.0, 0.0);
        nc.add_load(c, 100.0, 0.0);

        let sc = Scenario::new(&nc);
        let opts = PowerFlowOptions::default();
        let data = split_islands(&sc, false).islands[0].compile(&sc, &opts);
        let adm = AdmittanceMatrices::build(3, &data.branches, &data.yshunt, opts.min_impedance);
        let mut pb = PfProblem::new(&adm, &data, &data.v0, &opts);
        let out = dc_pf(&mut pb, opts.min_impedance, &mut DefaultSolver::default());
        assert!(out.converged());
        assert_eq!(out.iterations, 0);
        assert_eq!(pb.error, 0.0);
        // B = 10·[[2,-1],[-1,2]] on (b, c); P = (0, -1)
        assert!((pb.va[1] + 1.0 / 30.0).abs() < 1e-12);
        assert!((pb.va[2] + 2.0 / 30.0).abs() < 1e-12);
        assert_eq!(pb.va[0], 0.0);
    }

    #[test]
    fn test_phase_shift_injection() {
        let br = IslandBranches {
            from: vec![0],
            to: vec![1],
            r: vec![0.0],
            x: vec![0.2],
            g: vec![0.0],
            b: vec![0.0],
            tap_module: vec![1.0],
            tap_angle: vec![0.1],
            rate: vec![0.0],
        };
        let (b, p_shift) = dc_matrices(2, &br, 1e-6);
        assert_eq!(b.nnz(), 4);
        assert!((p_shift[0] - 0.5).abs() < 1e-12);
        assert!((p_shift[1] + 0.5).abs() < 1e-12);
    }
}
