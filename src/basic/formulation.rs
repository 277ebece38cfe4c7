use std::time::Instant;

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

use super::{
    admittance::AdmittanceMatrices,
    bus_types::BusRoles,
    circuit::BusType,
    controls::{ControlOutcome, Controls},
    error::PowerFlowError,
    island::IslandData,
    jacobian::{JacobianLookup, build_jacobian},
    options::{PowerFlowOptions, SolverType},
};

/// How an iterative method stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    Converged,
    MaxIterReached,
    /// Voltages left the sanity bound or turned non-finite.
    Diverged(PowerFlowError),
    /// The method could not take a step (singular or non-square system).
    Failed(PowerFlowError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterationOutcome {
    pub termination: Termination,
    pub iterations: usize,
}

impl IterationOutcome {
    pub fn new(termination: Termination, iterations: usize) -> Self {
        Self {
            termination,
            iterations,
        }
    }

    #[inline]
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }
}

/// Result of one method run on one island, in per-unit and local indices.
#[derive(Debug, Clone)]
pub struct NumericSolution {
    pub method: SolverType,
    pub v: DVector<Complex64>,
    pub scalc: DVector<Complex64>,
    /// Specified injections after control corrections.
    pub s0: DVector<Complex64>,
    pub converged: bool,
    pub error: f64,
    pub iterations: usize,
    pub elapsed: f64,
    pub roles: BusRoles,
    pub redistributed: f64,
    pub failure: Option<PowerFlowError>,
}

impl NumericSolution {
    /// Comparable error: non-finite errors rank last.
    #[inline]
    pub fn rank_error(&self) -> f64 {
        if self.error.is_finite() { self.error } else { f64::INFINITY }
    }
}

/// Infinity norm that maps any non-finite entry to `+inf`.
pub(crate) fn inf_norm(f: &DVector<f64>) -> f64 {
    let mut e: f64 = 0.0;
    for x in f.iter() {
        if !x.is_finite() {
            return f64::INFINITY;
        }
        e = e.max(x.abs());
    }
    e
}

/// Polar power flow formulation shared by every iterative method.
///
/// Owns the solver-local state of one island: voltages, bus roles,
/// specified injections and the controls that may change them. The
/// admittances and compiled island data are borrowed read-only.
#[derive(Debug, Clone)]
pub struct PfProblem<'a> {
    pub adm: &'a AdmittanceMatrices,
    pub data: &'a IslandData,
    pub roles: BusRoles,
    lookup: JacobianLookup,
    pub s0: DVector<Complex64>,
    pub va: DVector<f64>,
    pub vm: DVector<f64>,
    pub v: DVector<Complex64>,
    pub scalc: DVector<Complex64>,
    /// `Scalc − S0`.
    pub mismatch: DVector<Complex64>,
    /// `[Re(mismatch)[idx_dP]; Im(mismatch)[idx_dQ]]`.
    pub f: DVector<f64>,
    pub error: f64,
    pub controls: Controls,
    started: Instant,
}

impl<'a> PfProblem<'a> {
    /// Sets up the problem from a start voltage. Magnitudes of slack, PV and
    /// PQV buses, and slack angles, are always taken from the island setpoints.
    pub fn new(
        adm: &'a AdmittanceMatrices,
        data: &'a IslandData,
        v_start: &DVector<Complex64>,
        options: &PowerFlowOptions,
    ) -> Self {
        let n = data.n_bus();
        let roles = BusRoles::classify(&data.bus_types, &data.remote_pairs);
        let mut vm = v_start.map(|v| v.norm());
        let mut va = v_start.map(|v| v.arg());
        for i in 0..n {
            match data.bus_types[i] {
                BusType::Slack => {
                    vm[i] = data.v0[i].norm();
                    va[i] = data.v0[i].arg();
                }
                BusType::Pv | BusType::Pqv => vm[i] = data.v0[i].norm(),
                BusType::Pq | BusType::P => {}
            }
        }
        let mut problem = Self {
            adm,
            data,
            lookup: JacobianLookup::new(&roles, n),
            roles,
            s0: data.s0.clone(),
            va,
            vm,
            v: DVector::zeros(n),
            scalc: DVector::zeros(n),
            mismatch: DVector::zeros(n),
            f: DVector::zeros(0),
            error: f64::INFINITY,
            controls: Controls::new(data, options),
            started: Instant::now(),
        };
        problem.refresh();
        problem
    }

    #[inline]
    pub fn n_bus(&self) -> usize {
        self.vm.len()
    }

    /// Recomputes voltages, calculated power, mismatch and error.
    pub fn refresh(&mut self) {
        let n = self.n_bus();
        for i in 0..n {
            self.v[i] = Complex64::from_polar(self.vm[i], self.va[i]);
        }
        self.scalc = self.adm.power_injection(&self.v);
        self.mismatch = &self.scalc - &self.s0;
        let roles = &self.roles;
        let mis = &self.mismatch;
        self.f = DVector::from_iterator(
            roles.n_equations(),
            roles
                .idx_dp()
                .iter()
                .map(|&i| mis[i].re)
                .chain(roles.idx_dq.iter().map(|&i| mis[i].im)),
        );
        self.error = inf_norm(&self.f);
    }

    /// State vector `x = [Va[idx_dVa]; Vm[idx_dVm]]`.
    pub fn x(&self) -> DVector<f64> {
        let r = &self.roles;
        DVector::from_iterator(
            r.n_unknowns(),
            r.idx_dva
                .iter()
                .map(|&i| self.va[i])
                .chain(r.idx_dvm.iter().map(|&i| self.vm[i])),
        )
    }

    /// `x ← x + scale·dx`, then refreshes the mismatch.
    pub fn step(&mut self, dx: &DVector<f64>, scale: f64) {
        let n_dva = self.roles.idx_dva.len();
        for (k, &i) in self.roles.idx_dva.iter().enumerate() {
            self.va[i] += scale * dx[k];
        }
        for (k, &i) in self.roles.idx_dvm.iter().enumerate() {
            self.vm[i] += scale * dx[n_dva + k];
        }
        self.refresh();
    }

    pub fn save_state(&self) -> (DVector<f64>, DVector<f64>) {
        (self.va.clone(), self.vm.clone())
    }

    pub fn restore_state(&mut self, state: (DVector<f64>, DVector<f64>)) {
        (self.va, self.vm) = state;
        self.refresh();
    }

    /// `½·fᵀf`.
    #[inline]
    pub fn objective(&self) -> f64 {
        0.5 * self.f.dot(&self.f)
    }

    pub fn jacobian(&self) -> CscMatrix<f64> {
        build_jacobian(&self.adm.ybus, &self.v, &self.lookup)
    }

    pub fn is_diverged(&self, max_vm: f64) -> bool {
        !self.error.is_finite() || self.vm.iter().any(|x| !x.is_finite() || x.abs() > max_vm)
    }

    /// Runs the discrete controls when the mismatch is small enough and
    /// refreshes the mismatch if they changed anything.
    pub fn run_controls(&mut self, options: &PowerFlowOptions) -> ControlOutcome {
        if !options.controls_enabled() || self.error >= options.effective_control_threshold() {
            return ControlOutcome::default();
        }
        let outcome = self
            .controls
            .apply(&mut self.roles, &mut self.s0, &self.scalc, options.tolerance);
        if outcome.structure_changed {
            self.lookup = JacobianLookup::new(&self.roles, self.n_bus());
        }
        if outcome.changed() {
            self.refresh();
        }
        outcome
    }

    pub fn into_solution(self, method: SolverType, outcome: IterationOutcome) -> NumericSolution {
        let converged = outcome.converged();
        let failure = match outcome.termination {
            Termination::Diverged(e) | Termination::Failed(e) => Some(e),
            Termination::Converged | Termination::MaxIterReached => None,
        };
        NumericSolution {
            method,
            v: self.v,
            scalc: self.scalc,
            s0: self.s0,
            converged,
            error: self.error,
            iterations: outcome.iterations,
            elapsed: self.started.elapsed().as_secs_f64(),
            roles: self.roles,
            redistributed: self.controls.redistributed,
            failure,
        }
    }
}
