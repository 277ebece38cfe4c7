use bevy_ecs::prelude::*;
use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tabled::{Table, settings::Style};

mod res_display;
use res_display::*;

use super::{
    circuit::BusType,
    error::PowerFlowError,
    formulation::NumericSolution,
    island::Island,
    options::SolverType,
};

/// Outcome of one island.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IslandStatus {
    Converged,
    NotConverged,
    /// Single-node island left out by `ignore_single_node_islands`.
    Skipped,
    NoSlack,
    /// Every attempted method stopped on an error.
    Failed,
    Cancelled,
}

impl IslandStatus {
    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, IslandStatus::Converged | IslandStatus::Skipped)
    }
}

/// One row of a [`ConvergenceReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceAttempt {
    pub method: SolverType,
    pub converged: bool,
    pub error: f64,
    pub iterations: usize,
    /// Seconds.
    pub elapsed: f64,
}

impl ConvergenceAttempt {
    pub(crate) fn rejected(method: SolverType) -> Self {
        Self {
            method,
            converged: false,
            error: f64::INFINITY,
            iterations: 0,
            elapsed: 0.0,
        }
    }
}

impl From<&NumericSolution> for ConvergenceAttempt {
    fn from(sol: &NumericSolution) -> Self {
        Self {
            method: sol.method,
            converged: sol.converged,
            error: sol.error,
            iterations: sol.iterations,
            elapsed: sol.elapsed,
        }
    }
}

/// Every method attempted on one island, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub attempts: Vec<ConvergenceAttempt>,
}

impl ConvergenceReport {
    pub fn push(&mut self, attempt: ConvergenceAttempt) {
        self.attempts.push(attempt);
    }

    /// Renders the attempts as a markdown table.
    pub fn to_table(&self) -> String {
        let rows = self.attempts.iter().map(|a| AttemptRow {
            method: format!("{:?}", a.method),
            converged: a.converged,
            error: FloatWrapper::new(a.error, 6),
            iterations: a.iterations,
            elapsed_ms: FloatWrapper::new(a.elapsed * 1e3, 3),
        });
        Table::new(rows).with(Style::markdown()).to_string()
    }
}

/// Diagnostics of one island.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IslandReport {
    pub index: usize,
    /// Global bus indices.
    pub buses: Vec<usize>,
    /// Global branch indices.
    pub branches: Vec<usize>,
    pub status: IslandStatus,
    /// Method whose solution was kept.
    pub method: Option<SolverType>,
    pub error: f64,
    pub iterations: usize,
    pub elapsed: f64,
    /// Global indices of buses relaxed to PQ, in switching order.
    pub switched: Vec<usize>,
    /// Active power moved off the slack by distributed slack (MW).
    pub redistributed: f64,
    pub failure: Option<PowerFlowError>,
    pub report: ConvergenceReport,
}

impl IslandReport {
    /// Report of an island that produced no numerical solution.
    pub(crate) fn unsolved(island: &Island, status: IslandStatus, failure: Option<PowerFlowError>) -> Self {
        Self {
            index: island.index,
            buses: island.buses.clone(),
            branches: island.branches.clone(),
            status,
            method: None,
            error: 0.0,
            iterations: 0,
            elapsed: 0.0,
            switched: Vec::new(),
            redistributed: 0.0,
            failure,
            report: ConvergenceReport::default(),
        }
    }
}

/// Merged power flow solution over the whole circuit, global indexing.
///
/// Buses and branches that belong to no solved island are zero-filled.
#[derive(Debug, Clone, Resource, Serialize, Deserialize)]
pub struct PowerFlowResults {
    /// Bus voltages (p.u.).
    pub v: DVector<Complex64>,
    /// True when every island converged or was skipped.
    pub converged: bool,
    /// Largest island mismatch (p.u.).
    pub error: f64,
    /// Largest island iteration count.
    pub iterations: usize,
    /// Calculated bus injections (MVA).
    pub scalc: DVector<Complex64>,
    /// Specified bus injections after control corrections (MVA).
    pub sbus: DVector<Complex64>,
    /// From-end branch power (MVA).
    pub sf: DVector<Complex64>,
    /// To-end branch power (MVA).
    pub st: DVector<Complex64>,
    /// From-end branch current (p.u.).
    pub if_: DVector<Complex64>,
    /// To-end branch current (p.u.).
    pub it: DVector<Complex64>,
    pub loading: DVector<f64>,
    /// `Sf + St` (MVA).
    pub losses: DVector<Complex64>,
    /// Final bus types, after reactive limit switching.
    pub bus_types: Vec<BusType>,
    /// Wall time of the whole solve (s).
    pub elapsed: f64,
    pub islands: Vec<IslandReport>,
}

impl PowerFlowResults {
    pub fn zeros(bus_types: Vec<BusType>, n_branch: usize) -> Self {
        let n = bus_types.len();
        Self {
            v: DVector::zeros(n),
            converged: true,
            error: 0.0,
            iterations: 0,
            scalc: DVector::zeros(n),
            sbus: DVector::zeros(n),
            sf: DVector::zeros(n_branch),
            st: DVector::zeros(n_branch),
            if_: DVector::zeros(n_branch),
            it: DVector::zeros(n_branch),
            loading: DVector::zeros(n_branch),
            losses: DVector::zeros(n_branch),
            bus_types,
            elapsed: 0.0,
            islands: Vec::new(),
        }
    }

    #[inline]
    pub fn n_bus(&self) -> usize {
        self.v.len()
    }

    pub fn vm(&self) -> DVector<f64> {
        self.v.map(|v| v.norm())
    }

    /// Total `Sf + St` over all branches (MVA).
    pub fn total_losses(&self) -> Complex64 {
        self.losses.sum()
    }

    pub fn island_of(&self, bus: usize) -> Option<&IslandReport> {
        self.islands.iter().find(|r| r.buses.contains(&bus))
    }

    /// Renders bus voltages and calculated injections as a markdown table.
    pub fn bus_table(&self) -> String {
        let rows = (0..self.n_bus()).map(|i| BusResTable {
            Bus: i,
            Type: format!("{:?}", self.bus_types[i]),
            Vm: FloatWrapper::new(self.v[i].norm(), 4),
            Va: FloatWrapper::new(self.v[i].arg().to_degrees(), 3),
            P_mw: FloatWrapper::new(self.scalc[i].re, 3),
            Q_mvar: FloatWrapper::new(self.scalc[i].im, 3),
        });
        Table::new(rows).with(Style::markdown()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_table_lists_attempts() {
        let mut report = ConvergenceReport::default();
        report.push(ConvergenceAttempt {
            method: SolverType::NewtonRaphson,
            converged: false,
            error: 0.25,
            iterations: 25,
            elapsed: 0.001,
        });
        report.push(ConvergenceAttempt::rejected(SolverType::Helm));
        let table = report.to_table();
        assert!(table.contains("NewtonRaphson"));
        assert!(table.contains("Helm"));
        assert!(table.contains("inf"));
        assert_eq!(table.lines().count(), 4);
    }

    #[test]
    fn test_results_serde_roundtrip() {
        let mut res = PowerFlowResults::zeros(vec![BusType::Slack, BusType::Pq], 1);
        res.v[0] = Complex64::new(1.0, 0.0);
        res.v[1] = Complex64::new(0.97, -0.02);
        let text = serde_json::to_string(&res).unwrap();
        let back: PowerFlowResults = serde_json::from_str(&text).unwrap();
        assert_eq!(back.v, res.v);
        assert_eq!(back.bus_types, res.bus_types);
        assert!(res.bus_table().contains("Slack"));
    }
}
