use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use nalgebra::DVector;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{info, warn};

use super::{
    admittance::AdmittanceMatrices,
    circuit::NumericalCircuit,
    error::PowerFlowError,
    formulation::{NumericSolution, PfProblem},
    island::{Island, IslandData, split_islands},
    methods::method_for,
    options::PowerFlowOptions,
    post_processing::{BranchFlows, branch_flows},
    results::{ConvergenceAttempt, ConvergenceReport, IslandReport, IslandStatus, PowerFlowResults},
    scenario::Scenario,
};

/// Cooperative cancellation flag, polled once per island.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Solves the power flow of every island of `circuit`.
///
/// Returns `Err` only when the circuit or options are malformed. Numerical
/// trouble is reported through `converged` and the per-island reports.
pub fn run_power_flow(
    circuit: &NumericalCircuit,
    options: &PowerFlowOptions,
) -> Result<PowerFlowResults, PowerFlowError> {
    run_power_flow_with_cancel(circuit, options, &CancellationToken::default())
}

pub fn run_power_flow_with_cancel(
    circuit: &NumericalCircuit,
    options: &PowerFlowOptions,
    token: &CancellationToken,
) -> Result<PowerFlowResults, PowerFlowError> {
    solve_scenario(&Scenario::new(circuit), options, token)
}

/// A solved island before merging.
struct IslandOutcome {
    report: IslandReport,
    solved: Option<(NumericSolution, BranchFlows, f64)>,
}

pub(crate) fn solve_scenario(
    scenario: &Scenario,
    options: &PowerFlowOptions,
    token: &CancellationToken,
) -> Result<PowerFlowResults, PowerFlowError> {
    let started = Instant::now();
    scenario.validate()?;
    let nc = scenario.circuit();
    if let Some(guess) = &options.initial_voltage {
        if guess.len() != nc.n_bus() {
            return Err(PowerFlowError::Dimension(format!(
                "initial_voltage has length {}, expected {}",
                guess.len(),
                nc.n_bus()
            )));
        }
    }

    let split = split_islands(scenario, options.ignore_single_node_islands);

    #[cfg(feature = "parallel")]
    let outcomes: Vec<IslandOutcome> = split
        .islands
        .par_iter()
        .map(|island| solve_island(scenario, island, options, token))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<IslandOutcome> = split
        .islands
        .iter()
        .map(|island| solve_island(scenario, island, options, token))
        .collect();

    let mut results = PowerFlowResults::zeros(nc.bus.bus_type.clone(), nc.n_branch());
    for (island, outcome) in split.islands.iter().zip(outcomes) {
        merge_island(&mut results, island, outcome);
    }
    let first_dropped = split.islands.len();
    for (k, island) in split.dropped.iter().enumerate() {
        let mut report = IslandReport::unsolved(island, IslandStatus::Skipped, None);
        report.index = first_dropped + k;
        results.islands.push(report);
    }
    results.islands.sort_by_key(|r| r.buses.first().copied());

    results.converged = results.islands.iter().all(|r| r.status.is_success());
    results.elapsed = started.elapsed().as_secs_f64();
    info!(
        islands = results.islands.len(),
        converged = results.converged,
        error = results.error,
        iterations = results.iterations,
        elapsed = results.elapsed,
        "power flow finished"
    );
    Ok(results)
}

fn merge_island(results: &mut PowerFlowResults, island: &Island, outcome: IslandOutcome) {
    if let Some((sol, flows, sbase)) = outcome.solved {
        let types = sol.roles.bus_types();
        for (i, &g) in island.buses.iter().enumerate() {
            results.v[g] = sol.v[i];
            results.scalc[g] = sol.scalc[i] * sbase;
            results.sbus[g] = sol.s0[i] * sbase;
            results.bus_types[g] = types[i];
        }
        for (k, &g) in island.branches.iter().enumerate() {
            results.sf[g] = flows.sf[k];
            results.st[g] = flows.st[k];
            results.if_[g] = flows.if_[k];
            results.it[g] = flows.it[k];
            results.losses[g] = flows.losses[k];
            results.loading[g] = flows.loading[k];
        }
        results.error = results.error.max(sol.error);
        results.iterations = results.iterations.max(sol.iterations);
    }
    results.islands.push(outcome.report);
}

fn solve_island(
    scenario: &Scenario,
    island: &Island,
    options: &PowerFlowOptions,
    token: &CancellationToken,
) -> IslandOutcome {
    if token.is_cancelled() {
        let report = IslandReport::unsolved(island, IslandStatus::Cancelled, Some(PowerFlowError::Cancelled));
        return IslandOutcome { report, solved: None };
    }
    let data = island.compile(scenario, options);
    if !data.has_slack() {
        warn!(island = island.index, buses = island.n_bus(), "island has no slack bus, result zero-filled");
        let report = IslandReport::unsolved(island, IslandStatus::NoSlack, Some(PowerFlowError::NoSlack));
        return IslandOutcome { report, solved: None };
    }
    let adm = AdmittanceMatrices::build(data.n_bus(), &data.branches, &data.yshunt, options.min_impedance);
    let (best, report, failure) = run_attempts(island, &data, &adm, options);

    let Some(sol) = best else {
        let mut unsolved = IslandReport::unsolved(island, IslandStatus::Failed, failure);
        unsolved.report = report;
        return IslandOutcome {
            report: unsolved,
            solved: None,
        };
    };
    let status = if sol.converged {
        IslandStatus::Converged
    } else if sol.failure.is_some() {
        IslandStatus::Failed
    } else {
        IslandStatus::NotConverged
    };
    info!(
        island = island.index,
        buses = island.n_bus(),
        method = ?sol.method,
        converged = sol.converged,
        error = sol.error,
        iterations = sol.iterations,
        "island solved"
    );
    if options.verbose > 1 {
        info!(island = island.index, "\n{}", report.to_table());
    }

    let flows = branch_flows(&adm, &data.branches, &sol.v, data.sbase);
    let report = IslandReport {
        index: island.index,
        buses: island.buses.clone(),
        branches: island.branches.clone(),
        status,
        method: Some(sol.method),
        error: sol.error,
        iterations: sol.iterations,
        elapsed: sol.elapsed,
        switched: sol.roles.switched.iter().map(|&i| island.buses[i]).collect(),
        redistributed: sol.redistributed * data.sbase,
        failure: sol.failure.clone(),
        report,
    };
    IslandOutcome {
        report,
        solved: Some((sol, flows, data.sbase)),
    }
}

/// Runs the requested method and, if allowed, the fallbacks. Each attempt
/// starts from the best voltage found so far; the first converged attempt
/// ends the loop.
fn run_attempts(
    island: &Island,
    data: &IslandData,
    adm: &AdmittanceMatrices,
    options: &PowerFlowOptions,
) -> (Option<NumericSolution>, ConvergenceReport, Option<PowerFlowError>) {
    let mut report = ConvergenceReport::default();
    let mut best: Option<NumericSolution> = None;
    let mut last_failure = None;
    let mut v_start: DVector<_> = data.v0.clone();

    for kind in options.solver_type.attempt_order(options.retry_with_other_methods) {
        let method = match method_for(kind) {
            Ok(m) => m,
            Err(e) => {
                warn!(island = island.index, method = ?kind, "{e}");
                report.push(ConvergenceAttempt::rejected(kind));
                last_failure = Some(e);
                continue;
            }
        };
        let problem = PfProblem::new(adm, data, &v_start, options);
        let sol = method.solve(problem, options);
        report.push(ConvergenceAttempt::from(&sol));
        match &sol.failure {
            Some(e) => warn!(island = island.index, method = ?kind, "{e}"),
            None if !sol.converged => warn!(
                island = island.index,
                method = ?kind,
                error = sol.error,
                "power flow did not converge"
            ),
            None => {}
        }
        if let Some(e) = &sol.failure {
            last_failure = Some(e.clone());
        }

        let improves = best.as_ref().is_none_or(|b| sol.rank_error() < b.rank_error());
        if improves {
            if sol.v.iter().all(|v| v.re.is_finite() && v.im.is_finite()) {
                v_start = sol.v.clone();
            }
            best = Some(sol);
        }
        if best.as_ref().is_some_and(|b| b.converged) {
            break;
        }
    }
    (best, report, last_failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::options::SolverType;
    use crate::testcases::{ieee9_case, three_island_case, two_bus_case};

    #[test]
    fn test_run_power_flow_two_bus() {
        let nc = two_bus_case();
        let res = run_power_flow(&nc, &PowerFlowOptions::default()).unwrap();
        assert!(res.converged);
        assert!(res.error < 1e-6);
        assert_eq!(res.islands.len(), 1);
        assert_eq!(res.islands[0].method, Some(SolverType::NewtonRaphson));
        // slack supplies the load plus the series losses
        let balance = res.scalc.sum() - res.total_losses();
        assert!(balance.norm() < 1e-4, "{balance}");
    }

    #[test]
    fn test_unsupported_solver_falls_back() {
        let nc = ieee9_case();
        let opts = PowerFlowOptions::default().with_solver(SolverType::Helm);
        let res = run_power_flow(&nc, &opts).unwrap();
        assert!(res.converged);
        let attempts = &res.islands[0].report.attempts;
        assert_eq!(attempts[0].method, SolverType::Helm);
        assert!(!attempts[0].converged);
        assert_eq!(attempts[1].method, SolverType::NewtonRaphson);
        assert_eq!(res.islands[0].method, Some(SolverType::NewtonRaphson));

        let mut no_retry = opts.clone();
        no_retry.retry_with_other_methods = false;
        let res = run_power_flow(&nc, &no_retry).unwrap();
        assert!(!res.converged);
        assert_eq!(res.islands[0].status, IslandStatus::Failed);
        assert_eq!(
            res.islands[0].failure,
            Some(PowerFlowError::UnsupportedSolver(SolverType::Helm))
        );
    }

    #[test]
    fn test_retry_after_max_iter() {
        let nc = ieee9_case();
        let mut opts = PowerFlowOptions::default();
        opts.max_iter = 2;
        let res = run_power_flow(&nc, &opts).unwrap();
        // each attempt warm-starts from the previous best, so the
        // accumulated iterations eventually reach the tolerance
        let attempts = &res.islands[0].report.attempts;
        assert!(attempts.len() >= 2);
        assert!(!attempts[0].converged);
        assert!(attempts[1].error < attempts[0].error);
    }

    #[test]
    fn test_cancelled_before_start() {
        let nc = three_island_case();
        let token = CancellationToken::new();
        token.cancel();
        let res = run_power_flow_with_cancel(&nc, &PowerFlowOptions::default(), &token).unwrap();
        assert!(!res.converged);
        assert!(res.islands.iter().all(|r| r.status == IslandStatus::Cancelled));
        assert!(res.v.iter().all(|v| v.norm() == 0.0));
    }

    #[test]
    fn test_bad_initial_voltage_is_rejected() {
        let nc = two_bus_case();
        let mut opts = PowerFlowOptions::default();
        opts.initial_voltage = Some(DVector::zeros(5));
        assert!(matches!(run_power_flow(&nc, &opts), Err(PowerFlowError::Dimension(_))));
    }
}
