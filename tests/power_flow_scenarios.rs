use gridflow::prelude::*;
use gridflow::testcases::*;
use nalgebra::DVector;
use num_complex::Complex64;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn max_diff(a: &DVector<Complex64>, b: &DVector<Complex64>) -> f64 {
    (a - b).map(|d| d.norm()).max()
}

#[test]
fn two_bus_newton_raphson() {
    init_logging();
    let nc = two_bus_case();
    let res = run_power_flow(&nc, &PowerFlowOptions::default()).unwrap();
    assert!(res.converged);
    assert!(res.error < 1e-6);
    assert!(res.iterations <= 10);
    let vm = res.v[1].norm();
    assert!(vm > 0.95 && vm < 0.97, "|V| = {vm}");
    // the slack supplies the load and the line losses
    let slack = res.scalc[0];
    assert!((slack - Complex64::new(10.0, 5.0) - res.total_losses()).norm() < 1e-3);
    assert!(res.loading[0] > 0.5 && res.loading[0] < 0.6);
}

#[test]
fn single_node_island_is_skipped() {
    init_logging();
    let nc = single_bus_case();
    let mut opts = PowerFlowOptions::default();
    opts.ignore_single_node_islands = true;
    let res = run_power_flow(&nc, &opts).unwrap();
    assert!(res.converged);
    assert_eq!(res.islands.len(), 1);
    assert_eq!(res.islands[0].status, IslandStatus::Skipped);
    assert_eq!(res.v[0], Complex64::new(0.0, 0.0));
    assert_eq!(res.scalc[0], Complex64::new(0.0, 0.0));
    assert_eq!(res.sf.len(), 0);
}

#[test]
fn pv_bus_relaxed_at_reactive_limit() {
    init_logging();
    let nc = pv_qlimit_case();
    let mut opts = PowerFlowOptions::default();

    let free = run_power_flow(&nc, &opts).unwrap();
    assert!(free.converged);
    assert_eq!(free.bus_types[1], BusType::Pv);
    assert!((free.v[1].norm() - 1.02).abs() < 1e-9);
    assert!(free.scalc[1].im > 5.0, "needs {} MVAr", free.scalc[1].im);

    opts.control_q = true;
    let res = run_power_flow(&nc, &opts).unwrap();
    assert!(res.converged);
    assert_eq!(res.bus_types[1], BusType::Pq);
    assert!(res.v[1].norm() < 1.02);
    assert_eq!(res.islands[0].switched, vec![1]);
    // generator pinned at Qmax
    assert!((res.sbus[1].im - 5.0).abs() < 1e-9);
    assert!((res.scalc[1].im - 5.0).abs() < 1e-3);
}

#[test]
fn island_without_slack_does_not_disturb_others() {
    init_logging();
    let nc = three_island_case();
    let res = run_power_flow(&nc, &PowerFlowOptions::default()).unwrap();
    assert!(!res.converged);
    assert_eq!(res.islands.len(), 3);
    let lonely = res.island_of(5).unwrap();
    assert_eq!(lonely.status, IslandStatus::NoSlack);
    assert_eq!(lonely.failure, Some(PowerFlowError::NoSlack));
    assert_eq!(res.v[5], Complex64::new(0.0, 0.0));
    for bus in [0, 2] {
        assert_eq!(res.island_of(bus).unwrap().status, IslandStatus::Converged);
    }

    let mut opts = PowerFlowOptions::default();
    opts.ignore_single_node_islands = true;
    let reference = run_power_flow(&nc, &opts).unwrap();
    assert!(reference.converged);
    for bus in 0..5 {
        assert!((res.v[bus] - reference.v[bus]).norm() < 1e-12);
    }
}

#[test]
fn distributed_slack_conserves_power() {
    init_logging();
    let nc = ieee9_case();
    let plain = run_power_flow(&nc, &PowerFlowOptions::default()).unwrap();
    let slack_p = plain.scalc[0].re - plain.sbus[0].re;
    assert!(slack_p > 50.0);

    let mut opts = PowerFlowOptions::default();
    opts.distributed_slack = true;
    let res = run_power_flow(&nc, &opts).unwrap();
    assert!(res.converged);
    let moved = res.islands[0].redistributed;
    let added: f64 = (0..9).map(|i| res.sbus[i].re - plain.sbus[i].re).sum();
    assert!((moved - added).abs() < 1e-6);
    // the slack ends at its own schedule
    assert!((res.scalc[0].re - res.sbus[0].re).abs() < 1e-3);
    // the moved power matches the slack imbalance up to the change in losses
    assert!((moved - slack_p).abs() < 5.0, "moved {moved} MW for {slack_p} MW");
    // shares follow installed power of the generator buses (300 : 270)
    let share1 = res.sbus[1].re - plain.sbus[1].re;
    let share2 = res.sbus[2].re - plain.sbus[2].re;
    assert!((share1 / share2 - 300.0 / 270.0).abs() < 1e-9);
}

#[test]
fn reactive_limit_relaxation_is_monotonic() {
    init_logging();
    let mut nc = ieee9_case();
    for k in 1..3 {
        nc.injection.q_min[k] = -3.0;
        nc.injection.q_max[k] = 3.0;
    }
    let mut opts = PowerFlowOptions::default();
    opts.control_q = true;
    let res = run_power_flow(&nc, &opts).unwrap();
    let switched = &res.islands[0].switched;
    assert!(!switched.is_empty());
    let mut unique = switched.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), switched.len(), "a bus switched twice: {switched:?}");
    for &bus in switched {
        assert_eq!(res.bus_types[bus], BusType::Pq);
    }
}

#[test]
fn methods_agree_on_ieee9() {
    init_logging();
    let nc = ieee9_case();
    let mut opts = PowerFlowOptions::default();
    opts.retry_with_other_methods = false;
    opts.max_iter = 100;
    let nr = run_power_flow(&nc, &opts).unwrap();
    let lm = run_power_flow(&nc, &opts.clone().with_solver(SolverType::LevenbergMarquardt)).unwrap();
    let fd = run_power_flow(&nc, &opts.clone().with_solver(SolverType::FastDecoupled)).unwrap();
    assert!(nr.converged && lm.converged && fd.converged);
    assert!(max_diff(&nr.v, &lm.v) < 1e-4);
    assert!(max_diff(&nr.v, &fd.v) < 1e-4);
    assert!(nr.iterations <= 6);
}

#[test]
fn dc_power_flow_on_ieee9() {
    init_logging();
    let nc = ieee9_case();
    let opts = PowerFlowOptions::default().with_solver(SolverType::Dc);
    let res = run_power_flow(&nc, &opts).unwrap();
    assert!(res.converged);
    assert_eq!(res.iterations, 0);
    assert_eq!(res.islands[0].report.attempts.len(), 1);

    let ac = run_power_flow(&nc, &PowerFlowOptions::default()).unwrap();
    for i in 0..9 {
        let (dc_va, ac_va) = (res.v[i].arg(), ac.v[i].arg());
        assert!((dc_va - ac_va).abs() < 0.05, "bus {i}: {dc_va} vs {ac_va}");
    }
}

#[test]
fn remote_voltage_control() {
    init_logging();
    let nc = remote_control_case();
    let res = run_power_flow(&nc, &PowerFlowOptions::default()).unwrap();
    assert!(res.converged);
    assert_eq!(res.bus_types[1], BusType::P);
    assert_eq!(res.bus_types[2], BusType::Pqv);
    assert!((res.v[2].norm() - 1.01).abs() < 1e-6);
}

#[test]
fn scenario_outage_leaves_circuit_untouched() {
    init_logging();
    let nc = three_island_case();
    let mut sc = Scenario::new(&nc);
    sc.branch_active[1] = false;
    sc.injection_p[2] = 0.0;
    let opts = PowerFlowOptions {
        ignore_single_node_islands: true,
        ..Default::default()
    };
    let res = sc.solve(&opts).unwrap();
    // bus 4 is cut off from its slack and becomes a single-node island
    assert_eq!(res.island_of(4).unwrap().status, IslandStatus::Skipped);
    assert!(res.converged);
    assert_eq!(res.sf[1], Complex64::new(0.0, 0.0));
    assert!(nc.branch.active[1]);
    assert_eq!(nc.injection.s[2].re, 15.0);
}

#[test]
fn warm_start_from_solution() {
    init_logging();
    let nc = ieee9_case();
    let first = run_power_flow(&nc, &PowerFlowOptions::default()).unwrap();
    let opts = PowerFlowOptions {
        initial_voltage: Some(first.v.clone()),
        ..Default::default()
    };
    let again = run_power_flow(&nc, &opts).unwrap();
    assert!(again.converged);
    assert_eq!(again.iterations, 0);
    assert!(max_diff(&first.v, &again.v) < 1e-9);
}

#[test]
fn options_from_json() {
    init_logging();
    let opts = PowerFlowOptions::from_json(
        r#"{"solver_type":"FastDecoupled","max_iter":60,"verbose":2,"distributed_slack":true}"#,
    )
    .unwrap();
    let res = run_power_flow(&ieee9_case(), &opts).unwrap();
    assert!(res.converged);
    assert_eq!(res.islands[0].method, Some(SolverType::FastDecoupled));
}

#[test]
fn single_unknown_systems_solve() {
    init_logging();
    let pv = run_power_flow(&slack_pv_case(), &PowerFlowOptions::default()).unwrap();
    assert!(pv.converged);
    assert_eq!(pv.islands[0].report.attempts.len(), 1);
    assert!((pv.v[1].norm() - 1.02).abs() < 1e-9);
    assert!((pv.scalc[1].re - 20.0).abs() < 1e-3);

    let two_bus = two_bus_case();
    let opts = PowerFlowOptions {
        retry_with_other_methods: false,
        ..Default::default()
    };
    let nr = run_power_flow(&two_bus, &opts).unwrap();
    let fd = run_power_flow(&two_bus, &opts.clone().with_solver(SolverType::FastDecoupled)).unwrap();
    assert!(fd.converged);
    assert!(max_diff(&nr.v, &fd.v) < 1e-5);

    let dc = run_power_flow(&two_bus, &opts.with_solver(SolverType::Dc)).unwrap();
    assert!(dc.converged);
    // 1 p.u. over x = 0.05
    assert!((dc.v[1].arg() + 0.05).abs() < 1e-12);
}

#[test]
fn runaway_voltage_is_reported_not_fatal() {
    init_logging();
    let nc = two_bus_case();
    let mut opts = PowerFlowOptions {
        max_voltage_magnitude: 0.5,
        retry_with_other_methods: false,
        ..Default::default()
    };
    let res = run_power_flow(&nc, &opts).unwrap();
    assert!(!res.converged);
    let island = &res.islands[0];
    assert_eq!(island.status, IslandStatus::Failed);
    assert_eq!(island.failure, Some(PowerFlowError::NumericalOverflow { iteration: 0 }));

    opts.retry_with_other_methods = true;
    let res = run_power_flow(&nc, &opts).unwrap();
    assert!(!res.converged);
    assert_eq!(res.islands[0].report.attempts.len(), 3);
    assert!(matches!(
        res.islands[0].failure,
        Some(PowerFlowError::NumericalOverflow { .. })
    ));
}

#[test]
fn infeasible_load_does_not_converge() {
    init_logging();
    let mut nc = two_bus_case();
    // well past the transfer limit of the line
    nc.injection.s[0] = Complex64::new(500.0, 100.0);
    let res = run_power_flow(&nc, &PowerFlowOptions::default()).unwrap();
    assert!(!res.converged);
    assert_ne!(res.islands[0].status, IslandStatus::Converged);
    assert_eq!(res.islands[0].report.attempts.len(), 3);
}

/// Slack feeding a load through a series-compensated pair whose reactances
/// cancel, so every derivative at the load bus vanishes.
fn cancelled_reactance_case() -> NumericalCircuit {
    let mut nc = NumericalCircuit::new(100.0);
    let slack = nc.add_bus("slack", BusType::Slack, 110.0);
    let load = nc.add_bus("load", BusType::Pq, 110.0);
    nc.add_line(slack, load, 0.0, 0.1, 0.0, 100.0);
    nc.add_line(slack, load, 0.0, -0.1, 0.0, 100.0);
    nc.add_load(load, 10.0, 5.0);
    nc
}

#[test]
fn singular_jacobian_fails_the_island() {
    init_logging();
    let nc = cancelled_reactance_case();
    let mut opts = PowerFlowOptions {
        retry_with_other_methods: false,
        ..Default::default()
    };
    let res = run_power_flow(&nc, &opts).unwrap();
    assert!(!res.converged);
    let island = &res.islands[0];
    assert_eq!(island.status, IslandStatus::Failed);
    assert!(matches!(
        island.failure,
        Some(PowerFlowError::SingularJacobian { iteration: 0, .. })
    ));
    assert_eq!(island.report.attempts.len(), 1);

    opts.retry_with_other_methods = true;
    let res = run_power_flow(&nc, &opts).unwrap();
    assert!(!res.converged);
    let methods: Vec<_> = res.islands[0].report.attempts.iter().map(|a| a.method).collect();
    assert_eq!(
        methods,
        vec![
            SolverType::NewtonRaphson,
            SolverType::LevenbergMarquardt,
            SolverType::FastDecoupled
        ]
    );
    assert!(res.islands[0].report.attempts.iter().all(|a| !a.converged));
    assert_eq!(res.islands[0].status, IslandStatus::Failed);
}
