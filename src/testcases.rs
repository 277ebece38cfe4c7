//! Small reference networks used by the unit and scenario tests.

use crate::basic::circuit::{BusType, NumericalCircuit};

/// Slack feeding a 10 + j5 MVA load over one line (R = 0.01, X = 0.05 p.u.,
/// 10 MVA base). Injection 0 is the load.
pub fn two_bus_case() -> NumericalCircuit {
    let mut nc = NumericalCircuit::new(10.0);
    let slack = nc.add_bus("slack", BusType::Slack, 20.0);
    let load = nc.add_bus("load", BusType::Pq, 20.0);
    nc.add_line(slack, load, 0.01, 0.05, 0.0, 20.0);
    nc.add_load(load, 10.0, 5.0);
    nc
}

/// One isolated PQ bus carrying a load, no branches.
pub fn single_bus_case() -> NumericalCircuit {
    let mut nc = NumericalCircuit::new(100.0);
    let b = nc.add_bus("lonely", BusType::Pq, 10.0);
    nc.add_load(b, 1.0, 0.5);
    nc
}

/// Slack, a generator bus holding 1.02 p.u. with `Qmax = 5` MVAr, and a heavy
/// reactive load behind it. The generator cannot hold its setpoint.
pub fn pv_qlimit_case() -> NumericalCircuit {
    let mut nc = NumericalCircuit::new(100.0);
    let slack = nc.add_bus("slack", BusType::Slack, 110.0);
    let gen_bus = nc.add_bus("gen", BusType::Pq, 110.0);
    let load = nc.add_bus("load", BusType::Pq, 110.0);
    nc.add_line(slack, gen_bus, 0.01, 0.1, 0.0, 150.0);
    nc.add_line(gen_bus, load, 0.01, 0.1, 0.0, 150.0);
    nc.add_generator(slack, 0.0, 1.0, f64::NEG_INFINITY, f64::INFINITY);
    nc.add_generator(gen_bus, 20.0, 1.02, -5.0, 5.0);
    nc.add_load(load, 60.0, 40.0);
    nc
}

/// Three islands: buses {0, 1} and {2, 3, 4} each with a slack, and bus 5
/// on its own with a load and no slack.
pub fn three_island_case() -> NumericalCircuit {
    let mut nc = NumericalCircuit::new(100.0);
    let a0 = nc.add_bus("a0", BusType::Slack, 110.0);
    let a1 = nc.add_bus("a1", BusType::Pq, 110.0);
    let b0 = nc.add_bus("b0", BusType::Slack, 20.0);
    let b1 = nc.add_bus("b1", BusType::Pq, 20.0);
    let b2 = nc.add_bus("b2", BusType::Pq, 20.0);
    let c0 = nc.add_bus("c0", BusType::Pq, 20.0);
    nc.add_line(a0, a1, 0.01, 0.1, 0.02, 100.0);
    nc.add_line(b1, b2, 0.02, 0.08, 0.0, 50.0);
    nc.add_line(b0, b1, 0.01, 0.05, 0.0, 50.0);
    nc.add_load(a1, 40.0, 10.0);
    nc.add_load(b1, 10.0, 3.0);
    nc.add_load(b2, 15.0, 5.0);
    nc.add_load(c0, 1.0, 0.2);
    nc
}

/// WSCC 9-bus system on a 100 MVA base.
pub fn ieee9_case() -> NumericalCircuit {
    let mut nc = NumericalCircuit::new(100.0);
    let types = [
        BusType::Slack,
        BusType::Pq,
        BusType::Pq,
        BusType::Pq,
        BusType::Pq,
        BusType::Pq,
        BusType::Pq,
        BusType::Pq,
        BusType::Pq,
    ];
    let v_nom = [16.5, 18.0, 13.8, 230.0, 230.0, 230.0, 230.0, 230.0, 230.0];
    for (i, (ty, kv)) in types.into_iter().zip(v_nom).enumerate() {
        nc.add_bus(&format!("bus{}", i + 1), ty, kv);
    }
    let lines = [
        (0, 3, 0.0, 0.0576, 0.0, 250.0),
        (3, 4, 0.017, 0.092, 0.158, 250.0),
        (4, 5, 0.039, 0.17, 0.358, 150.0),
        (2, 5, 0.0, 0.0586, 0.0, 300.0),
        (5, 6, 0.0119, 0.1008, 0.209, 150.0),
        (6, 7, 0.0085, 0.072, 0.149, 250.0),
        (7, 1, 0.0, 0.0625, 0.0, 250.0),
        (7, 8, 0.032, 0.161, 0.306, 250.0),
        (8, 3, 0.01, 0.085, 0.176, 250.0),
    ];
    for (f, t, r, x, b, rate) in lines {
        nc.add_line(f, t, r, x, b, rate);
    }
    nc.add_generator(0, 0.0, 1.04, -300.0, 300.0);
    nc.add_generator(1, 163.0, 1.025, -300.0, 300.0);
    nc.add_generator(2, 85.0, 1.025, -300.0, 300.0);
    nc.add_load(4, 90.0, 30.0);
    nc.add_load(6, 100.0, 35.0);
    nc.add_load(8, 125.0, 50.0);
    nc.bus.installed_power[..3].copy_from_slice(&[250.0, 300.0, 270.0]);
    nc
}

/// Four buses where the generator at bus 1 regulates the voltage of bus 2.
pub fn remote_control_case() -> NumericalCircuit {
    let mut nc = NumericalCircuit::new(100.0);
    for i in 0..4 {
        let ty = if i == 0 { BusType::Slack } else { BusType::Pq };
        nc.add_bus(&format!("r{i}"), ty, 110.0);
    }
    nc.add_line(0, 1, 0.01, 0.08, 0.02, 100.0);
    nc.add_line(1, 2, 0.01, 0.06, 0.02, 100.0);
    nc.add_line(2, 3, 0.02, 0.1, 0.0, 100.0);
    let g = nc.add_generator(1, 30.0, 1.01, -100.0, 100.0);
    nc.injection.controlled_bus[g] = Some(2);
    nc.add_load(2, 40.0, 15.0);
    nc.add_load(3, 20.0, 8.0);
    nc
}

/// Slack and one generator bus holding 1.02 p.u. behind a single line; the
/// Newton system has one unknown.
pub fn slack_pv_case() -> NumericalCircuit {
    let mut nc = NumericalCircuit::new(100.0);
    let slack = nc.add_bus("slack", BusType::Slack, 110.0);
    let gen_bus = nc.add_bus("gen", BusType::Pq, 110.0);
    nc.add_line(slack, gen_bus, 0.01, 0.1, 0.0, 100.0);
    nc.add_generator(slack, 0.0, 1.0, f64::NEG_INFINITY, f64::INFINITY);
    nc.add_generator(gen_bus, 30.0, 1.02, -100.0, 100.0);
    nc.add_load(gen_bus, 10.0, 5.0);
    nc
}
