mod basic;
pub mod testcases;
pub mod prelude {
    use crate::basic;
    pub use basic::*;

    pub use basic::{
        circuit::{BranchControlMode, BusType, InjectionKind, NumericalCircuit},
        driver::{CancellationToken, run_power_flow, run_power_flow_with_cancel},
        ecs::{
            network::{CircuitRes, SolverStage, run_power_flow_system},
            plugin::{PowerFlowPlugin, default_app},
        },
        error::{LinearSolveError, PowerFlowError},
        methods::{PowerFlowMethod, method_for},
        options::{PowerFlowOptions, SolverType},
        results::{ConvergenceAttempt, ConvergenceReport, IslandReport, IslandStatus, PowerFlowResults},
        scenario::Scenario,
    };
}
