use bevy_ecs::prelude::*;
use derive_more::{Deref, DerefMut, From};
use tracing::error;

use crate::basic::{
    circuit::NumericalCircuit, driver::run_power_flow, options::PowerFlowOptions,
    results::PowerFlowResults,
};

/// Ordering of the power flow systems within `Update`.
#[derive(Clone, SystemSet, Debug, Hash, PartialEq, Eq)]
pub enum SolverStage {
    BeforeSolve,
    Solve,
    AfterSolve,
}

/// Resource wrapping the circuit to solve.
#[derive(Debug, Clone, Resource, Deref, DerefMut, From)]
pub struct CircuitRes(pub NumericalCircuit);

/// Solves [`CircuitRes`] with the current [`PowerFlowOptions`] and stores the
/// outcome as a [`PowerFlowResults`] resource.
///
/// Malformed input leaves no results behind.
pub fn run_power_flow_system(
    mut cmd: Commands,
    circuit: Res<CircuitRes>,
    options: Res<PowerFlowOptions>,
) {
    match run_power_flow(&circuit, &options) {
        Ok(results) => cmd.insert_resource(results),
        Err(err) => {
            error!(%err, "power flow input rejected");
            cmd.remove_resource::<PowerFlowResults>();
        }
    }
}
