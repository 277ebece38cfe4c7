use bevy_app::prelude::*;
use bevy_ecs::prelude::*;

use crate::basic::options::PowerFlowOptions;

use super::network::*;

/// Registers the power flow options and the solve system.
///
/// The solve runs on every `Update` in [`SolverStage::Solve`] once a
/// [`CircuitRes`] is present. Systems that edit the circuit or read the
/// results go in `BeforeSolve` and `AfterSolve`.
#[derive(Default)]
pub struct PowerFlowPlugin;

impl Plugin for PowerFlowPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PowerFlowOptions>();
        app.configure_sets(
            Update,
            (
                SolverStage::BeforeSolve,
                SolverStage::Solve,
                SolverStage::AfterSolve,
            )
                .chain(),
        );
        app.add_systems(
            Update,
            run_power_flow_system
                .run_if(resource_exists::<CircuitRes>)
                .in_set(SolverStage::Solve),
        );
    }
}

/// Creates an `App` with [`PowerFlowPlugin`] installed.
pub fn default_app() -> App {
    let mut app = App::new();
    app.add_plugins(PowerFlowPlugin);
    app
}
