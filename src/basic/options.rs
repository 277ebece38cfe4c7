use bevy_ecs::prelude::*;
use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Power flow algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SolverType {
    #[default]
    #[serde(rename = "NR")]
    NewtonRaphson,
    #[serde(rename = "LM")]
    LevenbergMarquardt,
    #[serde(rename = "HELM")]
    Helm,
    FastDecoupled,
    #[serde(rename = "DC")]
    Dc,
}

impl SolverType {
    /// AC methods tried, in order, when `retry_with_other_methods` is set.
    pub const RETRY_ORDER: [SolverType; 3] = [
        SolverType::NewtonRaphson,
        SolverType::LevenbergMarquardt,
        SolverType::FastDecoupled,
    ];

    /// Methods to attempt for one island: the requested one first, then the
    /// rest of [`Self::RETRY_ORDER`].
    pub fn attempt_order(self, retry: bool) -> Vec<SolverType> {
        let mut order = vec![self];
        if retry && self != SolverType::Dc {
            order.extend(Self::RETRY_ORDER.iter().copied().filter(|s| *s != self));
        }
        order
    }
}

/// Resource that holds the power flow configuration.
#[derive(Debug, Clone, Resource, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerFlowOptions {
    pub solver_type: SolverType,
    /// Convergence tolerance on the infinity norm of the mismatch (p.u.).
    pub tolerance: f64,
    pub max_iter: usize,
    /// Enforce generator reactive power limits.
    pub control_q: bool,
    pub distributed_slack: bool,
    pub retry_with_other_methods: bool,
    pub ignore_single_node_islands: bool,
    pub verbose: u8,
    /// Warm start voltage, one entry per global bus.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_voltage: Option<DVector<Complex64>>,
    /// Mismatch below which discrete controls are evaluated.
    pub control_threshold: f64,
    pub max_voltage_magnitude: f64,
    pub lm_initial_lambda_factor: f64,
    /// Floor applied to |R + jX| of every branch (p.u.).
    pub min_impedance: f64,
}

impl Default for PowerFlowOptions {
    fn default() -> Self {
        Self {
            solver_type: SolverType::NewtonRaphson,
            tolerance: 1e-6,
            max_iter: 25,
            control_q: false,
            distributed_slack: false,
            retry_with_other_methods: true,
            ignore_single_node_islands: false,
            verbose: 0,
            initial_voltage: None,
            control_threshold: 1e-2,
            max_voltage_magnitude: 10.0,
            lm_initial_lambda_factor: 1e-3,
            min_impedance: 1e-6,
        }
    }
}

impl PowerFlowOptions {
    pub fn with_solver(mut self, solver_type: SolverType) -> Self {
        self.solver_type = solver_type;
        self
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Threshold used to decide when controls may run; never tighter than the
    /// convergence tolerance.
    #[inline(always)]
    pub(crate) fn effective_control_threshold(&self) -> f64 {
        self.control_threshold.max(self.tolerance)
    }

    pub(crate) fn controls_enabled(&self) -> bool {
        self.control_q || self.distributed_slack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_json_defaults() {
        let opts = PowerFlowOptions::from_json(r#"{"solver_type":"LM","max_iter":40}"#).unwrap();
        assert_eq!(opts.solver_type, SolverType::LevenbergMarquardt);
        assert_eq!(opts.max_iter, 40);
        assert_eq!(opts.tolerance, 1e-6);
        assert!(opts.retry_with_other_methods);

        let text = opts.to_json().unwrap();
        let back = PowerFlowOptions::from_json(&text).unwrap();
        assert_eq!(back.max_iter, 40);
        assert!(back.initial_voltage.is_none());
    }

    #[test]
    fn test_attempt_order() {
        let order = SolverType::LevenbergMarquardt.attempt_order(true);
        assert_eq!(
            order,
            vec![
                SolverType::LevenbergMarquardt,
                SolverType::NewtonRaphson,
                SolverType::FastDecoupled
            ]
        );
        assert_eq!(SolverType::Dc.attempt_order(true), vec![SolverType::Dc]);
        assert_eq!(
            SolverType::NewtonRaphson.attempt_order(false),
            vec![SolverType::NewtonRaphson]
        );
        assert_eq!(SolverType::Helm.attempt_order(true).len(), 4);
    }
}
