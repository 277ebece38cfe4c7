use nalgebra::DVector;
use num_complex::Complex64;
use tracing::debug;

use super::{bus_types::BusRoles, circuit::BusType, island::IslandData, options::PowerFlowOptions};

/// What a control pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlOutcome {
    /// Bus roles changed: index sets and Jacobian shape must be rebuilt.
    pub structure_changed: bool,
    /// Only the specified injections changed.
    pub injections_changed: bool,
}

impl ControlOutcome {
    #[inline]
    pub fn changed(&self) -> bool {
        self.structure_changed || self.injections_changed
    }
}

/// Discrete controls applied between iterations: generator reactive limits
/// and distributed slack.
#[derive(Debug, Clone)]
pub struct Controls {
    control_q: bool,
    distributed_slack: bool,
    qmin: DVector<f64>,
    qmax: DVector<f64>,
    /// Reactive part of `S0` not produced by voltage controlling devices.
    q_fixed: DVector<f64>,
    /// Share of each bus in the slack redistribution; sums to 1 or is all zero.
    weights: DVector<f64>,
    /// Total active power moved away from the slack (p.u.).
    pub redistributed: f64,
}

impl Controls {
    pub fn new(data: &IslandData, options: &PowerFlowOptions) -> Self {
        let n = data.n_bus();
        let mut weights = DVector::zeros(n);
        for i in 0..n {
            if data.bus_types[i] != BusType::Slack && data.installed_power[i] > 0.0 {
                weights[i] = data.installed_power[i];
            }
        }
        let total = weights.sum();
        if total > 0.0 {
            weights /= total;
        }
        Self {
            control_q: options.control_q,
            distributed_slack: options.distributed_slack,
            qmin: data.qmin.clone(),
            qmax: data.qmax.clone(),
            q_fixed: data.s0.map(|s| s.im),
            weights,
            redistributed: 0.0,
        }
    }

    /// Runs one control pass against the current operating point.
    pub fn apply(
        &mut self,
        roles: &mut BusRoles,
        s0: &mut DVector<Complex64>,
        scalc: &DVector<Complex64>,
        tolerance: f64,
    ) -> ControlOutcome {
        let mut outcome = ControlOutcome::default();
        if self.control_q {
            outcome.structure_changed = self.enforce_q_limits(roles, s0, scalc);
        }
        if self.distributed_slack {
            outcome.injections_changed = self.distribute_slack(roles, s0, scalc, tolerance);
        }
        outcome
    }

    /// Relaxes every `pv`/`p` bus whose generator reactive output left its
    /// limits, pinning the injection to the violated limit.
    fn enforce_q_limits(
        &mut self,
        roles: &mut BusRoles,
        s0: &mut DVector<Complex64>,
        scalc: &DVector<Complex64>,
    ) -> bool {
        let candidates: Vec<usize> = roles.pv.iter().chain(roles.p.iter()).copied().collect();
        let mut changed = false;
        for i in candidates {
            let q_gen = scalc[i].im - self.q_fixed[i];
            let limit = if q_gen > self.qmax[i] {
                self.qmax[i]
            } else if q_gen < self.qmin[i] {
                self.qmin[i]
            } else {
                continue;
            };
            if roles.relax_to_pq(i) {
                debug!(bus = i, q_gen, limit, "reactive limit hit, bus relaxed to PQ");
                s0[i].im = self.q_fixed[i] + limit;
                changed = true;
            }
        }
        changed
    }

    /// Moves the active power absorbed by the slack buses onto the
    /// dispatchable buses in proportion to their installed capacity.
    fn distribute_slack(
        &mut self,
        roles: &BusRoles,
        s0: &mut DVector<Complex64>,
        scalc: &DVector<Complex64>,
        tolerance: f64,
    ) -> bool {
        if self.weights.iter().all(|&w| w == 0.0) {
            return false;
        }
        let imbalance: f64 = roles.slack.iter().map(|&i| scalc[i].re - s0[i].re).sum();
        if imbalance.abs() <= tolerance {
            return false;
        }
        for (s, w) in s0.iter_mut().zip(self.weights.iter()) {
            s.re += imbalance * w;
        }
        self.redistributed += imbalance;
        debug!(imbalance, total = self.redistributed, "slack imbalance redistributed");
        true
    }
}
