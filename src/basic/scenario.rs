use num_complex::Complex64;

use super::{
    circuit::NumericalCircuit,
    driver::{CancellationToken, solve_scenario},
    error::PowerFlowError,
    options::PowerFlowOptions,
    results::PowerFlowResults,
};

/// One solve request over a shared [`NumericalCircuit`].
///
/// The circuit is borrowed read-only; the fields that contingency and time
/// series drivers toggle between solves are private copies owned here.
#[derive(Debug, Clone)]
pub struct Scenario<'a> {
    circuit: &'a NumericalCircuit,
    pub bus_active: Vec<bool>,
    pub branch_active: Vec<bool>,
    pub injection_active: Vec<bool>,
    /// Active power of each injection (MW).
    pub injection_p: Vec<f64>,
}

impl<'a> Scenario<'a> {
    pub fn new(circuit: &'a NumericalCircuit) -> Self {
        Self {
            circuit,
            bus_active: circuit.bus.active.clone(),
            branch_active: circuit.branch.active.clone(),
            injection_active: circuit.injection.active.clone(),
            injection_p: circuit.injection.s.iter().map(|s| s.re).collect(),
        }
    }

    #[inline]
    pub fn circuit(&self) -> &'a NumericalCircuit {
        self.circuit
    }

    /// Complex power of injection `k` with the scenario's active power (MVA).
    #[inline]
    pub fn injection_s(&self, k: usize) -> Complex64 {
        Complex64::new(self.injection_p[k], self.circuit.injection.s[k].im)
    }

    /// True when the injection and its bus are both in service.
    #[inline]
    pub fn injection_in_service(&self, k: usize) -> bool {
        self.injection_active[k] && self.bus_active[self.circuit.injection.bus[k]]
    }

    /// True when the branch and both terminal buses are in service.
    #[inline]
    pub fn branch_in_service(&self, k: usize) -> bool {
        let br = &self.circuit.branch;
        self.branch_active[k] && self.bus_active[br.from[k]] && self.bus_active[br.to[k]]
    }

    pub fn validate(&self) -> Result<(), PowerFlowError> {
        self.circuit.validate()?;
        let c = self.circuit;
        let checks = [
            ("bus_active", self.bus_active.len(), c.n_bus()),
            ("branch_active", self.branch_active.len(), c.n_branch()),
            ("injection_active", self.injection_active.len(), c.n_injection()),
            ("injection_p", self.injection_p.len(), c.n_injection()),
        ];
        for (what, got, want) in checks {
            if got != want {
                return Err(PowerFlowError::Dimension(format!(
                    "scenario {what} has length {got}, expected {want}"
                )));
            }
        }
        Ok(())
    }

    /// Runs the multi-island power flow for this scenario.
    pub fn solve(&self, options: &PowerFlowOptions) -> Result<PowerFlowResults, PowerFlowError> {
        solve_scenario(self, options, &CancellationToken::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcases::two_bus_case;

    #[test]
    fn test_scenario_does_not_touch_circuit() {
        let nc = two_bus_case();
        let mut sc = Scenario::new(&nc);
        sc.branch_active[0] = false;
        sc.injection_p[0] = 42.0;
        assert!(nc.branch.active[0]);
        assert_eq!(sc.injection_s(0).re, 42.0);
        assert_eq!(sc.injection_s(0).im, nc.injection.s[0].im);
        assert!(!sc.branch_in_service(0));
        assert!(sc.validate().is_ok());

        sc.injection_p.pop();
        assert!(matches!(sc.validate(), Err(PowerFlowError::Dimension(_))));
    }
}
