use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::error::PowerFlowError;

/// Bus role codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BusType {
    Slack,
    #[serde(rename = "PV")]
    Pv,
    #[default]
    #[serde(rename = "PQ")]
    Pq,
    /// P, Q and |V| specified; angle unknown (remotely controlled bus).
    #[serde(rename = "PQV")]
    Pqv,
    /// Only P specified; angle and magnitude unknown (remote controlling bus).
    P,
}

/// How a branch participates in voltage/flow control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BranchControlMode {
    #[default]
    Fixed,
    TapModuleVoltage,
    TapAnglePower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InjectionKind {
    Load,
    Generator,
    Battery,
    /// Shunt admittance expressed in MVA at 1 p.u. (`G + jB`); B > 0 is capacitive.
    Shunt,
}

/// Per-bus arrays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusData {
    pub names: Vec<String>,
    pub active: Vec<bool>,
    pub bus_type: Vec<BusType>,
    /// Installed dispatchable capacity (MW), used by distributed slack.
    pub installed_power: Vec<f64>,
    pub v_nom: Vec<f64>,
}

/// Per-branch arrays, impedances in p.u. on the system base.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchData {
    pub names: Vec<String>,
    pub from: Vec<usize>,
    pub to: Vec<usize>,
    pub r: Vec<f64>,
    pub x: Vec<f64>,
    pub g: Vec<f64>,
    pub b: Vec<f64>,
    pub tap_module: Vec<f64>,
    /// Phase shift (rad).
    pub tap_angle: Vec<f64>,
    /// Thermal rating (MVA).
    pub rate: Vec<f64>,
    pub active: Vec<bool>,
    pub control_mode: Vec<BranchControlMode>,
}

/// Per-injection arrays (loads, generators, batteries and shunts), powers in MVA.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InjectionData {
    pub names: Vec<String>,
    pub kind: Vec<InjectionKind>,
    pub bus: Vec<usize>,
    pub s: Vec<Complex64>,
    pub active: Vec<bool>,
    /// Voltage controlling device.
    pub controllable: Vec<bool>,
    pub vm_set: Vec<f64>,
    pub q_min: Vec<f64>,
    pub q_max: Vec<f64>,
    /// Bus whose voltage is regulated; `None` means the own bus.
    pub controlled_bus: Vec<Option<usize>>,
}

/// Per-snapshot struct-of-arrays view of the network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NumericalCircuit {
    /// Base power (MVA).
    pub sbase: f64,
    pub bus: BusData,
    pub branch: BranchData,
    pub injection: InjectionData,
}

impl NumericalCircuit {
    pub fn new(sbase: f64) -> Self {
        Self {
            sbase,
            ..Default::default()
        }
    }

    #[inline]
    pub fn n_bus(&self) -> usize {
        self.bus.active.len()
    }

    #[inline]
    pub fn n_branch(&self) -> usize {
        self.branch.active.len()
    }

    #[inline]
    pub fn n_injection(&self) -> usize {
        self.injection.active.len()
    }

    pub fn add_bus(&mut self, name: &str, bus_type: BusType, v_nom: f64) -> usize {
        let b = &mut self.bus;
        b.names.push(name.to_owned());
        b.active.push(true);
        b.bus_type.push(bus_type);
        b.installed_power.push(0.0);
        b.v_nom.push(v_nom);
        b.active.len() - 1
    }

    /// Adds a plain line (no tap) and returns its index.
    pub fn add_line(&mut self, from: usize, to: usize, r: f64, x: f64, b: f64, rate: f64) -> usize {
        self.add_transformer(from, to, r, x, b, 1.0, 0.0, rate)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_transformer(
        &mut self,
        from: usize,
        to: usize,
        r: f64,
        x: f64,
        b: f64,
        tap_module: f64,
        tap_angle: f64,
        rate: f64,
    ) -> usize {
        let br = &mut self.branch;
        br.names.push(format!("{from}-{to}"));
        br.from.push(from);
        br.to.push(to);
        br.r.push(r);
        br.x.push(x);
        br.g.push(0.0);
        br.b.push(b);
        br.tap_module.push(tap_module);
        br.tap_angle.push(tap_angle);
        br.rate.push(rate);
        br.active.push(true);
        br.control_mode.push(BranchControlMode::Fixed);
        br.active.len() - 1
    }

    fn push_injection(&mut self, kind: InjectionKind, bus: usize, s: Complex64) -> usize {
        let inj = &mut self.injection;
        inj.names.push(format!("{kind:?}@{bus}"));
        inj.kind.push(kind);
        inj.bus.push(bus);
        inj.s.push(s);
        inj.active.push(true);
        inj.controllable.push(false);
        inj.vm_set.push(1.0);
        inj.q_min.push(f64::NEG_INFINITY);
        inj.q_max.push(f64::INFINITY);
        inj.controlled_bus.push(None);
        inj.active.len() - 1
    }

    pub fn add_load(&mut self, bus: usize, p_mw: f64, q_mvar: f64) -> usize {
        self.push_injection(InjectionKind::Load, bus, Complex64::new(p_mw, q_mvar))
    }

    pub fn add_shunt(&mut self, bus: usize, g_mw: f64, b_mvar: f64) -> usize {
        self.push_injection(InjectionKind::Shunt, bus, Complex64::new(g_mw, b_mvar))
    }

    /// Adds a voltage controlling generator with reactive limits (MVAr).
    pub fn add_generator(&mut self, bus: usize, p_mw: f64, vm_set: f64, q_min: f64, q_max: f64) -> usize {
        let k = self.push_injection(InjectionKind::Generator, bus, Complex64::new(p_mw, 0.0));
        let inj = &mut self.injection;
        inj.controllable[k] = true;
        inj.vm_set[k] = vm_set;
        inj.q_min[k] = q_min;
        inj.q_max[k] = q_max;
        k
    }

    pub fn add_battery(&mut self, bus: usize, p_mw: f64, vm_set: f64, q_min: f64, q_max: f64) -> usize {
        let k = self.add_generator(bus, p_mw, vm_set, q_min, q_max);
        self.injection.kind[k] = InjectionKind::Battery;
        k
    }

    /// Checks array lengths and index ranges.
    pub fn validate(&self) -> Result<(), PowerFlowError> {
        let dim = |what: &str, got: usize, want: usize| {
            if got == want {
                Ok(())
            } else {
                Err(PowerFlowError::Dimension(format!(
                    "{what} has length {got}, expected {want}"
                )))
            }
        };
        if !(self.sbase > 0.0) {
            return Err(PowerFlowError::Dimension(format!(
                "sbase must be positive, got {}",
                self.sbase
            )));
        }
        let n = self.n_bus();
        dim("bus.names", self.bus.names.len(), n)?;
        dim("bus.bus_type", self.bus.bus_type.len(), n)?;
        dim("bus.installed_power", self.bus.installed_power.len(), n)?;
        dim("bus.v_nom", self.bus.v_nom.len(), n)?;

        let m = self.n_branch();
        let br = &self.branch;
        for (what, len) in [
            ("branch.names", br.names.len()),
            ("branch.from", br.from.len()),
            ("branch.to", br.to.len()),
            ("branch.r", br.r.len()),
            ("branch.x", br.x.len()),
            ("branch.g", br.g.len()),
            ("branch.b", br.b.len()),
            ("branch.tap_module", br.tap_module.len()),
            ("branch.tap_angle", br.tap_angle.len()),
            ("branch.rate", br.rate.len()),
            ("branch.control_mode", br.control_mode.len()),
        ] {
            dim(what, len, m)?;
        }
        if let Some(k) = (0..m).find(|&k| br.from[k] >= n || br.to[k] >= n) {
            return Err(PowerFlowError::Dimension(format!(
                "branch {k} connects {}-{} but there are {n} buses",
                br.from[k], br.to[k]
            )));
        }

        let ni = self.n_injection();
        let inj = &self.injection;
        for (what, len) in [
            ("injection.names", inj.names.len()),
            ("injection.kind", inj.kind.len()),
            ("injection.bus", inj.bus.len()),
            ("injection.s", inj.s.len()),
            ("injection.controllable", inj.controllable.len()),
            ("injection.vm_set", inj.vm_set.len()),
            ("injection.q_min", inj.q_min.len()),
            ("injection.q_max", inj.q_max.len()),
            ("injection.controlled_bus", inj.controlled_bus.len()),
        ] {
            dim(what, len, ni)?;
        }
        let bad_bus = (0..ni).find(|&k| inj.bus[k] >= n || inj.controlled_bus[k].is_some_and(|c| c >= n));
        if let Some(k) = bad_bus {
            return Err(PowerFlowError::Dimension(format!(
                "injection {k} refers to a bus outside 0..{n}"
            )));
        }
        Ok(())
    }
}
