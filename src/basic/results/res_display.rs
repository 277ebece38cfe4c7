use std::fmt;
use tabled::Tabled;

/// A float that prints with a fixed number of decimal places.
#[derive(Clone, Copy, PartialEq, PartialOrd)]
pub(crate) struct FloatWrapper {
    pub(crate) value: f64,
    pub(crate) precision: usize,
}

impl FloatWrapper {
    pub fn new(value: f64, precision: usize) -> Self {
        FloatWrapper { value, precision }
    }
}

impl fmt::Display for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_finite() && self.value != 0.0 && self.value.abs() < 10f64.powi(-(self.precision as i32)) {
            write!(f, "{:.1$e}", self.value, self.precision.min(3))
        } else {
            write!(f, "{:.1$}", self.value, self.precision)
        }
    }
}

impl fmt::Debug for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Table row for one solver attempt.
#[derive(Debug, Tabled)]
pub(crate) struct AttemptRow {
    pub(crate) method: String,
    pub(crate) converged: bool,
    pub(crate) error: FloatWrapper,
    pub(crate) iterations: usize,
    pub(crate) elapsed_ms: FloatWrapper,
}

/// Table row for bus results.
#[derive(Debug, Tabled)]
#[allow(non_snake_case)]
pub(crate) struct BusResTable {
    pub(crate) Bus: usize,
    pub(crate) Type: String,
    pub(crate) Vm: FloatWrapper,
    pub(crate) Va: FloatWrapper,
    pub(crate) P_mw: FloatWrapper,
    pub(crate) Q_mvar: FloatWrapper,
}
