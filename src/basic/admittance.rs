use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::island::IslandBranches;

/// Nodal and branch admittance matrices of one island.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmittanceMatrices {
    /// n × n nodal admittance; the diagonal is always structurally present.
    pub ybus: CscMatrix<Complex64>,
    /// m × n, current entering each branch at its from end.
    pub yf: CscMatrix<Complex64>,
    /// m × n, current entering each branch at its to end.
    pub yt: CscMatrix<Complex64>,
}

/// Two-port admittance stamp of a single branch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchStamp {
    pub yff: Complex64,
    pub yft: Complex64,
    pub ytf: Complex64,
    pub ytt: Complex64,
}

impl BranchStamp {
    /// Pi model with an ideal transformer `t = m·e^{jθ}` at the from end.
    pub fn new(r: f64, x: f64, g: f64, b: f64, tap_module: f64, tap_angle: f64, min_impedance: f64) -> Self {
        let mut z = Complex64::new(r, x);
        if z.norm() < min_impedance {
            z = Complex64::new(0.0, min_impedance);
        }
        let ys = z.inv();
        let bc2 = Complex64::new(g, b) / 2.0;
        let m = if tap_module > 0.0 { tap_module } else { 1.0 };
        let tap = Complex64::from_polar(m, tap_angle);
        Self {
            yff: (ys + bc2) / (m * m),
            yft: -ys / tap.conj(),
            ytf: -ys / tap,
            ytt: ys + bc2,
        }
    }
}

impl AdmittanceMatrices {
    /// Assembles Ybus, Yf and Yt for `n` buses.
    ///
    /// Rebuilt from scratch whenever tap or shunt values change; nothing here
    /// is updated in place.
    pub fn build(
        n: usize,
        branches: &IslandBranches,
        yshunt: &DVector<Complex64>,
        min_impedance: f64,
    ) -> Self {
        let m = branches.len();
        let mut ybus = CooMatrix::new(n, n);
        let mut yf = CooMatrix::new(m, n);
        let mut yt = CooMatrix::new(m, n);
        for i in 0..n {
            ybus.push(i, i, yshunt[i]);
        }
        for k in 0..m {
            let (f, t) = (branches.from[k], branches.to[k]);
            let st = BranchStamp::new(
                branches.r[k],
                branches.x[k],
                branches.g[k],
                branches.b[k],
                branches.tap_module[k],
                branches.tap_angle[k],
                min_impedance,
            );
            yf.push(k, f, st.yff);
            yf.push(k, t, st.yft);
            yt.push(k, f, st.ytf);
            yt.push(k, t, st.ytt);

            ybus.push(f, f, st.yff);
            ybus.push(f, t, st.yft);
            ybus.push(t, f, st.ytf);
            ybus.push(t, t, st.ytt);
        }
        Self {
            ybus: CscMatrix::from(&ybus),
            yf: CscMatrix::from(&yf),
            yt: CscMatrix::from(&yt),
        }
    }

    #[inline]
    pub fn n_bus(&self) -> usize {
        self.ybus.nrows()
    }

    /// `Scalc = V ⊙ conj(Ybus·V)`.
    pub fn power_injection(&self, v: &DVector<Complex64>) -> DVector<Complex64> {
        v.component_mul(&(&self.ybus * v).conjugate())
    }
}
