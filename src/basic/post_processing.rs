use nalgebra::DVector;
use num_complex::Complex64;

use super::{admittance::AdmittanceMatrices, island::IslandBranches, sparse::stack::csc_vstack};

/// Branch quantities of one island; currents in p.u., powers in MVA.
#[derive(Debug, Clone)]
pub struct BranchFlows {
    pub if_: DVector<Complex64>,
    pub it: DVector<Complex64>,
    pub sf: DVector<Complex64>,
    pub st: DVector<Complex64>,
    pub losses: DVector<Complex64>,
    /// `|Sf| / rate`, zero for unrated branches.
    pub loading: DVector<f64>,
}

/// Computes branch currents, flows, losses and loading from a bus voltage
/// solution. Stateless; safe to call on non-converged voltages.
pub fn branch_flows(
    adm: &AdmittanceMatrices,
    branches: &IslandBranches,
    v: &DVector<Complex64>,
    sbase: f64,
) -> BranchFlows {
    let m = branches.len();
    let currents = &csc_vstack(&[&adm.yf, &adm.yt]) * v;
    let if_ = currents.rows(0, m).into_owned();
    let it = currents.rows(m, m).into_owned();
    let vf = DVector::from_iterator(m, branches.from.iter().map(|&f| v[f]));
    let vt = DVector::from_iterator(m, branches.to.iter().map(|&t| v[t]));
    let sf = vf.component_mul(&if_.conjugate()) * Complex64::new(sbase, 0.0);
    let st = vt.component_mul(&it.conjugate()) * Complex64::new(sbase, 0.0);
    let losses = &sf + &st;
    let loading = DVector::from_iterator(
        m,
        (0..m).map(|k| {
            let rate = branches.rate[k];
            if rate > 0.0 { sf[k].norm() / rate } else { 0.0 }
        }),
    );
    BranchFlows {
        if_,
        it,
        sf,
        st,
        losses,
        loading,
    }
}
