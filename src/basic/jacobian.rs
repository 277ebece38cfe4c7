use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;
use tracing::trace;

use super::{bus_types::BusRoles, dsbus_dv::dSbus_dV, sparse::select::position_lookup};

/// Dense bus → position maps for the four index sets, rebuilt whenever the
/// bus roles change.
#[derive(Debug, Clone)]
pub struct JacobianLookup {
    dva: Vec<Option<usize>>,
    dvm: Vec<Option<usize>>,
    dp: Vec<Option<usize>>,
    dq: Vec<Option<usize>>,
    n_dva: usize,
    n_dp: usize,
    n_cols: usize,
    n_rows: usize,
}

impl JacobianLookup {
    pub fn new(roles: &BusRoles, n: usize) -> Self {
        Self {
            dva: position_lookup(&roles.idx_dva, n),
            dvm: position_lookup(&roles.idx_dvm, n),
            dp: position_lookup(roles.idx_dp(), n),
            dq: position_lookup(&roles.idx_dq, n),
            n_dva: roles.idx_dva.len(),
            n_dp: roles.idx_dp().len(),
            n_cols: roles.n_unknowns(),
            n_rows: roles.n_equations(),
        }
    }
}

/// Builds the mismatch Jacobian
///
/// ```text
/// | dP/dVa  dP/dVm |
/// | dQ/dVa  dQ/dVm |
/// ```
///
/// with rows ordered `[idx_dP, idx_dQ]` and columns `[idx_dVa, idx_dVm]`.
///
/// Each Jacobian column is one Ybus column filtered through the row lookups,
/// so the cost is O(nnz(Ybus)) and row indices come out sorted.
#[allow(non_snake_case)]
pub fn build_jacobian(
    Ybus: &CscMatrix<Complex64>,
    v: &DVector<Complex64>,
    lookup: &JacobianLookup,
) -> CscMatrix<f64> {
    let (dS_dVm, dS_dVa) = dSbus_dV(Ybus, v);
    let (Yp, Yi) = (Ybus.col_offsets(), Ybus.row_indices());
    let n = Ybus.ncols();

    let mut col_of = vec![None; lookup.n_cols];
    for j in 0..n {
        if let Some(c) = lookup.dva[j] {
            col_of[c] = Some((j, false));
        }
        if let Some(c) = lookup.dvm[j] {
            col_of[lookup.n_dva + c] = Some((j, true));
        }
    }

    let mut offsets = Vec::with_capacity(lookup.n_cols + 1);
    let mut indices = Vec::with_capacity(4 * Ybus.nnz());
    let mut values = Vec::with_capacity(4 * Ybus.nnz());
    offsets.push(0);
    for (j, by_vm) in col_of.into_iter().flatten() {
        let dS = if by_vm { dS_dVm.values() } else { dS_dVa.values() };
        let range = Yp[j]..Yp[j + 1];
        for k in range.clone() {
            if let Some(r) = lookup.dp[Yi[k]] {
                indices.push(r);
                values.push(dS[k].re);
            }
        }
        for k in range {
            if let Some(r) = lookup.dq[Yi[k]] {
                indices.push(lookup.n_dp + r);
                values.push(dS[k].im);
            }
        }
        offsets.push(indices.len());
    }
    trace!(rows = lookup.n_rows, cols = lookup.n_cols, nnz = values.len(), "jacobian");
    unsafe {
        CscMatrix::try_from_csc_data(lookup.n_rows, lookup.n_cols, offsets, indices, values)
            .unwrap_unchecked()
    }
}
