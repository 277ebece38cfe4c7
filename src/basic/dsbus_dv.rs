use nalgebra::*;
use nalgebra_sparse::CscMatrix;
use num_traits::Zero;

/// Computes the partial derivatives of the bus power injections with respect
/// to voltage magnitudes and angles.
///
/// Both outputs share the sparsity pattern of `Ybus` (which must contain its
/// diagonal), so they are produced in two passes over the CSC arrays without
/// forming any diagonal matrix products.
///
/// # Arguments
///
/// * `Ybus` - Nodal admittance matrix in CSC format.
/// * `v` - Complex bus voltages.
///
/// # Returns
///
/// A tuple `(dS_dVm, dS_dVa)`:
///
/// * `dS_dVm = diag(V)·conj(Ybus·diag(E)) + conj(diag(I))·diag(E)`, with `E = V/|V|`
/// * `dS_dVa = j·diag(V)·conj(diag(I) − Ybus·diag(V))`, with `I = Ybus·V`
///
/// # Notes
///
/// * The identities are from MatPower:
///  R. D. Zimmerman, "AC Power Flows, Generalized OPF Costs and
///  their Derivatives using Complex Matrix Notation", MATPOWER
///  Technical Note 2, February 2010.U{http://www.pserc.cornell.edu/matpower/TN2-OPF-Derivatives.pdf}
///
#[allow(non_snake_case)]
pub fn dSbus_dV(
    Ybus: &CscMatrix<Complex<f64>>,
    v: &DVector<Complex<f64>>,
) -> (CscMatrix<Complex<f64>>, CscMatrix<Complex<f64>>) {
    let n = v.len();
    let (Yp, Yi, Yx) = (Ybus.col_offsets(), Ybus.row_indices(), Ybus.values());
    let nnz = Yx.len();
    let e = v.map(|x| {
        let m = x.norm();
        if m > 0.0 { x / m } else { Complex::new(1.0, 0.0) }
    });

    let mut ibus = vec![Complex::<f64>::zero(); n];
    let mut dvm = vec![Complex::<f64>::zero(); nnz];
    let mut dva = vec![Complex::<f64>::zero(); nnz];

    for j in 0..n {
        for k in Yp[j]..Yp[j + 1] {
            let i = Yi[k];
            ibus[i] += Yx[k] * v[j];
            dvm[k] = Yx[k] * e[j];
            dva[k] = -Yx[k] * v[j];
        }
    }

    let j_unit = Complex::<f64>::i();
    for j in 0..n {
        for k in Yp[j]..Yp[j + 1] {
            let i = Yi[k];
            let mut a = v[i] * dvm[k].conj();
            let mut b = dva[k];
            if i == j {
                a += ibus[i].conj() * e[i];
                b += ibus[i];
            }
            dvm[k] = a;
            dva[k] = j_unit * v[i] * b.conj();
        }
    }

    let mut dS_dVm = Ybus.clone();
    let mut dS_dVa = Ybus.clone();
    dS_dVm.values_mut().copy_from_slice(&dvm);
    dS_dVa.values_mut().copy_from_slice(&dva);
    (dS_dVm, dS_dVa)
}
