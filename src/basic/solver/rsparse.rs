use rsparse::{
    self,
    data::{self, Numeric, Symb},
    lsolve, lu, sqr, usolve,
};

use super::Solve;
use crate::basic::error::LinearSolveError;

/// Sparse LU from `rsparse`, with the symbolic analysis cached between calls.
#[derive(Default)]
pub struct RSparseSolver {
    x: Vec<f64>,
    symbolic: Option<Symb>,
}

#[allow(non_snake_case)]
impl Solve for RSparseSolver {
    fn solve(
        &mut self,
        Ap: &mut [usize],
        Ai: &mut [usize],
        Ax: &mut [f64],
        b: &mut [f64],
        n: usize,
    ) -> Result<(), LinearSolveError> {
        let p: Vec<isize> = Ap.iter().map(|&v| v as isize).collect();
        let a = data::Sprs {
            m: n,
            n,
            i: Ai.to_vec(),
            p,
            x: Ax.to_vec(),
            nzmax: Ax.len(),
        };
        if self.x.len() != n {
            self.symbolic = None;
            self.x = vec![0.0; n];
        }
        if self.symbolic.is_none() {
            // amd needs at least two columns; keep the natural order below that
            let order = if n < 2 { -1 } else { 1 };
            self.symbolic = Some(sqr(&a, order, false));
        }
        let Some(s) = self.symbolic.as_mut() else {
            return Err(LinearSolveError::Factorization("symbolic analysis failed"));
        };
        let num = lu(&a, s, 1e-6).map_err(|_| LinearSolveError::Factorization("LU factorization failed"))?;
        let mut x = &mut self.x;
        ipvec(&num.pinv, b, &mut x[..]); // x = P*b
        lsolve(&num.l, &mut x); // x = L\x
        usolve(&num.u, &mut x); // x = U\x
        ipvec(&s.q, &x, &mut b[..]); // b = Q*x

        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
    }
}

fn ipvec_identity<T: Numeric<T>>(b: &[T], x: &mut [T]) {
    x.copy_from_slice(b);
}

fn ipvec_perm<T: Numeric<T>>(p: &[isize], b: &[T], x: &mut [T]) {
    for k in 0..b.len() {
        x[p[k] as usize] = b[k];
    }
}

fn ipvec<T: Numeric<T>>(p: &Option<Vec<isize>>, b: &[T], x: &mut [T]) {
    match p {
        Some(pvec) => ipvec_perm(pvec, b, x),
        None => ipvec_identity(b, x),
    }
}
