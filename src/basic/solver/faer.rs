use faer::{
    MatMut,
    linalg::solvers::Solve,
    sparse::{
        SparseColMatRef, SymbolicSparseColMatRef,
        linalg::solvers::{Lu, SymbolicLu},
    },
};

use super::Solve as PoSolve;
use crate::basic::error::LinearSolveError;

/// Sparse LU from `faer`, with the symbolic analysis cached between calls.
#[derive(Default)]
pub struct FaerSolver {
    n: usize,
    symbolic: Option<SymbolicLu<usize>>,
}

#[allow(non_snake_case)]
impl PoSolve for FaerSolver {
    fn solve(
        &mut self,
        Ap: &mut [usize],
        Ai: &mut [usize],
        Ax: &mut [f64],
        b: &mut [f64],
        n: usize,
    ) -> Result<(), LinearSolveError> {
        let s = unsafe { SymbolicSparseColMatRef::new_unchecked(n, n, Ap, None, Ai) };
        let mat = SparseColMatRef::new(s, Ax);
        if self.n != n {
            self.symbolic = None;
            self.n = n;
        }
        let symbolic = match &self.symbolic {
            Some(sym) => sym.clone(),
            None => {
                let sym = SymbolicLu::try_new(s).map_err(|_| LinearSolveError::Factorization("Faer symbolic error"))?;
                self.symbolic = Some(sym.clone());
                sym
            }
        };
        let lu = Lu::try_new_with_symbolic(symbolic, mat)
            .map_err(|_| LinearSolveError::Factorization("Faer numerical error"))?;
        let mat_ref = MatMut::from_column_major_slice_mut(b, n, 1);
        lu.solve_in_place(mat_ref);
        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
    }
}
