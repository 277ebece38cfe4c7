use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;

use super::error::LinearSolveError;

#[cfg(feature = "faer")]
mod faer;
#[cfg(feature = "faer")]
pub use faer::*;

#[cfg(feature = "rsparse")]
mod rsparse;
#[cfg(feature = "rsparse")]
pub use rsparse::*;

#[cfg(feature = "faer")]
pub type DefaultSolver = FaerSolver;

#[cfg(all(not(feature = "faer"), feature = "rsparse"))]
pub type DefaultSolver = RSparseSolver;

#[allow(non_snake_case)]
/// A trait for solving square sparse linear systems given in CSC form.
pub trait Solve {
    /// Solves `A·x = b` in place.
    ///
    /// # Parameters
    ///
    /// * `Ap` - Column pointers of the matrix.
    /// * `Ai` - Row indices of the matrix.
    /// * `Ax` - Non-zero values of the matrix.
    /// * `b` - Right-hand side vector, overwritten by the solution.
    /// * `n` - Dimension of the system.
    fn solve(
        &mut self,
        Ap: &mut [usize],
        Ai: &mut [usize],
        Ax: &mut [f64],
        b: &mut [f64],
        n: usize,
    ) -> Result<(), LinearSolveError>;

    /// Drops any cached symbolic factorization. Must be called whenever the
    /// sparsity pattern of the next matrix differs from the previous one.
    fn reset(&mut self) {}
}

/// Solves `mat·x = rhs`, overwriting `rhs` with `x`.
///
/// Non-finite results are reported as [`LinearSolveError::NonFinite`] so a
/// numerically singular matrix is caught here rather than further down.
pub fn solve_csc(
    solver: &mut dyn Solve,
    mat: CscMatrix<f64>,
    rhs: &mut DVector<f64>,
) -> Result<(), LinearSolveError> {
    let n = mat.nrows();
    if n != mat.ncols() || n != rhs.len() {
        return Err(LinearSolveError::Factorization("dimension mismatch"));
    }
    if n == 0 {
        return Ok(());
    }
    if n == 1 {
        // scalar system, no factorization needed
        let pivot = mat.get_entry(0, 0).map_or(0.0, |e| e.into_value());
        if pivot == 0.0 {
            return Err(LinearSolveError::Factorization("zero pivot"));
        }
        rhs[0] /= pivot;
        return if rhs[0].is_finite() {
            Ok(())
        } else {
            Err(LinearSolveError::NonFinite)
        };
    }
    let (mut ap, mut ai, mut ax) = mat.disassemble();
    solver.solve(&mut ap, &mut ai, &mut ax, rhs.as_mut_slice(), n)?;
    if rhs.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(LinearSolveError::NonFinite)
    }
}
