use nalgebra::Complex;
use nalgebra_sparse::CscMatrix;

/// Splits a complex sparse matrix into real and imaginary parts sharing its pattern.
pub(crate) trait RealImage {
    type Mat;

    /// Returns the real and imaginary parts of the matrix.
    fn real_imag(&self) -> (Self::Mat, Self::Mat);

    /// Returns the real part of the matrix.
    fn real(&self) -> Self::Mat;

    /// Returns the negated imaginary part, i.e. the susceptance matrix `-Im(Y)`.
    fn neg_imag(&self) -> Self::Mat;
}

fn with_values(pattern_of: &CscMatrix<Complex<f64>>, values: Vec<f64>) -> CscMatrix<f64> {
    unsafe {
        CscMatrix::try_from_pattern_and_values(pattern_of.pattern().clone(), values).unwrap_unchecked()
    }
}

impl RealImage for CscMatrix<Complex<f64>> {
    type Mat = CscMatrix<f64>;

    fn real(&self) -> Self::Mat {
        with_values(self, self.values().iter().map(|x| x.re).collect())
    }

    fn neg_imag(&self) -> Self::Mat {
        with_values(self, self.values().iter().map(|x| -x.im).collect())
    }

    fn real_imag(&self) -> (Self::Mat, Self::Mat) {
        let (re, im) = self.values().iter().map(|x| (x.re, x.im)).unzip();
        (with_values(self, re), with_values(self, im))
    }
}
