use nalgebra_sparse::CscMatrix;

/// Dense position lookup for an index set over `0..n`.
///
/// `lookup[bus] == Some(k)` iff `set[k] == bus`.
pub fn position_lookup(set: &[usize], n: usize) -> Vec<Option<usize>> {
    let mut lookup = vec![None; n];
    for (k, &i) in set.iter().enumerate() {
        lookup[i] = Some(k);
    }
    lookup
}

/// Extracts the submatrix `mat[rows, cols]`, keeping explicit zeros.
///
/// `rows` must be ascending so the result stays sorted within each column.
pub fn csc_select<T: Clone>(mat: &CscMatrix<T>, rows: &[usize], cols: &[usize]) -> CscMatrix<T> {
    let row_pos = position_lookup(rows, mat.nrows());
    let mut offsets = Vec::with_capacity(cols.len() + 1);
    let mut indices = Vec::new();
    let mut values = Vec::new();
    offsets.push(0);
    for &j in cols {
        let (start, end) = (mat.col_offsets()[j], mat.col_offsets()[j + 1]);
        for k in start..end {
            if let Some(r) = row_pos[mat.row_indices()[k]] {
                indices.push(r);
                values.push(mat.values()[k].clone());
            }
        }
        offsets.push(indices.len());
    }
    unsafe {
        CscMatrix::try_from_csc_data(rows.len(), cols.len(), offsets, indices, values).unwrap_unchecked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use nalgebra_sparse::CooMatrix;

    #[test]
    fn test_csc_select() {
        let mut coo = CooMatrix::new(4, 4);
        for i in 0..4 {
            coo.push(i, i, (i + 1) as f64);
        }
        coo.push(0, 3, 7.0);
        coo.push(2, 1, 0.0);
        let mat = CscMatrix::from(&coo);
        let sub = csc_select(&mat, &[0, 2], &[1, 3]);
        let dense = DMatrix::from(&sub);
        assert_eq!(dense, DMatrix::from_row_slice(2, 2, &[0.0, 7.0, 0.0, 0.0]));
        // (2,1) explicit zero survives
        assert_eq!(sub.nnz(), 2);
    }

    #[test]
    fn test_position_lookup() {
        let lk = position_lookup(&[1, 4], 5);
        assert_eq!(lk, vec![None, Some(0), None, None, Some(1)]);
    }
}
