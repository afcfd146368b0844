//! small dense solvers - covariate counts here are tiny, no BLAS needed

use ndarray::{Array1, Array2};
use crate::error::{SurvivalError, Result};

const PIVOT_EPS: f64 = 1e-12;

/// solve Ax = b w/ partially pivoted gaussian elimination
pub fn solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return Err(SurvivalError::invalid_dimensions("matrix dimensions mismatch"));
    }

    let mut a = a.clone();
    let mut b = b.clone();

    // forward elimination
    for i in 0..n {
        let max_row = (i..n)
            .max_by(|&x, &y| a[[x, i]].abs().total_cmp(&a[[y, i]].abs()))
            .unwrap_or(i);

        if a[[max_row, i]].abs() < PIVOT_EPS {
            return Err(SurvivalError::numerical_error("matrix is singular"));
        }

        if max_row != i {
            for j in 0..n {
                a.swap([i, j], [max_row, j]);
            }
            b.swap(i, max_row);
        }

        for k in i + 1..n {
            let factor = a[[k, i]] / a[[i, i]];
            for j in i..n {
                a[[k, j]] -= factor * a[[i, j]];
            }
            b[k] -= factor * b[i];
        }
    }

    // back substitution
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = b[i];
        for j in i + 1..n {
            x[i] -= a[[i, j]] * x[j];
        }
        x[i] /= a[[i, i]];
    }

    Ok(x)
}

/// lower-triangular L with A = L Lᵀ; fails unless A is symmetric positive definite
pub fn cholesky(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(SurvivalError::invalid_dimensions("cholesky needs a square matrix"));
    }

    let mut l = Array2::zeros((n, n));
    for j in 0..n {
        let mut diag = a[[j, j]];
        for k in 0..j {
            diag -= l[[j, k]] * l[[j, k]];
        }
        if !(diag > PIVOT_EPS) || !diag.is_finite() {
            return Err(SurvivalError::not_positive_definite(format!(
                "pivot {j} is {diag:e}"
            )));
        }
        l[[j, j]] = diag.sqrt();

        for i in j + 1..n {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = sum / l[[j, j]];
        }
    }

    Ok(l)
}

/// inverse of a symmetric positive definite matrix via cholesky
pub fn spd_inverse(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    let l = cholesky(a)?;

    // invert L by forward substitution, then A⁻¹ = L⁻ᵀ L⁻¹
    let mut l_inv = Array2::<f64>::zeros((n, n));
    for col in 0..n {
        for i in col..n {
            let mut sum = if i == col { 1.0 } else { 0.0 };
            for k in col..i {
                sum -= l[[i, k]] * l_inv[[k, col]];
            }
            l_inv[[i, col]] = sum / l[[i, i]];
        }
    }

    Ok(l_inv.t().dot(&l_inv))
}

/// solve Ax = b for symmetric positive definite A
pub fn spd_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if b.len() != n {
        return Err(SurvivalError::invalid_dimensions("rhs length mismatch"));
    }
    let l = cholesky(a)?;

    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * y[k];
        }
        y[i] = sum / l[[i, i]];
    }

    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in i + 1..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_solve_needs_pivoting() {
        let a = array![[0.0, 2.0], [3.0, 1.0]];
        let b = array![4.0, 5.0];
        let x = solve(&a, &b).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_solve_singular() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(solve(&a, &array![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_spd_inverse() {
        let a = array![[4.0, 2.0, 0.6], [2.0, 5.0, 1.0], [0.6, 1.0, 3.0]];
        let inv = spd_inverse(&a).unwrap();
        let identity = a.dot(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(identity[[i, j]], expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_spd_solve_matches_solve() {
        let a = array![[4.0, 1.0], [1.0, 3.0]];
        let b = array![1.0, 2.0];
        let x1 = spd_solve(&a, &b).unwrap();
        let x2 = solve(&a, &b).unwrap();
        assert_relative_eq!(x1[0], x2[0], epsilon = 1e-12);
        assert_relative_eq!(x1[1], x2[1], epsilon = 1e-12);
    }

    #[test]
    fn test_not_positive_definite() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(matches!(
            cholesky(&a),
            Err(SurvivalError::NotPositiveDefinite { .. })
        ));
        let zero = Array2::<f64>::zeros((2, 2));
        assert!(spd_inverse(&zero).is_err());
    }
}
