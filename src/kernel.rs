//! Process local dense products on square row-major blocks.

use matrixmultiply::dgemm;

/// `y <- A x` for an `n x n` row-major `a`.
///
/// # Panics
/// if the slices do not have `n * n`, `n` and `n` entries.
pub fn mat_mult_local(n: usize, a: &[f64], x: &[f64], y: &mut [f64]) {
    assert_eq!(a.len(), n * n, "matrix block must hold n*n entries");
    assert_eq!(x.len(), n, "x must hold n entries");
    assert_eq!(y.len(), n, "y must hold n entries");
    if n == 0 {
        return;
    }
    // x and y are n x 1 matrices
    unsafe {
        dgemm(
            n,
            n,
            1,
            1.0,
            a.as_ptr(),
            n as isize,
            1,
            x.as_ptr(),
            1,
            1,
            0.0,
            y.as_mut_ptr(),
            1,
            1,
        );
    }
}

/// `C <- A B + C` for `n x n` row-major blocks.
///
/// # Panics
/// if any slice does not have `n * n` entries.
pub fn mat_mat_mult_local(n: usize, a: &[f64], b: &[f64], c: &mut [f64]) {
    assert_eq!(a.len(), n * n, "A block must hold n*n entries");
    assert_eq!(b.len(), n * n, "B block must hold n*n entries");
    assert_eq!(c.len(), n * n, "C block must hold n*n entries");
    if n == 0 {
        return;
    }
    unsafe {
        dgemm(
            n,
            n,
            n,
            1.0,
            a.as_ptr(),
            n as isize,
            1,
            b.as_ptr(),
            n as isize,
            1,
            1.0,
            c.as_mut_ptr(),
            n as isize,
            1,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_gemm(n: usize, a: &[f64], b: &[f64], c: &mut [f64]) {
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    c[i * n + j] += a[i * n + k] * b[k * n + j];
                }
            }
        }
    }

    #[test]
    fn gemv_matches_hand_computation() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let x = [1.0, -1.0];
        let mut y = [9.0, 9.0];
        mat_mult_local(2, &a, &x, &mut y);
        assert_eq!(y, [-1.0, -1.0]);
    }

    #[test]
    fn gemm_accumulates_into_c() {
        let n = 5;
        let a = (0..n * n).map(|i| i as f64 * 0.5).collect::<Vec<_>>();
        let b = (0..n * n).map(|i| 3.0 - i as f64).collect::<Vec<_>>();
        let mut c = vec![1.0; n * n];
        let mut expected = c.clone();
        naive_gemm(n, &a, &b, &mut expected);
        mat_mat_mult_local(n, &a, &b, &mut c);
        for (got, want) in c.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-12 * want.abs().max(1.0));
        }
    }

    #[test]
    fn empty_blocks_are_fine() {
        mat_mult_local(0, &[], &[], &mut []);
        mat_mat_mult_local(0, &[], &[], &mut []);
    }

    #[test]
    #[should_panic]
    fn wrong_shape_panics() {
        let mut c = [0.0; 4];
        mat_mat_mult_local(2, &[0.0; 3], &[0.0; 4], &mut c);
    }
}
