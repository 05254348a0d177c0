use num_traits::Float;

/// Largest system handled: three interpolation axes.
pub(crate) const MAX_DIM: usize = 3;

///
/// Determinant of the row-major `n x n` matrix `a`, `n <= 3`.
///
#[inline]
pub(crate) fn determinant<T: Float>(a: &[T], n: usize) -> T
{
    match n
    {
        0 => T::one(),
        1 => a[0],
        2 => a[0] * a[3] - a[1] * a[2],
        _ => a[0] * (a[4] * a[8] - a[5] * a[7])
            - a[1] * (a[3] * a[8] - a[5] * a[6])
            + a[2] * (a[3] * a[7] - a[4] * a[6]),
    }
}

///
/// Solves `a x = b` for a row-major `n x n` matrix by Gaussian elimination with
/// partial pivoting. `a` and `b` are overwritten; on success `b` holds `x`.
/// Returns `false` when a pivot falls below `tolerance`.
///
pub(crate) fn solve<T: Float>(a: &mut [T], b: &mut [T], n: usize, tolerance: T) -> bool
{
    for col in 0..n
    {
        let mut pivot = col;
        for row in col + 1..n
        {
            if a[row * n + col].abs() > a[pivot * n + col].abs()
            {
                pivot = row;
            }
        }
        if a[pivot * n + col].abs() <= tolerance
        {
            return false;
        }
        if pivot != col
        {
            for k in 0..n
            {
                a.swap(col * n + k, pivot * n + k);
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n
        {
            let factor = a[row * n + col] / a[col * n + col];
            for k in col..n
            {
                a[row * n + k] = a[row * n + k] - factor * a[col * n + k];
            }
            b[row] = b[row] - factor * b[col];
        }
    }
    for col in (0..n).rev()
    {
        let mut sum = b[col];
        for k in col + 1..n
        {
            sum = sum - a[col * n + k] * b[k];
        }
        b[col] = sum / a[col * n + col];
    }
    true
}

#[test]
fn check_determinant()
{
    assert_eq!(determinant(&[2.0], 1), 2.0);
    assert_eq!(determinant(&[1.0, 2.0, 3.0, 4.0], 2), -2.0);
    assert_eq!(determinant(&[2.0, 0.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 4.0], 3), 24.0);
    assert_eq!(determinant(&[1.0f32, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 1.0, 1.0], 3), 0.0);
}

#[test]
fn check_solve()
{
    let mut a = [0.0, 2.0, 1.0, 1.0, 1.0, 0.0, 3.0, 0.0, 1.0];
    let mut b = [7.0, 3.0, 6.0];
    assert!(solve(&mut a, &mut b, 3, 1e-14));
    let expected = [1.0, 2.0, 3.0];
    for (x, e) in b.iter().zip(expected)
    {
        assert!((x - e).abs() < 1e-12);
    }

    let mut singular = [1.0, 2.0, 2.0, 4.0];
    let mut rhs = [1.0, 2.0];
    assert!(!solve(&mut singular, &mut rhs, 2, 1e-14));
}
