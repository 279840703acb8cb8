use glam::{DMat3, DVec3};

/// Singular value decomposition of a 3x3 matrix `m = u * diag(s) * v^T`.
///
/// The singular values are sorted in non-increasing order.
#[derive(Debug, Clone, Copy)]
pub struct Svd3 {
    /// Left singular vectors as columns.
    pub u: DMat3,
    /// Singular values, `s.x >= s.y >= s.z >= 0`.
    pub s: DVec3,
    /// Right singular vectors as columns.
    pub v: DMat3,
}

fn faer_to_dmat3(mat: faer::MatRef<'_, f64>) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(mat.read(0, 0), mat.read(1, 0), mat.read(2, 0)),
        DVec3::new(mat.read(0, 1), mat.read(1, 1), mat.read(2, 1)),
        DVec3::new(mat.read(0, 2), mat.read(1, 2), mat.read(2, 2)),
    )
}

/// Compute the singular value decomposition of a 3x3 matrix.
///
/// # Arguments
///
/// * `m` - The matrix to decompose.
///
/// # Returns
///
/// The decomposition with `u`, `s` and `v` such that `m = u * diag(s) * v^T`.
///
/// Example:
///
/// ```
/// use glam::{DMat3, DVec3};
/// use surfreg_3d::linalg::svd3;
///
/// let m = DMat3::from_diagonal(DVec3::new(1.0, 3.0, 2.0));
/// let svd = svd3(&m);
/// assert!((svd.s.x - 3.0).abs() < 1e-12);
/// ```
pub fn svd3(m: &DMat3) -> Svd3 {
    // glam is column-major, faer is indexed (row, col)
    let mat = faer::Mat::<f64>::from_fn(3, 3, |i, j| m.col(j)[i]);

    let svd = mat.svd();
    let s = svd.s_diagonal();

    Svd3 {
        u: faer_to_dmat3(svd.u()),
        s: DVec3::new(s[0], s[1], s[2]),
        v: faer_to_dmat3(svd.v()),
    }
}

/// Project a 3x3 matrix onto the closest proper rotation (det = +1) in the Frobenius sense.
pub fn nearest_rotation(m: &DMat3) -> DMat3 {
    let svd = svd3(m);
    let d = (svd.u * svd.v.transpose()).determinant().signum();
    svd.u * DMat3::from_diagonal(DVec3::new(1.0, 1.0, d)) * svd.v.transpose()
}

/// Compute the centroid of a set of points.
///
/// PRECONDITION: points is not empty.
pub fn centroid(points: &[DVec3]) -> DVec3 {
    points.iter().fold(DVec3::ZERO, |acc, &p| acc + p) / points.len() as f64
}

/// Outer product `a * b^T`.
#[inline]
pub fn outer(a: DVec3, b: DVec3) -> DMat3 {
    DMat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// Compute the principal frame of a set of points.
///
/// The frame is centered at the centroid of the points and its rotation holds the
/// eigenvectors of the point covariance as columns, sorted by decreasing eigenvalue.
/// The first column is therefore the principal axis. The basis is right-handed.
///
/// PRECONDITION: points is not empty.
///
/// # Returns
///
/// The rotation (columns are the axes of the frame) and the centroid.
pub fn principal_frame(points: &[DVec3]) -> (DMat3, DVec3) {
    let c = centroid(points);
    let cov = points
        .iter()
        .fold(DMat3::ZERO, |acc, &p| acc + outer(p - c, p - c));

    // the covariance is symmetric positive semi-definite, so its left singular
    // vectors are its eigenvectors ordered by eigenvalue
    let u = svd3(&cov).u;
    let rotation = if u.determinant() < 0.0 {
        DMat3::from_cols(u.x_axis, u.y_axis, -u.z_axis)
    } else {
        u
    };

    (rotation, c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_mat3_eq(a: &DMat3, b: &DMat3, epsilon: f64) {
        for (x, y) in a.to_cols_array().iter().zip(b.to_cols_array().iter()) {
            assert_relative_eq!(x, y, epsilon = epsilon);
        }
    }

    #[test]
    fn test_svd3_reconstruct() {
        let m = DMat3::from_cols(
            DVec3::new(1.0, 4.0, -2.0),
            DVec3::new(0.5, -1.0, 3.0),
            DVec3::new(2.0, 0.0, 1.5),
        );
        let svd = svd3(&m);

        assert!(svd.s.x >= svd.s.y && svd.s.y >= svd.s.z && svd.s.z >= 0.0);

        let recon = svd.u * DMat3::from_diagonal(svd.s) * svd.v.transpose();
        assert_mat3_eq(&recon, &m, 1e-10);
        assert_mat3_eq(&(svd.u.transpose() * svd.u), &DMat3::IDENTITY, 1e-10);
        assert_mat3_eq(&(svd.v.transpose() * svd.v), &DMat3::IDENTITY, 1e-10);
    }

    #[test]
    fn test_nearest_rotation() {
        let r = DMat3::from_rotation_z(0.3) * DMat3::from_rotation_x(-0.7);
        // small non-orthogonal perturbation
        let noisy = r + DMat3::from_cols(
            DVec3::new(1e-6, 0.0, 0.0),
            DVec3::new(0.0, -2e-6, 0.0),
            DVec3::new(1e-6, 0.0, 1e-6),
        );
        let fixed = nearest_rotation(&noisy);
        assert_relative_eq!(fixed.determinant(), 1.0, epsilon = 1e-12);
        assert_mat3_eq(&fixed, &r, 1e-5);
    }

    #[test]
    fn test_principal_frame() {
        let points = (0..20)
            .map(|i| DVec3::new(i as f64, 0.01 * (i % 2) as f64, 0.0))
            .collect::<Vec<_>>();

        let (rotation, c) = principal_frame(&points);

        assert_relative_eq!(c.x, 9.5, epsilon = 1e-12);
        assert_relative_eq!(rotation.x_axis.x.abs(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(rotation.determinant(), 1.0, epsilon = 1e-12);
    }
}
