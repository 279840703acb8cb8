//! Closed-form least-squares rigid registration of two corresponding point sets.

use glam::{DMat3, DVec3};

use crate::{linalg, transforms::RigidTransform};

/// Ratio between the second and the first singular value below which the input is
/// considered collinear.
const DEGENERACY_RATIO: f64 = 1e-9;

/// Error type for point set registration.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// The two point sets must have the same number of points.
    #[error("Mismatched point set lengths: source ({src}) != destination ({dst})")]
    MismatchedLengths {
        /// Number of source points.
        src: usize,
        /// Number of destination points.
        dst: usize,
    },

    /// Not enough correspondences to constrain a rotation.
    #[error("Registration requires at least {required} correspondences, got {actual}")]
    InsufficientPoints {
        /// Minimum number of correspondences.
        required: usize,
        /// Number of correspondences provided.
        actual: usize,
    },
}

/// Output of [`fit_transformation`].
#[derive(Debug, Clone, Copy)]
pub struct Registration {
    /// Transformation mapping the source points onto the destination points.
    pub transform: RigidTransform,
    /// Singular values of the cross-covariance matrix, in decreasing order.
    pub singular_values: DVec3,
    /// The input was collinear (or coincident) and the rotation is not unique.
    ///
    /// Coplanar input is not flagged: the reflection fix still yields a unique rotation.
    pub degenerate: bool,
}

/// Compute the rigid transformation that best aligns two point sets.
///
/// Minimizes `Σ |R * src_i + t - dst_i|²` over proper rotations `R` and translations `t`.
///
/// The algorithm:
/// 1. Compute centroids of both point sets
/// 2. Center both sets by subtracting their respective centroids
/// 3. Compute the cross-covariance matrix H = Σ[(src - src_mean) * (dst - dst_mean)^T]
/// 4. Compute the SVD of H = U * S * V^T
/// 5. Calculate rotation matrix R = V * diag(1, 1, det(V * U^T)) * U^T
/// 6. Calculate translation vector t = dst_mean - R * src_mean
///
/// For more details, see: Arun, K., Huang, T. S., and Blostein, S. D.
/// "Least-squares fitting of two 3-D point sets." IEEE PAMI, 1987.
///
/// Collinear input does not fail: the rotation about the line is arbitrary, a warning
/// is logged and [`Registration::degenerate`] is set.
///
/// # Arguments
///
/// * `points_src` - Source points.
/// * `points_dst` - Destination points, index-aligned with `points_src`.
///
/// # Returns
///
/// The registration result with the transformation from source to destination.
pub fn fit_transformation(
    points_src: &[DVec3],
    points_dst: &[DVec3],
) -> Result<Registration, RegistrationError> {
    if points_src.len() != points_dst.len() {
        return Err(RegistrationError::MismatchedLengths {
            src: points_src.len(),
            dst: points_dst.len(),
        });
    }
    if points_src.len() < 3 {
        return Err(RegistrationError::InsufficientPoints {
            required: 3,
            actual: points_src.len(),
        });
    }

    let src_centroid = linalg::centroid(points_src);
    let dst_centroid = linalg::centroid(points_dst);

    let h = points_src
        .iter()
        .zip(points_dst.iter())
        .fold(DMat3::ZERO, |acc, (&src_pt, &dst_pt)| {
            acc + linalg::outer(src_pt - src_centroid, dst_pt - dst_centroid)
        });

    let svd = linalg::svd3(&h);
    let (u, s, v) = (svd.u, svd.s, svd.v);

    // flip the last axis if V * U^T is a reflection
    let d = (v * u.transpose()).determinant().signum();
    let rotation = v * DMat3::from_diagonal(DVec3::new(1.0, 1.0, d)) * u.transpose();
    let translation = dst_centroid - rotation * src_centroid;

    let degenerate = s.x <= f64::EPSILON || s.y <= DEGENERACY_RATIO * s.x;
    if degenerate {
        log::warn!(
            "degenerate registration input ({} points), singular values: {:?}",
            points_src.len(),
            s
        );
    }

    Ok(Registration {
        transform: RigidTransform::new(rotation, translation),
        singular_values: s,
        degenerate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn create_random_points(rng: &mut StdRng, num_points: usize) -> Vec<DVec3> {
        (0..num_points)
            .map(|_| DVec3::new(rng.random(), rng.random(), rng.random()) * 10.0)
            .collect()
    }

    fn assert_transform_eq(a: &RigidTransform, b: &RigidTransform, epsilon: f64) {
        for (x, y) in a
            .rotation
            .to_cols_array()
            .iter()
            .zip(b.rotation.to_cols_array().iter())
        {
            assert_relative_eq!(x, y, epsilon = epsilon);
        }
        for i in 0..3 {
            assert_relative_eq!(a.translation[i], b.translation[i], epsilon = epsilon);
        }
    }

    #[test]
    fn test_fit_transformation_identity() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(1);
        let points = create_random_points(&mut rng, 30);

        let reg = fit_transformation(&points, &points)?;

        assert_transform_eq(&reg.transform, &RigidTransform::IDENTITY, 1e-10);
        assert!(!reg.degenerate);
        Ok(())
    }

    #[test]
    fn test_fit_transformation_pure_rotation() -> Result<(), Box<dyn std::error::Error>> {
        let points_src = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, 1.0),
        ];
        // rotate 90 degrees around X: y -> z, z -> -y
        let points_dst = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 0.0, 1.0),
            DVec3::new(0.0, -1.0, 0.0),
        ];

        let reg = fit_transformation(&points_src, &points_dst)?;
        let expected =
            RigidTransform::from_axis_angle(DVec3::X, std::f64::consts::FRAC_PI_2, DVec3::ZERO)?;

        assert_transform_eq(&reg.transform, &expected, 1e-10);
        Ok(())
    }

    #[test]
    fn test_fit_transformation_random() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(42);
        let points_src = create_random_points(&mut rng, 30);

        for _ in 0..10 {
            let axis = DVec3::new(rng.random(), rng.random(), rng.random()) - 0.5;
            let angle = rng.random_range(-3.0..3.0);
            let translation = DVec3::new(rng.random(), rng.random(), rng.random()) * 20.0;
            let expected = RigidTransform::from_axis_angle(axis, angle, translation)?;

            let points_dst = expected.apply_points(&points_src);
            let reg = fit_transformation(&points_src, &points_dst)?;

            assert_transform_eq(&reg.transform, &expected, 1e-8);
            assert_relative_eq!(reg.transform.rotation.determinant(), 1.0, epsilon = 1e-10);
        }
        Ok(())
    }

    #[test]
    fn test_fit_transformation_planar_no_reflection() -> Result<(), Box<dyn std::error::Error>> {
        // coplanar points still determine a unique proper rotation
        let points_src = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(2.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(3.0, 2.0, 0.0),
        ];
        let expected =
            RigidTransform::from_axis_angle(DVec3::new(1.0, 2.0, 3.0), 0.8, DVec3::ONE)?;
        let points_dst = expected.apply_points(&points_src);

        let reg = fit_transformation(&points_src, &points_dst)?;

        assert!(!reg.degenerate);
        assert_transform_eq(&reg.transform, &expected, 1e-9);
        Ok(())
    }

    #[test]
    fn test_fit_transformation_collinear_is_flagged() -> Result<(), Box<dyn std::error::Error>> {
        let points_src = (0..5)
            .map(|i| DVec3::new(i as f64, 0.0, 0.0))
            .collect::<Vec<_>>();
        let points_dst = points_src
            .iter()
            .map(|p| *p + DVec3::new(0.0, 1.0, 0.0))
            .collect::<Vec<_>>();

        let reg = fit_transformation(&points_src, &points_dst)?;

        assert!(reg.degenerate);
        // the points are still mapped onto each other
        for (src, dst) in points_src.iter().zip(points_dst.iter()) {
            assert_relative_eq!(reg.transform.apply(*src).distance(*dst), 0.0, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_fit_transformation_errors() {
        let a = vec![DVec3::ZERO; 4];
        let b = vec![DVec3::ZERO; 3];
        assert!(matches!(
            fit_transformation(&a, &b),
            Err(RegistrationError::MismatchedLengths { src: 4, dst: 3 })
        ));
        assert!(matches!(
            fit_transformation(&a[..2], &b[..2]),
            Err(RegistrationError::InsufficientPoints {
                required: 3,
                actual: 2
            })
        ));
    }
}
