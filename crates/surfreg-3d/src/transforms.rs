use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};

use crate::linalg;

/// Maximum deviation of `R^T * R` from identity tolerated before re-orthonormalizing.
const ORTHONORMALITY_TOLERANCE: f64 = 1e-10;

/// Error type for rigid transform construction.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// The rotation axis has (numerically) zero length.
    #[error("cannot compute rotation matrix from a zero vector")]
    ZeroAxis,
}

/// A rigid body transformation `p' = R * p + t`.
///
/// The rotation is kept orthonormal with a positive determinant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    /// The rotation matrix.
    pub rotation: DMat3,
    /// The translation vector.
    pub translation: DVec3,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    /// The identity transformation.
    pub const IDENTITY: Self = Self {
        rotation: DMat3::IDENTITY,
        translation: DVec3::ZERO,
    };

    /// Create a new rigid transform from a rotation and a translation.
    ///
    /// PRECONDITION: rotation is orthonormal with det = +1.
    pub fn new(rotation: DMat3, translation: DVec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Create the identity transformation.
    pub fn identity() -> Self {
        Self::IDENTITY
    }

    /// Create a rigid transform from a row-major rotation and a translation array.
    pub fn from_arrays(rotation: &[[f64; 3]; 3], translation: &[f64; 3]) -> Self {
        Self::new(
            DMat3::from_cols_array_2d(rotation).transpose(),
            DVec3::from_array(*translation),
        )
    }

    /// Return the rotation as row-major array and the translation as array.
    pub fn to_arrays(&self) -> ([[f64; 3]; 3], [f64; 3]) {
        (
            self.rotation.transpose().to_cols_array_2d(),
            self.translation.to_array(),
        )
    }

    /// Create a rigid transform from an axis-angle rotation and a translation.
    ///
    /// # Arguments
    ///
    /// * `axis` - The axis of rotation, normalized internally.
    /// * `angle` - The angle of rotation in radians.
    /// * `translation` - The translation vector.
    ///
    /// Example:
    ///
    /// ```
    /// use glam::DVec3;
    /// use surfreg_3d::transforms::RigidTransform;
    ///
    /// let tf = RigidTransform::from_axis_angle(DVec3::X, std::f64::consts::FRAC_PI_2, DVec3::ZERO).unwrap();
    /// let p = tf.apply(DVec3::Y);
    /// assert!((p - DVec3::Z).length() < 1e-12);
    /// ```
    pub fn from_axis_angle(
        axis: DVec3,
        angle: f64,
        translation: DVec3,
    ) -> Result<Self, TransformError> {
        let magnitude = axis.length();
        if magnitude < 1e-10 {
            return Err(TransformError::ZeroAxis);
        }
        let axis = axis / magnitude;

        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;
        let (x, y, z) = (axis.x, axis.y, axis.z);

        // Rodrigues formula written out per entry, columns first
        let rotation = DMat3::from_cols(
            DVec3::new(c + x * x * t, x * y * t + z * s, x * z * t - y * s),
            DVec3::new(x * y * t - z * s, c + y * y * t, y * z * t + x * s),
            DVec3::new(x * z * t + y * s, y * z * t - x * s, c + z * z * t),
        );

        Ok(Self::new(rotation, translation))
    }

    /// Compose two transformations as `self ∘ other`.
    ///
    /// The result applies `other` first and `self` second:
    /// `R = R_self * R_other`, `t = R_self * t_other + t_self`.
    pub fn compose(&self, other: &RigidTransform) -> RigidTransform {
        let mut rotation = self.rotation * other.rotation;
        if orthonormality_error(&rotation) > ORTHONORMALITY_TOLERANCE {
            rotation = linalg::nearest_rotation(&rotation);
        }
        RigidTransform {
            rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Compute the inverse transformation `R' = R^-1`, `t' = -R' * t`.
    ///
    /// # Panics
    ///
    /// Panics if the rotation is singular, which breaks the type invariant.
    pub fn inverse(&self) -> RigidTransform {
        let det = self.rotation.determinant();
        assert!(
            det.abs() > f64::EPSILON,
            "rigid transform has a singular rotation (det = {det})"
        );
        // orthonormal, so the inverse is the transpose
        let rotation = self.rotation.transpose();
        RigidTransform {
            rotation,
            translation: -(rotation * self.translation),
        }
    }

    /// Apply the transformation to a single point.
    #[inline]
    pub fn apply(&self, point: DVec3) -> DVec3 {
        self.rotation * point + self.translation
    }

    /// Apply the inverse transformation to a single point, i.e. `R^T * (p - t)`.
    #[inline]
    pub fn inverse_apply(&self, point: DVec3) -> DVec3 {
        self.rotation.transpose() * (point - self.translation)
    }

    /// Apply the transformation to a set of points.
    pub fn apply_points(&self, points: &[DVec3]) -> Vec<DVec3> {
        points.iter().map(|&p| self.apply(p)).collect()
    }

    /// Sum of the squared differences of all rotation entries plus the squared
    /// differences of the translation entries.
    pub fn frobenius_distance_sq(&self, other: &RigidTransform) -> f64 {
        let dr = self.rotation - other.rotation;
        let dr_sq = dr.x_axis.length_squared()
            + dr.y_axis.length_squared()
            + dr.z_axis.length_squared();
        dr_sq + self.translation.distance_squared(other.translation)
    }

    /// Largest absolute entry of `R^T * R - I`.
    pub fn orthonormality_error(&self) -> f64 {
        orthonormality_error(&self.rotation)
    }
}

fn orthonormality_error(rotation: &DMat3) -> f64 {
    (rotation.transpose() * *rotation - DMat3::IDENTITY)
        .to_cols_array()
        .iter()
        .fold(0.0f64, |acc, v| acc.max(v.abs()))
}
