use glam::DVec3;

use crate::{linalg, transforms::RigidTransform};

/// Error type for point cloud operations.
#[derive(Debug, thiserror::Error)]
pub enum PointCloudError {
    /// Two point clouds that must correspond have different sizes.
    #[error("Mismatched point cloud sizes: {0} != {1}")]
    MismatchedLengths(usize, usize),
}

/// An ordered set of 3d points.
///
/// The order matters: clouds used together are paired index by index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<DVec3>,
}

impl PointCloud {
    /// Create a new point cloud from points.
    pub fn new(points: Vec<DVec3>) -> Self {
        Self { points }
    }

    /// Create a new point cloud from raw `[x, y, z]` arrays.
    pub fn from_arrays(points: &[[f64; 3]]) -> Self {
        Self::new(points.iter().map(|p| DVec3::from_array(*p)).collect())
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[DVec3] {
        &self.points
    }

    /// Consume the point cloud and return the points.
    pub fn into_points(self) -> Vec<DVec3> {
        self.points
    }

    /// Centroid of the points, or `None` for an empty cloud.
    pub fn centroid(&self) -> Option<DVec3> {
        (!self.is_empty()).then(|| linalg::centroid(&self.points))
    }

    /// Return a new point cloud with every point transformed.
    pub fn transform(&self, transform: &RigidTransform) -> PointCloud {
        PointCloud::new(transform.apply_points(&self.points))
    }

    /// Euclidean distance between each pair of corresponding points.
    pub fn distances(&self, other: &PointCloud) -> Result<Vec<f64>, PointCloudError> {
        if self.len() != other.len() {
            return Err(PointCloudError::MismatchedLengths(self.len(), other.len()));
        }
        Ok(self
            .points
            .iter()
            .zip(other.points.iter())
            .map(|(a, b)| a.distance(*b))
            .collect())
    }
}

impl From<Vec<DVec3>> for PointCloud {
    fn from(points: Vec<DVec3>) -> Self {
        Self::new(points)
    }
}
