use glam::DVec3;

use crate::{
    bounds::{Aabb, BoundingSphere},
    transforms::RigidTransform,
};

/// Relative threshold on `|e1 x e2|² / (|e1|² |e2|²)` under which a triangle has no area.
///
/// Kept well above the rounding error of the normal equations in [`Triangle::closest_point`].
const DEGENERATE_SIN_SQ: f64 = 1e-12;

/// Error type for triangle construction.
#[derive(Debug, thiserror::Error)]
pub enum TriangleError {
    /// The corners are coincident or collinear.
    #[error("Degenerate triangle with zero area: {0:?}")]
    DegenerateTriangle([DVec3; 3]),

    /// A corner has a NaN or infinite coordinate.
    #[error("Triangle corner is not finite: {0:?}")]
    NonFinite([DVec3; 3]),
}

/// A triangle of a surface mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    corners: [DVec3; 3],
    sphere: BoundingSphere,
}

impl Triangle {
    /// Create a new triangle from its corners `p`, `q`, `r`.
    ///
    /// Fails if the triangle has zero area or a non-finite corner.
    pub fn new(p: DVec3, q: DVec3, r: DVec3) -> Result<Self, TriangleError> {
        let corners = [p, q, r];
        if !corners.iter().all(|c| c.is_finite()) {
            return Err(TriangleError::NonFinite(corners));
        }

        let (e1, e2) = (q - p, r - p);
        let cross_sq = e1.cross(e2).length_squared();
        if cross_sq <= DEGENERATE_SIN_SQ * e1.length_squared() * e2.length_squared()
            || cross_sq == 0.0
        {
            return Err(TriangleError::DegenerateTriangle(corners));
        }

        Ok(Self {
            corners,
            sphere: BoundingSphere::from_triangle(p, q, r),
        })
    }

    /// Get as reference the corners of the triangle.
    pub fn corners(&self) -> &[DVec3; 3] {
        &self.corners
    }

    /// Get the sphere enclosing the triangle.
    pub fn bounding_sphere(&self) -> &BoundingSphere {
        &self.sphere
    }

    /// The point used to sort the triangle in space, its centroid.
    pub fn sort_point(&self) -> DVec3 {
        (self.corners[0] + self.corners[1] + self.corners[2]) / 3.0
    }

    /// Grow `bounds` to contain the corners expressed in the local coordinates of `frame`.
    ///
    /// `frame` maps local coordinates to world coordinates.
    pub fn enlarge_bounds(&self, frame: &RigidTransform, bounds: &mut Aabb) {
        for &corner in &self.corners {
            bounds.expand(frame.inverse_apply(corner));
        }
    }

    /// Compute the point on the triangle closest to `query`.
    ///
    /// The query is projected on the triangle plane by solving for the barycentric
    /// coordinates `(l, u)` in the basis of the edges `q - p` and `r - p`. An inside projection is
    /// the answer. Otherwise the closest point lies on one of the edges whose constraint is
    /// violated, and the nearest of their clamped projections is returned.
    ///
    /// When the normal equations are too ill-conditioned to solve, the nearest clamped
    /// projection of `query` on the three edges is returned instead.
    ///
    /// Example:
    ///
    /// ```
    /// use glam::DVec3;
    /// use surfreg_3d::triangle::Triangle;
    ///
    /// let tri = Triangle::new(DVec3::ZERO, DVec3::new(2.0, 0.0, 0.0), DVec3::new(0.0, 2.0, 0.0)).unwrap();
    /// let c = tri.closest_point(DVec3::new(1.0, 1.0, 5.0));
    /// assert!((c - DVec3::new(1.0, 1.0, 0.0)).length() < 1e-12);
    /// ```
    pub fn closest_point(&self, query: DVec3) -> DVec3 {
        let [p, q, r] = self.corners;
        let (e1, e2) = (q - p, r - p);
        let d = query - p;

        // normal equations of the 3x2 least-squares system [e1 e2] * (l, u) = d
        let (a11, a12, a22) = (e1.dot(e1), e1.dot(e2), e2.dot(e2));
        let (b1, b2) = (e1.dot(d), e2.dot(d));
        let det = a11 * a22 - a12 * a12;
        if det <= f64::EPSILON * a11 * a22 {
            return closest_point_on_edges(query, &self.corners);
        }
        let l = (a22 * b1 - a12 * b2) / det;
        let u = (a11 * b2 - a12 * b1) / det;
        if !l.is_finite() || !u.is_finite() {
            return closest_point_on_edges(query, &self.corners);
        }

        let c = p + l * e1 + u * e2;
        if l >= 0.0 && u >= 0.0 && l + u <= 1.0 {
            return c;
        }

        // `c - query` is normal to the plane, so the point closest to `c` is also
        // the point closest to `query`
        let mut best = c;
        let mut best_dist = f64::INFINITY;
        let mut consider = |a: DVec3, b: DVec3| {
            let candidate = project_on_segment(c, a, b);
            let dist = candidate.distance_squared(c);
            if dist < best_dist {
                best = candidate;
                best_dist = dist;
            }
        };
        if l < 0.0 {
            consider(r, p);
        }
        if u < 0.0 {
            consider(p, q);
        }
        if l + u > 1.0 {
            consider(q, r);
        }
        best
    }
}

// nearest clamped projection of `query` on the edges p-q, q-r and r-p
fn closest_point_on_edges(query: DVec3, corners: &[DVec3; 3]) -> DVec3 {
    let [p, q, r] = *corners;
    [(p, q), (q, r), (r, p)]
        .into_iter()
        .map(|(a, b)| project_on_segment(query, a, b))
        .fold((p, f64::INFINITY), |best, candidate| {
            let dist = candidate.distance_squared(query);
            if dist < best.1 {
                (candidate, dist)
            } else {
                best
            }
        })
        .0
}

/// Project `c` on the segment from `p` to `q`, clamping to the end points.
///
/// PRECONDITION: `p != q`.
pub fn project_on_segment(c: DVec3, p: DVec3, q: DVec3) -> DVec3 {
    let pq = q - p;
    let lambda = ((c - p).dot(pq) / pq.dot(pq)).clamp(0.0, 1.0);
    p + lambda * pq
}
