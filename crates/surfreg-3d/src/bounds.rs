use glam::DVec3;

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// The minimum corner.
    pub min: DVec3,
    /// The maximum corner.
    pub max: DVec3,
}

impl Aabb {
    /// An empty box, which any point enlarges.
    pub const EMPTY: Self = Self {
        min: DVec3::INFINITY,
        max: DVec3::NEG_INFINITY,
    };

    /// Check if the box contains no point.
    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    /// Grow the box to contain `point`.
    #[inline]
    pub fn expand(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Check if `point` lies within `margin` of the box on every axis.
    ///
    /// If this returns false, every point of the box is farther than `margin` from `point`.
    #[inline]
    pub fn contains_within(&self, point: DVec3, margin: f64) -> bool {
        point.cmpge(self.min - margin).all() && point.cmple(self.max + margin).all()
    }

    /// Euclidean distance from `point` to the box, zero inside.
    pub fn distance(&self, point: DVec3) -> f64 {
        let outside = (self.min - point).max(point - self.max).max(DVec3::ZERO);
        outside.length()
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// A sphere enclosing a triangle, used to skip triangles during search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// The center of the sphere.
    pub center: DVec3,
    /// The radius of the sphere.
    pub radius: f64,
}

impl BoundingSphere {
    /// Compute a sphere enclosing the triangle `a`, `b`, `c`.
    ///
    /// The corners are reordered so that `a`-`b` is the longest edge. The center is then
    /// searched along the perpendicular bisector of `a`-`b` in the triangle plane: it is the
    /// midpoint of `a`-`b` when that sphere already holds `c` (obtuse or right triangle),
    /// and the circumcenter otherwise. The sphere is not necessarily minimal.
    ///
    /// PRECONDITION: the triangle is not degenerate.
    pub fn from_triangle(a: DVec3, b: DVec3, c: DVec3) -> Self {
        let ab = a.distance_squared(b);
        let bc = b.distance_squared(c);
        let ca = c.distance_squared(a);
        let (a, b, c) = if ab >= bc && ab >= ca {
            (a, b, c)
        } else if bc >= ca {
            (b, c, a)
        } else {
            (c, a, b)
        };

        let f = (a + b) * 0.5;
        let u = a - f;
        let v = c - f;
        let d = u.cross(v).cross(u);

        let denom = 2.0 * d.dot(v - u);
        let lambda = if denom.abs() > f64::MIN_POSITIVE {
            ((v.dot(v) - u.dot(u)) / denom).max(0.0)
        } else {
            0.0
        };
        let center = f + lambda * d;

        // take the largest corner distance so rounding never leaves a corner outside
        let radius = center
            .distance(a)
            .max(center.distance(b))
            .max(center.distance(c));

        Self { center, radius }
    }

    /// Lower bound of the distance from `point` to anything inside the sphere.
    #[inline]
    pub fn lower_bound_distance(&self, point: DVec3) -> f64 {
        point.distance(self.center) - self.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_aabb_expand_contains() {
        let mut aabb = Aabb::EMPTY;
        assert!(aabb.is_empty());

        aabb.expand(DVec3::new(0.0, 0.0, 0.0));
        aabb.expand(DVec3::new(1.0, 2.0, 3.0));
        assert!(!aabb.is_empty());

        assert!(aabb.contains_within(DVec3::new(0.5, 0.5, 0.5), 0.0));
        assert!(!aabb.contains_within(DVec3::new(1.5, 0.5, 0.5), 0.4));
        assert!(aabb.contains_within(DVec3::new(1.5, 0.5, 0.5), 0.5));
        assert_relative_eq!(aabb.distance(DVec3::new(4.0, 6.0, 3.0)), 5.0);
        assert_relative_eq!(aabb.distance(DVec3::new(0.2, 0.2, 0.2)), 0.0);
    }

    #[test]
    fn test_sphere_right_triangle() {
        let sphere = BoundingSphere::from_triangle(
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(2.0, 0.0, 0.0),
            DVec3::new(0.0, 2.0, 0.0),
        );
        assert_relative_eq!(sphere.center.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(sphere.center.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(sphere.radius, 2f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_equilateral_is_circumsphere() {
        let h = 3f64.sqrt();
        let sphere = BoundingSphere::from_triangle(
            DVec3::new(-1.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, h, 0.0),
        );
        assert_relative_eq!(sphere.center.y, h / 3.0, epsilon = 1e-12);
        assert_relative_eq!(sphere.radius, 2.0 / h, epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_obtuse_uses_midpoint() {
        let sphere = BoundingSphere::from_triangle(
            DVec3::new(0.0, 0.3, 1.0),
            DVec3::new(-4.0, 0.0, 1.0),
            DVec3::new(4.0, 0.0, 1.0),
        );
        assert_relative_eq!(sphere.center.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(sphere.center.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(sphere.radius, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_contains_corners() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let corners = [0, 1, 2].map(|_| {
                DVec3::new(
                    rng.random_range(-5.0..5.0),
                    rng.random_range(-5.0..5.0),
                    rng.random_range(-5.0..5.0),
                )
            });
            let sphere = BoundingSphere::from_triangle(corners[0], corners[1], corners[2]);
            for c in corners {
                assert!(c.distance(sphere.center) <= sphere.radius + 1e-12);
            }
        }
    }
}
