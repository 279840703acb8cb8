use glam::DVec3;
use surfreg_3d::{
    mesh::TriangleMesh,
    tree::{ClosestPoint, CovarianceTree},
};

/// A surface that answers closest point queries.
///
/// Implementations must be exact: on return `best` holds the closest point of the surface,
/// unless the initial candidate of `best` was already at least as close.
pub trait SurfaceSearch: Sync {
    /// Search the point closest to `query`, updating `best` in place.
    fn find_closest_point(&self, query: DVec3, best: &mut ClosestPoint);
}

impl SurfaceSearch for CovarianceTree {
    fn find_closest_point(&self, query: DVec3, best: &mut ClosestPoint) {
        CovarianceTree::find_closest_point(self, query, best);
    }
}

/// Exhaustive search over every triangle of a mesh.
#[derive(Debug, Clone, Copy)]
pub struct LinearSearch<'a>(pub &'a TriangleMesh);

impl SurfaceSearch for LinearSearch<'_> {
    fn find_closest_point(&self, query: DVec3, best: &mut ClosestPoint) {
        let (point, distance) = self.0.closest_point_linear(query);
        best.offer(point, distance);
    }
}

/// Search over every triangle of a mesh, pruned by the triangle bounding spheres.
#[derive(Debug, Clone, Copy)]
pub struct SphereSearch<'a>(pub &'a TriangleMesh);

impl SurfaceSearch for SphereSearch<'_> {
    fn find_closest_point(&self, query: DVec3, best: &mut ClosestPoint) {
        for tri in self.0.triangles() {
            if tri.bounding_sphere().lower_bound_distance(query) >= best.bound {
                continue;
            }
            let c = tri.closest_point(query);
            best.offer(c, c.distance(query));
        }
    }
}
