//! Covariance tree: a bounding volume hierarchy of oriented boxes over mesh triangles.
//!
//! Every node owns a local frame whose first axis is the principal axis of the corners of its
//! triangles. The box of the node is axis-aligned in that frame, so it follows elongated
//! clusters of triangles much tighter than a box aligned with the world axes. A node splits its
//! triangles in two by the side of the plane through the centroid, normal to the principal
//! axis, that their centroid falls on.

use glam::DVec3;

use crate::{bounds::Aabb, linalg, transforms::RigidTransform, triangle::Triangle};

/// Error type for the covariance tree.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// The tree needs at least one triangle.
    #[error("Cannot build a covariance tree without triangles")]
    Empty,
}

/// Running best match of a closest point search.
///
/// `bound` is the pruning radius: any region farther than `bound` from the query is skipped.
/// It never increases during a search and is never lower than `distance`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoint {
    /// Best point found so far.
    pub point: DVec3,
    /// Distance from the query to `point`.
    pub distance: f64,
    /// Current pruning radius.
    pub bound: f64,
}

impl ClosestPoint {
    /// An accumulator without candidate, which searches the whole tree.
    pub fn unbounded(query: DVec3) -> Self {
        Self {
            point: query,
            distance: f64::INFINITY,
            bound: f64::INFINITY,
        }
    }

    /// An accumulator seeded with a known point of the surface.
    ///
    /// `slack` widens the initial pruning radius beyond the distance to `candidate`. It only
    /// affects how much of the tree is visited, never which point is returned.
    ///
    /// PRECONDITION: `candidate` lies on the searched surface.
    pub fn seeded(query: DVec3, candidate: DVec3, slack: f64) -> Self {
        let distance = query.distance(candidate);
        Self {
            point: candidate,
            distance,
            bound: distance + slack.max(0.0),
        }
    }

    /// Record `point` at `distance` if it improves on the current best.
    #[inline]
    pub fn offer(&mut self, point: DVec3, distance: f64) {
        if distance < self.distance {
            self.point = point;
            self.distance = distance;
            self.bound = self.bound.min(distance);
        }
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Leaf(Vec<Triangle>),
    Split(Box<CovTreeNode>, Box<CovTreeNode>),
}

/// A node of the covariance tree.
#[derive(Debug, Clone)]
pub struct CovTreeNode {
    // maps local coordinates of the node to world coordinates
    frame: RigidTransform,
    // bounds of the triangle corners in local coordinates
    bounds: Aabb,
    num_triangles: usize,
    kind: NodeKind,
}

impl CovTreeNode {
    /// Build a node, and recursively its children, owning `triangles`.
    ///
    /// PRECONDITION: triangles is not empty.
    fn new(triangles: Vec<Triangle>) -> Self {
        let frame = Self::compute_frame(&triangles);

        let mut bounds = Aabb::EMPTY;
        for tri in &triangles {
            tri.enlarge_bounds(&frame, &mut bounds);
        }

        let num_triangles = triangles.len();
        let kind = if num_triangles <= 1 {
            NodeKind::Leaf(triangles)
        } else {
            let (left, right) = Self::split(triangles, &frame);
            NodeKind::Split(Box::new(Self::new(left)), Box::new(Self::new(right)))
        };

        Self {
            frame,
            bounds,
            num_triangles,
            kind,
        }
    }

    /// Frame centered at the centroid of all corners, first axis along their principal axis.
    fn compute_frame(triangles: &[Triangle]) -> RigidTransform {
        let corners = triangles
            .iter()
            .flat_map(|tri| tri.corners().iter().copied())
            .collect::<Vec<_>>();
        let (rotation, centroid) = linalg::principal_frame(&corners);
        RigidTransform::new(rotation, centroid)
    }

    /// Split the triangles by the sign of the local x coordinate of their sort point.
    fn split(triangles: Vec<Triangle>, frame: &RigidTransform) -> (Vec<Triangle>, Vec<Triangle>) {
        let mut keyed = triangles
            .into_iter()
            .map(|tri| (frame.inverse_apply(tri.sort_point()).x, tri))
            .collect::<Vec<_>>();

        let num_negative = keyed.iter().filter(|(x, _)| *x < 0.0).count();
        let split_at = if num_negative == 0 || num_negative == keyed.len() {
            // all sort points on one side (e.g. coincident centroids), halve instead
            keyed.len() / 2
        } else {
            num_negative
        };

        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        let right = keyed.split_off(split_at);

        (
            keyed.into_iter().map(|(_, tri)| tri).collect(),
            right.into_iter().map(|(_, tri)| tri).collect(),
        )
    }

    /// Search the subtree for the point closest to `query`, updating `best` in place.
    pub fn find_closest_point(&self, query: DVec3, best: &mut ClosestPoint) {
        let local = self.frame.inverse_apply(query);
        if !self.bounds.contains_within(local, best.bound) {
            return;
        }

        match &self.kind {
            NodeKind::Split(left, right) => {
                // visit the nearer box first to shrink the bound early
                let (first, second) =
                    if left.box_distance(query) <= right.box_distance(query) {
                        (left, right)
                    } else {
                        (right, left)
                    };
                first.find_closest_point(query, best);
                second.find_closest_point(query, best);
            }
            NodeKind::Leaf(triangles) => {
                for tri in triangles {
                    if tri.bounding_sphere().lower_bound_distance(query) >= best.bound {
                        continue;
                    }
                    let c = tri.closest_point(query);
                    best.offer(c, c.distance(query));
                }
            }
        }
    }

    fn box_distance(&self, query: DVec3) -> f64 {
        self.bounds.distance(self.frame.inverse_apply(query))
    }

    /// Local to world frame of the node.
    pub fn frame(&self) -> &RigidTransform {
        &self.frame
    }

    /// Bounding box of the node in its local frame.
    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Number of triangles in the subtree.
    pub fn len(&self) -> usize {
        self.num_triangles
    }

    /// Check if the subtree has no triangle. Always false for a built tree.
    pub fn is_empty(&self) -> bool {
        self.num_triangles == 0
    }

    /// Check if the node holds its triangles directly.
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// The two children of an internal node.
    pub fn children(&self) -> Option<(&CovTreeNode, &CovTreeNode)> {
        match &self.kind {
            NodeKind::Split(left, right) => Some((&**left, &**right)),
            NodeKind::Leaf(_) => None,
        }
    }

    /// The triangles of a leaf node.
    pub fn triangles(&self) -> Option<&[Triangle]> {
        match &self.kind {
            NodeKind::Leaf(triangles) => Some(triangles),
            NodeKind::Split(..) => None,
        }
    }

    fn depth(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(_) => 1,
            NodeKind::Split(left, right) => 1 + left.depth().max(right.depth()),
        }
    }

    fn num_leaves(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(_) => 1,
            NodeKind::Split(left, right) => left.num_leaves() + right.num_leaves(),
        }
    }
}

/// Spatial search structure for closest point queries on a set of triangles.
///
/// The tree is immutable once built, so it can be shared across threads for queries.
///
/// Example:
///
/// ```
/// use glam::DVec3;
/// use surfreg_3d::{tree::CovarianceTree, triangle::Triangle};
///
/// let triangles = vec![
///     Triangle::new(DVec3::ZERO, DVec3::X, DVec3::Y).unwrap(),
///     Triangle::new(DVec3::X, DVec3::new(1.0, 1.0, 0.0), DVec3::Y).unwrap(),
/// ];
/// let tree = CovarianceTree::new(triangles).unwrap();
/// let best = tree.closest_point(DVec3::new(0.5, 0.5, 2.0));
/// assert!((best.distance - 2.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct CovarianceTree {
    root: CovTreeNode,
}

impl CovarianceTree {
    /// Build the tree over `triangles`.
    pub fn new(triangles: Vec<Triangle>) -> Result<Self, TreeError> {
        if triangles.is_empty() {
            return Err(TreeError::Empty);
        }
        let now = std::time::Instant::now();
        let root = CovTreeNode::new(triangles);
        log::debug!(
            "Built covariance tree over {} triangles, depth {}, in {:?}",
            root.len(),
            root.depth(),
            now.elapsed()
        );
        Ok(Self { root })
    }

    /// Search for the point closest to `query`, starting from the state of `best`.
    ///
    /// On return `best` holds the closest point of the surface, or its initial candidate when
    /// nothing closer exists.
    pub fn find_closest_point(&self, query: DVec3, best: &mut ClosestPoint) {
        self.root.find_closest_point(query, best);
    }

    /// Search for the point closest to `query` over the whole tree.
    pub fn closest_point(&self, query: DVec3) -> ClosestPoint {
        let mut best = ClosestPoint::unbounded(query);
        self.find_closest_point(query, &mut best);
        best
    }

    /// The root node of the tree.
    pub fn root(&self) -> &CovTreeNode {
        &self.root
    }

    /// Number of triangles in the tree.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    /// Check if the tree has no triangle. Always false for a built tree.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Number of levels of the tree, a single leaf has depth 1.
    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    /// Number of leaf nodes.
    pub fn num_leaves(&self) -> usize {
        self.root.num_leaves()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::TriangleMesh;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_point(rng: &mut StdRng, scale: f64) -> DVec3 {
        DVec3::new(
            rng.random_range(-scale..scale),
            rng.random_range(-scale..scale),
            rng.random_range(-scale..scale),
        )
    }

    fn random_triangles(rng: &mut StdRng, num_triangles: usize) -> Vec<Triangle> {
        let mut triangles = Vec::with_capacity(num_triangles);
        while triangles.len() < num_triangles {
            let anchor = random_point(rng, 20.0);
            let (b, c) = (random_point(rng, 2.0), random_point(rng, 2.0));
            if let Ok(tri) = Triangle::new(anchor, anchor + b, anchor + c) {
                triangles.push(tri);
            }
        }
        triangles
    }

    fn collect_leaf_triangles<'a>(node: &'a CovTreeNode, out: &mut Vec<&'a Triangle>) {
        match node.children() {
            Some((left, right)) => {
                collect_leaf_triangles(left, out);
                collect_leaf_triangles(right, out);
            }
            None => out.extend(node.triangles().unwrap_or_default()),
        }
    }

    #[test]
    fn test_empty_tree() {
        assert!(matches!(CovarianceTree::new(vec![]), Err(TreeError::Empty)));
    }

    #[test]
    fn test_leaves_partition_input() -> Result<(), TreeError> {
        let mut rng = StdRng::seed_from_u64(17);
        let triangles = random_triangles(&mut rng, 128);
        let tree = CovarianceTree::new(triangles.clone())?;

        assert_eq!(tree.len(), 128);
        assert_eq!(tree.num_leaves(), 128);

        let mut leaves = Vec::new();
        collect_leaf_triangles(tree.root(), &mut leaves);
        assert_eq!(leaves.len(), triangles.len());
        for tri in &triangles {
            assert_eq!(leaves.iter().filter(|t| **t == tri).count(), 1);
        }
        Ok(())
    }

    #[test]
    fn test_node_bounds_contain_corners() -> Result<(), TreeError> {
        let mut rng = StdRng::seed_from_u64(23);
        let tree = CovarianceTree::new(random_triangles(&mut rng, 64))?;

        let mut stack = vec![tree.root()];
        while let Some(node) = stack.pop() {
            let mut leaves = Vec::new();
            collect_leaf_triangles(node, &mut leaves);
            for tri in leaves {
                for &corner in tri.corners() {
                    let local = node.frame().inverse_apply(corner);
                    assert!(node.bounds().contains_within(local, 1e-9));
                }
            }
            if let Some((left, right)) = node.children() {
                stack.push(left);
                stack.push(right);
            }
        }
        Ok(())
    }

    #[test]
    fn test_coincident_sort_points_terminate() -> Result<(), Box<dyn std::error::Error>> {
        // every triangle shares the same centroid
        let triangles = (0..16)
            .map(|i| {
                let angle = i as f64 * 0.3;
                let (s, c) = angle.sin_cos();
                let a = DVec3::new(c, s, 0.0);
                let b = DVec3::new(-s, c, 1.0);
                Triangle::new(a, b, -(a + b))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tree = CovarianceTree::new(triangles)?;
        assert_eq!(tree.len(), 16);
        assert_eq!(tree.num_leaves(), 16);
        assert!(tree.depth() <= 16);
        Ok(())
    }

    #[test]
    fn test_tree_matches_linear_search() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(31);

        for num_triangles in [50, 75, 200] {
            let triangles = random_triangles(&mut rng, num_triangles);
            let mut vertices = Vec::new();
            let mut indices = Vec::new();
            for (i, tri) in triangles.iter().enumerate() {
                vertices.extend_from_slice(tri.corners());
                indices.push([3 * i, 3 * i + 1, 3 * i + 2]);
            }
            let mesh = TriangleMesh::new(vertices, indices)?;
            let tree = CovarianceTree::new(triangles)?;

            for _ in 0..200 {
                let query = random_point(&mut rng, 25.0);
                let (expected_point, expected_dist) = mesh.closest_point_linear(query);
                let best = tree.closest_point(query);

                assert_relative_eq!(best.distance, expected_dist, epsilon = 1e-9);
                assert_relative_eq!(best.point.distance(expected_point), 0.0, epsilon = 1e-9);
            }
        }
        Ok(())
    }

    #[test]
    fn test_warm_start_returns_exact_point() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(37);
        let triangles = random_triangles(&mut rng, 100);
        let candidate_tri = triangles[0].clone();
        let tree = CovarianceTree::new(triangles)?;

        for _ in 0..100 {
            let query = random_point(&mut rng, 25.0);
            let exact = tree.closest_point(query);

            // a valid surface point as seed, with and without extra slack
            let seed = candidate_tri.closest_point(query);
            for slack in [0.0, 0.5, 5.0] {
                let mut best = ClosestPoint::seeded(query, seed, slack);
                tree.find_closest_point(query, &mut best);
                assert_relative_eq!(best.distance, exact.distance, epsilon = 1e-9);
                assert!(best.bound >= best.distance);
                assert!(best.bound <= exact.distance + slack + 1e-9);
            }

            // seeding with the exact answer keeps it
            let mut best = ClosestPoint::seeded(query, exact.point, 0.0);
            tree.find_closest_point(query, &mut best);
            assert_eq!(best.point, exact.point);
        }
        Ok(())
    }
}
