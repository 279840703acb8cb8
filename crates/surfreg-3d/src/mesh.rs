use glam::DVec3;

use crate::triangle::{Triangle, TriangleError};

/// Error type for triangle mesh construction.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// The mesh has no triangle.
    #[error("Triangle mesh is empty")]
    Empty,

    /// A triangle references a vertex that does not exist.
    #[error("Triangle {triangle} references vertex {index} but the mesh has {num_vertices} vertices")]
    IndexOutOfBounds {
        /// Index of the offending triangle.
        triangle: usize,
        /// The out of range vertex index.
        index: usize,
        /// Number of vertices in the mesh.
        num_vertices: usize,
    },

    /// A triangle is invalid.
    #[error("Invalid triangle {index}: {source}")]
    Triangle {
        /// Index of the offending triangle.
        index: usize,
        /// The triangle error.
        source: TriangleError,
    },
}

/// A triangulated surface given as vertex coordinates and vertex index triples.
#[derive(Debug, Clone)]
pub struct TriangleMesh {
    vertices: Vec<DVec3>,
    indices: Vec<[usize; 3]>,
    triangles: Vec<Triangle>,
}

impl TriangleMesh {
    /// Create a new mesh from vertices and the vertex indices of each triangle.
    ///
    /// Fails if the mesh is empty, an index is out of range or a triangle is degenerate.
    pub fn new(vertices: Vec<DVec3>, indices: Vec<[usize; 3]>) -> Result<Self, MeshError> {
        if indices.is_empty() {
            return Err(MeshError::Empty);
        }

        let triangles = indices
            .iter()
            .enumerate()
            .map(|(i, tri)| {
                let [a, b, c] = tri.map(|index| {
                    vertices
                        .get(index)
                        .copied()
                        .ok_or(MeshError::IndexOutOfBounds {
                            triangle: i,
                            index,
                            num_vertices: vertices.len(),
                        })
                });
                Triangle::new(a?, b?, c?).map_err(|source| MeshError::Triangle { index: i, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!(
            "Built mesh with {} vertices and {} triangles",
            vertices.len(),
            triangles.len()
        );

        Ok(Self {
            vertices,
            indices,
            triangles,
        })
    }

    /// Create a new mesh from raw `[x, y, z]` vertex arrays.
    pub fn from_arrays(
        vertices: &[[f64; 3]],
        indices: Vec<[usize; 3]>,
    ) -> Result<Self, MeshError> {
        Self::new(
            vertices.iter().map(|v| DVec3::from_array(*v)).collect(),
            indices,
        )
    }

    /// Get the number of triangles in the mesh.
    #[inline]
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    /// Check if the mesh has no triangle. Always false for a constructed mesh.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Get as reference the vertices of the mesh.
    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    /// Get as reference the vertex indices of each triangle.
    pub fn indices(&self) -> &[[usize; 3]] {
        &self.indices
    }

    /// Get as reference the triangles of the mesh.
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Find the closest point on the mesh by visiting every triangle.
    ///
    /// # Returns
    ///
    /// The closest point and its distance to `query`.
    pub fn closest_point_linear(&self, query: DVec3) -> (DVec3, f64) {
        self.triangles
            .iter()
            .map(|tri| {
                let c = tri.closest_point(query);
                (c, c.distance(query))
            })
            .fold((query, f64::INFINITY), |best, cur| {
                if cur.1 < best.1 {
                    cur
                } else {
                    best
                }
            })
    }

    /// Find the closest point on the mesh, skipping triangles whose bounding sphere is
    /// farther than the best distance found so far.
    ///
    /// # Returns
    ///
    /// The closest point and its distance to `query`.
    pub fn closest_point_spheres(&self, query: DVec3) -> (DVec3, f64) {
        let mut best = (query, f64::INFINITY);
        for tri in &self.triangles {
            if tri.bounding_sphere().lower_bound_distance(query) >= best.1 {
                continue;
            }
            let c = tri.closest_point(query);
            let d = c.distance(query);
            if d < best.1 {
                best = (c, d);
            }
        }
        best
    }
}
