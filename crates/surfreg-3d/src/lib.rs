#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Bounding volumes: axis-aligned boxes and triangle bounding spheres.
pub mod bounds;

/// Linear algebra utilities.
pub mod linalg;

/// Triangle meshes.
pub mod mesh;

/// Point cloud container.
pub mod pointcloud;

/// Point set registration.
pub mod registration;

/// Rigid body transforms.
pub mod transforms;

/// Spatial search tree over mesh triangles.
pub mod tree;

/// Triangle primitive.
pub mod triangle;
