#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod icp_mesh;
pub use icp_mesh::*;

mod ops;

/// Closest point search backends used by the registration loop.
pub mod search;
