#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use surfreg_3d as k3d;

#[doc(inline)]
pub use surfreg_icp as icp;
