//! Mesh skinning core: dual-quaternion algebra, linear/dual-quaternion/center-of-rotation
//! transfer functions, an offline center-of-rotation precompute and the per-instance
//! dispatch state machine.
//!
//! This crate is renderer-agnostic. GPU compute and rendering live in `dqskin-wgpu`.

#![forbid(unsafe_code)]

mod dispatch;
mod dual_quat;
mod error;
mod model;
mod precompute;
mod render;
mod skeleton;
mod skinning;
mod topology;
mod version;

#[cfg(feature = "json")]
pub mod json;

#[cfg(feature = "binary")]
pub mod binary;

pub use dispatch::*;
pub use dual_quat::*;
pub use error::*;
pub use model::*;
pub use precompute::*;
pub use render::*;
pub use skeleton::*;
pub use skinning::*;
pub use topology::*;
pub use version::*;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod dual_quat_tests;



#[cfg(test)]
mod skinning_tests;


#[cfg(test)]
mod hinge_tests;


#[cfg(all(test, feature = "binary"))]
mod binary_tests;
