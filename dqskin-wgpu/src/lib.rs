//! wgpu integration for `dqskin`: a capability probe, a compute skinning backend and a
//! vertex-pulling renderer that draws host or device frames.

mod compute;
mod renderer;

pub use compute::*;
pub use renderer::*;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod compute_tests;
