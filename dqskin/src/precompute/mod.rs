//! Offline precompute: weight-similarity clustering, then threaded center-of-rotation
//! estimation over the clusters.

mod center_of_rotation;
mod cluster;

pub use center_of_rotation::*;
pub use cluster::*;

use crate::{Error, SkinData};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(test)]
mod center_of_rotation_tests;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PrecomputeReport {
    pub clusters: usize,
    pub fallbacks: usize,
    pub elapsed: Duration,
}

/// Both precompute phases, run to completion.
#[derive(Clone, Debug, Default)]
pub struct Precompute {
    pub settings: CorSettings,
}

impl Precompute {
    pub fn new(settings: CorSettings) -> Self {
        Self { settings }
    }

    /// Clusters `skin`, estimates its centers of rotation and installs both.
    ///
    /// Fails with [`Error::PartialPrecompute`] if any worker failed; the input skin is
    /// consumed either way and the whole run has to be repeated.
    pub fn run(&self, mut skin: SkinData) -> Result<(SkinData, PrecomputeReport), Error> {
        self.settings.validate()?;
        let started = Instant::now();

        let mut builder = ClusterBuilder::new(&skin, self.settings.weight_distance_threshold)?;
        let total = skin.vertex_count();
        for clustered in builder.by_ref() {
            log::trace!("clustering: {clustered}/{total} vertices");
        }
        let clusters = builder.finish();
        let cluster_count = clusters.len();
        skin.clusters = Some(clusters);
        skin.centers_of_rotation = None;

        let skin = Arc::new(skin);
        let job = compute_centers_of_rotation(Arc::clone(&skin), &self.settings)?;
        let outcome = job.join();
        let fallbacks = outcome.fallbacks;

        let mut skin = Arc::unwrap_or_clone(skin);
        skin.apply_centers(outcome)?;

        let report = PrecomputeReport {
            clusters: cluster_count,
            fallbacks,
            elapsed: started.elapsed(),
        };
        log::info!(
            "precompute finished in {:?}: {} clusters, {} fallbacks",
            report.elapsed,
            report.clusters,
            report.fallbacks
        );
        Ok((skin, report))
    }
}
