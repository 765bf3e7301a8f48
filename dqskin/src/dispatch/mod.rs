//! Backend selection and the per-instance update/render state machine.

mod instance;
mod sequential;

pub use instance::*;
pub use sequential::*;

use crate::{BonePalette, DispatchError, Error, Frame, SkinData, SkinningAlgorithm};
use std::any::Any;
use std::sync::Arc;


#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub enum BackendPreference {
    /// Parallel when the probe reports compute support, else sequential.
    #[default]
    Auto,
    ForceParallel,
    ForceSequential,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub enum BackendKind {
    Parallel,
    Sequential,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "json", serde(default))]
pub struct SkinningConfig {
    pub algorithm: SkinningAlgorithm,
    pub backend: BackendPreference,
    pub tension: bool,
}

#[cfg(feature = "json")]
impl SkinningConfig {
    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        serde_json::from_str(input).map_err(|e| Error::JsonParse {
            message: e.to_string(),
        })
    }
}

pub trait CapabilityProbe {
    fn supports_parallel_compute(&self) -> bool;
}

/// Fixed answer, for headless hosts and tests.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StaticProbe(pub bool);

impl CapabilityProbe for StaticProbe {
    fn supports_parallel_compute(&self) -> bool {
        self.0
    }
}

pub trait ParallelBackendFactory {
    fn create(
        &self,
        skin: &Arc<SkinData>,
        config: &SkinningConfig,
    ) -> Result<Box<dyn SkinningBackend>, Error>;
}

/// A loaded backend. Owns every resource it allocated; [`SkinningBackend::release`] frees
/// them after in-flight work has finished.
pub trait SkinningBackend {
    fn kind(&self) -> BackendKind;

    /// The algorithm actually running, after any degrade.
    fn algorithm(&self) -> SkinningAlgorithm;

    fn tension_enabled(&self) -> bool;

    fn dispatch(&mut self, palette: &BonePalette) -> Result<(), DispatchError>;

    /// The most recently completed deformation.
    fn frame(&self) -> Frame<'_>;

    fn release(&mut self);

    fn as_any(&self) -> &dyn Any;
}
