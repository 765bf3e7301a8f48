use crate::{
    BackendKind, BackendPreference, BonePalette, BonePose, CapabilityProbe, DispatchError, Error,
    FrameRenderer, ParallelBackendFactory, RenderConfig, SequentialBackend, SkinData,
    SkinningAlgorithm, SkinningBackend, SkinningConfig,
};
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InstanceState {
    Unloaded,
    Loaded {
        backend: BackendKind,
        algorithm: SkinningAlgorithm,
    },
    Disposed,
}

/// One skinned mesh bound to a backend.
///
/// `update` and `render` are blocking; callers must not render a frame while its update is
/// still being issued from another thread.
pub struct SkinnedInstance {
    skin: Arc<SkinData>,
    probe: Box<dyn CapabilityProbe>,
    parallel: Option<Box<dyn ParallelBackendFactory>>,
    config: SkinningConfig,
    /// `Auto` resolution, cached until the next reload.
    resolved: Option<BackendKind>,
    backend: Option<Box<dyn SkinningBackend>>,
    palette: BonePalette,
    disposed: bool,
}

impl std::fmt::Debug for SkinnedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkinnedInstance")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("vertices", &self.skin.vertex_count())
            .finish()
    }
}

impl SkinnedInstance {
    pub fn new(skin: Arc<SkinData>, probe: Box<dyn CapabilityProbe>) -> Self {
        let bone_count = skin.bone_count();
        Self {
            skin,
            probe,
            parallel: None,
            config: SkinningConfig::default(),
            resolved: None,
            backend: None,
            palette: BonePalette::identity(bone_count),
            disposed: false,
        }
    }

    pub fn with_parallel_backend(mut self, factory: Box<dyn ParallelBackendFactory>) -> Self {
        self.parallel = Some(factory);
        self
    }

    pub fn skin(&self) -> &Arc<SkinData> {
        &self.skin
    }

    pub fn config(&self) -> &SkinningConfig {
        &self.config
    }

    pub fn state(&self) -> InstanceState {
        if self.disposed {
            return InstanceState::Disposed;
        }
        match &self.backend {
            Some(backend) => InstanceState::Loaded {
                backend: backend.kind(),
                algorithm: backend.algorithm(),
            },
            None => InstanceState::Unloaded,
        }
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend.as_ref().map(|b| b.kind())
    }

    /// The algorithm the loaded backend runs, after any degrade.
    pub fn algorithm(&self) -> Option<SkinningAlgorithm> {
        self.backend.as_ref().map(|b| b.algorithm())
    }

    pub fn backend(&self) -> Option<&dyn SkinningBackend> {
        self.backend.as_deref()
    }

    /// Loads the instance, or reloads it if it is already loaded.
    pub fn configure(&mut self, config: SkinningConfig) -> Result<(), Error> {
        self.reload(config)
    }

    /// Releases the current backend and builds a new one for `config`. `Auto` is probed again.
    /// On failure the instance is left unloaded.
    pub fn reload(&mut self, config: SkinningConfig) -> Result<(), Error> {
        self.ensure_not_disposed()?;
        self.resolved = None;
        self.config = config;
        self.rebuild()
    }

    /// Swaps the algorithm, reusing the cached backend resolution.
    pub fn set_algorithm(&mut self, algorithm: SkinningAlgorithm) -> Result<(), Error> {
        self.ensure_not_disposed()?;
        self.config.algorithm = algorithm;
        if self.backend.is_some() {
            self.rebuild()?;
        }
        Ok(())
    }

    pub fn set_tension(&mut self, enabled: bool) -> Result<(), Error> {
        self.ensure_not_disposed()?;
        self.config.tension = enabled;
        if self.backend.is_some() {
            self.rebuild()?;
        }
        Ok(())
    }

    /// Refreshes the palette from `poses` and runs one dispatch.
    pub fn update(&mut self, poses: &[BonePose]) -> Result<(), DispatchError> {
        if self.disposed {
            return Err(DispatchError::Disposed);
        }
        let Some(backend) = self.backend.as_mut() else {
            return Err(DispatchError::NotLoaded);
        };
        let expected = self.skin.bone_count();
        if poses.len() != expected {
            return Err(DispatchError::PoseCountMismatch {
                expected,
                actual: poses.len(),
            });
        }
        self.palette.update(&self.skin.bones, poses);
        backend.dispatch(&self.palette)
    }

    pub fn render(
        &self,
        renderer: &mut dyn FrameRenderer,
        config: &RenderConfig,
    ) -> Result<(), DispatchError> {
        if self.disposed {
            return Err(DispatchError::Disposed);
        }
        let Some(backend) = self.backend.as_ref() else {
            return Err(DispatchError::NotLoaded);
        };
        renderer.draw(backend.frame(), &self.skin, config)
    }

    /// Releases the backend. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.release_backend();
        self.disposed = true;
        log::debug!("skinned instance disposed");
    }

    fn ensure_not_disposed(&self) -> Result<(), Error> {
        if self.disposed {
            return Err(Error::InvalidState {
                message: "instance has been disposed".to_string(),
            });
        }
        Ok(())
    }

    fn release_backend(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.release();
            log::debug!("released {:?} backend", backend.kind());
        }
    }

    fn rebuild(&mut self) -> Result<(), Error> {
        self.release_backend();
        self.skin.validate()?;

        let kind = self.resolve()?;
        let backend = match kind {
            BackendKind::Sequential => self.sequential(),
            BackendKind::Parallel => match self.create_parallel() {
                Ok(backend) => backend,
                Err(err) if self.config.backend == BackendPreference::Auto => {
                    log::warn!("parallel backend failed to initialize, using sequential: {err}");
                    self.resolved = Some(BackendKind::Sequential);
                    self.sequential()
                }
                Err(err) => return Err(err),
            },
        };

        log::info!(
            "loaded {:?} backend ({:?}, tension {})",
            backend.kind(),
            backend.algorithm(),
            backend.tension_enabled()
        );
        self.backend = Some(backend);
        Ok(())
    }

    fn resolve(&mut self) -> Result<BackendKind, Error> {
        match self.config.backend {
            BackendPreference::ForceSequential => Ok(BackendKind::Sequential),
            BackendPreference::ForceParallel => {
                if self.parallel.is_some() && self.probe.supports_parallel_compute() {
                    Ok(BackendKind::Parallel)
                } else {
                    Err(Error::ParallelComputeUnavailable)
                }
            }
            BackendPreference::Auto => {
                if let Some(kind) = self.resolved {
                    return Ok(kind);
                }
                let kind = if self.parallel.is_some() && self.probe.supports_parallel_compute() {
                    BackendKind::Parallel
                } else {
                    BackendKind::Sequential
                };
                log::debug!("auto backend resolved to {kind:?}");
                self.resolved = Some(kind);
                Ok(kind)
            }
        }
    }

    fn sequential(&self) -> Box<dyn SkinningBackend> {
        Box::new(SequentialBackend::new(Arc::clone(&self.skin), &self.config))
    }

    fn create_parallel(&self) -> Result<Box<dyn SkinningBackend>, Error> {
        let Some(factory) = self.parallel.as_ref() else {
            return Err(Error::ParallelComputeUnavailable);
        };
        factory.create(&self.skin, &self.config)
    }
}

impl Drop for SkinnedInstance {
    fn drop(&mut self) {
        self.dispose();
    }
}
