use crate::BackendKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("parallel compute was forced but the device reports no compute capability")]
    ParallelComputeUnavailable,

    #[error("failed to initialize {backend:?} backend: {message}")]
    BackendInit {
        backend: BackendKind,
        message: String,
    },

    #[error("missing required resource: {what}")]
    MissingResource { what: &'static str },

    #[error("invalid skin data: {message}")]
    InvalidSkin { message: String },

    #[error("vertex {vertex} references bone {bone} but the skin has {bone_count} bones")]
    InvalidBoneIndex {
        vertex: usize,
        bone: u32,
        bone_count: usize,
    },

    #[error("clustering requires per-vertex skin weights")]
    MissingWeights,

    #[error("center-of-rotation estimation requires a prior cluster pass")]
    MissingClusters,

    #[error("stale skin data: '{array}' holds {stored} entries but the mesh has {expected} vertices")]
    StaleSkinData {
        array: &'static str,
        stored: usize,
        expected: usize,
    },

    #[error("center-of-rotation precompute is partial: {failed_workers} worker(s) failed")]
    PartialPrecompute { failed_workers: usize },

    #[error("invalid state: {message}")]
    InvalidState { message: String },

    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    #[cfg(feature = "json")]
    #[error("failed to parse skin JSON: {message}")]
    JsonParse { message: String },

    #[cfg(feature = "binary")]
    #[error("failed to parse skin binary: {message}")]
    BinaryParse { message: String },
}

/// Per-frame failures. These never abort the caller; they are returned so the caller can
/// decide whether to reload onto another backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no backend is loaded")]
    NotLoaded,

    #[error("instance has been disposed")]
    Disposed,

    #[error("expected {expected} bone poses, got {actual}")]
    PoseCountMismatch { expected: usize, actual: usize },

    #[error("compute device lost: {message}")]
    DeviceLost { message: String },

    #[error("compute device error: {message}")]
    Device { message: String },
}
