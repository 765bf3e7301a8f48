use crate::{DispatchError, SkinData, SkinningBackend};
use glam::{Vec2, Vec3};

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct DeformedVertex {
    pub position: Vec3,
    pub uv: Vec2,
    /// Edge-length change around the vertex, in `[-1, 1]`. Zero when tension is disabled.
    pub tension: f32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeformedFrame {
    pub vertices: Vec<DeformedVertex>,
}

impl DeformedFrame {
    /// The undeformed mesh, used before the first dispatch completes.
    pub fn from_rest(skin: &SkinData) -> Self {
        Self {
            vertices: skin
                .vertices
                .iter()
                .map(|v| DeformedVertex {
                    position: v.position,
                    uv: v.uv,
                    tension: 0.0,
                })
                .collect(),
        }
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices.iter().map(|v| v.position)
    }
}

/// Most recently completed deformation, wherever it lives.
#[derive(Copy, Clone)]
pub enum Frame<'a> {
    Host(&'a DeformedFrame),
    /// Output stays on the device; renderers downcast through [`SkinningBackend::as_any`].
    Device(&'a dyn SkinningBackend),
}

impl std::fmt::Debug for Frame<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host(frame) => f
                .debug_tuple("Host")
                .field(&frame.vertices.len())
                .finish(),
            Self::Device(backend) => f.debug_tuple("Device").field(&backend.kind()).finish(),
        }
    }
}

/// Per-draw options. Replaces any process-wide shader toggle.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderConfig {
    /// Shade by tension instead of the base color.
    pub tension_debug: bool,
    /// Draw a single submesh instead of all of them.
    pub submesh: Option<usize>,
}

impl RenderConfig {
    pub fn submesh_ranges<'a>(
        &self,
        skin: &'a SkinData,
    ) -> impl Iterator<Item = &'a crate::SubmeshRange> + 'a {
        let only = self.submesh;
        skin.submeshes
            .iter()
            .enumerate()
            .filter(move |(i, _)| only.is_none_or(|s| s == *i))
            .map(|(_, range)| range)
    }
}

pub trait FrameRenderer {
    fn draw(
        &mut self,
        frame: Frame<'_>,
        skin: &SkinData,
        config: &RenderConfig,
    ) -> Result<(), DispatchError>;
}
