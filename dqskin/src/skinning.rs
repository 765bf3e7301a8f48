//! Per-vertex skinning transfer functions.
//!
//! Every function maps a rest-space position through a [`BonePalette`], which already folds
//! each bone's inverse rest transform into its current pose.

use crate::{BonePose, BoneRest, DualQuat, Influences, MeshTopology, SkinData};
use glam::{Mat4, Quat, Vec3, Vec4};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub enum SkinningAlgorithm {
    #[default]
    Linear,
    DualQuaternion,
    OptimizedCenterOfRotation,
}

impl SkinningAlgorithm {
    /// The algorithm a backend actually runs for `skin`. Center-of-rotation skinning
    /// degrades to linear blending when the skin carries no centers.
    pub fn effective_for(self, skin: &SkinData) -> Self {
        match self {
            Self::OptimizedCenterOfRotation if skin.centers_of_rotation.is_none() => {
                log::warn!(
                    "center-of-rotation skinning requested without precomputed centers; using linear blend"
                );
                Self::Linear
            }
            other => other,
        }
    }
}

/// `pose ∘ inverse_rest` for one bone.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SkinTransform {
    pub matrix: Mat4,
    pub dual: DualQuat,
    pub rotation: Quat,
}

impl Default for SkinTransform {
    fn default() -> Self {
        Self {
            matrix: Mat4::IDENTITY,
            dual: DualQuat::IDENTITY,
            rotation: Quat::IDENTITY,
        }
    }
}

impl SkinTransform {
    pub fn new(rest: &BoneRest, pose: &BonePose) -> Self {
        Self {
            matrix: pose.matrix * rest.inverse_matrix,
            dual: DualQuat::compose(&pose.dual, &rest.inverse_dual),
            rotation: (pose.rotation * rest.inverse_rotation).normalize(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BonePalette {
    transforms: Vec<SkinTransform>,
}

impl BonePalette {
    pub fn identity(bone_count: usize) -> Self {
        Self {
            transforms: vec![SkinTransform::default(); bone_count],
        }
    }

    pub fn from_poses(rest: &[BoneRest], poses: &[BonePose]) -> Self {
        let mut out = Self::default();
        out.update(rest, poses);
        out
    }

    /// Rebuilds the palette in place. Extra poses or rests beyond the shorter slice are ignored.
    pub fn update(&mut self, rest: &[BoneRest], poses: &[BonePose]) {
        self.transforms.clear();
        self.transforms.extend(
            rest.iter()
                .zip(poses)
                .map(|(rest, pose)| SkinTransform::new(rest, pose)),
        );
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn get(&self, bone: usize) -> Option<&SkinTransform> {
        self.transforms.get(bone)
    }

    pub fn as_slice(&self) -> &[SkinTransform] {
        &self.transforms
    }
}

pub fn linear_blend(position: Vec3, influences: &Influences, palette: &[SkinTransform]) -> Vec3 {
    blended_matrix(influences, palette).transform_point3(position)
}

pub fn dual_quaternion_blend(
    position: Vec3,
    influences: &Influences,
    palette: &[SkinTransform],
) -> Vec3 {
    let reference = palette
        .get(influences.bones[influences.dominant_slot()] as usize)
        .map(|t| t.dual.real)
        .unwrap_or(Quat::IDENTITY);

    let mut sum = DualQuat::ZERO;
    for (bone, weight) in influences.iter() {
        let Some(transform) = palette.get(bone as usize) else {
            continue;
        };
        let weight = if transform.dual.real.dot(reference) < 0.0 {
            -weight
        } else {
            weight
        };
        sum.add_scaled(&transform.dual, weight);
    }
    sum.normalize().apply(position)
}

/// Rotation is the sign-aligned quaternion blend; translation is chosen so the center of
/// rotation lands where linear blending would put it.
pub fn optimized_center_of_rotation(
    position: Vec3,
    influences: &Influences,
    center: Vec3,
    palette: &[SkinTransform],
) -> Vec3 {
    let reference = palette
        .get(influences.bones[influences.dominant_slot()] as usize)
        .map(|t| t.rotation)
        .unwrap_or(Quat::IDENTITY);

    let mut rotation = Vec4::ZERO;
    for (bone, weight) in influences.iter() {
        let Some(transform) = palette.get(bone as usize) else {
            continue;
        };
        let signed = if transform.rotation.dot(reference) < 0.0 {
            -weight
        } else {
            weight
        };
        rotation += Vec4::from(transform.rotation) * signed;
    }
    let rotation = if rotation.length_squared() <= f32::EPSILON {
        Quat::IDENTITY
    } else {
        Quat::from_vec4(rotation.normalize())
    };

    let moved_center = blended_matrix(influences, palette).transform_point3(center);
    let translation = moved_center - rotation * center;
    rotation * position + translation
}

/// Deforms one vertex. `center` is ignored by everything but center-of-rotation skinning,
/// which falls back to linear blending when it is `None`.
pub fn skin_vertex(
    algorithm: SkinningAlgorithm,
    position: Vec3,
    influences: &Influences,
    center: Option<Vec3>,
    palette: &[SkinTransform],
) -> Vec3 {
    match (algorithm, center) {
        (SkinningAlgorithm::Linear, _) => linear_blend(position, influences, palette),
        (SkinningAlgorithm::DualQuaternion, _) => {
            dual_quaternion_blend(position, influences, palette)
        }
        (SkinningAlgorithm::OptimizedCenterOfRotation, Some(center)) => {
            optimized_center_of_rotation(position, influences, center, palette)
        }
        (SkinningAlgorithm::OptimizedCenterOfRotation, None) => {
            linear_blend(position, influences, palette)
        }
    }
}

/// Per-vertex edge-length change. Positive values mean the vertex's edges are compressed,
/// negative values mean stretched.
pub fn compute_tension(topology: &MeshTopology, positions: &[Vec3], out: &mut [f32]) {
    for (vertex, slot) in out.iter_mut().enumerate() {
        let Some(&here) = positions.get(vertex) else {
            *slot = 0.0;
            continue;
        };

        let mut sum = 0.0f32;
        let mut edges = 0u32;
        for (&neighbor, &rest) in topology
            .neighbors(vertex)
            .iter()
            .zip(topology.rest_lengths(vertex))
        {
            if rest <= f32::EPSILON {
                continue;
            }
            let Some(&there) = positions.get(neighbor as usize) else {
                continue;
            };
            sum += 1.0 - here.distance(there) / rest;
            edges += 1;
        }

        *slot = if edges == 0 {
            0.0
        } else {
            (sum / edges as f32).clamp(-1.0, 1.0)
        };
    }
}

fn blended_matrix(influences: &Influences, palette: &[SkinTransform]) -> Mat4 {
    let mut out = Mat4::ZERO;
    for (bone, weight) in influences.iter() {
        if let Some(transform) = palette.get(bone as usize) {
            out += transform.matrix * weight;
        }
    }
    out
}
