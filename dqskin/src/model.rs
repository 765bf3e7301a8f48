use crate::{CorOutcome, DualQuat, Error, MeshTopology, precompute::ClusterAssignment};
use glam::{Mat4, Quat, Vec2, Vec3};

/// Maximum bone influences per vertex.
pub const MAX_INFLUENCES: usize = 4;

const WEIGHT_SUM_TOLERANCE: f32 = 1.0e-3;
const REST_FORM_TOLERANCE: f32 = 1.0e-4;

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct SkinVertex {
    pub position: Vec3,
    pub uv: Vec2,
}

/// Up to four `(bone, weight)` pairs, heaviest first. Unused slots carry weight 0.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct Influences {
    pub bones: [u32; MAX_INFLUENCES],
    pub weights: [f32; MAX_INFLUENCES],
}

impl Influences {
    pub fn single(bone: u32) -> Self {
        Self {
            bones: [bone, 0, 0, 0],
            weights: [1.0, 0.0, 0.0, 0.0],
        }
    }

    /// Builds influences from arbitrary pairs: drops zero weights, keeps the four heaviest,
    /// and renormalizes them to sum to 1.
    pub fn from_pairs(pairs: &[(u32, f32)]) -> Result<Self, Error> {
        let mut sorted: Vec<(u32, f32)> = pairs
            .iter()
            .copied()
            .filter(|&(_, w)| w > 0.0 && w.is_finite())
            .collect();
        sorted.sort_by(|a, b| b.1.total_cmp(&a.1));
        sorted.truncate(MAX_INFLUENCES);

        let sum: f32 = sorted.iter().map(|&(_, w)| w).sum();
        if sum <= 0.0 {
            return Err(Error::InvalidSkin {
                message: "vertex has no positive bone weight".to_string(),
            });
        }

        let mut out = Self::default();
        for (slot, &(bone, weight)) in sorted.iter().enumerate() {
            out.bones[slot] = bone;
            out.weights[slot] = weight / sum;
        }
        Ok(out)
    }

    /// Iterates the non-zero `(bone, weight)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.bones
            .iter()
            .copied()
            .zip(self.weights.iter().copied())
            .filter(|&(_, w)| w > 0.0)
    }

    pub fn count(&self) -> usize {
        self.weights.iter().filter(|&&w| w > 0.0).count()
    }

    pub fn weight_sum(&self) -> f32 {
        self.weights.iter().sum()
    }

    /// Slot index of the heaviest influence.
    pub fn dominant_slot(&self) -> usize {
        let mut best = 0usize;
        for slot in 1..MAX_INFLUENCES {
            if self.weights[slot] > self.weights[best] {
                best = slot;
            }
        }
        best
    }
}

/// Rest-pose inverse of one bone, kept in the three forms the transfer functions consume.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoneRest {
    pub inverse_matrix: Mat4,
    pub inverse_dual: DualQuat,
    pub inverse_rotation: Quat,
}

impl Default for BoneRest {
    fn default() -> Self {
        Self {
            inverse_matrix: Mat4::IDENTITY,
            inverse_dual: DualQuat::IDENTITY,
            inverse_rotation: Quat::IDENTITY,
        }
    }
}

impl BoneRest {
    /// From the bone's world transform at bind time.
    pub fn from_bind(rotation: Quat, translation: Vec3) -> Self {
        let rotation = rotation.normalize();
        Self {
            inverse_matrix: Mat4::from_rotation_translation(rotation, translation).inverse(),
            inverse_dual: DualQuat::from_rigid(rotation, translation).inverse(),
            inverse_rotation: rotation.conjugate(),
        }
    }

    pub fn from_pose(pose: &BonePose) -> Self {
        Self::from_bind(pose.rotation, pose.matrix.w_axis.truncate())
    }

    /// Whether the matrix and dual-quaternion forms describe the same transform.
    ///
    /// Rotation columns are compared against `tolerance` directly; the translation column
    /// against `tolerance * max(1, |t|)`, since f32 rounding there grows with distance.
    pub fn is_consistent(&self, tolerance: f32) -> bool {
        let from_dual = self.inverse_dual.to_matrix();
        let m = &self.inverse_matrix;
        let rotation_agrees = from_dual.x_axis.abs_diff_eq(m.x_axis, tolerance)
            && from_dual.y_axis.abs_diff_eq(m.y_axis, tolerance)
            && from_dual.z_axis.abs_diff_eq(m.z_axis, tolerance);
        let translation_tolerance = tolerance * m.w_axis.truncate().length().max(1.0);
        rotation_agrees && from_dual.w_axis.abs_diff_eq(m.w_axis, translation_tolerance)
    }
}

/// Current world transform of one bone.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BonePose {
    pub matrix: Mat4,
    pub dual: DualQuat,
    pub rotation: Quat,
}

impl Default for BonePose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl BonePose {
    pub const IDENTITY: Self = Self {
        matrix: Mat4::IDENTITY,
        dual: DualQuat::IDENTITY,
        rotation: Quat::IDENTITY,
    };

    pub fn from_rigid(rotation: Quat, translation: Vec3) -> Self {
        let rotation = rotation.normalize();
        Self {
            matrix: Mat4::from_rotation_translation(rotation, translation),
            dual: DualQuat::from_rigid(rotation, translation),
            rotation,
        }
    }

    pub fn translation(&self) -> Vec3 {
        self.matrix.w_axis.truncate()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct SubmeshRange {
    pub first_index: usize,
    pub index_count: usize,
}

impl SubmeshRange {
    /// One past the last index, or `None` when the range overflows.
    pub fn end(&self) -> Option<usize> {
        self.first_index.checked_add(self.index_count)
    }
}

/// Raw mesh as handed over by an asset loader.
#[derive(Clone, Debug, Default)]
pub struct MeshSource {
    pub positions: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
    pub submeshes: Vec<SubmeshRange>,
    pub bone_indices: Vec<[u32; MAX_INFLUENCES]>,
    pub bone_weights: Vec<[f32; MAX_INFLUENCES]>,
}

/// Per-mesh skin asset: immutable rest data consumed by every backend.
#[derive(Clone, Debug, Default)]
pub struct SkinData {
    pub vertices: Vec<SkinVertex>,
    pub influences: Vec<Influences>,
    pub indices: Vec<u32>,
    pub submeshes: Vec<SubmeshRange>,
    pub bones: Vec<BoneRest>,
    pub clusters: Option<ClusterAssignment>,
    pub centers_of_rotation: Option<Vec<Vec3>>,
}

impl SkinData {
    pub fn from_mesh(mesh: MeshSource, bind_poses: &[BonePose]) -> Result<Self, Error> {
        let vertex_count = mesh.positions.len();
        if vertex_count == 0 {
            return Err(Error::MissingResource { what: "mesh" });
        }
        if mesh.bone_indices.len() != vertex_count || mesh.bone_weights.len() != vertex_count
        {
            return Err(Error::MissingWeights);
        }
        if !mesh.uvs.is_empty() && mesh.uvs.len() != vertex_count {
            return Err(Error::InvalidSkin {
                message: format!(
                    "{} uvs for {} vertices",
                    mesh.uvs.len(),
                    vertex_count
                ),
            });
        }

        let vertices = mesh
            .positions
            .iter()
            .enumerate()
            .map(|(i, &position)| SkinVertex {
                position,
                uv: mesh.uvs.get(i).copied().unwrap_or(Vec2::ZERO),
            })
            .collect();

        let mut influences = Vec::with_capacity(vertex_count);
        for (bones, weights) in mesh.bone_indices.iter().zip(&mesh.bone_weights) {
            let pairs: Vec<(u32, f32)> = bones.iter().copied().zip(weights.iter().copied()).collect();
            influences.push(Influences::from_pairs(&pairs)?);
        }

        let submeshes = if mesh.submeshes.is_empty() {
            vec![SubmeshRange {
                first_index: 0,
                index_count: mesh.indices.len(),
            }]
        } else {
            mesh.submeshes
        };

        let skin = Self {
            vertices,
            influences,
            indices: mesh.indices,
            submeshes,
            bones: bind_poses.iter().map(BoneRest::from_pose).collect(),
            clusters: None,
            centers_of_rotation: None,
        };
        skin.validate()?;

        let histogram = skin.influence_histogram();
        log::debug!(
            "skin loaded: {} vertices, {} triangles, {} bones, influences 1/2/3/4 = {:?}",
            skin.vertex_count(),
            skin.triangle_count(),
            skin.bone_count(),
            histogram
        );
        Ok(skin)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangle(&self, triangle: usize) -> Option<[u32; 3]> {
        let base = triangle.checked_mul(3)?;
        let tri = self.indices.get(base..base + 3)?;
        Some([tri[0], tri[1], tri[2]])
    }

    /// Number of vertices using exactly 1, 2, 3 and 4 influences.
    pub fn influence_histogram(&self) -> [usize; MAX_INFLUENCES] {
        let mut out = [0usize; MAX_INFLUENCES];
        for influence in &self.influences {
            let count = influence.count();
            if count > 0 {
                out[count - 1] += 1;
            }
        }
        out
    }

    pub fn topology(&self) -> MeshTopology {
        MeshTopology::build(self)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let vertex_count = self.vertex_count();
        if vertex_count == 0 {
            return Err(Error::MissingResource { what: "mesh" });
        }
        if self.bones.is_empty() {
            return Err(Error::MissingResource { what: "bones" });
        }
        self.check_fresh(vertex_count)?;

        if self.indices.len() % 3 != 0 {
            return Err(Error::InvalidSkin {
                message: format!("index count {} is not a multiple of 3", self.indices.len()),
            });
        }
        if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(Error::InvalidSkin {
                message: format!("index {index} out of range for {vertex_count} vertices"),
            });
        }
        for range in &self.submeshes {
            let end = range.end().ok_or_else(|| Error::InvalidSkin {
                message: format!(
                    "submesh range {} + {} overflows",
                    range.first_index, range.index_count
                ),
            })?;
            if end > self.indices.len() {
                return Err(Error::InvalidSkin {
                    message: format!(
                        "submesh range {}..{end} exceeds {} indices",
                        range.first_index,
                        self.indices.len()
                    ),
                });
            }
        }

        let bone_count = self.bone_count();
        for (vertex, influence) in self.influences.iter().enumerate() {
            for (bone, _) in influence.iter() {
                if bone as usize >= bone_count {
                    return Err(Error::InvalidBoneIndex {
                        vertex,
                        bone,
                        bone_count,
                    });
                }
            }
            if let Some(&weight) = influence
                .weights
                .iter()
                .find(|w| !w.is_finite() || **w < 0.0)
            {
                return Err(Error::InvalidSkin {
                    message: format!("vertex {vertex} has weight {weight}"),
                });
            }
            let sum = influence.weight_sum();
            if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
                return Err(Error::InvalidSkin {
                    message: format!("vertex {vertex} weights sum to {sum}"),
                });
            }
        }

        for (bone, rest) in self.bones.iter().enumerate() {
            if !rest.is_consistent(REST_FORM_TOLERANCE) {
                return Err(Error::InvalidSkin {
                    message: format!("bone {bone} rest matrix and dual quaternion disagree"),
                });
            }
        }
        Ok(())
    }

    /// Rejects persisted per-vertex arrays that were built for a different vertex count.
    pub fn check_fresh(&self, vertex_count: usize) -> Result<(), Error> {
        let check = |array: &'static str, stored: usize| {
            if stored == vertex_count {
                Ok(())
            } else {
                Err(Error::StaleSkinData {
                    array,
                    stored,
                    expected: vertex_count,
                })
            }
        };

        check("vertices", self.vertices.len())?;
        check("influences", self.influences.len())?;
        if let Some(clusters) = &self.clusters {
            check("clusters", clusters.vertex_count())?;
        }
        if let Some(centers) = &self.centers_of_rotation {
            check("centers_of_rotation", centers.len())?;
        }
        Ok(())
    }

    /// Installs precomputed centers of rotation. Partial outcomes are refused.
    pub fn apply_centers(&mut self, outcome: CorOutcome) -> Result<(), Error> {
        if !outcome.is_complete() {
            return Err(Error::PartialPrecompute {
                failed_workers: outcome.failed_workers,
            });
        }
        if outcome.centers.len() != self.vertex_count() {
            return Err(Error::StaleSkinData {
                array: "centers_of_rotation",
                stored: outcome.centers.len(),
                expected: self.vertex_count(),
            });
        }
        self.centers_of_rotation = Some(outcome.centers);
        Ok(())
    }
}
