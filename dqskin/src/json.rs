use crate::{
    BoneRest, Cluster, ClusterAssignment, DualQuat, Error, Influences, SKIN_FORMAT_VERSION,
    SkinData, SkinVertex, SubmeshRange,
};
use glam::{Mat4, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Root {
    version: u32,
    vertex_count: usize,
    positions: Vec<[f32; 3]>,
    #[serde(default)]
    uvs: Vec<[f32; 2]>,
    bone_indices: Vec<[u32; 4]>,
    bone_weights: Vec<[f32; 4]>,
    indices: Vec<u32>,
    #[serde(default)]
    submeshes: Vec<SubmeshDef>,
    bones: Vec<BoneRestDef>,
    #[serde(default)]
    clusters: Option<ClustersDef>,
    #[serde(default)]
    centers_of_rotation: Option<Vec<[f32; 3]>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SubmeshDef {
    first_index: usize,
    index_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct BoneRestDef {
    inverse_matrix: [f32; 16],
    inverse_dual_real: [f32; 4],
    inverse_dual_dual: [f32; 4],
    inverse_rotation: [f32; 4],
}

#[derive(Debug, Serialize, Deserialize)]
struct ClustersDef {
    clusters: Vec<Cluster>,
    vertex_indices: Vec<u32>,
    triangle_indices: Vec<u32>,
}

impl SkinData {
    pub fn to_json_string(&self) -> Result<String, Error> {
        let root = Root {
            version: SKIN_FORMAT_VERSION,
            vertex_count: self.vertex_count(),
            positions: self.vertices.iter().map(|v| v.position.to_array()).collect(),
            uvs: self.vertices.iter().map(|v| v.uv.to_array()).collect(),
            bone_indices: self.influences.iter().map(|i| i.bones).collect(),
            bone_weights: self.influences.iter().map(|i| i.weights).collect(),
            indices: self.indices.clone(),
            submeshes: self
                .submeshes
                .iter()
                .map(|s| SubmeshDef {
                    first_index: s.first_index,
                    index_count: s.index_count,
                })
                .collect(),
            bones: self
                .bones
                .iter()
                .map(|b| BoneRestDef {
                    inverse_matrix: b.inverse_matrix.to_cols_array(),
                    inverse_dual_real: b.inverse_dual.real.to_array(),
                    inverse_dual_dual: b.inverse_dual.dual.to_array(),
                    inverse_rotation: b.inverse_rotation.to_array(),
                })
                .collect(),
            clusters: self.clusters.as_ref().map(|c| ClustersDef {
                clusters: c.clusters.clone(),
                vertex_indices: c.vertex_indices.clone(),
                triangle_indices: c.triangle_indices.clone(),
            }),
            centers_of_rotation: self
                .centers_of_rotation
                .as_ref()
                .map(|c| c.iter().map(|p| p.to_array()).collect()),
        };
        serde_json::to_string(&root).map_err(|e| Error::JsonParse {
            message: e.to_string(),
        })
    }

    /// Parses a skin saved by [`SkinData::to_json_string`]. Any per-vertex array whose
    /// length differs from `expected_vertex_count` is rejected as stale.
    pub fn from_json_str(input: &str, expected_vertex_count: usize) -> Result<Self, Error> {
        let root: Root = serde_json::from_str(input).map_err(|e| Error::JsonParse {
            message: e.to_string(),
        })?;

        if root.version != SKIN_FORMAT_VERSION {
            return Err(Error::JsonParse {
                message: format!(
                    "unsupported skin format version {} (expected {SKIN_FORMAT_VERSION})",
                    root.version
                ),
            });
        }
        if root.vertex_count != expected_vertex_count {
            return Err(Error::StaleSkinData {
                array: "vertex_count",
                stored: root.vertex_count,
                expected: expected_vertex_count,
            });
        }
        stale_check("positions", root.positions.len(), expected_vertex_count)?;
        if !root.uvs.is_empty() {
            stale_check("uvs", root.uvs.len(), expected_vertex_count)?;
        }
        stale_check("bone_indices", root.bone_indices.len(), expected_vertex_count)?;
        stale_check("bone_weights", root.bone_weights.len(), expected_vertex_count)?;

        let vertices = root
            .positions
            .iter()
            .enumerate()
            .map(|(i, p)| SkinVertex {
                position: Vec3::from_array(*p),
                uv: root.uvs.get(i).map_or(Vec2::ZERO, |uv| Vec2::from_array(*uv)),
            })
            .collect();
        let influences = root
            .bone_indices
            .iter()
            .zip(&root.bone_weights)
            .map(|(&bones, &weights)| Influences { bones, weights })
            .collect();
        let bones = root
            .bones
            .iter()
            .map(|b| BoneRest {
                inverse_matrix: Mat4::from_cols_array(&b.inverse_matrix),
                inverse_dual: DualQuat::from_parts(
                    Quat::from_array(b.inverse_dual_real),
                    Quat::from_array(b.inverse_dual_dual),
                ),
                inverse_rotation: Quat::from_array(b.inverse_rotation),
            })
            .collect();

        let skin = SkinData {
            vertices,
            influences,
            indices: root.indices,
            submeshes: root
                .submeshes
                .iter()
                .map(|s| SubmeshRange {
                    first_index: s.first_index,
                    index_count: s.index_count,
                })
                .collect(),
            bones,
            clusters: root.clusters.map(|c| ClusterAssignment {
                clusters: c.clusters,
                vertex_indices: c.vertex_indices,
                triangle_indices: c.triangle_indices,
            }),
            centers_of_rotation: root
                .centers_of_rotation
                .map(|c| c.into_iter().map(Vec3::from_array).collect()),
        };
        skin.validate()?;
        Ok(skin)
    }
}

fn stale_check(array: &'static str, stored: usize, expected: usize) -> Result<(), Error> {
    if stored == expected {
        Ok(())
    } else {
        Err(Error::StaleSkinData {
            array,
            stored,
            expected,
        })
    }
}
