//! Compact binary skin format.
//!
//! Layout (big-endian): `"DQSK"`, format version, vertex count, bone count, index count,
//! submesh count, a flags byte, then the per-vertex, index, submesh and bone arrays,
//! followed by the optional cluster and center-of-rotation sections.

use crate::{
    BoneRest, Cluster, ClusterAssignment, DualQuat, Error, Influences, SKIN_FORMAT_MAGIC,
    SKIN_FORMAT_VERSION, SkinData, SkinVertex, SubmeshRange,
};
use byteorder::{BigEndian, ByteOrder};
use glam::{Mat4, Quat, Vec2, Vec3};

const FLAG_CLUSTERS: u8 = 1 << 0;
const FLAG_CENTERS: u8 = 1 << 1;

#[derive(Clone, Debug)]
struct BinaryInput<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> BinaryInput<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < len {
            return Err(Error::BinaryParse {
                message: "unexpected EOF".to_string(),
            });
        }
        let out = &self.bytes[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn read_u32_be(&mut self) -> Result<u32, Error> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    fn read_len(&mut self) -> Result<usize, Error> {
        Ok(self.read_u32_be()? as usize)
    }

    fn read_f32_be(&mut self) -> Result<f32, Error> {
        Ok(BigEndian::read_f32(self.take(4)?))
    }

    fn read_f32s<const N: usize>(&mut self) -> Result<[f32; N], Error> {
        let mut out = [0.0f32; N];
        for v in &mut out {
            *v = self.read_f32_be()?;
        }
        Ok(out)
    }

    fn read_u32s<const N: usize>(&mut self) -> Result<[u32; N], Error> {
        let mut out = [0u32; N];
        for v in &mut out {
            *v = self.read_u32_be()?;
        }
        Ok(out)
    }

    /// Rejects counts that cannot fit in the remaining input before anything is allocated.
    fn expect_items(&self, count: usize, item_size: usize, what: &str) -> Result<(), Error> {
        match count.checked_mul(item_size) {
            Some(bytes) if bytes <= self.remaining() => Ok(()),
            _ => Err(Error::BinaryParse {
                message: format!("{what} count {count} exceeds remaining input"),
            }),
        }
    }
}

#[derive(Default)]
struct BinaryOutput {
    bytes: Vec<u8>,
}

impl BinaryOutput {
    fn write_u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    fn write_u32_be(&mut self, v: u32) {
        let mut buf = [0u8; 4];
        BigEndian::write_u32(&mut buf, v);
        self.bytes.extend_from_slice(&buf);
    }

    fn write_len(&mut self, len: usize) {
        self.write_u32_be(len as u32);
    }

    fn write_f32_be(&mut self, v: f32) {
        let mut buf = [0u8; 4];
        BigEndian::write_f32(&mut buf, v);
        self.bytes.extend_from_slice(&buf);
    }

    fn write_f32s(&mut self, values: &[f32]) {
        for &v in values {
            self.write_f32_be(v);
        }
    }

    fn write_u32s(&mut self, values: &[u32]) {
        for &v in values {
            self.write_u32_be(v);
        }
    }
}

impl SkinData {
    pub fn to_skin_bytes(&self) -> Vec<u8> {
        let mut out = BinaryOutput::default();
        out.bytes.extend_from_slice(&SKIN_FORMAT_MAGIC);
        out.write_u32_be(SKIN_FORMAT_VERSION);
        out.write_len(self.vertex_count());
        out.write_len(self.bone_count());
        out.write_len(self.indices.len());
        out.write_len(self.submeshes.len());

        let mut flags = 0u8;
        if self.clusters.is_some() {
            flags |= FLAG_CLUSTERS;
        }
        if self.centers_of_rotation.is_some() {
            flags |= FLAG_CENTERS;
        }
        out.write_u8(flags);

        for (vertex, influences) in self.vertices.iter().zip(&self.influences) {
            out.write_f32s(&vertex.position.to_array());
            out.write_f32s(&vertex.uv.to_array());
            out.write_u32s(&influences.bones);
            out.write_f32s(&influences.weights);
        }
        out.write_u32s(&self.indices);
        for range in &self.submeshes {
            out.write_len(range.first_index);
            out.write_len(range.index_count);
        }
        for bone in &self.bones {
            out.write_f32s(&bone.inverse_matrix.to_cols_array());
            out.write_f32s(&bone.inverse_dual.real.to_array());
            out.write_f32s(&bone.inverse_dual.dual.to_array());
            out.write_f32s(&bone.inverse_rotation.to_array());
        }

        if let Some(clusters) = &self.clusters {
            out.write_len(clusters.clusters.len());
            for c in &clusters.clusters {
                out.write_u32s(&[
                    c.id,
                    c.vertex_start,
                    c.vertex_len,
                    c.triangle_start,
                    c.triangle_len,
                ]);
            }
            out.write_len(clusters.vertex_indices.len());
            out.write_u32s(&clusters.vertex_indices);
            out.write_len(clusters.triangle_indices.len());
            out.write_u32s(&clusters.triangle_indices);
        }
        if let Some(centers) = &self.centers_of_rotation {
            out.write_len(centers.len());
            for c in centers {
                out.write_f32s(&c.to_array());
            }
        }
        out.bytes
    }

    /// Parses bytes written by [`SkinData::to_skin_bytes`]. A stored vertex count or
    /// per-vertex array that differs from `expected_vertex_count` is rejected as stale.
    pub fn from_skin_bytes(bytes: &[u8], expected_vertex_count: usize) -> Result<Self, Error> {
        let mut input = BinaryInput::new(bytes);
        if input.take(4)? != SKIN_FORMAT_MAGIC.as_slice() {
            return Err(Error::BinaryParse {
                message: "missing DQSK header".to_string(),
            });
        }
        let version = input.read_u32_be()?;
        if version != SKIN_FORMAT_VERSION {
            return Err(Error::BinaryParse {
                message: format!(
                    "unsupported skin format version {version} (expected {SKIN_FORMAT_VERSION})"
                ),
            });
        }

        let vertex_count = input.read_len()?;
        if vertex_count != expected_vertex_count {
            return Err(Error::StaleSkinData {
                array: "vertex_count",
                stored: vertex_count,
                expected: expected_vertex_count,
            });
        }
        let bone_count = input.read_len()?;
        let index_count = input.read_len()?;
        let submesh_count = input.read_len()?;
        let flags = input.read_u8()?;

        input.expect_items(vertex_count, 13 * 4, "vertex")?;
        let mut vertices = Vec::with_capacity(vertex_count);
        let mut influences = Vec::with_capacity(vertex_count);
        for _ in 0..vertex_count {
            let position = Vec3::from_array(input.read_f32s::<3>()?);
            let uv = Vec2::from_array(input.read_f32s::<2>()?);
            vertices.push(SkinVertex { position, uv });
            influences.push(Influences {
                bones: input.read_u32s::<4>()?,
                weights: input.read_f32s::<4>()?,
            });
        }

        input.expect_items(index_count, 4, "index")?;
        let mut indices = Vec::with_capacity(index_count);
        for _ in 0..index_count {
            indices.push(input.read_u32_be()?);
        }

        input.expect_items(submesh_count, 8, "submesh")?;
        let mut submeshes = Vec::with_capacity(submesh_count);
        for _ in 0..submesh_count {
            submeshes.push(SubmeshRange {
                first_index: input.read_len()?,
                index_count: input.read_len()?,
            });
        }

        input.expect_items(bone_count, 28 * 4, "bone")?;
        let mut bones = Vec::with_capacity(bone_count);
        for _ in 0..bone_count {
            let matrix = input.read_f32s::<16>()?;
            let real = input.read_f32s::<4>()?;
            let dual = input.read_f32s::<4>()?;
            let rotation = input.read_f32s::<4>()?;
            bones.push(BoneRest {
                inverse_matrix: Mat4::from_cols_array(&matrix),
                inverse_dual: DualQuat::from_parts(Quat::from_array(real), Quat::from_array(dual)),
                inverse_rotation: Quat::from_array(rotation),
            });
        }

        let clusters = if flags & FLAG_CLUSTERS != 0 {
            Some(read_clusters(&mut input)?)
        } else {
            None
        };
        let centers_of_rotation = if flags & FLAG_CENTERS != 0 {
            let count = input.read_len()?;
            input.expect_items(count, 12, "center")?;
            let mut centers = Vec::with_capacity(count);
            for _ in 0..count {
                centers.push(Vec3::from_array(input.read_f32s::<3>()?));
            }
            Some(centers)
        } else {
            None
        };

        if input.remaining() != 0 {
            return Err(Error::BinaryParse {
                message: format!("{} trailing bytes", input.remaining()),
            });
        }

        let skin = SkinData {
            vertices,
            influences,
            indices,
            submeshes,
            bones,
            clusters,
            centers_of_rotation,
        };
        skin.validate()?;
        Ok(skin)
    }
}

fn read_clusters(input: &mut BinaryInput<'_>) -> Result<ClusterAssignment, Error> {
    let count = input.read_len()?;
    input.expect_items(count, 20, "cluster")?;
    let mut clusters = Vec::with_capacity(count);
    for _ in 0..count {
        let [id, vertex_start, vertex_len, triangle_start, triangle_len] =
            input.read_u32s::<5>()?;
        clusters.push(Cluster {
            id,
            vertex_start,
            vertex_len,
            triangle_start,
            triangle_len,
        });
    }

    let vertex_indices = read_index_list(input, "cluster vertex")?;
    let triangle_indices = read_index_list(input, "cluster triangle")?;

    Ok(ClusterAssignment {
        clusters,
        vertex_indices,
        triangle_indices,
    })
}

fn read_index_list(input: &mut BinaryInput<'_>, what: &str) -> Result<Vec<u32>, Error> {
    let len = input.read_len()?;
    input.expect_items(len, 4, what)?;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(input.read_u32_be()?);
    }
    Ok(out)
}
