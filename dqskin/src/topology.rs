use crate::SkinData;

/// Compressed vertex adjacency of a triangle mesh.
///
/// `neighbors` and `rest_lengths` share the same offsets: entry `k` of a vertex's neighbor
/// slice is the rest length of the edge to that neighbor.
#[derive(Clone, Debug, Default)]
pub struct MeshTopology {
    pub neighbor_offsets: Vec<u32>,
    pub neighbors: Vec<u32>,
    pub rest_lengths: Vec<f32>,
    pub triangle_offsets: Vec<u32>,
    pub vertex_triangles: Vec<u32>,
}

impl MeshTopology {
    pub fn build(skin: &SkinData) -> Self {
        let vertex_count = skin.vertex_count();
        let triangle_count = skin.triangle_count();

        let mut edges: Vec<(u32, u32)> = Vec::with_capacity(triangle_count * 6);
        let mut incidences: Vec<(u32, u32)> = Vec::with_capacity(triangle_count * 3);
        for triangle in 0..triangle_count {
            let Some(tri) = skin.triangle(triangle) else {
                break;
            };
            if tri.iter().any(|&i| i as usize >= vertex_count) {
                continue;
            }
            for corner in 0..3 {
                let a = tri[corner];
                let b = tri[(corner + 1) % 3];
                incidences.push((a, triangle as u32));
                if a != b {
                    edges.push((a, b));
                    edges.push((b, a));
                }
            }
        }
        edges.sort_unstable();
        edges.dedup();
        incidences.sort_unstable();
        incidences.dedup();

        let neighbor_offsets = offsets_from_sorted(vertex_count, &edges);
        let neighbors: Vec<u32> = edges.iter().map(|e| e.1).collect();
        let rest_lengths = edges
            .iter()
            .map(|&(a, b)| {
                skin.vertices[a as usize]
                    .position
                    .distance(skin.vertices[b as usize].position)
            })
            .collect();

        let triangle_offsets = offsets_from_sorted(vertex_count, &incidences);
        let vertex_triangles = incidences.iter().map(|e| e.1).collect();

        Self {
            neighbor_offsets,
            neighbors,
            rest_lengths,
            triangle_offsets,
            vertex_triangles,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.neighbor_offsets.len().saturating_sub(1)
    }

    pub fn neighbors(&self, vertex: usize) -> &[u32] {
        let (start, end) = span(&self.neighbor_offsets, vertex);
        &self.neighbors[start..end]
    }

    pub fn rest_lengths(&self, vertex: usize) -> &[f32] {
        let (start, end) = span(&self.neighbor_offsets, vertex);
        &self.rest_lengths[start..end]
    }

    pub fn triangles(&self, vertex: usize) -> &[u32] {
        let (start, end) = span(&self.triangle_offsets, vertex);
        &self.vertex_triangles[start..end]
    }
}

fn span(offsets: &[u32], vertex: usize) -> (usize, usize) {
    match (offsets.get(vertex), offsets.get(vertex + 1)) {
        (Some(&start), Some(&end)) => (start as usize, end as usize),
        _ => (0, 0),
    }
}

// `pairs` must be sorted by key.
fn offsets_from_sorted(vertex_count: usize, pairs: &[(u32, u32)]) -> Vec<u32> {
    let mut offsets = vec![0u32; vertex_count + 1];
    for &(key, _) in pairs {
        if (key as usize) < vertex_count {
            offsets[key as usize + 1] += 1;
        }
    }
    for i in 0..vertex_count {
        offsets[i + 1] += offsets[i];
    }
    offsets
}
