use crate::{Error, Influences, MeshTopology, SkinData};
use std::collections::VecDeque;

/// One cluster's slices into [`ClusterAssignment`]'s flat index arrays.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub struct Cluster {
    pub id: u32,
    pub vertex_start: u32,
    pub vertex_len: u32,
    pub triangle_start: u32,
    pub triangle_len: u32,
}

/// Disjoint partition of a mesh's vertices, plus each cluster's incident triangles.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterAssignment {
    pub clusters: Vec<Cluster>,
    pub vertex_indices: Vec<u32>,
    pub triangle_indices: Vec<u32>,
}

impl ClusterAssignment {
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Number of vertices covered by the partition.
    pub fn vertex_count(&self) -> usize {
        self.vertex_indices.len()
    }

    pub fn cluster_vertices(&self, cluster: usize) -> &[u32] {
        self.clusters
            .get(cluster)
            .and_then(|c| {
                let start = c.vertex_start as usize;
                self.vertex_indices.get(start..start + c.vertex_len as usize)
            })
            .unwrap_or(&[])
    }

    pub fn cluster_triangles(&self, cluster: usize) -> &[u32] {
        self.clusters
            .get(cluster)
            .and_then(|c| {
                let start = c.triangle_start as usize;
                self.triangle_indices.get(start..start + c.triangle_len as usize)
            })
            .unwrap_or(&[])
    }
}

/// L2 distance between two bone→weight maps. A bone missing on one side has weight 0.
pub fn weight_distance(a: &Influences, b: &Influences) -> f32 {
    let mut sum = 0.0f32;
    for (bone, wa) in a.iter() {
        let wb = b.iter().find(|&(other, _)| other == bone).map_or(0.0, |(_, w)| w);
        sum += (wa - wb) * (wa - wb);
    }
    for (bone, wb) in b.iter() {
        if !a.iter().any(|(other, _)| other == bone) {
            sum += wb * wb;
        }
    }
    sum.sqrt()
}

/// Breadth-first weight-similarity clustering.
///
/// Each call to `next` grows one cluster and yields the running number of clustered
/// vertices, so callers can report progress or stop early and [`ClusterBuilder::restart`].
pub struct ClusterBuilder<'a> {
    skin: &'a SkinData,
    topology: MeshTopology,
    threshold: f32,
    visited: Vec<bool>,
    triangle_stamp: Vec<u32>,
    queue: VecDeque<u32>,
    next_seed: usize,
    clustered: usize,
    out: ClusterAssignment,
}

impl<'a> ClusterBuilder<'a> {
    pub fn new(skin: &'a SkinData, threshold: f32) -> Result<Self, Error> {
        if skin.influences.is_empty() || skin.influences.len() != skin.vertex_count() {
            return Err(Error::MissingWeights);
        }
        if threshold.is_nan() || threshold < 0.0 {
            return Err(Error::InvalidValue {
                message: format!("weight distance threshold must be >= 0, got {threshold}"),
            });
        }

        let topology = skin.topology();
        Ok(Self {
            skin,
            threshold,
            visited: vec![false; skin.vertex_count()],
            triangle_stamp: vec![0; skin.triangle_count()],
            queue: VecDeque::new(),
            next_seed: 0,
            clustered: 0,
            out: ClusterAssignment::default(),
            topology,
        })
    }

    pub fn restart(&mut self) {
        self.visited.fill(false);
        self.triangle_stamp.fill(0);
        self.queue.clear();
        self.next_seed = 0;
        self.clustered = 0;
        self.out = ClusterAssignment::default();
    }

    pub fn clustered(&self) -> usize {
        self.clustered
    }

    /// Runs the remaining clusters and returns the partition.
    pub fn finish(mut self) -> ClusterAssignment {
        while self.next().is_some() {}
        log::info!(
            "clustered {} vertices into {} clusters (threshold {})",
            self.clustered,
            self.out.len(),
            self.threshold
        );
        self.out
    }

    fn grow(&mut self, seed: usize) {
        let id = self.out.clusters.len() as u32;
        let vertex_start = self.out.vertex_indices.len();
        let skin = self.skin;
        let influences = &skin.influences;

        self.visited[seed] = true;
        self.queue.push_back(seed as u32);
        while let Some(vertex) = self.queue.pop_front() {
            self.out.vertex_indices.push(vertex);
            let here = &influences[vertex as usize];
            for &neighbor in self.topology.neighbors(vertex as usize) {
                let n = neighbor as usize;
                if self.visited[n] {
                    continue;
                }
                if weight_distance(here, &influences[n]) <= self.threshold {
                    self.visited[n] = true;
                    self.queue.push_back(neighbor);
                }
            }
        }

        // Stamps are cluster id + 1 so a zeroed stamp never matches.
        let triangle_start = self.out.triangle_indices.len();
        let stamp = id + 1;
        for &vertex in &self.out.vertex_indices[vertex_start..] {
            for &triangle in self.topology.triangles(vertex as usize) {
                let slot = &mut self.triangle_stamp[triangle as usize];
                if *slot != stamp {
                    *slot = stamp;
                    self.out.triangle_indices.push(triangle);
                }
            }
        }

        let vertex_len = self.out.vertex_indices.len() - vertex_start;
        self.out.clusters.push(Cluster {
            id,
            vertex_start: vertex_start as u32,
            vertex_len: vertex_len as u32,
            triangle_start: triangle_start as u32,
            triangle_len: (self.out.triangle_indices.len() - triangle_start) as u32,
        });
        self.clustered += vertex_len;
    }
}

impl Iterator for ClusterBuilder<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.next_seed < self.visited.len() && self.visited[self.next_seed] {
            self.next_seed += 1;
        }
        if self.next_seed >= self.visited.len() {
            return None;
        }
        self.grow(self.next_seed);
        Some(self.clustered)
    }
}

pub fn build_clusters(skin: &SkinData, threshold: f32) -> Result<ClusterAssignment, Error> {
    Ok(ClusterBuilder::new(skin, threshold)?.finish())
}
