use crate::{Error, Influences, SkinData};
use glam::Vec3;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::thread::JoinHandle;

/// Tuning for both precompute phases.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "json", serde(default))]
pub struct CorSettings {
    pub weight_distance_threshold: f32,
    pub worker_count: usize,
    /// σ of the similarity kernel.
    pub similarity_kernel: f32,
    pub similarity_threshold: f32,
}

impl Default for CorSettings {
    fn default() -> Self {
        Self {
            weight_distance_threshold: 1.0,
            worker_count: 8,
            similarity_kernel: 0.5,
            similarity_threshold: 0.05,
        }
    }
}

impl CorSettings {
    pub fn validate(&self) -> Result<(), Error> {
        if self.worker_count == 0 {
            return Err(Error::InvalidValue {
                message: "worker count must be at least 1".to_string(),
            });
        }
        if self.similarity_kernel.is_nan() || self.similarity_kernel <= 0.0 {
            return Err(Error::InvalidValue {
                message: format!(
                    "similarity kernel must be > 0, got {}",
                    self.similarity_kernel
                ),
            });
        }
        Ok(())
    }
}

/// Bone→weight map of a triangle: the three corners merged, each weighted by 1/3.
pub fn merged_triangle_weights(corners: [&Influences; 3]) -> Vec<(u32, f32)> {
    let mut merged: Vec<(u32, f32)> = Vec::with_capacity(12);
    for corner in corners {
        for (bone, weight) in corner.iter() {
            match merged.iter_mut().find(|(b, _)| *b == bone) {
                Some((_, w)) => *w += weight / 3.0,
                None => merged.push((bone, weight / 3.0)),
            }
        }
    }
    merged
}

/// Gaussian similarity of two weight maps over their shared bones:
/// `Σ_{j<k} aⱼbⱼaₖbₖ · exp(-(aⱼbₖ - aₖbⱼ)² / σ²)`. Zero when fewer than two bones are shared.
pub fn weight_similarity(a: &[(u32, f32)], b: &[(u32, f32)], kernel: f32) -> f32 {
    let mut shared: [(f32, f32); 12] = [(0.0, 0.0); 12];
    let mut count = 0usize;
    for &(bone, wa) in a {
        if count == shared.len() {
            break;
        }
        if let Some(&(_, wb)) = b.iter().find(|(other, _)| *other == bone) {
            shared[count] = (wa, wb);
            count += 1;
        }
    }

    let sigma_sq = kernel * kernel;
    let mut sum = 0.0f32;
    for j in 0..count {
        for k in (j + 1)..count {
            let (aj, bj) = shared[j];
            let (ak, bk) = shared[k];
            let cross = aj * bk - ak * bj;
            sum += aj * bj * ak * bk * (-(cross * cross) / sigma_sq).exp();
        }
    }
    sum
}

pub fn triangle_area(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    0.5 * (b - a).cross(c - a).length()
}

/// Similarity of `vertex` to `triangle`, or `None` if either index is out of range.
pub fn triangle_similarity(
    skin: &SkinData,
    vertex: usize,
    triangle: usize,
    kernel: f32,
) -> Option<f32> {
    let tri = skin.triangle(triangle)?;
    let here: Vec<(u32, f32)> = skin.influences.get(vertex)?.iter().collect();
    let corners = [
        skin.influences.get(tri[0] as usize)?,
        skin.influences.get(tri[1] as usize)?,
        skin.influences.get(tri[2] as usize)?,
    ];
    Some(weight_similarity(
        &here,
        &merged_triangle_weights(corners),
        kernel,
    ))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorkerStatus {
    Running,
    Done,
    Failed,
}

impl WorkerStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Done,
            2 => Self::Failed,
            _ => Self::Running,
        }
    }
}

/// Snapshot of one worker.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WorkerState {
    pub processed: usize,
    pub status: WorkerStatus,
}

#[derive(Debug, Default)]
struct WorkerSlot {
    processed: AtomicUsize,
    status: AtomicU8,
}

impl WorkerSlot {
    fn snapshot(&self) -> WorkerState {
        WorkerState {
            processed: self.processed.load(Ordering::Acquire),
            status: WorkerStatus::from_u8(self.status.load(Ordering::Acquire)),
        }
    }
}

// Marks the slot failed unless the worker reached the end of its stride, including when
// the stride unwinds.
struct FinishGuard<'a> {
    slot: &'a WorkerSlot,
    done: bool,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        let status = if self.done { 1 } else { 2 };
        self.slot.status.store(status, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct WorkerResult {
    centers: Vec<(u32, Vec3)>,
    fallbacks: Vec<u32>,
}

/// Aggregate progress across all workers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f32 / self.total as f32
        }
    }
}

/// Result of a joined [`CorJob`].
#[derive(Clone, Debug, PartialEq)]
pub struct CorOutcome {
    /// One center per vertex. Vertices owned by a failed worker keep their rest position.
    pub centers: Vec<Vec3>,
    pub workers: Vec<WorkerState>,
    /// Vertices that fell back to their rest position, sorted.
    pub fallback_vertices: Vec<u32>,
    pub fallbacks: usize,
    pub failed_workers: usize,
}

impl CorOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed_workers == 0
    }
}

/// Running center-of-rotation estimation.
pub struct CorJob {
    slots: Arc<[WorkerSlot]>,
    handles: Vec<JoinHandle<Result<WorkerResult, Error>>>,
    rest: Vec<Vec3>,
}

impl CorJob {
    pub fn worker_count(&self) -> usize {
        self.slots.len()
    }

    pub fn states(&self) -> Vec<WorkerState> {
        self.slots.iter().map(WorkerSlot::snapshot).collect()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            processed: self
                .slots
                .iter()
                .map(|s| s.processed.load(Ordering::Acquire))
                .sum(),
            total: self.rest.len(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.states()
            .iter()
            .all(|s| s.status != WorkerStatus::Running)
    }

    /// Blocks until every worker has exited and merges their results.
    pub fn join(self) -> CorOutcome {
        let mut centers = self.rest;
        let mut fallback_vertices = Vec::new();

        for (index, handle) in self.handles.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(result)) => {
                    for (vertex, center) in result.centers {
                        if let Some(slot) = centers.get_mut(vertex as usize) {
                            *slot = center;
                        }
                    }
                    fallback_vertices.extend(result.fallbacks);
                }
                Ok(Err(err)) => {
                    log::warn!("center-of-rotation worker {index} failed: {err}");
                }
                Err(_) => {
                    log::warn!("center-of-rotation worker {index} panicked");
                }
            }
        }

        let workers: Vec<WorkerState> = self.slots.iter().map(WorkerSlot::snapshot).collect();
        let failed_workers = workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Failed)
            .count();
        fallback_vertices.sort_unstable();

        log::info!(
            "centers of rotation: {} vertices, {} fallbacks, {}/{} workers failed",
            centers.len(),
            fallback_vertices.len(),
            failed_workers,
            workers.len()
        );

        CorOutcome {
            centers,
            workers,
            fallbacks: fallback_vertices.len(),
            fallback_vertices,
            failed_workers,
        }
    }
}

/// Starts the threaded center-of-rotation estimation over `skin.clusters`.
///
/// Worker `i` owns clusters `i, i + N, i + 2N, ...`. A worker that errors or panics is
/// marked failed without stopping its siblings.
pub fn compute_centers_of_rotation(
    skin: Arc<SkinData>,
    settings: &CorSettings,
) -> Result<CorJob, Error> {
    settings.validate()?;
    let Some(clusters) = skin.clusters.as_ref() else {
        return Err(Error::MissingClusters);
    };
    skin.check_fresh(skin.vertex_count())?;

    let worker_count = settings.worker_count;
    let cluster_count = clusters.len();
    log::debug!(
        "spawning {worker_count} center-of-rotation workers over {cluster_count} clusters"
    );

    let slots: Arc<[WorkerSlot]> = (0..worker_count).map(|_| WorkerSlot::default()).collect();
    let rest: Vec<Vec3> = skin.vertices.iter().map(|v| v.position).collect();

    let mut handles = Vec::with_capacity(worker_count);
    for worker in 0..worker_count {
        let skin = Arc::clone(&skin);
        let slots = Arc::clone(&slots);
        let kernel = settings.similarity_kernel;
        let threshold = settings.similarity_threshold;

        let handle = std::thread::Builder::new()
            .name(format!("cor-worker-{worker}"))
            .spawn(move || {
                let slot = &slots[worker];
                let mut guard = FinishGuard { slot, done: false };
                let result = run_stride(&skin, worker, worker_count, kernel, threshold, slot);
                guard.done = result.is_ok();
                result
            })
            .map_err(|err| Error::InvalidState {
                message: format!("failed to spawn center-of-rotation worker {worker}: {err}"),
            })?;
        handles.push(handle);
    }

    Ok(CorJob {
        slots,
        handles,
        rest,
    })
}

fn run_stride(
    skin: &SkinData,
    worker: usize,
    stride: usize,
    kernel: f32,
    threshold: f32,
    slot: &WorkerSlot,
) -> Result<WorkerResult, Error> {
    let mut out = WorkerResult::default();
    let Some(clusters) = skin.clusters.as_ref() else {
        return Err(Error::MissingClusters);
    };

    for cluster in (worker..clusters.len()).step_by(stride) {
        let triangles = clusters.cluster_triangles(cluster);
        for &vertex in clusters.cluster_vertices(cluster) {
            let Some(rest) = skin.vertices.get(vertex as usize) else {
                return Err(Error::InvalidSkin {
                    message: format!("cluster {cluster} references missing vertex {vertex}"),
                });
            };

            let mut weighted = Vec3::ZERO;
            let mut total = 0.0f32;
            for &triangle in triangles {
                let Some(similarity) =
                    triangle_similarity(skin, vertex as usize, triangle as usize, kernel)
                else {
                    return Err(Error::InvalidSkin {
                        message: format!(
                            "cluster {cluster} references invalid triangle {triangle}"
                        ),
                    });
                };
                if similarity < threshold {
                    continue;
                }
                let Some(tri) = skin.triangle(triangle as usize) else {
                    continue;
                };
                let [a, b, c] = tri.map(|i| skin.vertices[i as usize].position);
                let weight = triangle_area(a, b, c) * similarity;
                weighted += (a + b + c) / 3.0 * weight;
                total += weight;
            }

            if total > f32::EPSILON {
                out.centers.push((vertex, weighted / total));
            } else {
                out.centers.push((vertex, rest.position));
                out.fallbacks.push(vertex);
            }
            slot.processed.fetch_add(1, Ordering::Release);
        }
    }
    Ok(out)
}
