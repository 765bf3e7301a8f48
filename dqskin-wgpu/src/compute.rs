use dqskin::{
    BackendKind, BonePalette, CapabilityProbe, DeformedFrame, DeformedVertex, DispatchError,
    Error, Frame, MeshTopology, ParallelBackendFactory, SkinData, SkinningAlgorithm,
    SkinningBackend, SkinningConfig,
};
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use wgpu::util::DeviceExt;

const WORKGROUP_SIZE: u32 = 64;

/// Both passes bind four storage buffers, which fits the downlevel defaults.
const REQUIRED_STORAGE_BUFFERS: u32 = 4;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuRestVertex {
    position: [f32; 4],
    center: [f32; 4],
    uv: [f32; 2],
    _pad: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuInfluence {
    weights: [f32; 4],
    indices: [u32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuBone {
    skin_matrix: [[f32; 4]; 4],
    dq_real: [f32; 4],
    dq_dual: [f32; 4],
    rotation: [f32; 4],
}

/// Layout of the deformed stream. The renderer pulls vertices from the same buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct GpuFrameVertex {
    pub(crate) position: [f32; 4],
    pub(crate) uv: [f32; 2],
    pub(crate) tension: f32,
    pub(crate) _pad: f32,
}

impl From<&DeformedVertex> for GpuFrameVertex {
    fn from(v: &DeformedVertex) -> Self {
        Self {
            position: v.position.extend(1.0).to_array(),
            uv: v.uv.to_array(),
            tension: v.tension,
            _pad: 0.0,
        }
    }
}

impl From<&GpuFrameVertex> for DeformedVertex {
    fn from(v: &GpuFrameVertex) -> Self {
        Self {
            position: glam::Vec4::from_array(v.position).truncate(),
            uv: glam::Vec2::from_array(v.uv),
            tension: v.tension,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    vertex_count: u32,
    algorithm: u32,
    bone_count: u32,
    _pad: u32,
}

fn algorithm_code(algorithm: SkinningAlgorithm) -> u32 {
    match algorithm {
        SkinningAlgorithm::Linear => 0,
        SkinningAlgorithm::DualQuaternion => 1,
        SkinningAlgorithm::OptimizedCenterOfRotation => 2,
    }
}

fn limits_support_compute(limits: &wgpu::Limits) -> bool {
    limits.max_storage_buffers_per_shader_stage >= REQUIRED_STORAGE_BUFFERS
        && limits.max_compute_invocations_per_workgroup >= WORKGROUP_SIZE
        && limits.max_compute_workgroup_size_x >= WORKGROUP_SIZE
}

/// Answers the capability question from an adapter before any device exists.
#[derive(Copy, Clone, Debug)]
pub struct WgpuProbe {
    supported: bool,
}

impl WgpuProbe {
    pub fn new(adapter: &wgpu::Adapter) -> Self {
        let downlevel = adapter.get_downlevel_capabilities();
        let supported = downlevel
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
            && limits_support_compute(&adapter.limits());
        if !supported {
            log::info!(
                "adapter '{}' lacks compute support for skinning",
                adapter.get_info().name
            );
        }
        Self { supported }
    }
}

impl CapabilityProbe for WgpuProbe {
    fn supports_parallel_compute(&self) -> bool {
        self.supported
    }
}

/// Creates [`ComputeSkinningBackend`]s on one device.
///
/// The factory installs the device-lost callback, so every backend it creates reports
/// [`DispatchError::DeviceLost`] once the device goes away. Create one factory per device;
/// a second one replaces the first one's callback.
pub struct WgpuBackendFactory {
    device: wgpu::Device,
    queue: wgpu::Queue,
    lost: Arc<AtomicBool>,
}

impl WgpuBackendFactory {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("skinning device lost ({reason:?}): {message}");
            flag.store(true, Ordering::Release);
        });
        Self {
            device,
            queue,
            lost,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }
}

impl CapabilityProbe for WgpuBackendFactory {
    fn supports_parallel_compute(&self) -> bool {
        !self.is_lost() && limits_support_compute(&self.device.limits())
    }
}

impl ParallelBackendFactory for WgpuBackendFactory {
    fn create(
        &self,
        skin: &Arc<SkinData>,
        config: &SkinningConfig,
    ) -> Result<Box<dyn SkinningBackend>, Error> {
        let backend = ComputeSkinningBackend::new(
            self.device.clone(),
            self.queue.clone(),
            Arc::clone(&self.lost),
            skin,
            config,
        )?;
        Ok(Box::new(backend))
    }
}

struct TensionResources {
    pipeline: wgpu::ComputePipeline,
    bind_groups: [wgpu::BindGroup; 2],
}

struct Resources {
    skin_pipeline: wgpu::ComputePipeline,
    params_buffer: wgpu::Buffer,
    bone_buffer: wgpu::Buffer,
    outputs: [wgpu::Buffer; 2],
    skin_bind_groups: [wgpu::BindGroup; 2],
    tension: Option<TensionResources>,
}

/// Skins on the device. Output is double buffered; [`SkinningBackend::frame`] points at the
/// buffer written by the last submitted dispatch.
pub struct ComputeSkinningBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    lost: Arc<AtomicBool>,
    algorithm: SkinningAlgorithm,
    vertex_count: u32,
    bone_count: usize,
    bones: Vec<GpuBone>,
    resources: Option<Resources>,
    front: usize,
}

impl ComputeSkinningBackend {
    fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        lost: Arc<AtomicBool>,
        skin: &SkinData,
        config: &SkinningConfig,
    ) -> Result<Self, Error> {
        if lost.load(Ordering::Acquire) {
            return Err(init_error("device is lost"));
        }
        let limits = device.limits();
        if !limits_support_compute(&limits) {
            return Err(Error::ParallelComputeUnavailable);
        }

        let vertex_count = u32::try_from(skin.vertex_count())
            .map_err(|_| init_error("vertex count exceeds u32"))?;
        let output_size = skin.vertex_count() as u64 * size_of::<GpuFrameVertex>() as u64;
        let rest_size = skin.vertex_count() as u64 * size_of::<GpuRestVertex>() as u64;
        if rest_size.max(output_size) > u64::from(limits.max_storage_buffer_binding_size) {
            return Err(init_error(format!(
                "{} vertices exceed the storage binding limit of {} bytes",
                skin.vertex_count(),
                limits.max_storage_buffer_binding_size
            )));
        }
        if vertex_count.div_ceil(WORKGROUP_SIZE) > limits.max_compute_workgroups_per_dimension {
            return Err(init_error("vertex count exceeds the workgroup dispatch limit"));
        }

        let algorithm = config.algorithm.effective_for(skin);
        let rest = rest_vertices(skin);
        let influences = skin
            .influences
            .iter()
            .map(|inf| GpuInfluence {
                weights: inf.weights,
                indices: inf.bones,
            })
            .collect::<Vec<_>>();
        let bones = vec![GpuBone::IDENTITY; skin.bone_count()];

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("dqskin skin shader"),
            source: wgpu::ShaderSource::Wgsl(SKIN_SHADER.into()),
        });

        let skin_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("dqskin skin bind group layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, false),
            ],
        });
        let skin_pipeline = create_pipeline(&device, &skin_layout, &shader, "skin_main");

        let params = Params {
            vertex_count,
            algorithm: algorithm_code(algorithm),
            bone_count: bones.len() as u32,
            _pad: 0,
        };
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("dqskin params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let rest_buffer = storage_init(&device, "dqskin rest vertices", &rest);
        let influence_buffer = storage_init(&device, "dqskin influences", &influences);
        let bone_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("dqskin bones"),
            contents: bytemuck::cast_slice(&non_empty(&bones)),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        // Both outputs start at rest so the first frame is drawable before any dispatch.
        let initial = DeformedFrame::from_rest(skin)
            .vertices
            .iter()
            .map(GpuFrameVertex::from)
            .collect::<Vec<_>>();
        let outputs = [0, 1].map(|i| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(if i == 0 {
                    "dqskin frame 0"
                } else {
                    "dqskin frame 1"
                }),
                contents: bytemuck::cast_slice(&non_empty(&initial)),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            })
        });

        let skin_bind_groups = [0, 1].map(|i| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("dqskin skin bind group"),
                layout: &skin_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: rest_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: influence_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: bone_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: outputs[i].as_entire_binding(),
                    },
                ],
            })
        });

        let tension = config.tension.then(|| {
            create_tension(
                &device,
                &skin.topology(),
                &params_buffer,
                &outputs,
            )
        });

        log::debug!(
            "compute backend ready: {} vertices, {} bones, {:?}, tension {}",
            vertex_count,
            bones.len(),
            algorithm,
            tension.is_some()
        );

        Ok(Self {
            device,
            queue,
            lost,
            algorithm,
            vertex_count,
            bone_count: skin.bone_count(),
            bones,
            resources: Some(Resources {
                skin_pipeline,
                params_buffer,
                bone_buffer,
                outputs,
                skin_bind_groups,
                tension,
            }),
            front: 0,
        })
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// The storage buffer holding the current frame, laid out as the renderer expects.
    pub fn output_buffer(&self) -> Option<&wgpu::Buffer> {
        self.resources.as_ref().map(|r| &r.outputs[self.front])
    }

    /// Copies the current frame back to the host, blocking until the device is idle.
    pub fn read_back(&self) -> Result<DeformedFrame, DispatchError> {
        self.check_device()?;
        let Some(resources) = self.resources.as_ref() else {
            return Err(DispatchError::NotLoaded);
        };
        let size = u64::from(self.vertex_count) * size_of::<GpuFrameVertex>() as u64;
        if size == 0 {
            return Ok(DeformedFrame::default());
        }

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("dqskin readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("dqskin readback encoder"),
            });
        encoder.copy_buffer_to_buffer(&resources.outputs[self.front], 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let (sender, receiver) = std::sync::mpsc::channel();
        staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });
        self.wait_idle()?;
        match receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(device_error(e)),
            Err(_) => {
                return Err(DispatchError::Device {
                    message: "readback callback never ran".to_string(),
                });
            }
        }

        let frame = {
            let bytes = staging.slice(..).get_mapped_range();
            let vertices = bytes
                .chunks_exact(size_of::<GpuFrameVertex>())
                .map(|chunk| DeformedVertex::from(&bytemuck::pod_read_unaligned::<GpuFrameVertex>(chunk)))
                .collect();
            DeformedFrame { vertices }
        };
        staging.unmap();
        Ok(frame)
    }

    fn check_device(&self) -> Result<(), DispatchError> {
        if self.lost.load(Ordering::Acquire) {
            return Err(DispatchError::DeviceLost {
                message: "device was lost".to_string(),
            });
        }
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), DispatchError> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| {
                if self.lost.load(Ordering::Acquire) {
                    DispatchError::DeviceLost {
                        message: e.to_string(),
                    }
                } else {
                    device_error(e)
                }
            })
    }
}

impl SkinningBackend for ComputeSkinningBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Parallel
    }

    fn algorithm(&self) -> SkinningAlgorithm {
        self.algorithm
    }

    fn tension_enabled(&self) -> bool {
        self.resources.as_ref().is_some_and(|r| r.tension.is_some())
    }

    fn dispatch(&mut self, palette: &BonePalette) -> Result<(), DispatchError> {
        self.check_device()?;
        let Some(resources) = self.resources.as_ref() else {
            return Err(DispatchError::NotLoaded);
        };
        if palette.len() != self.bone_count {
            return Err(DispatchError::PoseCountMismatch {
                expected: self.bone_count,
                actual: palette.len(),
            });
        }

        for (slot, transform) in self.bones.iter_mut().zip(palette.as_slice()) {
            *slot = GpuBone {
                skin_matrix: transform.matrix.to_cols_array_2d(),
                dq_real: transform.dual.real.to_array(),
                dq_dual: transform.dual.dual.to_array(),
                rotation: transform.rotation.to_array(),
            };
        }
        if !self.bones.is_empty() {
            self.queue.write_buffer(
                &resources.bone_buffer,
                0,
                bytemuck::cast_slice(&self.bones),
            );
        }

        let back = 1 - self.front;
        let workgroups = self.vertex_count.div_ceil(WORKGROUP_SIZE);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("dqskin dispatch encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("dqskin skin pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&resources.skin_pipeline);
            pass.set_bind_group(0, &resources.skin_bind_groups[back], &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        if let Some(tension) = resources.tension.as_ref() {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("dqskin tension pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&tension.pipeline);
            pass.set_bind_group(0, &tension.bind_groups[back], &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        self.queue.submit(Some(encoder.finish()));
        self.front = back;
        Ok(())
    }

    fn frame(&self) -> Frame<'_> {
        Frame::Device(self)
    }

    fn release(&mut self) {
        let Some(resources) = self.resources.take() else {
            return;
        };
        // In-flight dispatches still reference these buffers.
        if !self.lost.load(Ordering::Acquire) {
            if let Err(e) = self.wait_idle() {
                log::warn!("waiting for skinning work before release failed: {e}");
            }
        }
        drop(resources);
        self.bones.clear();
        log::debug!("compute backend released");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for ComputeSkinningBackend {
    fn drop(&mut self) {
        self.release();
    }
}

impl GpuBone {
    const IDENTITY: Self = Self {
        skin_matrix: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
        dq_real: [0.0, 0.0, 0.0, 1.0],
        dq_dual: [0.0; 4],
        rotation: [0.0, 0.0, 0.0, 1.0],
    };
}

fn rest_vertices(skin: &SkinData) -> Vec<GpuRestVertex> {
    skin.vertices
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let center = skin
                .centers_of_rotation
                .as_ref()
                .and_then(|c| c.get(i))
                .copied()
                .unwrap_or(v.position);
            GpuRestVertex {
                position: v.position.extend(1.0).to_array(),
                center: center.extend(1.0).to_array(),
                uv: v.uv.to_array(),
                _pad: [0.0; 2],
            }
        })
        .collect()
}

fn create_tension(
    device: &wgpu::Device,
    topology: &MeshTopology,
    params_buffer: &wgpu::Buffer,
    outputs: &[wgpu::Buffer; 2],
) -> TensionResources {
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("dqskin tension bind group layout"),
        entries: &[
            uniform_entry(0),
            storage_entry(1, true),
            storage_entry(2, true),
            storage_entry(3, true),
            storage_entry(4, false),
        ],
    });
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("dqskin tension shader"),
        source: wgpu::ShaderSource::Wgsl(TENSION_SHADER.into()),
    });
    let pipeline = create_pipeline(device, &layout, &shader, "tension_main");

    let offsets = storage_init(device, "dqskin neighbor offsets", &topology.neighbor_offsets);
    let neighbors = storage_init(device, "dqskin neighbors", &topology.neighbors);
    let rest_lengths = storage_init(device, "dqskin rest lengths", &topology.rest_lengths);

    let bind_groups = [0, 1].map(|i| {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("dqskin tension bind group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: offsets.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: neighbors.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: rest_lengths.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: outputs[i].as_entire_binding(),
                },
            ],
        })
    });

    TensionResources {
        pipeline,
        bind_groups,
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
    shader: &wgpu::ShaderModule,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("dqskin compute pipeline layout"),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(entry_point),
        layout: Some(&layout),
        module: shader,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_init<T: bytemuck::Pod>(device: &wgpu::Device, label: &str, data: &[T]) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(&non_empty(data)),
        usage: wgpu::BufferUsages::STORAGE,
    })
}

/// Storage bindings may not be empty.
fn non_empty<T: bytemuck::Pod>(data: &[T]) -> std::borrow::Cow<'_, [T]> {
    if data.is_empty() {
        std::borrow::Cow::Owned(vec![T::zeroed()])
    } else {
        std::borrow::Cow::Borrowed(data)
    }
}

fn init_error(message: impl Into<String>) -> Error {
    Error::BackendInit {
        backend: BackendKind::Parallel,
        message: message.into(),
    }
}

fn device_error(e: impl std::fmt::Display) -> DispatchError {
    DispatchError::Device {
        message: e.to_string(),
    }
}

const SKIN_SHADER: &str = r#"
struct Params {
  vertex_count: u32,
  algorithm: u32,
  bone_count: u32,
  _pad: u32,
};

struct RestVertex {
  position: vec4<f32>,
  center: vec4<f32>,
  uv: vec2<f32>,
  _pad: vec2<f32>,
};

struct Influence {
  weights: vec4<f32>,
  indices: vec4<u32>,
};

struct Bone {
  skin_matrix: mat4x4<f32>,
  dq_real: vec4<f32>,
  dq_dual: vec4<f32>,
  rotation: vec4<f32>,
};

struct FrameVertex {
  position: vec4<f32>,
  uv: vec2<f32>,
  tension: f32,
  _pad: f32,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> rest: array<RestVertex>;
@group(0) @binding(2) var<storage, read> influences: array<Influence>;
@group(0) @binding(3) var<storage, read> bones: array<Bone>;
@group(0) @binding(4) var<storage, read_write> frame: array<FrameVertex>;

// Quaternions are (x, y, z, w).
fn quat_mul(a: vec4<f32>, b: vec4<f32>) -> vec4<f32> {
  return vec4<f32>(
    a.w * b.xyz + b.w * a.xyz + cross(a.xyz, b.xyz),
    a.w * b.w - dot(a.xyz, b.xyz),
  );
}

fn quat_conj(q: vec4<f32>) -> vec4<f32> {
  return vec4<f32>(-q.xyz, q.w);
}

fn quat_rotate(q: vec4<f32>, v: vec3<f32>) -> vec3<f32> {
  let t = 2.0 * cross(q.xyz, v);
  return v + q.w * t + cross(q.xyz, t);
}

fn dominant_slot(w: vec4<f32>) -> u32 {
  var best = 0u;
  for (var s = 1u; s < 4u; s++) {
    if (w[s] > w[best]) {
      best = s;
    }
  }
  return best;
}

fn blended_matrix(inf: Influence) -> mat4x4<f32> {
  var m = mat4x4<f32>(vec4<f32>(0.0), vec4<f32>(0.0), vec4<f32>(0.0), vec4<f32>(0.0));
  for (var s = 0u; s < 4u; s++) {
    let w = inf.weights[s];
    let b = inf.indices[s];
    if (w <= 0.0 || b >= params.bone_count) {
      continue;
    }
    m += bones[b].skin_matrix * w;
  }
  return m;
}

fn linear_blend(p: vec3<f32>, inf: Influence) -> vec3<f32> {
  return (blended_matrix(inf) * vec4<f32>(p, 1.0)).xyz;
}

fn dual_quaternion_blend(p: vec3<f32>, inf: Influence) -> vec3<f32> {
  let dominant = inf.indices[dominant_slot(inf.weights)];
  var reference = vec4<f32>(0.0, 0.0, 0.0, 1.0);
  if (dominant < params.bone_count) {
    reference = bones[dominant].dq_real;
  }

  var real = vec4<f32>(0.0);
  var dual = vec4<f32>(0.0);
  for (var s = 0u; s < 4u; s++) {
    var w = inf.weights[s];
    let b = inf.indices[s];
    if (w <= 0.0 || b >= params.bone_count) {
      continue;
    }
    if (dot(bones[b].dq_real, reference) < 0.0) {
      w = -w;
    }
    real += bones[b].dq_real * w;
    dual += bones[b].dq_dual * w;
  }

  let len = length(real);
  if (len <= 1.1920929e-7) {
    return p;
  }
  real = real / len;
  dual = dual / len;
  let t = quat_mul(2.0 * dual, quat_conj(real)).xyz;
  return quat_rotate(real, p) + t;
}

fn optimized_center_of_rotation(p: vec3<f32>, center: vec3<f32>, inf: Influence) -> vec3<f32> {
  let dominant = inf.indices[dominant_slot(inf.weights)];
  var reference = vec4<f32>(0.0, 0.0, 0.0, 1.0);
  if (dominant < params.bone_count) {
    reference = bones[dominant].rotation;
  }

  var q = vec4<f32>(0.0);
  for (var s = 0u; s < 4u; s++) {
    var w = inf.weights[s];
    let b = inf.indices[s];
    if (w <= 0.0 || b >= params.bone_count) {
      continue;
    }
    if (dot(bones[b].rotation, reference) < 0.0) {
      w = -w;
    }
    q += bones[b].rotation * w;
  }
  if (dot(q, q) <= 1.1920929e-7) {
    q = vec4<f32>(0.0, 0.0, 0.0, 1.0);
  } else {
    q = normalize(q);
  }

  let moved_center = (blended_matrix(inf) * vec4<f32>(center, 1.0)).xyz;
  let t = moved_center - quat_rotate(q, center);
  return quat_rotate(q, p) + t;
}

@compute @workgroup_size(64)
fn skin_main(@builtin(global_invocation_id) id: vec3<u32>) {
  let v = id.x;
  if (v >= params.vertex_count) {
    return;
  }
  let r = rest[v];
  let inf = influences[v];
  let p = r.position.xyz;

  var out: vec3<f32>;
  switch params.algorithm {
    case 1u: {
      out = dual_quaternion_blend(p, inf);
    }
    case 2u: {
      out = optimized_center_of_rotation(p, r.center.xyz, inf);
    }
    default: {
      out = linear_blend(p, inf);
    }
  }

  frame[v].position = vec4<f32>(out, 1.0);
  frame[v].uv = r.uv;
  frame[v].tension = 0.0;
}
"#;

const TENSION_SHADER: &str = r#"
struct Params {
  vertex_count: u32,
  algorithm: u32,
  bone_count: u32,
  _pad: u32,
};

struct FrameVertex {
  position: vec4<f32>,
  uv: vec2<f32>,
  tension: f32,
  _pad: f32,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> neighbor_offsets: array<u32>;
@group(0) @binding(2) var<storage, read> neighbors: array<u32>;
@group(0) @binding(3) var<storage, read> rest_lengths: array<f32>;
@group(0) @binding(4) var<storage, read_write> frame: array<FrameVertex>;

@compute @workgroup_size(64)
fn tension_main(@builtin(global_invocation_id) id: vec3<u32>) {
  let v = id.x;
  if (v >= params.vertex_count) {
    return;
  }
  let here = frame[v].position.xyz;
  let start = neighbor_offsets[v];
  let end = neighbor_offsets[v + 1u];

  var sum = 0.0;
  var edges = 0u;
  for (var k = start; k < end; k++) {
    let rest_length = rest_lengths[k];
    let n = neighbors[k];
    if (rest_length <= 1.1920929e-7 || n >= params.vertex_count) {
      continue;
    }
    sum += 1.0 - distance(here, frame[n].position.xyz) / rest_length;
    edges += 1u;
  }

  var tension = 0.0;
  if (edges > 0u) {
    tension = clamp(sum / f32(edges), -1.0, 1.0);
  }
  frame[v].tension = tension;
}
"#;
