use crate::ComputeSkinningBackend;
use crate::compute::GpuFrameVertex;
use dqskin::{DeformedFrame, DispatchError, Frame, FrameRenderer, RenderConfig, SkinData};
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Globals {
    clip_from_world: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawParams {
    tension_debug: u32,
    _pad: [u32; 3],
}

/// Buffers owned by one draw of a pass. Queue writes all land before the pass executes,
/// so draws in the same pass never share them.
struct DrawSlot {
    params_buffer: wgpu::Buffer,
    host_buffer: wgpu::Buffer,
    host_capacity: usize,
}

impl DrawSlot {
    fn new(device: &wgpu::Device, host_capacity: usize) -> Self {
        Self {
            params_buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("dqskin draw params"),
                size: size_of::<DrawParams>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            host_buffer: create_host_buffer(device, host_capacity),
            host_capacity,
        }
    }

    fn upload_host(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, frame: &DeformedFrame) {
        let needed = frame.vertices.len();
        if needed > self.host_capacity {
            while self.host_capacity < needed {
                self.host_capacity *= 2;
            }
            self.host_buffer = create_host_buffer(device, self.host_capacity);
        }
        let vertices = frame
            .vertices
            .iter()
            .map(GpuFrameVertex::from)
            .collect::<Vec<_>>();
        if !vertices.is_empty() {
            queue.write_buffer(&self.host_buffer, 0, bytemuck::cast_slice(&vertices));
        }
    }
}

/// Draws deformed frames by pulling vertices from a storage buffer, so device frames are
/// drawn in place and host frames only need one upload.
///
/// The index buffer is built from the skin passed to [`SkinRenderer::new`]; draw that skin.
/// Each draw in a pass gets its own vertex and parameter buffers, which are reused by the
/// next call to [`SkinRenderer::pass`]. Submit a pass before starting the next one.
pub struct SkinRenderer {
    device: wgpu::Device,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    globals: Globals,
    globals_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: usize,
    host_capacity: usize,
    slots: Vec<DrawSlot>,
}

impl SkinRenderer {
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        skin: &SkinData,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("dqskin-wgpu render shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("dqskin render bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("dqskin-wgpu pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = create_pipeline(device, &pipeline_layout, &shader, color_format);

        let globals = Globals {
            clip_from_world: glam::Mat4::IDENTITY.to_cols_array_2d(),
        };
        let globals_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("dqskin globals"),
            contents: bytemuck::bytes_of(&globals),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let mut indices = skin.indices.clone();
        if indices.is_empty() {
            indices.push(0);
        }
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("dqskin indices"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let host_capacity = skin.vertex_count().max(1);
        let slots = vec![DrawSlot::new(device, host_capacity)];

        Self {
            device: device.clone(),
            pipeline,
            bind_group_layout,
            globals,
            globals_buffer,
            index_buffer,
            index_count: skin.indices.len(),
            host_capacity,
            slots,
        }
    }

    pub fn update_globals_matrix(&mut self, queue: &wgpu::Queue, clip_from_world: [[f32; 4]; 4]) {
        self.globals.clip_from_world = clip_from_world;
        queue.write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&self.globals));
    }

    /// Binds the renderer to one render pass. Draw slots are handed out from the start
    /// again, so the previous pass must already be submitted.
    pub fn pass<'a, 'p>(
        &'a mut self,
        queue: &'a wgpu::Queue,
        pass: &'a mut wgpu::RenderPass<'p>,
    ) -> SkinPass<'a, 'p> {
        SkinPass {
            renderer: self,
            queue,
            pass,
            next_slot: 0,
        }
    }

    fn slot(&mut self, index: usize) -> &mut DrawSlot {
        while self.slots.len() <= index {
            self.slots.push(DrawSlot::new(&self.device, self.host_capacity));
        }
        &mut self.slots[index]
    }

    fn bind_group(&self, vertices: &wgpu::Buffer, params: &wgpu::Buffer) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("dqskin render bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.globals_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: vertices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
            ],
        })
    }
}

/// [`FrameRenderer`] over one `wgpu::RenderPass`.
pub struct SkinPass<'a, 'p> {
    renderer: &'a mut SkinRenderer,
    queue: &'a wgpu::Queue,
    pass: &'a mut wgpu::RenderPass<'p>,
    next_slot: usize,
}

impl FrameRenderer for SkinPass<'_, '_> {
    fn draw(
        &mut self,
        frame: Frame<'_>,
        skin: &SkinData,
        config: &RenderConfig,
    ) -> Result<(), DispatchError> {
        let (host_frame, device_buffer) = match frame {
            Frame::Host(frame) => {
                if frame.vertices.len() != skin.vertex_count() {
                    return Err(DispatchError::Device {
                        message: format!(
                            "frame has {} vertices but the skin has {}",
                            frame.vertices.len(),
                            skin.vertex_count()
                        ),
                    });
                }
                (Some(frame), None)
            }
            Frame::Device(backend) => {
                let Some(compute) = backend.as_any().downcast_ref::<ComputeSkinningBackend>()
                else {
                    return Err(DispatchError::Device {
                        message: format!("cannot draw device frames from {:?}", backend.kind()),
                    });
                };
                let Some(buffer) = compute.output_buffer() else {
                    return Err(DispatchError::NotLoaded);
                };
                (None, Some(buffer))
            }
        };

        let index = self.next_slot;
        self.next_slot += 1;
        let device = self.renderer.device.clone();
        let slot = self.renderer.slot(index);
        let params = DrawParams {
            tension_debug: u32::from(config.tension_debug),
            _pad: [0; 3],
        };
        self.queue
            .write_buffer(&slot.params_buffer, 0, bytemuck::bytes_of(&params));
        if let Some(frame) = host_frame {
            slot.upload_host(&device, self.queue, frame);
        }
        let slot = &self.renderer.slots[index];
        let bind_group = self.renderer.bind_group(
            device_buffer.unwrap_or(&slot.host_buffer),
            &slot.params_buffer,
        );

        self.pass.set_pipeline(&self.renderer.pipeline);
        self.pass.set_bind_group(0, &bind_group, &[]);
        self.pass
            .set_index_buffer(self.renderer.index_buffer.slice(..), wgpu::IndexFormat::Uint32);

        for range in config.submesh_ranges(skin) {
            let start = range.first_index;
            let Some(end) = range.end().filter(|&end| end <= self.renderer.index_count) else {
                log::warn!(
                    "submesh at {start} (+{}) exceeds the {} uploaded indices; skipped",
                    range.index_count,
                    self.renderer.index_count
                );
                continue;
            };
            self.pass.draw_indexed(start as u32..end as u32, 0, 0..1);
        }
        Ok(())
    }
}

fn create_host_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("dqskin host frame"),
        size: (capacity * size_of::<GpuFrameVertex>()) as u64,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    color_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("dqskin-wgpu pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

const SHADER: &str = r#"
struct Globals {
  clip_from_world: mat4x4<f32>,
};

struct DrawParams {
  tension_debug: u32,
  _pad0: u32,
  _pad1: u32,
  _pad2: u32,
};

struct FrameVertex {
  position: vec4<f32>,
  uv: vec2<f32>,
  tension: f32,
  _pad: f32,
};

@group(0) @binding(0)
var<uniform> globals: Globals;

@group(0) @binding(1)
var<storage, read> vertices: array<FrameVertex>;

@group(0) @binding(2)
var<uniform> params: DrawParams;

struct VsOut {
  @builtin(position) position: vec4<f32>,
  @location(0) uv: vec2<f32>,
  @location(1) tension: f32,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VsOut {
  let v = vertices[index];
  var out: VsOut;
  out.position = globals.clip_from_world * vec4<f32>(v.position.xyz, 1.0);
  out.uv = v.uv;
  out.tension = v.tension;
  return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
  if (params.tension_debug != 0u) {
    // Compressed edges shade red, stretched edges blue.
    let t = clamp(in.tension, -1.0, 1.0);
    let base = vec3<f32>(0.5, 0.5, 0.5);
    let squash = vec3<f32>(1.0, 0.1, 0.1);
    let stretch = vec3<f32>(0.1, 0.2, 1.0);
    let rgb = select(mix(base, stretch, -t), mix(base, squash, t), t >= 0.0);
    return vec4<f32>(rgb, 1.0);
  }
  let checker = (floor(in.uv.x * 8.0) + floor(in.uv.y * 8.0)) % 2.0;
  let rgb = mix(vec3<f32>(0.75, 0.72, 0.68), vec3<f32>(0.6, 0.57, 0.54), checker);
  return vec4<f32>(rgb, 1.0);
}
"#;
