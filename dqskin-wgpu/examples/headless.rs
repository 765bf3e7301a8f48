use dqskin::{
    BonePose, Frame, MeshSource, RenderConfig, SkinData, SkinnedInstance,
    SkinningAlgorithm, SkinningConfig,
};
use dqskin_wgpu::{ComputeSkinningBackend, SkinRenderer, WgpuBackendFactory, WgpuProbe};
use glam::{Mat4, Quat, Vec2, Vec3};
use std::sync::Arc;

const RINGS: usize = 9;
const SIDES: usize = 16;
const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

fn tube() -> MeshSource {
    let mut mesh = MeshSource::default();
    for ring in 0..RINGS {
        let x = -1.0 + 2.0 * ring as f32 / (RINGS - 1) as f32;
        let t = ((x + 0.25) / 0.5).clamp(0.0, 1.0);
        for side in 0..SIDES {
            let angle = std::f32::consts::TAU * side as f32 / SIDES as f32;
            mesh.positions
                .push(Vec3::new(x, 0.25 * angle.cos(), 0.25 * angle.sin()));
            mesh.uvs.push(Vec2::new(
                ring as f32 / (RINGS - 1) as f32,
                side as f32 / SIDES as f32,
            ));
            mesh.bone_indices.push([0, 1, 0, 0]);
            mesh.bone_weights.push([1.0 - t, t, 0.0, 0.0]);
        }
    }
    for ring in 0..(RINGS - 1) as u32 {
        for side in 0..SIDES as u32 {
            let next = (side + 1) % SIDES as u32;
            let a = ring * SIDES as u32 + side;
            let b = ring * SIDES as u32 + next;
            mesh.indices
                .extend_from_slice(&[a, b, b + SIDES as u32, a, b + SIDES as u32, a + SIDES as u32]);
        }
    }
    mesh
}

fn main() {
    env_logger::init();

    let instance = wgpu::Instance::default();
    let Ok(adapter) = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        compatible_surface: None,
        power_preference: wgpu::PowerPreference::HighPerformance,
        force_fallback_adapter: false,
    })) else {
        eprintln!("no adapter available");
        return;
    };
    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("device"),
        required_features: wgpu::Features::empty(),
        required_limits: adapter.limits(),
        experimental_features: Default::default(),
        memory_hints: wgpu::MemoryHints::Performance,
        trace: Default::default(),
    }))
    .unwrap();
    println!("adapter: {}", adapter.get_info().name);
    let vertex_storage = adapter
        .get_downlevel_capabilities()
        .flags
        .contains(wgpu::DownlevelFlags::VERTEX_STORAGE);

    let bind = [BonePose::IDENTITY, BonePose::IDENTITY];
    let skin = Arc::new(SkinData::from_mesh(tube(), &bind).unwrap());

    let mut skinned = SkinnedInstance::new(Arc::clone(&skin), Box::new(WgpuProbe::new(&adapter)))
        .with_parallel_backend(Box::new(WgpuBackendFactory::new(
            device.clone(),
            queue.clone(),
        )));
    skinned
        .configure(SkinningConfig {
            algorithm: SkinningAlgorithm::DualQuaternion,
            tension: true,
            ..SkinningConfig::default()
        })
        .unwrap();
    println!("backend: {:?}", skinned.backend_kind());

    let target = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("headless target"),
        size: wgpu::Extent3d {
            width: 256,
            height: 256,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());
    let mut renderer = SkinRenderer::new(&device, FORMAT, &skin);
    renderer.update_globals_matrix(
        &queue,
        Mat4::from_scale(Vec3::splat(0.6)).to_cols_array_2d(),
    );

    for degrees in [0.0f32, 45.0, 90.0, 135.0] {
        let poses = [
            BonePose::IDENTITY,
            BonePose::from_rigid(Quat::from_rotation_z(degrees.to_radians()), Vec3::ZERO),
        ];
        skinned.update(&poses).unwrap();

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("headless encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.1,
                            g: 0.1,
                            b: 0.12,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            let config = RenderConfig {
                tension_debug: true,
                submesh: None,
            };
            if vertex_storage {
                skinned
                    .render(&mut renderer.pass(&queue, &mut pass), &config)
                    .unwrap();
            }
        }
        queue.submit(Some(encoder.finish()));

        let frame = match skinned.backend().map(|b| b.frame()) {
            Some(Frame::Host(frame)) => frame.clone(),
            Some(Frame::Device(backend)) => backend
                .as_any()
                .downcast_ref::<ComputeSkinningBackend>()
                .unwrap()
                .read_back()
                .unwrap(),
            None => unreachable!("instance is loaded"),
        };
        let max_tension = frame
            .vertices
            .iter()
            .map(|v| v.tension)
            .fold(f32::MIN, f32::max);
        let min_tension = frame
            .vertices
            .iter()
            .map(|v| v.tension)
            .fold(f32::MAX, f32::min);
        println!("{degrees:>5.1}°: tension in [{min_tension:+.3}, {max_tension:+.3}]");
    }

    skinned.dispose();
}
