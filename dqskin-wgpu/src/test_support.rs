use dqskin::{BonePose, MeshSource, SkinData};
use glam::{Quat, Vec2, Vec3};

pub struct Gpu {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

/// `None` when the machine has no usable adapter; GPU tests return early in that case.
pub fn gpu() -> Option<Gpu> {
    let _ = env_logger::builder().is_test(true).try_init();
    let instance = wgpu::Instance::default();
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        compatible_surface: None,
        power_preference: wgpu::PowerPreference::LowPower,
        force_fallback_adapter: false,
    }))
    .ok()?;
    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("dqskin test device"),
        required_features: wgpu::Features::empty(),
        required_limits: adapter.limits(),
        experimental_features: Default::default(),
        memory_hints: wgpu::MemoryHints::Performance,
        trace: Default::default(),
    }))
    .ok()?;
    Some(Gpu {
        adapter,
        device,
        queue,
    })
}

/// Two-ring box hinge: ring 0 rigid to bone 0, ring 1 split evenly between both bones.
pub fn hinge_skin() -> SkinData {
    let ring = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];
    let mut mesh = MeshSource::default();
    for (x, weights) in [(-1.0, [1.0, 0.0, 0.0, 0.0]), (0.0, [0.5, 0.5, 0.0, 0.0])] {
        for (y, z) in ring {
            mesh.positions.push(Vec3::new(x, y, z));
            mesh.uvs.push(Vec2::new(y + 0.5, z + 0.5));
            mesh.bone_indices.push([0, 1, 0, 0]);
            mesh.bone_weights.push(weights);
        }
    }
    for i in 0..4u32 {
        let next = (i + 1) % 4;
        mesh.indices
            .extend_from_slice(&[i, next, 4 + next, i, 4 + next, 4 + i]);
    }
    match SkinData::from_mesh(mesh, &[BonePose::IDENTITY, BonePose::IDENTITY]) {
        Ok(skin) => skin,
        Err(err) => panic!("hinge fixture is invalid: {err}"),
    }
}

pub fn hinge_bent() -> Vec<BonePose> {
    vec![
        BonePose::IDENTITY,
        BonePose::from_rigid(
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::new(0.0, 0.1, 0.0),
        ),
    ]
}

/// Hinge skin with one center of rotation per vertex, halfway between the rest position
/// and the joint axis.
pub fn hinge_with_centers() -> SkinData {
    let mut skin = hinge_skin();
    skin.centers_of_rotation = Some(
        skin.vertices
            .iter()
            .map(|v| Vec3::new(v.position.x * 0.5, 0.0, 0.0))
            .collect(),
    );
    skin
}
