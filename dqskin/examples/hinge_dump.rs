use dqskin::{
    BackendPreference, BonePose, CorSettings, Frame, MeshSource, Precompute, SkinData,
    SkinnedInstance, SkinningAlgorithm, SkinningConfig, StaticProbe,
};
use glam::{Quat, Vec3};
use std::sync::Arc;

const RINGS: usize = 9;
const SIDES: usize = 12;

/// Tube along +X from -1 to 1, bones split at x = 0 with a linear weight ramp near the joint.
fn tube() -> MeshSource {
    let mut mesh = MeshSource::default();
    for ring in 0..RINGS {
        let x = -1.0 + 2.0 * ring as f32 / (RINGS - 1) as f32;
        let t = ((x + 0.25) / 0.5).clamp(0.0, 1.0);
        for side in 0..SIDES {
            let angle = std::f32::consts::TAU * side as f32 / SIDES as f32;
            mesh.positions
                .push(Vec3::new(x, 0.25 * angle.cos(), 0.25 * angle.sin()));
            mesh.uvs
                .push(glam::Vec2::new(ring as f32 / (RINGS - 1) as f32, side as f32 / SIDES as f32));
            mesh.bone_indices.push([0, 1, 0, 0]);
            mesh.bone_weights.push([1.0 - t, t, 0.0, 0.0]);
        }
    }
    for ring in 0..(RINGS - 1) as u32 {
        for side in 0..SIDES as u32 {
            let next = (side + 1) % SIDES as u32;
            let a = ring * SIDES as u32 + side;
            let b = ring * SIDES as u32 + next;
            let c = a + SIDES as u32;
            let d = b + SIDES as u32;
            mesh.indices.extend_from_slice(&[a, b, d, a, d, c]);
        }
    }
    mesh
}

fn ring_area(frame: &dqskin::DeformedFrame, ring: usize) -> f32 {
    let points = &frame.vertices[ring * SIDES..(ring + 1) * SIDES];
    let mut sum = Vec3::ZERO;
    for (i, a) in points.iter().enumerate() {
        let b = &points[(i + 1) % points.len()];
        sum += a.position.cross(b.position);
    }
    0.5 * sum.length()
}

fn main() {
    env_logger::init();

    let degrees: f32 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(90.0);

    let bind = [BonePose::IDENTITY, BonePose::IDENTITY];
    let skin = SkinData::from_mesh(tube(), &bind).expect("tube mesh is valid");
    let settings = CorSettings {
        worker_count: 4,
        ..CorSettings::default()
    };
    let (skin, report) = Precompute::new(settings).run(skin).expect("precompute");
    println!(
        "precompute: {} clusters, {} fallbacks, {:?}",
        report.clusters, report.fallbacks, report.elapsed
    );

    let poses = [
        BonePose::IDENTITY,
        BonePose::from_rigid(Quat::from_rotation_z(degrees.to_radians()), Vec3::ZERO),
    ];
    let skin = Arc::new(skin);
    let joint = RINGS / 2;

    for algorithm in [
        SkinningAlgorithm::Linear,
        SkinningAlgorithm::DualQuaternion,
        SkinningAlgorithm::OptimizedCenterOfRotation,
    ] {
        let mut instance = SkinnedInstance::new(Arc::clone(&skin), Box::new(StaticProbe(false)));
        instance
            .configure(SkinningConfig {
                algorithm,
                backend: BackendPreference::ForceSequential,
                tension: true,
            })
            .expect("configure");
        instance.update(&poses).expect("update");

        let Some(Frame::Host(frame)) = instance.backend().map(|b| b.frame()) else {
            panic!("sequential backend exposes host frames");
        };
        let rest_area = ring_area(&dqskin::DeformedFrame::from_rest(&skin), joint);
        let max_tension = frame
            .vertices
            .iter()
            .map(|v| v.tension.abs())
            .fold(0.0f32, f32::max);
        println!(
            "{algorithm:?}: joint area {:.4} ({:+.1}%), max |tension| {max_tension:.3}",
            ring_area(frame, joint),
            100.0 * (ring_area(frame, joint) / rest_area - 1.0)
        );
    }
}
