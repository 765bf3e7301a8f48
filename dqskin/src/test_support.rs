use crate::{BonePose, MeshSource, SkinData};
use glam::{Quat, Vec2, Vec3};
use rand::Rng;
use std::f32::consts::FRAC_PI_2;

pub fn assert_approx(actual: f32, expected: f32, tolerance: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= tolerance,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

pub fn assert_vec3_approx(actual: Vec3, expected: Vec3, tolerance: f32) {
    assert!(
        actual.abs_diff_eq(expected, tolerance),
        "expected {expected:?}, got {actual:?}"
    );
}

/// `(y, z)` corners of the hinge cross-section, in winding order.
pub const RING: [(f32, f32); 4] = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];

/// Two bones bound at the origin. Ring 0 (vertices 0..4, x = -1) is rigid to bone 0; the
/// joint ring (vertices 4..8, x = 0) is split evenly between bones 0 and 1.
pub fn hinge_mesh() -> MeshSource {
    let mut positions = Vec::new();
    let mut bone_indices = Vec::new();
    let mut bone_weights = Vec::new();
    for (x, weights) in [(-1.0, [1.0, 0.0, 0.0, 0.0]), (0.0, [0.5, 0.5, 0.0, 0.0])] {
        for (y, z) in RING {
            positions.push(Vec3::new(x, y, z));
            bone_indices.push([0, 1, 0, 0]);
            bone_weights.push(weights);
        }
    }

    let mut indices = Vec::new();
    for i in 0..4u32 {
        let next = (i + 1) % 4;
        indices.extend_from_slice(&[i, next, 4 + next, i, 4 + next, 4 + i]);
    }

    MeshSource {
        uvs: positions.iter().map(|p| Vec2::new(p.y + 0.5, p.z + 0.5)).collect(),
        positions,
        indices,
        submeshes: Vec::new(),
        bone_indices,
        bone_weights,
    }
}

pub fn hinge_bind() -> Vec<BonePose> {
    vec![BonePose::IDENTITY, BonePose::IDENTITY]
}

pub fn hinge_skin() -> SkinData {
    match SkinData::from_mesh(hinge_mesh(), &hinge_bind()) {
        Ok(skin) => skin,
        Err(err) => panic!("hinge fixture is invalid: {err}"),
    }
}

/// Bone 1 bent 90° about +Z at the joint.
pub fn hinge_bent() -> Vec<BonePose> {
    vec![
        BonePose::IDENTITY,
        BonePose::from_rigid(Quat::from_rotation_z(FRAC_PI_2), Vec3::ZERO),
    ]
}

/// Area of a planar polygon given in winding order.
pub fn polygon_area(points: &[Vec3]) -> f32 {
    let mut sum = Vec3::ZERO;
    for (i, &a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        sum += a.cross(b);
    }
    0.5 * sum.length()
}

pub fn random_rigid(rng: &mut impl Rng) -> (Quat, Vec3) {
    let axis = Vec3::new(
        rng.gen_range(-1.0..1.0),
        rng.gen_range(-1.0..1.0),
        rng.gen_range(-1.0..1.0),
    )
    .try_normalize()
    .unwrap_or(Vec3::Y);
    let angle = rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI);
    let translation = Vec3::new(
        rng.gen_range(-10.0..10.0),
        rng.gen_range(-10.0..10.0),
        rng.gen_range(-10.0..10.0),
    );
    (Quat::from_axis_angle(axis, angle), translation)
}
