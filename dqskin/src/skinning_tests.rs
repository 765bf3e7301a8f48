use crate::test_support::{assert_approx, assert_vec3_approx, hinge_skin, random_rigid};
use crate::{
    BonePalette, BonePose, BoneRest, Influences, MeshSource, SkinData, SkinningAlgorithm,
    compute_tension, dual_quaternion_blend, linear_blend, optimized_center_of_rotation,
    skin_vertex,
};
use glam::{Quat, Vec3};
use rand::SeedableRng;
use rand::rngs::StdRng;

const ALGORITHMS: [SkinningAlgorithm; 3] = [
    SkinningAlgorithm::Linear,
    SkinningAlgorithm::DualQuaternion,
    SkinningAlgorithm::OptimizedCenterOfRotation,
];

fn random_poses(rng: &mut StdRng, count: usize) -> Vec<BonePose> {
    (0..count)
        .map(|_| {
            let (rotation, translation) = random_rigid(rng);
            BonePose::from_rigid(rotation, translation)
        })
        .collect()
}

#[test]
fn rest_pose_is_identity_for_all_algorithms() {
    let mut rng = StdRng::seed_from_u64(11);
    let bind = random_poses(&mut rng, 3);
    let rest: Vec<BoneRest> = bind.iter().map(BoneRest::from_pose).collect();
    let palette = BonePalette::from_poses(&rest, &bind);

    let influences = Influences::from_pairs(&[(0, 0.5), (1, 0.3), (2, 0.2)]).expect("weights");
    for _ in 0..50 {
        let (_, position) = random_rigid(&mut rng);
        let (_, center) = random_rigid(&mut rng);
        for algorithm in ALGORITHMS {
            let out = skin_vertex(
                algorithm,
                position,
                &influences,
                Some(center),
                palette.as_slice(),
            );
            assert_vec3_approx(out, position, 1.0e-4);
        }
    }
}

#[test]
fn single_influence_matches_direct_transform() {
    let mut rng = StdRng::seed_from_u64(23);
    let bind = random_poses(&mut rng, 2);
    let poses = random_poses(&mut rng, 2);
    let rest: Vec<BoneRest> = bind.iter().map(BoneRest::from_pose).collect();
    let palette = BonePalette::from_poses(&rest, &poses);

    let influences = Influences::single(1);
    let direct = poses[1].matrix * rest[1].inverse_matrix;
    for _ in 0..50 {
        let (_, position) = random_rigid(&mut rng);
        let (_, center) = random_rigid(&mut rng);
        let expected = direct.transform_point3(position);

        assert_vec3_approx(linear_blend(position, &influences, palette.as_slice()), expected, 1.0e-3);
        assert_vec3_approx(
            dual_quaternion_blend(position, &influences, palette.as_slice()),
            expected,
            1.0e-3,
        );
        assert_vec3_approx(
            optimized_center_of_rotation(position, &influences, center, palette.as_slice()),
            expected,
            1.0e-3,
        );
    }
}

#[test]
fn dual_quaternion_blend_picks_consistent_cover() {
    // Same transform on both bones, opposite quaternion signs.
    let pose = BonePose::from_rigid(Quat::from_rotation_y(0.9), Vec3::new(1.0, 0.0, 0.0));
    let mut flipped = pose;
    flipped.dual = -pose.dual;
    flipped.rotation = -pose.rotation;

    let rest = vec![BoneRest::default(), BoneRest::default()];
    let palette = BonePalette::from_poses(&rest, &[pose, flipped]);
    let influences = Influences::from_pairs(&[(0, 0.5), (1, 0.5)]).expect("weights");

    let p = Vec3::new(0.0, 1.0, 2.0);
    let expected = pose.matrix.transform_point3(p);
    assert_vec3_approx(
        dual_quaternion_blend(p, &influences, palette.as_slice()),
        expected,
        1.0e-4,
    );
    assert_vec3_approx(
        optimized_center_of_rotation(p, &influences, Vec3::ZERO, palette.as_slice()),
        expected,
        1.0e-4,
    );
}

#[test]
fn center_of_rotation_without_centers_degrades_to_linear() {
    let skin = hinge_skin();
    assert_eq!(
        SkinningAlgorithm::OptimizedCenterOfRotation.effective_for(&skin),
        SkinningAlgorithm::Linear
    );
    assert_eq!(
        SkinningAlgorithm::DualQuaternion.effective_for(&skin),
        SkinningAlgorithm::DualQuaternion
    );

    let mut with_centers = skin.clone();
    with_centers.centers_of_rotation = Some(vec![Vec3::ZERO; 8]);
    assert_eq!(
        SkinningAlgorithm::OptimizedCenterOfRotation.effective_for(&with_centers),
        SkinningAlgorithm::OptimizedCenterOfRotation
    );

    let palette = BonePalette::from_poses(&skin.bones, &crate::test_support::hinge_bent());
    let influences = skin.influences[4];
    let p = skin.vertices[4].position;
    assert_vec3_approx(
        skin_vertex(
            SkinningAlgorithm::OptimizedCenterOfRotation,
            p,
            &influences,
            None,
            palette.as_slice(),
        ),
        linear_blend(p, &influences, palette.as_slice()),
        1.0e-6,
    );
}

#[test]
fn palette_ignores_missing_bones() {
    let palette = BonePalette::identity(1);
    let influences = Influences::from_pairs(&[(0, 0.5), (4, 0.5)]).expect("weights");
    let p = Vec3::new(1.0, 2.0, 3.0);
    // Only half the weight lands, so linear blending scales toward the origin.
    assert_vec3_approx(linear_blend(p, &influences, palette.as_slice()), p * 0.5, 1.0e-6);
}

#[test]
fn tension_is_zero_at_rest() {
    let skin = hinge_skin();
    let topology = skin.topology();
    let positions: Vec<Vec3> = skin.vertices.iter().map(|v| v.position).collect();
    let mut tension = vec![1.0; positions.len()];
    compute_tension(&topology, &positions, &mut tension);
    for t in tension {
        assert_approx(t, 0.0, 1.0e-6);
    }
}

#[test]
fn tension_is_positive_under_compression_and_negative_under_stretch() {
    let skin = hinge_skin();
    let topology = skin.topology();

    let squashed: Vec<Vec3> = skin.vertices.iter().map(|v| v.position * 0.5).collect();
    let mut tension = vec![0.0; squashed.len()];
    compute_tension(&topology, &squashed, &mut tension);
    for &t in &tension {
        assert_approx(t, 0.5, 1.0e-5);
    }

    let stretched: Vec<Vec3> = skin.vertices.iter().map(|v| v.position * 4.0).collect();
    compute_tension(&topology, &stretched, &mut tension);
    for &t in &tension {
        assert_approx(t, -1.0, 1.0e-6);
    }
}

#[test]
fn isolated_vertex_has_zero_tension() {
    let mesh = MeshSource {
        positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::new(5.0, 5.0, 5.0)],
        indices: vec![0, 1, 2],
        bone_indices: vec![[0; 4]; 4],
        bone_weights: vec![[1.0, 0.0, 0.0, 0.0]; 4],
        ..Default::default()
    };
    let skin = SkinData::from_mesh(mesh, &[BonePose::IDENTITY]).expect("valid mesh");
    let topology = skin.topology();
    let positions = vec![Vec3::ZERO, Vec3::X * 0.5, Vec3::Y * 0.5, Vec3::ZERO];
    let mut tension = vec![0.0; 4];
    compute_tension(&topology, &positions, &mut tension);
    assert!(tension[0] > 0.0);
    assert_approx(tension[3], 0.0, 0.0);
}
