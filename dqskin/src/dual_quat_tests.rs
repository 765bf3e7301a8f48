use crate::DualQuat;
use crate::test_support::{assert_vec3_approx, random_rigid};
use glam::{Mat4, Quat, Vec3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::f32::consts::FRAC_PI_2;

#[test]
fn from_rigid_recovers_translation() {
    let dq = DualQuat::from_rigid(Quat::from_rotation_y(0.7), Vec3::new(1.0, -2.0, 3.0));
    assert_vec3_approx(dq.translation(), Vec3::new(1.0, -2.0, 3.0), 1.0e-5);
}

#[test]
fn apply_rotates_then_translates() {
    let dq = DualQuat::from_rigid(Quat::from_rotation_z(FRAC_PI_2), Vec3::new(0.0, 0.0, 5.0));
    assert_vec3_approx(dq.apply(Vec3::X), Vec3::new(0.0, 1.0, 5.0), 1.0e-5);
    assert_vec3_approx(dq * Vec3::X, Vec3::new(0.0, 1.0, 5.0), 1.0e-5);
}

#[test]
fn compose_applies_right_operand_first() {
    let rotate = DualQuat::from_rotation(Quat::from_rotation_z(FRAC_PI_2));
    let translate = DualQuat::from_translation(Vec3::new(1.0, 0.0, 0.0));

    // Translate first, then rotate: (0,0,0) -> (1,0,0) -> (0,1,0).
    let composed = DualQuat::compose(&rotate, &translate);
    assert_vec3_approx(composed.apply(Vec3::ZERO), Vec3::new(0.0, 1.0, 0.0), 1.0e-5);

    // Rotate first, then translate: (0,0,0) -> (0,0,0) -> (1,0,0).
    let composed = translate * rotate;
    assert_vec3_approx(composed.apply(Vec3::ZERO), Vec3::new(1.0, 0.0, 0.0), 1.0e-5);
}

#[test]
fn compose_matches_matrix_product() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..100 {
        let (ra, ta) = random_rigid(&mut rng);
        let (rb, tb) = random_rigid(&mut rng);
        let a = DualQuat::from_rigid(ra, ta);
        let b = DualQuat::from_rigid(rb, tb);
        let matrix = Mat4::from_rotation_translation(ra, ta) * Mat4::from_rotation_translation(rb, tb);

        let p = Vec3::new(0.3, -1.2, 2.5);
        assert_vec3_approx((a * b).apply(p), matrix.transform_point3(p), 1.0e-3);
    }
}

#[test]
fn compose_with_inverse_is_identity_for_random_transforms() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..1000 {
        let (rotation, translation) = random_rigid(&mut rng);
        let dq = DualQuat::from_rigid(rotation, translation);
        let round_trip = DualQuat::compose(&dq, &dq.inverse()).normalize();

        // Either cover of the identity is acceptable.
        let aligned = if round_trip.real.w < 0.0 {
            -round_trip
        } else {
            round_trip
        };
        assert!(
            aligned.approx_eq(&DualQuat::IDENTITY, 1.0e-4),
            "round trip of {dq:?} gave {round_trip:?}"
        );
    }
}

#[test]
fn double_cover_applies_identically() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..200 {
        let (rotation, translation) = random_rigid(&mut rng);
        let dq = DualQuat::from_rigid(rotation, translation);
        let (_, p) = random_rigid(&mut rng);
        assert_vec3_approx(dq.apply(p), (-dq).apply(p), 1.0e-4);
    }
}

#[test]
fn equality_is_sign_sensitive() {
    let dq = DualQuat::from_rigid(Quat::from_rotation_x(0.4), Vec3::ONE);
    assert_eq!(dq, dq);
    assert_ne!(dq, -dq);
    assert_eq!(dq.negate(), -dq);
    assert_eq!(dq.negate().negate(), dq);
}

#[test]
fn normalize_divides_both_parts_by_real_length() {
    let dq = DualQuat::from_rigid(Quat::from_rotation_x(1.0), Vec3::new(2.0, 0.0, 0.0));
    let scaled = DualQuat::from_parts(dq.real * 3.0, dq.dual * 3.0);
    let normalized = scaled.normalize();
    assert!((normalized.length() - 1.0).abs() < 1.0e-6);
    assert!(normalized.approx_eq(&dq, 1.0e-5));
}

#[test]
fn matrix_conversion_round_trips() {
    let rotation = Quat::from_euler(glam::EulerRot::XYZ, 0.3, -0.8, 1.9);
    let translation = Vec3::new(-4.0, 0.5, 7.25);
    let matrix = Mat4::from_rotation_translation(rotation, translation);

    let dq = DualQuat::from_matrix(&matrix);
    assert!(dq.to_matrix().abs_diff_eq(matrix, 1.0e-5));
}

#[test]
fn inverse_undoes_apply() {
    let dq = DualQuat::from_rigid(Quat::from_rotation_y(-2.1), Vec3::new(3.0, 1.0, -1.0));
    let p = Vec3::new(0.25, 0.5, 0.75);
    assert_vec3_approx(dq.inverse().apply(dq.apply(p)), p, 1.0e-5);
}

#[test]
fn degenerate_normalize_returns_identity() {
    let zero = DualQuat::from_parts(Quat::from_xyzw(0.0, 0.0, 0.0, 0.0), Quat::IDENTITY);
    assert_eq!(zero.normalize(), DualQuat::IDENTITY);
}
