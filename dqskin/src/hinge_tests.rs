//! End-to-end: a two-bone hinge bent 90° through the sequential backend.

use crate::test_support::{hinge_bent, hinge_skin, polygon_area};
use crate::{
    BackendPreference, CorSettings, DeformedFrame, Frame, Precompute, SequentialBackend,
    SkinnedInstance, SkinningAlgorithm, SkinningConfig, StaticProbe,
};
use glam::Vec3;
use std::sync::Arc;

fn joint_area(frame: &DeformedFrame) -> f32 {
    let ring: Vec<Vec3> = frame.vertices[4..8].iter().map(|v| v.position).collect();
    polygon_area(&ring)
}

fn bent_frame(skin: Arc<crate::SkinData>, algorithm: SkinningAlgorithm) -> DeformedFrame {
    let mut instance = SkinnedInstance::new(skin, Box::new(StaticProbe(false)));
    instance
        .configure(SkinningConfig {
            algorithm,
            backend: BackendPreference::ForceSequential,
            tension: false,
        })
        .expect("sequential backend loads");
    instance.update(&hinge_bent()).expect("dispatch succeeds");

    let backend = instance.backend().expect("loaded");
    let Frame::Host(frame) = backend.frame() else {
        panic!("sequential backend must expose a host frame");
    };
    assert!(backend.as_any().is::<SequentialBackend>());
    frame.clone()
}

#[test]
fn rest_cross_section_is_unit_square() {
    let skin = hinge_skin();
    let rest = DeformedFrame::from_rest(&skin);
    assert!((joint_area(&rest) - 1.0).abs() < 1.0e-6);
}

#[test]
fn linear_blend_collapses_joint() {
    let frame = bent_frame(Arc::new(hinge_skin()), SkinningAlgorithm::Linear);
    let area = joint_area(&frame);
    assert!(area < 0.8, "linear blend kept {area} of the joint area");
}

#[test]
fn dual_quaternion_blend_preserves_joint() {
    let frame = bent_frame(Arc::new(hinge_skin()), SkinningAlgorithm::DualQuaternion);
    let area = joint_area(&frame);
    assert!((area - 1.0).abs() < 0.02, "dual quaternion blend changed area to {area}");
}

#[test]
fn center_of_rotation_preserves_joint() {
    let settings = CorSettings {
        worker_count: 2,
        similarity_threshold: 0.01,
        ..CorSettings::default()
    };
    let (skin, report) = Precompute::new(settings)
        .run(hinge_skin())
        .expect("precompute completes");
    assert_eq!(report.clusters, 1);

    let frame = bent_frame(Arc::new(skin), SkinningAlgorithm::OptimizedCenterOfRotation);
    let area = joint_area(&frame);
    assert!((area - 1.0).abs() < 0.02, "center-of-rotation skinning changed area to {area}");

    // The rigid ring is untouched by the bend.
    for (i, v) in frame.vertices[0..4].iter().enumerate() {
        let rest = hinge_skin().vertices[i].position;
        assert!(v.position.abs_diff_eq(rest, 1.0e-5));
    }
}
