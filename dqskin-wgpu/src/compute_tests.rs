use crate::test_support::{Gpu, gpu, hinge_bent, hinge_skin, hinge_with_centers};
use crate::{ComputeSkinningBackend, WgpuBackendFactory, WgpuProbe};
use dqskin::{
    BackendKind, BackendPreference, BonePalette, CapabilityProbe, DeformedFrame, DispatchError,
    ParallelBackendFactory, SequentialBackend, SkinData, SkinnedInstance, SkinningAlgorithm,
    SkinningBackend, SkinningConfig,
};
use std::sync::Arc;

const ALGORITHMS: [SkinningAlgorithm; 3] = [
    SkinningAlgorithm::Linear,
    SkinningAlgorithm::DualQuaternion,
    SkinningAlgorithm::OptimizedCenterOfRotation,
];

fn compute_backend(
    gpu: &Gpu,
    skin: &Arc<SkinData>,
    config: &SkinningConfig,
) -> Option<Box<dyn SkinningBackend>> {
    if !WgpuProbe::new(&gpu.adapter).supports_parallel_compute() {
        return None;
    }
    let factory = WgpuBackendFactory::new(gpu.device.clone(), gpu.queue.clone());
    Some(factory.create(skin, config).expect("compute backend"))
}

fn read_back(backend: &dyn SkinningBackend) -> DeformedFrame {
    backend
        .as_any()
        .downcast_ref::<ComputeSkinningBackend>()
        .expect("compute backend")
        .read_back()
        .expect("read back")
}

fn assert_frames_close(actual: &DeformedFrame, expected: &DeformedFrame, tolerance: f32) {
    assert_eq!(actual.vertices.len(), expected.vertices.len());
    for (i, (a, e)) in actual.vertices.iter().zip(&expected.vertices).enumerate() {
        assert!(
            a.position.abs_diff_eq(e.position, tolerance),
            "vertex {i}: {:?} vs {:?}",
            a.position,
            e.position
        );
        assert_eq!(a.uv, e.uv, "vertex {i} uv");
        assert!(
            (a.tension - e.tension).abs() <= tolerance,
            "vertex {i} tension: {} vs {}",
            a.tension,
            e.tension
        );
    }
}

#[test]
fn device_matches_host_for_every_algorithm() {
    let Some(gpu) = gpu() else {
        return;
    };
    let skin = Arc::new(hinge_with_centers());
    let palette = BonePalette::from_poses(&skin.bones, &hinge_bent());

    for algorithm in ALGORITHMS {
        let config = SkinningConfig {
            algorithm,
            tension: true,
            ..SkinningConfig::default()
        };
        let Some(mut device) = compute_backend(&gpu, &skin, &config) else {
            return;
        };
        let mut host = SequentialBackend::new(Arc::clone(&skin), &config);

        device.dispatch(&palette).expect("device dispatch");
        host.dispatch(&palette).expect("host dispatch");

        assert_eq!(device.algorithm(), algorithm);
        assert_frames_close(&read_back(device.as_ref()), host.front(), 1.0e-4);
    }
}

#[test]
fn first_frame_is_the_rest_pose() {
    let Some(gpu) = gpu() else {
        return;
    };
    let skin = Arc::new(hinge_skin());
    let Some(device) = compute_backend(&gpu, &skin, &SkinningConfig::default()) else {
        return;
    };
    assert_eq!(device.kind(), BackendKind::Parallel);
    assert!(!device.tension_enabled());
    assert_frames_close(&read_back(device.as_ref()), &DeformedFrame::from_rest(&skin), 0.0);
}

#[test]
fn center_of_rotation_without_centers_runs_linear() {
    let Some(gpu) = gpu() else {
        return;
    };
    let skin = Arc::new(hinge_skin());
    let config = SkinningConfig {
        algorithm: SkinningAlgorithm::OptimizedCenterOfRotation,
        ..SkinningConfig::default()
    };
    let Some(mut device) = compute_backend(&gpu, &skin, &config) else {
        return;
    };
    assert_eq!(device.algorithm(), SkinningAlgorithm::Linear);

    let palette = BonePalette::from_poses(&skin.bones, &hinge_bent());
    device.dispatch(&palette).expect("dispatch");
    let mut host = SequentialBackend::new(
        Arc::clone(&skin),
        &SkinningConfig {
            algorithm: SkinningAlgorithm::Linear,
            ..SkinningConfig::default()
        },
    );
    host.dispatch(&palette).expect("dispatch");
    assert_frames_close(&read_back(device.as_ref()), host.front(), 1.0e-4);
}

#[test]
fn palette_size_must_match_the_skin() {
    let Some(gpu) = gpu() else {
        return;
    };
    let skin = Arc::new(hinge_skin());
    let Some(mut device) = compute_backend(&gpu, &skin, &SkinningConfig::default()) else {
        return;
    };
    assert_eq!(
        device.dispatch(&BonePalette::identity(1)),
        Err(DispatchError::PoseCountMismatch {
            expected: 2,
            actual: 1
        })
    );
}

#[test]
fn released_backend_refuses_work() {
    let Some(gpu) = gpu() else {
        return;
    };
    let skin = Arc::new(hinge_skin());
    let Some(mut device) = compute_backend(&gpu, &skin, &SkinningConfig::default()) else {
        return;
    };
    device
        .dispatch(&BonePalette::from_poses(&skin.bones, &hinge_bent()))
        .expect("dispatch");
    device.release();
    device.release();

    let compute = device
        .as_any()
        .downcast_ref::<ComputeSkinningBackend>()
        .expect("compute backend");
    assert!(compute.output_buffer().is_none());
    assert_eq!(compute.read_back(), Err(DispatchError::NotLoaded));
    assert_eq!(
        device.dispatch(&BonePalette::identity(2)),
        Err(DispatchError::NotLoaded)
    );
}

#[test]
fn auto_instance_resolves_to_the_device() {
    let Some(gpu) = gpu() else {
        return;
    };
    let probe = WgpuProbe::new(&gpu.adapter);
    let supported = probe.supports_parallel_compute();
    let skin = Arc::new(hinge_with_centers());
    let mut instance = SkinnedInstance::new(Arc::clone(&skin), Box::new(probe))
        .with_parallel_backend(Box::new(WgpuBackendFactory::new(
            gpu.device.clone(),
            gpu.queue.clone(),
        )));
    instance
        .configure(SkinningConfig {
            algorithm: SkinningAlgorithm::DualQuaternion,
            backend: BackendPreference::Auto,
            tension: false,
        })
        .expect("configure");

    let expected = if supported {
        BackendKind::Parallel
    } else {
        BackendKind::Sequential
    };
    assert_eq!(instance.backend_kind(), Some(expected));
    instance.update(&hinge_bent()).expect("update");
}
