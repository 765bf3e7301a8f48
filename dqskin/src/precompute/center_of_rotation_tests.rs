use crate::test_support::{assert_approx, assert_vec3_approx, hinge_skin};
use crate::{
    Cluster, ClusterAssignment, CorSettings, Error, Influences, MeshSource, SkinData,
    WorkerStatus, build_clusters, compute_centers_of_rotation, merged_triangle_weights,
    triangle_area, weight_similarity,
};
use glam::Vec3;
use std::sync::Arc;

fn clustered_hinge(threshold: f32) -> SkinData {
    let mut skin = hinge_skin();
    skin.clusters = Some(build_clusters(&skin, threshold).expect("clusters"));
    skin
}

#[test]
fn merged_weights_average_corners() {
    let a = Influences::single(0);
    let b = Influences::from_pairs(&[(0, 0.5), (1, 0.5)]).expect("weights");
    let mut merged = merged_triangle_weights([&a, &a, &b]);
    merged.sort_by_key(|&(bone, _)| bone);
    assert_eq!(merged.len(), 2);
    assert_approx(merged[0].1, 2.5 / 3.0, 1.0e-6);
    assert_approx(merged[1].1, 0.5 / 3.0, 1.0e-6);
}

#[test]
fn similarity_needs_two_shared_bones() {
    assert_eq!(weight_similarity(&[(0, 1.0)], &[(0, 1.0)], 0.5), 0.0);
    assert_eq!(weight_similarity(&[(0, 0.5), (1, 0.5)], &[(2, 1.0)], 0.5), 0.0);

    // Identical maps: the exponential term is 1.
    let same = [(0, 0.5), (1, 0.5)];
    assert_approx(weight_similarity(&same, &same, 0.5), 0.0625, 1.0e-7);

    // Diverging ratios are penalized.
    let other = [(0, 0.9), (1, 0.1)];
    assert!(weight_similarity(&same, &other, 0.5) < 0.5 * 0.9 * 0.5 * 0.1);
}

#[test]
fn triangle_area_of_unit_right_triangle() {
    assert_approx(triangle_area(Vec3::ZERO, Vec3::X, Vec3::Y), 0.5, 1.0e-7);
    assert_approx(triangle_area(Vec3::ZERO, Vec3::X, Vec3::X * 2.0), 0.0, 1.0e-7);
}

#[test]
fn joint_centers_sit_on_the_hinge_axis() {
    let skin = Arc::new(clustered_hinge(1.0));
    let settings = CorSettings {
        worker_count: 3,
        similarity_threshold: 0.01,
        ..CorSettings::default()
    };
    let job = compute_centers_of_rotation(Arc::clone(&skin), &settings).expect("job starts");
    assert_eq!(job.worker_count(), 3);
    let outcome = job.join();

    assert!(outcome.is_complete());
    assert_eq!(outcome.centers.len(), 8);
    assert_eq!(outcome.workers.iter().map(|w| w.processed).sum::<usize>(), 8);
    assert!(outcome.workers.iter().all(|w| w.status == WorkerStatus::Done));

    // Rigid vertices share no bone pair with any triangle and fall back.
    assert_eq!(outcome.fallback_vertices, vec![0, 1, 2, 3]);
    assert_eq!(outcome.fallbacks, 4);
    for v in 0..4 {
        assert_vec3_approx(outcome.centers[v], skin.vertices[v].position, 0.0);
    }

    for v in 4..8 {
        let center = outcome.centers[v];
        assert!(center.x > -2.0 / 3.0 && center.x < -1.0 / 3.0, "{center:?}");
        assert_approx(center.y, 0.0, 1.0e-5);
        assert_approx(center.z, 0.0, 1.0e-5);
    }
}

#[test]
fn isolated_vertex_falls_back_to_rest_position() {
    let mesh = MeshSource {
        positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::new(4.0, 5.0, 6.0)],
        indices: vec![0, 1, 2],
        bone_indices: vec![[0, 1, 0, 0]; 4],
        bone_weights: vec![[0.5, 0.5, 0.0, 0.0]; 4],
        ..Default::default()
    };
    let mut skin = SkinData::from_mesh(mesh, &[crate::BonePose::IDENTITY; 2]).expect("valid");
    skin.clusters = Some(build_clusters(&skin, 1.0).expect("clusters"));

    let outcome = compute_centers_of_rotation(Arc::new(skin), &CorSettings::default())
        .expect("job starts")
        .join();
    assert!(outcome.is_complete());
    assert_eq!(outcome.fallback_vertices, vec![3]);
    assert_vec3_approx(outcome.centers[3], Vec3::new(4.0, 5.0, 6.0), 0.0);

    // The triangle's own vertices land on its centroid.
    let centroid = Vec3::new(1.0 / 3.0, 1.0 / 3.0, 0.0);
    for v in 0..3 {
        assert_vec3_approx(outcome.centers[v], centroid, 1.0e-6);
    }
}

#[test]
fn failing_worker_does_not_stop_siblings() {
    let mut skin = hinge_skin();
    // Cluster 1 references a vertex the mesh does not have.
    skin.clusters = Some(ClusterAssignment {
        clusters: vec![
            Cluster {
                id: 0,
                vertex_start: 0,
                vertex_len: 4,
                triangle_start: 0,
                triangle_len: 8,
            },
            Cluster {
                id: 1,
                vertex_start: 4,
                vertex_len: 4,
                triangle_start: 0,
                triangle_len: 8,
            },
        ],
        vertex_indices: vec![0, 1, 2, 3, 4, 5, 6, 99],
        triangle_indices: (0..8).collect(),
    });

    let settings = CorSettings {
        worker_count: 2,
        ..CorSettings::default()
    };
    let outcome = compute_centers_of_rotation(Arc::new(skin.clone()), &settings)
        .expect("job starts")
        .join();

    assert!(!outcome.is_complete());
    assert_eq!(outcome.failed_workers, 1);
    assert_eq!(outcome.workers[0].status, WorkerStatus::Done);
    assert_eq!(outcome.workers[0].processed, 4);
    assert_eq!(outcome.workers[1].status, WorkerStatus::Failed);
    assert_eq!(outcome.workers[1].processed, 3);

    let err = skin.apply_centers(outcome).unwrap_err();
    assert!(matches!(err, Error::PartialPrecompute { failed_workers: 1 }));
}

#[test]
fn rejects_missing_clusters_and_bad_settings() {
    let skin = Arc::new(hinge_skin());
    assert!(matches!(
        compute_centers_of_rotation(Arc::clone(&skin), &CorSettings::default()).err(),
        Some(Error::MissingClusters)
    ));

    let clustered = Arc::new(clustered_hinge(1.0));
    for settings in [
        CorSettings {
            worker_count: 0,
            ..CorSettings::default()
        },
        CorSettings {
            similarity_kernel: 0.0,
            ..CorSettings::default()
        },
    ] {
        assert!(matches!(
            compute_centers_of_rotation(Arc::clone(&clustered), &settings).err(),
            Some(Error::InvalidValue { .. })
        ));
    }
}

#[test]
fn progress_reaches_total_after_join() {
    let skin = Arc::new(clustered_hinge(0.5));
    let job = compute_centers_of_rotation(skin, &CorSettings::default()).expect("job starts");
    let total = job.progress().total;
    assert_eq!(total, 8);
    let outcome = job.join();
    let processed: usize = outcome.workers.iter().map(|w| w.processed).sum();
    assert_eq!(processed, total);
}
