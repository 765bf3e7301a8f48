use crate::test_support::hinge_skin;
use crate::{Error, SkinData, build_clusters};
use glam::Vec3;

fn clustered_hinge() -> SkinData {
    let mut skin = hinge_skin();
    skin.clusters = Some(build_clusters(&skin, 0.5).expect("clusters"));
    skin.centers_of_rotation = Some(skin.vertices.iter().map(|v| v.position).collect());
    skin
}

#[test]
fn skin_survives_binary() {
    let skin = clustered_hinge();
    let bytes = skin.to_skin_bytes();
    assert_eq!(&bytes[..4], b"DQSK");

    let loaded = SkinData::from_skin_bytes(&bytes, 8).expect("loads");
    assert_eq!(loaded.vertices, skin.vertices);
    assert_eq!(loaded.influences, skin.influences);
    assert_eq!(loaded.bones, skin.bones);
    assert_eq!(loaded.clusters, skin.clusters);
    assert_eq!(loaded.centers_of_rotation, skin.centers_of_rotation);
}

#[test]
fn optional_sections_may_be_absent() {
    let skin = hinge_skin();
    let loaded = SkinData::from_skin_bytes(&skin.to_skin_bytes(), 8).expect("loads");
    assert!(loaded.clusters.is_none());
    assert!(loaded.centers_of_rotation.is_none());
}

#[test]
fn stale_vertex_count_is_rejected() {
    let bytes = clustered_hinge().to_skin_bytes();
    let err = SkinData::from_skin_bytes(&bytes, 12).unwrap_err();
    assert!(
        matches!(
            err,
            Error::StaleSkinData {
                array: "vertex_count",
                stored: 8,
                expected: 12
            }
        ),
        "{err:?}"
    );
}

#[test]
fn stale_centers_are_rejected() {
    let mut skin = clustered_hinge();
    skin.centers_of_rotation = Some(vec![Vec3::ZERO; 3]);
    let err = SkinData::from_skin_bytes(&skin.to_skin_bytes(), 8).unwrap_err();
    assert!(
        matches!(
            err,
            Error::StaleSkinData {
                array: "centers_of_rotation",
                ..
            }
        ),
        "{err:?}"
    );
}

#[test]
fn truncated_input_is_a_parse_error() {
    let bytes = clustered_hinge().to_skin_bytes();
    for len in [0, 3, 10, bytes.len() / 2, bytes.len() - 1] {
        let err = SkinData::from_skin_bytes(&bytes[..len], 8).unwrap_err();
        assert!(matches!(err, Error::BinaryParse { .. }), "len {len}: {err:?}");
    }
}

#[test]
fn bad_header_is_rejected() {
    let mut bytes = hinge_skin().to_skin_bytes();
    bytes[0] = b'X';
    assert!(matches!(
        SkinData::from_skin_bytes(&bytes, 8),
        Err(Error::BinaryParse { .. })
    ));
}
