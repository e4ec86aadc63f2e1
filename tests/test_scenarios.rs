extern crate metabuffer;

mod common;

use common::*;
use metabuffer::buffer::{ExportFilter, Payload, ReferenceKind, Slot};
use metabuffer::{CameraMetadata, MetaError};

#[test]
fn test_allocate_reserves_space_not_validity() {
    for kind in BACKENDS {
        let buffer = buffer(kind);
        buffer.allocate_buffer(&[TAG_X, TAG_Y]).unwrap();

        assert_eq!(buffer.slot(TAG_X), Some(Slot::InPlace));
        assert!(matches!(
            buffer.slot(TAG_Y),
            Some(Slot::Region { offset: 0, .. })
        ));
        assert_eq!(buffer.capacity(), 4096);
        assert_eq!(buffer.count(), 0);
        assert!(buffer.get_tag(TAG_Y).is_none());

        buffer.set_tag(TAG_Y, &[1; 4096], 1024).unwrap();
        assert_eq!(buffer.count(), 1);
        assert_eq!(buffer.capacity(), 4096);
    }
}

#[test]
fn test_merge_disjoint_adds_missing_tags_only() {
    for kind in BACKENDS {
        let a = buffer(kind);
        let b = buffer(kind);
        a.set_tag(TAG_X, &int32(1), 1).unwrap();
        b.set_tag(TAG_X, &int32(2), 1).unwrap();
        b.set_tag(TAG_TIMESTAMP, &3i64.to_le_bytes(), 1).unwrap();

        a.merge(&b, true).unwrap();
        assert_eq!(read_int32(&a.get_tag_bytes(TAG_X).unwrap()), 1);
        assert_eq!(a.get_tag_bytes(TAG_TIMESTAMP).unwrap(), 3i64.to_le_bytes());
    }
}

#[test]
fn test_merge_overwrites_and_references_source() {
    for kind in BACKENDS {
        let a = buffer(kind);
        let b = buffer(kind);
        a.set_tag(TAG_X, &int32(1), 1).unwrap();
        b.set_tag(TAG_X, &int32(2), 1).unwrap();

        a.merge(&b, false).unwrap();
        assert_eq!(read_int32(&a.get_tag_bytes(TAG_X).unwrap()), 2);
        assert_eq!(b.reference_count(), 1);
        assert_eq!(b.reference_counts()[ReferenceKind::Merge], 1);

        a.reset();
        assert_eq!(b.reference_count(), 0);
    }
}

#[test]
fn test_camera_lookup_resolves_through_subtree() {
    for kind in BACKENDS {
        let camera1 = buffer(kind);
        let camera2 = buffer(kind);
        camera1.set_tag(TAG_Z, &[1; 256], 64).unwrap();
        camera2.set_tag(TAG_Z, &[2; 256], 64).unwrap();

        let master = buffer(kind);
        master
            .combine_multi_camera_metadata(&[1, 2], &[camera1.clone(), camera2.clone()], 1)
            .unwrap();

        assert_eq!(master.get_tag_bytes(TAG_Z).unwrap(), vec![1; 256]);
        assert_eq!(master.get_tag_by_camera_id(TAG_Z, 2), camera2.get_tag(TAG_Z));
        assert_eq!(master.get_tag_by_camera_id(TAG_Z, 1), camera1.get_tag(TAG_Z));
        assert_eq!(
            master.get_tag_bytes_by_camera_id(TAG_Z, 2).unwrap(),
            vec![2; 256]
        );

        // A downstream buffer sees the same view through its merge links.
        let downstream = buffer(kind);
        downstream.merge(&master, false).unwrap();
        assert_eq!(
            downstream.get_tag_bytes_by_camera_id(TAG_Z, 2).unwrap(),
            vec![2; 256]
        );
    }
}

#[test]
fn test_camera_switch_takes_values_from_new_master() {
    for kind in BACKENDS {
        let wide = buffer(kind);
        let tele = buffer(kind);
        wide.set_tag(TAG_Z, &[1; 256], 64).unwrap();
        tele.set_tag(TAG_Z, &[2; 256], 64).unwrap();
        wide.set_tag(TAG_X, &int32(10), 1).unwrap();

        let root = buffer(kind);
        root.combine_multi_camera_metadata(&[0, 1], &[wide.clone(), tele.clone()], 0)
            .unwrap();
        let result = buffer(kind);
        result.merge_switching_camera(&root, 0, 1).unwrap();

        assert_eq!(result.get_tag_bytes(TAG_Z).unwrap(), vec![2; 256]);
        assert_eq!(result.get_tag(TAG_Z), tele.get_tag(TAG_Z));
        // Tele never set TAG_X, so the value of the old master stays.
        assert_eq!(read_int32(&result.get_tag_bytes(TAG_X).unwrap()), 10);
        assert_eq!(tele.reference_counts()[ReferenceKind::Merge], 2);

        assert!(matches!(
            result.merge_switching_camera(&root, 0, 9),
            Err(MetaError::InvalidArgument(_))
        ));
    }
}

#[test]
fn test_merged_values_follow_the_source() {
    let source = buffer(metabuffer::MapKind::Linear);
    let sink = buffer(metabuffer::MapKind::Linear);
    source.set_tag(TAG_Y, &[1; 4096], 1024).unwrap();
    sink.merge(&source, false).unwrap();
    assert!(matches!(sink.payload(TAG_Y), Some(Payload::Foreign(_))));

    // Large values are shared, so a later write to the source is visible.
    source.set_tag(TAG_Y, &[2; 4096], 1024).unwrap();
    assert_eq!(sink.get_tag_bytes(TAG_Y).unwrap(), vec![2; 4096]);

    // A write to the sink goes to its own memory.
    sink.set_tag(TAG_Y, &[3; 4096], 1024).unwrap();
    assert!(matches!(sink.payload(TAG_Y), Some(Payload::Local(_))));
    assert_eq!(source.get_tag_bytes(TAG_Y).unwrap(), vec![2; 4096]);
}

#[test]
fn test_metadata_round_trip_between_backends() {
    let linear = buffer(metabuffer::MapKind::Linear);
    linear.set_tag(TAG_X, &int32(4), 1).unwrap();
    linear.set_tag(TAG_FACES, &[7; 80], 20).unwrap();
    linear.set_tag(TAG_TUNING, &[9; 300], 300).unwrap();
    linear.set_tag(TAG_PROP_ISO, &int32(800), 1).unwrap();

    let mut exported = CameraMetadata::new();
    linear
        .get_android_meta(&mut exported, &ExportFilter::default())
        .unwrap();
    assert!(exported.find(TAG_PROPERTY_BLOB).is_some());
    assert!(exported.find(TAG_PROP_ISO).is_none());

    let bytes = exported.to_bytes();
    let decoded = CameraMetadata::from_bytes(&bytes).unwrap();
    let hash = buffer(metabuffer::MapKind::Hash);
    hash.set_tags_from_metadata(&decoded).unwrap();
    assert_eq!(hash.count(), 4);
    assert_eq!(read_int32(&hash.get_tag_bytes(TAG_PROP_ISO).unwrap()), 800);
    assert_eq!(hash.get_tag_bytes(TAG_TUNING).unwrap(), vec![9; 300]);

    let framework_only = ExportFilter {
        framework_tags_only: true,
        filter_properties: true,
        ..Default::default()
    };
    let mut visible = CameraMetadata::new();
    hash.get_android_meta(&mut visible, &framework_only).unwrap();
    let mut tags: Vec<u32> = visible.iter().map(|e| e.tag).collect();
    tags.sort_unstable();
    assert_eq!(tags, vec![TAG_X, TAG_FACES]);
}

#[test]
fn test_destroy_lifecycle() {
    let a = buffer(metabuffer::MapKind::Hash);
    let b = buffer(metabuffer::MapKind::Hash);
    b.set_tag(TAG_Y, &[5; 16], 4).unwrap();
    a.merge(&b, false).unwrap();

    assert!(matches!(b.destroy(false), Err(MetaError::Busy { references: 1 })));
    a.destroy(false).unwrap();
    assert_eq!(b.reference_count(), 0);
    b.destroy(false).unwrap();
    assert!(matches!(a.merge(&b, false), Err(MetaError::InvalidState(_))));
}
