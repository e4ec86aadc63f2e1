extern crate metabuffer;

mod common;

use common::*;
use metabuffer::{MapKind, MetaBuffer};
use std::fs;

#[test]
fn test_dumps_land_in_the_metadata_directory() {
    let directory = std::env::temp_dir().join(format!("metabuf-dump-{}", std::process::id()));
    let mut options = options(MapKind::Hash);
    options.dump_directory = directory.clone();
    let buffer = MetaBuffer::create(catalog(), &options).unwrap();
    buffer.set_tag(TAG_X, &int32(3), 1).unwrap();
    buffer.set_tag(TAG_TUNING, &[0xab; 40], 40).unwrap();

    let binary = buffer.binary_dump(None).unwrap();
    assert_eq!(binary.parent(), Some(directory.join("metadata").as_path()));
    assert_eq!(
        binary.file_name().unwrap().to_str().unwrap(),
        format!("metadata_{:08x}.bin", buffer.unique_id())
    );
    let bytes = fs::read(&binary).unwrap();
    assert_eq!(&bytes[..4], b"META");
    // Header, then two records of 12 bytes plus values.
    assert_eq!(bytes.len(), 8 + (12 + 4) + (12 + 40));

    let text = buffer.dump_details(Some("frame.txt")).unwrap();
    let report = fs::read_to_string(&text).unwrap();
    assert!(report.lines().any(|l| l.starts_with("Tag 10000 size 4")));
    assert!(report.contains("tagName org.quic.camera.tuning.data"));

    buffer.print(false);
    buffer.print_details();
    fs::remove_dir_all(&directory).unwrap();
}
