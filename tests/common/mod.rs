#![allow(dead_code)]

use metabuffer::buffer::MapKind;
use metabuffer::catalog::{ElementType, StaticTagCatalog, TagCatalog, TagVisibility};
use metabuffer::util::constants::{PROPERTY_BLOB_NAME, PROPERTY_BLOB_SECTION};
use metabuffer::{MetaBuffer, Options};
use std::sync::Arc;

pub const TAG_X: u32 = 0x0001_0000;
pub const TAG_Y: u32 = 0x0001_0001;
pub const TAG_Z: u32 = 0x0001_0002;
pub const TAG_TIMESTAMP: u32 = 0x0002_0000;
pub const TAG_FACES: u32 = 0x0002_0001;
pub const TAG_TUNING: u32 = 0x8000_0000;
pub const TAG_PROPERTY_BLOB: u32 = 0x8000_0001;
pub const TAG_PROP_ISO: u32 = 0x3000_0000;
pub const TAG_PROP_CCM: u32 = 0x3000_0001;

pub const STANDARD_TAGS: [u32; 6] = [TAG_X, TAG_Y, TAG_Z, TAG_TIMESTAMP, TAG_FACES, TAG_TUNING];
pub const PROPERTY_TAGS: [u32; 2] = [TAG_PROP_ISO, TAG_PROP_CCM];

/// TAG_X and TAG_TIMESTAMP are small, TAG_Y is 4096 bytes, TAG_Z is 256 bytes.
pub fn catalog() -> Arc<dyn TagCatalog> {
    Arc::new(
        StaticTagCatalog::builder()
            .tag(TAG_X, "android.control", "mode", ElementType::Int32, 1, TagVisibility::ALL)
            .tag(TAG_Y, "android.statistics", "lensShadingMap", ElementType::Float, 1024, TagVisibility::ALL)
            .tag(TAG_Z, "android.statistics", "histogram", ElementType::Int32, 64, TagVisibility::ALL)
            .tag(TAG_TIMESTAMP, "android.sensor", "timestamp", ElementType::Int64, 1, TagVisibility::ALL)
            .tag(TAG_FACES, "android.statistics", "faceRectangles", ElementType::Int32, 40, TagVisibility::ALL)
            .tag(TAG_TUNING, "org.quic.camera.tuning", "data", ElementType::Byte, 512, TagVisibility::OEM)
            .tag(TAG_PROPERTY_BLOB, PROPERTY_BLOB_SECTION, PROPERTY_BLOB_NAME, ElementType::Byte, 512, TagVisibility::OEM)
            .property(TAG_PROP_ISO, "com.qti.chi.property", "iso", ElementType::Int32, 1)
            .property(TAG_PROP_CCM, "com.qti.chi.property", "ccm", ElementType::Rational, 9)
            .build()
            .unwrap(),
    )
}

pub fn options(kind: MapKind) -> Options {
    let mut options = Options::default();
    options.map_kind = kind;
    options
}

pub fn buffer(kind: MapKind) -> Arc<MetaBuffer> {
    MetaBuffer::create(catalog(), &options(kind)).unwrap()
}

pub fn buffer_with(catalog: &Arc<dyn TagCatalog>, kind: MapKind) -> Arc<MetaBuffer> {
    MetaBuffer::create(catalog.clone(), &options(kind)).unwrap()
}

pub fn int32(value: i32) -> [u8; 4] {
    value.to_le_bytes()
}

pub fn read_int32(bytes: &[u8]) -> i32 {
    i32::from_le_bytes(bytes[..4].try_into().unwrap())
}

pub const BACKENDS: [MapKind; 2] = [MapKind::Linear, MapKind::Hash];
