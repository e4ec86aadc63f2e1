use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

use metabuffer::catalog::{ElementType, StaticTagCatalog, TagCatalog, TagVisibility};
use metabuffer::util::constants::{PROPERTY_BLOB_NAME, PROPERTY_BLOB_SECTION};
use metabuffer::{MapKind, MetaBuffer, Options};
use std::hint::black_box;
use std::sync::Arc;

const SMALL_TAGS: u32 = 200;
const LARGE_TAGS: u32 = 20;

fn small_tag(i: u32) -> u32 {
    0x0001_0000 + i
}

fn large_tag(i: u32) -> u32 {
    0x0002_0000 + i
}

/// A catalog shaped like a real one: many small tags, a few large ones.
fn catalog() -> Arc<dyn TagCatalog> {
    let mut builder = StaticTagCatalog::builder();
    for i in 0..SMALL_TAGS {
        builder = builder.tag(
            small_tag(i),
            "bench.small",
            &format!("tag{}", i),
            ElementType::Int32,
            4,
            TagVisibility::ALL,
        );
    }
    for i in 0..LARGE_TAGS {
        builder = builder.tag(
            large_tag(i),
            "bench.large",
            &format!("tag{}", i),
            ElementType::Byte,
            2048,
            TagVisibility::ALL,
        );
    }
    Arc::new(
        builder
            .tag(
                0x8000_0000,
                PROPERTY_BLOB_SECTION,
                PROPERTY_BLOB_NAME,
                ElementType::Byte,
                64,
                TagVisibility::OEM,
            )
            .build()
            .unwrap(),
    )
}

fn filled(catalog: &Arc<dyn TagCatalog>, kind: MapKind) -> Arc<MetaBuffer> {
    let mut options = Options::default();
    options.map_kind = kind;
    let buffer = MetaBuffer::create(catalog.clone(), &options).unwrap();
    for i in (0..SMALL_TAGS).step_by(4) {
        buffer.set_tag(small_tag(i), &[1; 16], 4).unwrap();
    }
    for i in 0..LARGE_TAGS {
        buffer.set_tag(large_tag(i), &[2; 2048], 2048).unwrap();
    }
    buffer
}

pub fn bench_main(c: &mut Criterion) {
    let catalog = catalog();
    for kind in [MapKind::Linear, MapKind::Hash] {
        let src = filled(&catalog, kind);
        let dst = filled(&catalog, kind);

        c.bench_function(&format!("{}/set_get", kind), |b| {
            b.iter(|| {
                dst.set_tag(small_tag(1), black_box(&[3; 16]), 4).unwrap();
                black_box(dst.get_tag(small_tag(1)))
            })
        });
        c.bench_function(&format!("{}/merge", kind), |b| {
            b.iter(|| {
                dst.merge(&src, false).unwrap();
                dst.reset();
            })
        });
        c.bench_function(&format!("{}/copy", kind), |b| {
            b.iter(|| {
                dst.copy(&src, false).unwrap();
                dst.reset();
            })
        });
        c.bench_function(&format!("{}/iterate", kind), |b| {
            b.iter(|| black_box(src.create_iterator().count()))
        });
    }
}

criterion_group!(benches, bench_main);
criterion_main!(benches);
