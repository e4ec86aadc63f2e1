use crate::buffer::MapKind;
use crate::catalog::{ElementType, StaticTagCatalog, TagCatalog, TagVisibility};
use crate::util::constants::{PROPERTY_BLOB_NAME, PROPERTY_BLOB_SECTION};
use crate::util::options::Options;
use std::panic;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// A 4-byte framework tag, stored inline.
pub const TAG_AE_MODE: u32 = 0x0001_0000;
/// An 8-byte framework tag, stored inline.
pub const TAG_EXPOSURE_TIME: u32 = 0x0001_0001;
/// A 4096-byte framework tag, stored in a region.
pub const TAG_HISTOGRAM: u32 = 0x0001_0002;
/// A 128-byte vendor tag hidden from the framework, stored in a region.
pub const TAG_VENDOR_BLOB: u32 = 0x8000_0000;
/// The carrier of packed property tags.
pub const TAG_PROPERTY_BLOB: u32 = 0x8000_0001;
/// A 4-byte property tag.
pub const TAG_PROP_GAIN: u32 = 0x3000_0000;
/// A 96-byte property tag.
pub const TAG_PROP_MATRIX: u32 = 0x3000_0001;

/// The catalog shared by the unit tests.
pub fn test_catalog() -> Arc<dyn TagCatalog> {
    Arc::new(
        StaticTagCatalog::builder()
            .tag(TAG_AE_MODE, "android.control", "aeMode", ElementType::Int32, 1, TagVisibility::ALL)
            .tag(TAG_EXPOSURE_TIME, "android.sensor", "exposureTime", ElementType::Int64, 1, TagVisibility::ALL)
            .tag(TAG_HISTOGRAM, "android.statistics", "histogram", ElementType::Int32, 1024, TagVisibility::ALL)
            .tag(TAG_VENDOR_BLOB, "org.quic.camera.debug", "blob", ElementType::Byte, 128, TagVisibility::OEM)
            .tag(TAG_PROPERTY_BLOB, PROPERTY_BLOB_SECTION, PROPERTY_BLOB_NAME, ElementType::Byte, 256, TagVisibility::OEM)
            .property(TAG_PROP_GAIN, "com.qti.chi.property", "gain", ElementType::Float, 1)
            .property(TAG_PROP_MATRIX, "com.qti.chi.property", "matrix", ElementType::Float, 24)
            .build()
            .expect("test catalog is consistent"),
    )
}

/// Options with the given backend. Other tests may set `METABUF_MAP_KIND` concurrently, so
/// tests never rely on the default.
pub fn test_options(kind: MapKind) -> Options {
    let mut options = Options::default();
    options.map_kind = kind;
    options
}

// https://github.com/rust-lang/rfcs/issues/2798#issuecomment-552949300
pub fn panic_after<T, F>(millis: u64, f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T,
    F: Send + 'static,
{
    let (done_tx, done_rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let val = f();
        done_tx.send(()).expect("Unable to send completion signal");
        val
    });

    match done_rx.recv_timeout(Duration::from_millis(millis)) {
        Ok(_) => handle.join().expect("Thread panicked"),
        Err(e) => panic!("Thread took too long: {}", e),
    }
}

// A global lock to make tests that touch environment variables serial.
static SERIAL_TEST_LOCK: Mutex<()> = Mutex::new(());

// force some tests to be executed serially
pub fn serial_test<F>(f: F)
where
    F: FnOnce(),
{
    // If one test fails, the lock will become poisoned. We would want to continue for other tests anyway.
    let _guard = SERIAL_TEST_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    f();
}

// Always execute a cleanup closure no matter the test panics or not.
pub fn with_cleanup<T, C>(test: T, cleanup: C)
where
    T: FnOnce() + panic::UnwindSafe,
    C: FnOnce(),
{
    let res = panic::catch_unwind(test);
    cleanup();
    if let Err(e) = res {
        panic::resume_unwind(e);
    }
}
