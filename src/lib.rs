//! A metadata buffer engine for camera pipelines.
//!
//! Every frame that passes through a camera pipeline carries metadata: a set of tags, each
//! holding a small typed array such as an exposure time, a histogram or an opaque vendor
//! blob. This crate stores those tags in [`MetaBuffer`](buffer::MetaBuffer)s and lets
//! pipeline stages combine buffers cheaply:
//!
//! * A [`TagCatalog`](catalog::TagCatalog) describes the tags: their type, maximum element
//!   count and a dense unique index. Buffers created against one catalog can be composed.
//! * A buffer keeps small values inline and large values in zero-initialized memory regions
//!   it owns. Regions survive [`reset`](buffer::MetaBuffer::reset) and are reused by the
//!   next frame.
//! * [`merge`](buffer::MetaBuffer::merge) shares the large values of another buffer instead
//!   of copying them. The merged buffer is linked and reference counted until the merging
//!   buffer is reset.
//! * Several per-camera buffers can be combined under one root, and tags can then be read as
//!   seen by any of those cameras.
//! * Buffers convert to and from [`CameraMetadata`](metadata::CameraMetadata) containers.
//!
//! Logging goes through the [`log`](https://docs.rs/log) crate. Call
//! [`util::logger::try_init`] to install the built-in `env_logger`, or install any other
//! logger. Buffers are configured with [`Options`](util::options::Options), which read
//! `METABUF_*` environment variables.

pub mod buffer;
pub mod catalog;
mod error;
pub mod metadata;
pub mod util;

pub use crate::buffer::{MapKind, MetaBuffer, MetaIterator, TagEntry};
pub use crate::catalog::{StaticTagCatalog, TagCatalog};
pub use crate::error::{MetaError, Result};
pub use crate::metadata::CameraMetadata;
pub use crate::util::options::Options;
