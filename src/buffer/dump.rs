//! Diagnostic dumps.
//!
//! A binary dump is the magic `META`, the little-endian format version, then one record per
//! valid tag:
//!
//! ```text
//! u32 tag, u32 size, u32 count, size bytes of value
//! ```
//!
//! A detail dump is a text report with one line per valid tag.

use super::content::Content;
use super::{ClientKey, MetaBuffer, Payload, ReferenceKind, Slot};
use crate::error::Result;
use crate::util::constants::{DUMP_MAGIC, DUMP_VERSION, MAX_GRAPH_DEPTH};
use crate::util::log::info;
use itertools::Itertools;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

fn write_record<W: Write>(writer: &mut W, content: &Content, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(&content.tag().to_le_bytes())?;
    writer.write_all(&content.size().to_le_bytes())?;
    writer.write_all(&content.count().to_le_bytes())?;
    writer.write_all(bytes)
}

impl MetaBuffer {
    fn describe(&self, content: &Content) -> String {
        let (offset, region) = match content.slot() {
            Slot::Region { index, offset } => (offset.to_string(), index.to_string()),
            Slot::InPlace => ("0".to_string(), "inline".to_string()),
            Slot::Unassigned | Slot::Reserved { .. } => ("-".to_string(), "-".to_string()),
        };
        let address = content
            .address()
            .map_or_else(|| "null".to_string(), |a| a.to_string());
        let parent = match (content.payload(), content.owner()) {
            (Payload::Foreign(_), Some(owner)) => format!("{:#x}", owner),
            _ => "self".to_string(),
        };
        let name = self
            .catalog
            .info_by_tag(content.tag())
            .map_or_else(|| "unknown".to_string(), |info| info.full_name());
        format!(
            "Tag {:x} size {} offset {} addr {} region {} count {} parent {} tagName {}",
            content.tag(),
            content.size(),
            offset,
            address,
            region,
            content.count(),
            parent,
            name
        )
    }

    fn dump_path(&self, file_name: Option<&str>, extension: &str) -> Result<PathBuf> {
        let directory = self.options.dump_directory.join("metadata");
        fs::create_dir_all(&directory)?;
        let file_name = match file_name {
            Some(name) => name.to_string(),
            None => format!("metadata_{:08x}.{}", self.unique_id, extension),
        };
        Ok(directory.join(file_name))
    }

    /// Write the binary dump of the valid tags to `writer`.
    pub fn binary_dump_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let map = self.map.read();
        writer.write_all(&DUMP_MAGIC)?;
        writer.write_all(&DUMP_VERSION.to_le_bytes())?;
        let mut result = Ok(());
        map.for_each_content(&mut |content| {
            if result.is_ok() {
                if let Some(bytes) = content.bytes() {
                    result = write_record(writer, content, bytes);
                }
            }
        });
        result.map_err(Into::into)
    }

    /// Write the binary dump to `file_name`, by default `metadata_<id>.bin`, under the
    /// `metadata` directory of the configured dump directory.
    pub fn binary_dump(&self, file_name: Option<&str>) -> Result<PathBuf> {
        let path = self.dump_path(file_name, "bin")?;
        let mut writer = BufWriter::new(File::create(&path)?);
        self.binary_dump_to(&mut writer)?;
        writer.flush()?;
        info!("Buffer {:#x} dumped to {}", self.unique_id, path.display());
        Ok(path)
    }

    /// Write a text report to `writer`: three header lines describing the buffer, its
    /// reference holders and its links, then one line per valid tag.
    pub fn dump_details_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let lines = self.lines(true);
        let counts = self.reference_counts();
        writeln!(
            writer,
            "MetaBuffer {:#x} backend {} tags {} regions {} capacity {} references {} \
             (external {} internal {} merge {}) camera {}",
            self.unique_id,
            self.map_kind(),
            lines.len(),
            self.regions.allocated_count(),
            self.capacity(),
            self.reference_count(),
            counts[ReferenceKind::External],
            counts[ReferenceKind::Internal],
            counts[ReferenceKind::Merge],
            self.camera_id()
                .map_or_else(|| "none".to_string(), |id| id.to_string())
        )?;
        let holders = self.reference_holders();
        writeln!(
            writer,
            "Clients {}: {}",
            holders.len(),
            holders
                .iter()
                .map(|(key, kind)| match key {
                    ClientKey::Client(id) => format!("client {} {:?}", id, kind),
                    ClientKey::Buffer(id) => format!("buffer {:#x} {:?}", id, kind),
                })
                .join(", ")
        )?;
        let links = self.linked_buffers();
        writeln!(
            writer,
            "Links {}: {}",
            links.len(),
            links.iter().map(|b| format!("{:#x}", b.unique_id)).join(", ")
        )?;
        for line in lines {
            writeln!(writer, "{}", line)?;
        }
        Ok(())
    }

    pub fn dump_details(&self, file_name: Option<&str>) -> Result<PathBuf> {
        let path = self.dump_path(file_name, "txt")?;
        let mut writer = BufWriter::new(File::create(&path)?);
        self.dump_details_to(&mut writer)?;
        writer.flush()?;
        info!("Buffer {:#x} details dumped to {}", self.unique_id, path.display());
        Ok(path)
    }

    fn lines(&self, valid_only: bool) -> Vec<String> {
        let map = self.map.read();
        let mut lines = Vec::new();
        map.for_each_content(&mut |content| {
            if content.is_valid() || !valid_only {
                lines.push(self.describe(content));
            }
        });
        lines
    }

    /// Log the tags of this buffer.
    pub fn print(&self, valid_only: bool) {
        info!(
            "MetaBuffer {:#x}: {} valid tags, {} bytes in regions",
            self.unique_id,
            self.count(),
            self.capacity()
        );
        for line in self.lines(valid_only) {
            info!("  {}", line);
        }
    }

    /// Log this buffer and every buffer reachable through its merge links.
    pub fn print_details(&self) {
        self.print(true);
        let mut level = self.linked_buffers();
        for depth in 1..=MAX_GRAPH_DEPTH {
            if level.is_empty() {
                return;
            }
            for buffer in &level {
                info!(
                    "Depth {}: buffer {:#x} merged by {:#x}, {} references",
                    depth,
                    buffer.unique_id,
                    self.unique_id,
                    buffer.reference_count()
                );
                buffer.print(true);
            }
            level = level
                .iter()
                .flat_map(|b| b.linked_buffers())
                .unique_by(|b| b.unique_id)
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MapKind;
    use crate::util::test_util::*;

    #[test]
    fn binary_dump_layout() {
        let buffer = MetaBuffer::create(test_catalog(), &test_options(MapKind::Linear)).unwrap();
        buffer.set_tag(TAG_AE_MODE, &7i32.to_le_bytes(), 1).unwrap();
        let mut out = Vec::new();
        buffer.binary_dump_to(&mut out).unwrap();

        let mut expected = b"META".to_vec();
        expected.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        expected.extend_from_slice(&TAG_AE_MODE.to_le_bytes());
        expected.extend_from_slice(&4u32.to_le_bytes());
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(&7i32.to_le_bytes());
        assert_eq!(out, expected);
    }

    #[test]
    fn detail_lines_describe_placement() {
        let buffer = MetaBuffer::create(test_catalog(), &test_options(MapKind::Linear)).unwrap();
        buffer.set_tag(TAG_AE_MODE, &7i32.to_le_bytes(), 1).unwrap();
        buffer.set_tag(TAG_VENDOR_BLOB, &[0; 16], 16).unwrap();
        let mut out = Vec::new();
        buffer.dump_details_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("backend Linear tags 2 regions 1 capacity"));
        assert_eq!(lines[1], "Clients 0: ");
        assert_eq!(lines[2], "Links 0: ");
        assert!(lines[3].starts_with("Tag 10000 size 4 offset 0"));
        assert!(lines[3].ends_with("parent self tagName android.control.aeMode"));
        assert!(lines[4].contains("region 0 count 16"));
    }

    #[test]
    fn detail_header_lists_holders_and_links() {
        let buffer = MetaBuffer::create(test_catalog(), &test_options(MapKind::Hash)).unwrap();
        let source = MetaBuffer::create(test_catalog(), &test_options(MapKind::Hash)).unwrap();
        source.set_tag(TAG_AE_MODE, &1i32.to_le_bytes(), 1).unwrap();
        buffer.merge(&source, false).unwrap();
        buffer.add_reference(3, true);

        let mut out = Vec::new();
        buffer.dump_details_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("backend Hash"));
        assert!(lines[0].contains("references 1 (external 1 internal 0 merge 0)"));
        assert_eq!(lines[1], "Clients 1: client 3 External");
        assert_eq!(lines[2], format!("Links 1: {:#x}", source.unique_id()));

        let mut out = Vec::new();
        source.dump_details_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let holder = format!("Clients 1: buffer {:#x} Merge", buffer.unique_id());
        assert_eq!(text.lines().nth(1), Some(holder.as_str()));
    }
}
