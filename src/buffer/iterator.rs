use super::content::Content;
use super::map::{HashMap, LinearMap, StorageMap};
use super::{MetaBuffer, TagEntry};
use crate::error::{MetaError, Result};

enum Cursor {
    /// Slot index into a linear map.
    Linear(usize),
    /// Position in the tags a hash map held when iteration began.
    Hash { tags: Vec<u32>, position: usize },
}

/// Walks the valid tags of a buffer. The buffer's map stays read-locked while the iterator
/// lives, so writers wait until it is dropped.
///
/// Use it as an [`Iterator`], or drive it explicitly with [`begin`](Self::begin),
/// [`advance`](Self::advance) and [`get_entry`](Self::get_entry).
pub struct MetaIterator<'a> {
    map: spin::RwLockReadGuard<'a, Box<dyn StorageMap>>,
    buffer: &'a MetaBuffer,
    cursor: Cursor,
    started: bool,
}

impl<'a> MetaIterator<'a> {
    pub(crate) fn new(
        map: spin::RwLockReadGuard<'a, Box<dyn StorageMap>>,
        buffer: &'a MetaBuffer,
    ) -> Self {
        let cursor = match map.downcast_ref::<HashMap>() {
            Some(hash) => Cursor::Hash {
                tags: hash.valid_tags(),
                position: 0,
            },
            None => Cursor::Linear(0),
        };
        let mut iter = MetaIterator {
            map,
            buffer,
            cursor,
            started: false,
        };
        iter.settle();
        iter
    }

    fn linear(&self) -> Option<&LinearMap> {
        self.map.downcast_ref::<LinearMap>()
    }

    fn current(&self) -> Option<&Content> {
        match &self.cursor {
            Cursor::Linear(index) => self.linear().and_then(|map| map.content_at(*index)),
            Cursor::Hash { tags, position } => {
                tags.get(*position).and_then(|tag| self.map.find(*tag))
            }
        }
    }

    /// Move to the first valid slot at or after the cursor.
    fn settle(&mut self) {
        if let Cursor::Linear(index) = self.cursor {
            let next = self.linear().map_or(index, |map| {
                (index..map.len())
                    .find(|i| map.content_at(*i).is_some_and(Content::is_valid))
                    .unwrap_or(map.len())
            });
            self.cursor = Cursor::Linear(next);
        }
    }

    /// Position on the first valid tag. Fails with `NoMore` if there is none.
    pub fn begin(&mut self) -> Result<()> {
        self.started = true;
        match &mut self.cursor {
            Cursor::Linear(index) => *index = 0,
            Cursor::Hash { position, .. } => *position = 0,
        }
        self.settle();
        if self.has_done() {
            Err(MetaError::NoMore)
        } else {
            Ok(())
        }
    }

    pub fn has_done(&self) -> bool {
        self.current().is_none()
    }

    /// Move to the next valid tag. Fails with `NoMore` once past the last one.
    pub fn advance(&mut self) -> Result<()> {
        if self.has_done() {
            return Err(MetaError::NoMore);
        }
        match &mut self.cursor {
            Cursor::Linear(index) => *index += 1,
            Cursor::Hash { position, .. } => *position += 1,
        }
        self.settle();
        if self.has_done() {
            Err(MetaError::NoMore)
        } else {
            Ok(())
        }
    }

    pub fn get_entry(&self) -> Result<TagEntry> {
        let content = self
            .current()
            .ok_or_else(|| MetaError::InvalidArgument("iterator is past the end".into()))?;
        self.buffer.entry_of(content)
    }
}

impl Iterator for MetaIterator<'_> {
    type Item = TagEntry;

    fn next(&mut self) -> Option<TagEntry> {
        if !self.started {
            self.begin().ok()?;
        }
        let entry = self.get_entry().ok()?;
        // Reaching the end is reported by the next call.
        let _ = self.advance();
        Some(entry)
    }
}
