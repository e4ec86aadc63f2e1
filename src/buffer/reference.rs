//! Reference counting and merge links.

use super::MetaBuffer;
use crate::error::{MetaError, Result};
use crate::util::log::{debug, trace, warn};
use enum_map::{Enum, EnumMap};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Why a reference is held.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Enum)]
pub enum ReferenceKind {
    /// Held by a client outside the pipeline.
    External,
    /// Held by a pipeline node.
    Internal,
    /// Held by another buffer that merged this one.
    Merge,
}

/// Who holds a reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientKey {
    Client(u32),
    /// A buffer, by unique id.
    Buffer(u32),
}

#[derive(Clone, Copy, Debug)]
struct ClientSlot {
    key: ClientKey,
    kind: ReferenceKind,
}

pub(crate) struct ClientState {
    counts: EnumMap<ReferenceKind, u32>,
    slots: Vec<Option<ClientSlot>>,
    /// Buffers this one merged. Each link holds a merge reference on its buffer.
    links: Vec<Option<Arc<MetaBuffer>>>,
}

impl ClientState {
    pub(crate) fn new(client_slots: usize, link_slots: usize) -> Self {
        ClientState {
            counts: EnumMap::default(),
            slots: vec![None; client_slots],
            links: (0..link_slots).map(|_| None).collect(),
        }
    }

    pub(super) fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    fn occupy(&mut self, key: ClientKey, kind: ReferenceKind) {
        let slot = Some(ClientSlot { key, kind });
        match self.slots.iter_mut().find(|s| s.is_none()) {
            Some(free) => *free = slot,
            None => {
                debug!("Growing client slots past {}", self.slots.len());
                self.slots.push(slot);
            }
        }
    }

    fn vacate(&mut self, key: ClientKey, kind: ReferenceKind) -> bool {
        let held = self
            .slots
            .iter_mut()
            .find(|s| matches!(s, Some(slot) if slot.key == key && slot.kind == kind));
        match held {
            Some(slot) => {
                *slot = None;
                true
            }
            None => false,
        }
    }

    fn add_link(&mut self, buffer: Arc<MetaBuffer>) {
        match self.links.iter_mut().find(|l| l.is_none()) {
            Some(free) => *free = Some(buffer),
            None => {
                debug!("Growing link slots past {}", self.links.len());
                self.links.push(Some(buffer));
            }
        }
    }

    fn remove_link(&mut self, unique_id: u32) -> Option<Arc<MetaBuffer>> {
        self.links
            .iter_mut()
            .find(|l| l.as_ref().is_some_and(|b| b.unique_id == unique_id))
            .and_then(Option::take)
    }

    fn linked(&self) -> impl Iterator<Item = &Arc<MetaBuffer>> {
        self.links.iter().flatten()
    }

    /// Empty the link table. The caller releases the merge references afterwards, outside
    /// any lock of this buffer.
    pub(crate) fn take_links(&mut self) -> Vec<Arc<MetaBuffer>> {
        self.links.iter_mut().filter_map(Option::take).collect()
    }
}

impl MetaBuffer {
    fn acquire(&self, key: ClientKey, kind: ReferenceKind) -> u32 {
        let mut state = self.clients.lock();
        state.counts[kind] += 1;
        state.occupy(key, kind);
        let total = state.total();
        self.reference_total.store(total, Ordering::Release);
        trace!(
            "Buffer {:#x}: {:?} reference by {:?}, {} total",
            self.unique_id,
            kind,
            key,
            total
        );
        total
    }

    fn release(&self, key: ClientKey, kind: ReferenceKind) -> u32 {
        let (total, invalidate) = {
            let mut state = self.clients.lock();
            if state.counts[kind] == 0 {
                warn!(
                    "Buffer {:#x}: {:?} released a {:?} reference it does not hold",
                    self.unique_id, key, kind
                );
                return state.total();
            }
            state.counts[kind] -= 1;
            if !state.vacate(key, kind) {
                warn!(
                    "Buffer {:#x}: no {:?} slot recorded for {:?}",
                    self.unique_id, kind, key
                );
            }
            let total = state.total();
            self.reference_total.store(total, Ordering::Release);
            (total, total == 0 && self.is_invalidate_pending())
        };
        trace!(
            "Buffer {:#x}: {:?} released by {:?}, {} left",
            self.unique_id,
            kind,
            key,
            total
        );
        if invalidate {
            self.invalidate(false);
        }
        total
    }

    /// Take a reference for client `client_id`. Returns the new total.
    pub fn add_reference(&self, client_id: u32, external: bool) -> u32 {
        let kind = if external {
            ReferenceKind::External
        } else {
            ReferenceKind::Internal
        };
        self.acquire(ClientKey::Client(client_id), kind)
    }

    /// Drop a reference of client `client_id`. Returns the new total. A pending invalidation
    /// runs once the total reaches zero.
    pub fn release_reference(&self, client_id: u32, external: bool) -> u32 {
        let kind = if external {
            ReferenceKind::External
        } else {
            ReferenceKind::Internal
        };
        self.release(ClientKey::Client(client_id), kind)
    }

    /// Take a merge reference on behalf of `holder`.
    pub fn add_buffer_reference(&self, holder: &MetaBuffer) -> u32 {
        self.acquire(ClientKey::Buffer(holder.unique_id), ReferenceKind::Merge)
    }

    pub fn release_buffer_reference(&self, holder: &MetaBuffer) -> u32 {
        self.release(ClientKey::Buffer(holder.unique_id), ReferenceKind::Merge)
    }

    /// Drop all external references, or every reference when `include_internal` is set. The
    /// latter also invalidates the buffer at once.
    pub fn release_all_references(&self, include_internal: bool) {
        let invalidate = {
            let mut state = self.clients.lock();
            if include_internal {
                state.counts.clear();
                state.slots.iter_mut().for_each(|s| *s = None);
            } else {
                state.counts[ReferenceKind::External] = 0;
                for slot in state.slots.iter_mut() {
                    if matches!(slot, Some(s) if s.kind == ReferenceKind::External) {
                        *slot = None;
                    }
                }
            }
            let total = state.total();
            self.reference_total.store(total, Ordering::Release);
            total == 0 && self.is_invalidate_pending()
        };
        debug!(
            "Buffer {:#x}: released all {} references",
            self.unique_id,
            if include_internal { "" } else { "external " }
        );
        if include_internal {
            self.invalidate(true);
        } else if invalidate {
            self.invalidate(false);
        }
    }

    pub fn reference_count(&self) -> u32 {
        self.reference_total.load(Ordering::Acquire)
    }

    pub fn reference_counts(&self) -> EnumMap<ReferenceKind, u32> {
        self.clients.lock().counts
    }

    /// Hold `buffer` in the first free link slot.
    pub(crate) fn add_to_free_link(&self, buffer: Arc<MetaBuffer>) {
        self.clients.lock().add_link(buffer);
    }

    /// Unlink `buffer` and release the merge reference held on it.
    pub fn remove_from_link(&self, buffer: &MetaBuffer) -> Result<()> {
        let removed = self.clients.lock().remove_link(buffer.unique_id);
        match removed {
            Some(linked) => {
                linked.release_buffer_reference(self);
                Ok(())
            }
            None => Err(MetaError::NoSuch(format!(
                "buffer {:#x} holds no link to {:#x}",
                self.unique_id, buffer.unique_id
            ))),
        }
    }

    /// Buffers this buffer has merged and still holds.
    /// Every recorded holder of a reference on this buffer.
    pub fn reference_holders(&self) -> Vec<(ClientKey, ReferenceKind)> {
        self.clients
            .lock()
            .slots
            .iter()
            .flatten()
            .map(|slot| (slot.key, slot.kind))
            .collect()
    }

    pub fn linked_buffers(&self) -> Vec<Arc<MetaBuffer>> {
        self.clients.lock().linked().cloned().collect()
    }

    pub(crate) fn linked_buffer(&self, unique_id: u32) -> Option<Arc<MetaBuffer>> {
        self.clients
            .lock()
            .linked()
            .find(|b| b.unique_id == unique_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MapKind;
    use crate::util::test_util::*;

    fn buffer() -> Arc<MetaBuffer> {
        MetaBuffer::create(test_catalog(), &test_options(MapKind::Linear)).unwrap()
    }

    #[test]
    fn counts_sum_to_total() {
        let buffer = buffer();
        let holder = self::buffer();
        buffer.add_reference(1, true);
        buffer.add_reference(1, true);
        buffer.add_reference(2, false);
        buffer.add_buffer_reference(&holder);
        let counts = buffer.reference_counts();
        assert_eq!(counts[ReferenceKind::External], 2);
        assert_eq!(counts[ReferenceKind::Internal], 1);
        assert_eq!(counts[ReferenceKind::Merge], 1);
        assert_eq!(buffer.reference_count(), counts.values().sum::<u32>());

        assert_eq!(buffer.release_reference(1, true), 3);
        assert_eq!(buffer.release_buffer_reference(&holder), 2);
        // Nothing to release.
        assert_eq!(buffer.release_buffer_reference(&holder), 2);
    }

    #[test]
    fn client_slots_grow() {
        let mut options = test_options(MapKind::Linear);
        options.initial_client_slots = 1;
        let buffer = MetaBuffer::create(test_catalog(), &options).unwrap();
        for client in 0..5 {
            buffer.add_reference(client, false);
        }
        assert_eq!(buffer.reference_count(), 5);
        for client in 0..5 {
            buffer.release_reference(client, false);
        }
        assert_eq!(buffer.reference_count(), 0);
    }

    #[test]
    fn pending_invalidation_runs_on_last_release() {
        let buffer = buffer();
        buffer.set_tag(TAG_AE_MODE, &[1; 4], 1).unwrap();
        buffer.add_reference(3, false);
        buffer.invalidate(false);
        assert!(buffer.is_invalidate_pending());
        assert_eq!(buffer.count(), 1);
        buffer.release_reference(3, false);
        assert!(!buffer.is_invalidate_pending());
        assert_eq!(buffer.count(), 0);
    }

    #[test]
    fn release_all_external_keeps_internal() {
        let buffer = buffer();
        buffer.add_reference(1, true);
        buffer.add_reference(2, true);
        buffer.add_reference(3, false);
        buffer.release_all_references(false);
        assert_eq!(buffer.reference_count(), 1);
        assert_eq!(buffer.reference_counts()[ReferenceKind::Internal], 1);

        buffer.set_tag(TAG_AE_MODE, &[1; 4], 1).unwrap();
        buffer.release_all_references(true);
        assert_eq!(buffer.reference_count(), 0);
        assert_eq!(buffer.count(), 0);
    }

    #[test]
    fn links_can_be_removed() {
        let buffer = buffer();
        let other = self::buffer();
        buffer.add_to_free_link(other.clone());
        other.add_buffer_reference(&buffer);
        assert_eq!(buffer.linked_buffers().len(), 1);
        assert!(buffer.linked_buffer(other.unique_id()).is_some());

        buffer.remove_from_link(&other).unwrap();
        assert_eq!(other.reference_count(), 0);
        assert!(matches!(
            buffer.remove_from_link(&other),
            Err(MetaError::NoSuch(_))
        ));
    }
}
