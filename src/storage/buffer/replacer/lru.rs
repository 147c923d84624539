use linked_hash_map::LinkedHashMap;

use crate::common::types::{PageId, PagePtr};

/// A cached page and whether it holds changes not yet written back.
///
/// The flag mirrors `Page::is_dirty` and is updated by the pool under the
/// page table lock, so victim selection never has to take a page latch.
struct Frame {
    page: PagePtr,
    dirty: bool,
}

/// Resident pages in least-recently-used order
///
/// The front of the map is the coldest page. Victim selection walks from the
/// front and only ever offers a clean page.
pub(crate) struct LruPageTable {
    frames: LinkedHashMap<PageId, Frame>,
    capacity: usize,
}

impl LruPageTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: LinkedHashMap::with_capacity(capacity),
            capacity,
        }
    }

    /// Look up a page and record the access
    pub fn record_access(&mut self, page_id: PageId) -> Option<PagePtr> {
        self.frames.get_refresh(&page_id).map(|frame| frame.page.clone())
    }

    pub fn get(&self, page_id: PageId) -> Option<PagePtr> {
        self.frames.get(&page_id).map(|frame| frame.page.clone())
    }

    /// Insert or overwrite a page; it becomes the most recently used
    pub fn insert(&mut self, page_id: PageId, page: PagePtr, dirty: bool) {
        self.frames.insert(page_id, Frame { page, dirty });
    }

    /// Record whether a resident page is dirty. No-op for absent pages.
    pub fn set_dirty(&mut self, page_id: PageId, dirty: bool) {
        if let Some(frame) = self.frames.get_mut(&page_id) {
            frame.dirty = dirty;
        }
    }

    pub fn remove(&mut self, page_id: PageId) -> Option<PagePtr> {
        self.frames.remove(&page_id).map(|frame| frame.page)
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.frames.contains_key(&page_id)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    /// Least recently used clean page
    pub fn victim(&self) -> Option<PageId> {
        self.frames
            .iter()
            .find(|(_, frame)| !frame.dirty)
            .map(|(page_id, _)| *page_id)
    }

    /// Snapshot of every resident page
    pub fn entries(&self) -> Vec<(PageId, PagePtr)> {
        self.frames
            .iter()
            .map(|(page_id, frame)| (*page_id, frame.page.clone()))
            .collect()
    }
}
