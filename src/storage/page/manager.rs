use crate::common::types::SlotId;
use crate::storage::page::header::PageHeader;
use crate::storage::page::error::PageError;
use crate::storage::page::layout::{HEADER_SIZE, RECORD_OFFSET_SIZE, RecordLocation};

/// Slotted layout of a heap page.
///
/// Record data grows forward from the header; slot entries grow backward from
/// the end of the page. The page size is the length of the buffer.
#[derive(Debug, Default, Clone, Copy)]
pub struct PageManager;

impl PageManager {
    pub fn new() -> Self {
        Self
    }

    pub fn init_page(&self, data: &mut [u8]) {
        let header = PageHeader::new(data.len());
        data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    pub fn get_header(&self, data: &[u8]) -> PageHeader {
        PageHeader::from_bytes(&data[0..HEADER_SIZE])
    }

    pub fn get_free_space(&self, data: &[u8]) -> u32 {
        self.get_header(data).free_space_size
    }

    /// Can a record of `len` bytes (plus its slot) still fit?
    pub fn has_room_for(&self, data: &[u8], len: usize) -> bool {
        self.get_free_space(data) as usize >= len + RECORD_OFFSET_SIZE
    }

    pub fn insert_record(&self, data: &mut [u8], record: &[u8]) -> Result<SlotId, PageError> {
        let mut header = self.get_header(data);

        if record.is_empty() || !self.has_room_for(data, record.len()) {
            return Err(PageError::InsufficientSpace);
        }

        let slot = header.record_count;
        let slot_pos = self.get_slot_position(data.len(), slot);
        let record_loc = RecordLocation {
            offset: header.free_space_offset,
            length: record.len() as u32,
        };

        let start = header.free_space_offset as usize;
        data[start..start + record.len()].copy_from_slice(record);
        data[slot_pos..slot_pos + RECORD_OFFSET_SIZE].copy_from_slice(&record_loc.to_bytes());

        header.free_space_offset += record.len() as u32;
        header.free_space_size -= (record.len() + RECORD_OFFSET_SIZE) as u32;
        header.record_count += 1;
        data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());

        Ok(slot)
    }

    /// Tombstone the record in `slot`. Its space is not reclaimed.
    pub fn delete_record(&self, data: &mut [u8], slot: SlotId) -> Result<(), PageError> {
        let slot_pos = self.checked_slot_position(data, slot)?;
        let mut record_loc = self.get_record_location(data, slot_pos);

        if record_loc.is_deleted() {
            return Err(PageError::RecordNotFound(slot));
        }

        record_loc.length = 0;
        data[slot_pos..slot_pos + RECORD_OFFSET_SIZE].copy_from_slice(&record_loc.to_bytes());

        Ok(())
    }

    pub fn get_record(&self, data: &[u8], slot: SlotId) -> Result<Vec<u8>, PageError> {
        let slot_pos = self.checked_slot_position(data, slot)?;
        let record_loc = self.get_record_location(data, slot_pos);

        if record_loc.is_deleted() {
            return Err(PageError::RecordNotFound(slot));
        }

        let start = record_loc.offset as usize;
        Ok(data[start..start + record_loc.length as usize].to_vec())
    }

    /// Every live record with its slot, in slot order
    pub fn records(&self, data: &[u8]) -> Vec<(SlotId, Vec<u8>)> {
        let header = self.get_header(data);
        (0..header.record_count)
            .filter_map(|slot| self.get_record(data, slot).ok().map(|record| (slot, record)))
            .collect()
    }

    fn checked_slot_position(&self, data: &[u8], slot: SlotId) -> Result<usize, PageError> {
        if slot >= self.get_header(data).record_count {
            return Err(PageError::InvalidSlot(slot));
        }
        Ok(self.get_slot_position(data.len(), slot))
    }

    // Slot entries are laid out backward from the end of the page
    fn get_slot_position(&self, page_size: usize, slot: SlotId) -> usize {
        page_size - RECORD_OFFSET_SIZE * (slot as usize + 1)
    }

    fn get_record_location(&self, data: &[u8], slot_pos: usize) -> RecordLocation {
        RecordLocation::from_bytes(&data[slot_pos..slot_pos + RECORD_OFFSET_SIZE])
    }
}
