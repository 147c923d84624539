use log::debug;

use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruPageTable;

/// Make room for one more page.
///
/// Only clean pages are evicted; when every resident page is dirty the pool
/// reports `BufferPoolFull` instead of writing uncommitted data to disk.
pub(super) fn evict_page(page_table: &mut LruPageTable) -> Result<(), BufferPoolError> {
    if !page_table.is_full() {
        return Ok(());
    }

    let victim = page_table.victim().ok_or(BufferPoolError::BufferPoolFull)?;
    page_table.remove(victim);
    debug!("Evicted clean page {}", victim);

    Ok(())
}
