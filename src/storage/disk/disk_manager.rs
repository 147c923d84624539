use std::fs::{File, OpenOptions};
use std::io::{Read, Write, Seek, SeekFrom};
use std::path::Path;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::PageNo;

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid page number: {0}")]
    InvalidPageNo(PageNo),
    #[error("Page buffer is {actual} bytes, expected {expected}")]
    PageSizeMismatch { expected: usize, actual: usize },
}

/// DiskManager is responsible for the raw page I/O of one table file.
///
/// Pages are numbered from zero and stored back to back.
pub struct DiskManager {
    db_file: Mutex<File>,
    page_size: usize,
}

impl DiskManager {
    /// Open or create the file at `db_path`
    pub fn new(db_path: impl AsRef<Path>, page_size: usize) -> Result<Self, DiskManagerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(db_path)?;

        Ok(Self {
            db_file: Mutex::new(file),
            page_size,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Read a page from disk
    pub fn read_page(&self, page_no: PageNo) -> Result<Vec<u8>, DiskManagerError> {
        let mut buffer = vec![0u8; self.page_size];
        let mut file = self.db_file.lock();

        if page_no >= Self::count_pages(&file, self.page_size)? {
            return Err(DiskManagerError::InvalidPageNo(page_no));
        }

        file.seek(SeekFrom::Start(self.page_offset(page_no)))?;
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    /// Write a page to disk
    pub fn write_page(&self, page_no: PageNo, data: &[u8]) -> Result<(), DiskManagerError> {
        self.check_size(data)?;

        let mut file = self.db_file.lock();
        if page_no > Self::count_pages(&file, self.page_size)? {
            return Err(DiskManagerError::InvalidPageNo(page_no));
        }

        file.seek(SeekFrom::Start(self.page_offset(page_no)))?;
        file.write_all(data)?;
        file.flush()?;

        Ok(())
    }

    /// Append `data` as a new page and return its number
    pub fn allocate_page(&self, data: &[u8]) -> Result<PageNo, DiskManagerError> {
        self.check_size(data)?;

        let mut file = self.db_file.lock();
        let new_page_no = Self::count_pages(&file, self.page_size)?;

        file.seek(SeekFrom::Start(self.page_offset(new_page_no)))?;
        file.write_all(data)?;
        file.flush()?;

        Ok(new_page_no)
    }

    /// Number of whole pages in the file
    pub fn num_pages(&self) -> Result<PageNo, DiskManagerError> {
        let file = self.db_file.lock();
        Self::count_pages(&file, self.page_size)
    }

    fn count_pages(file: &File, page_size: usize) -> Result<PageNo, DiskManagerError> {
        let file_size = file.metadata()?.len();
        Ok((file_size / page_size as u64) as PageNo)
    }

    fn check_size(&self, data: &[u8]) -> Result<(), DiskManagerError> {
        if data.len() != self.page_size {
            return Err(DiskManagerError::PageSizeMismatch {
                expected: self.page_size,
                actual: data.len(),
            });
        }
        Ok(())
    }

    /// Calculate the offset of a page in the file
    fn page_offset(&self, page_no: PageNo) -> u64 {
        page_no as u64 * self.page_size as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_allocate_read_write() {
        let file = NamedTempFile::new().unwrap();
        let disk = DiskManager::new(file.path(), 128).unwrap();
        assert_eq!(disk.num_pages().unwrap(), 0);

        let first = disk.allocate_page(&[1u8; 128]).unwrap();
        let second = disk.allocate_page(&[2u8; 128]).unwrap();
        assert_eq!((first, second), (0, 1));
        assert_eq!(disk.num_pages().unwrap(), 2);

        disk.write_page(1, &[9u8; 128]).unwrap();
        assert_eq!(disk.read_page(0).unwrap(), vec![1u8; 128]);
        assert_eq!(disk.read_page(1).unwrap(), vec![9u8; 128]);
    }

    #[test]
    fn test_read_past_end_fails() {
        let file = NamedTempFile::new().unwrap();
        let disk = DiskManager::new(file.path(), 128).unwrap();

        assert!(matches!(disk.read_page(0), Err(DiskManagerError::InvalidPageNo(0))));
    }

    #[test]
    fn test_wrong_buffer_size_rejected() {
        let file = NamedTempFile::new().unwrap();
        let disk = DiskManager::new(file.path(), 128).unwrap();

        assert!(matches!(
            disk.allocate_page(&[0u8; 64]),
            Err(DiskManagerError::PageSizeMismatch { expected: 128, actual: 64 })
        ));
    }
}
