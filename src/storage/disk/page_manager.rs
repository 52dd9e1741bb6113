use crate::error::{DbError, DbResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Whole-page reads and writes against one backing file.
///
/// Page `i` occupies bytes `[i * page_size, (i + 1) * page_size)`. There is no file
/// header; the page count is the file length divided by the page size.
pub struct PageManager {
    file: File,
    path: PathBuf,
    page_size: usize,
}

impl PageManager {
    /// Opens `path`, creating an empty file if it does not exist.
    pub fn open_or_create(path: &Path, page_size: usize) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            page_size,
        })
    }

    pub fn read_page(&mut self, page_no: u32, buf: &mut [u8]) -> DbResult<()> {
        self.check_len(buf.len())?;

        let offset = self.page_offset(page_no);
        let file_size = self.file.metadata()?.len();
        if offset + self.page_size as u64 > file_size {
            return Err(DbError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("page {} is beyond the end of {:?}", page_no, self.path),
            )));
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    pub fn write_page(&mut self, page_no: u32, data: &[u8]) -> DbResult<()> {
        self.check_len(data.len())?;

        let offset = self.page_offset(page_no);
        let file_size = self.file.metadata()?.len();
        if offset > file_size {
            // Leaves zero pages in the gap, which decode as empty pages.
            self.file.set_len(offset)?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.sync_data()?;
        Ok(())
    }

    pub fn num_pages(&self) -> DbResult<u32> {
        let file_size = self.file.metadata()?.len();
        Ok((file_size / self.page_size as u64) as u32)
    }

    /// Appends a page filled with `data` and returns its number.
    pub fn append_page(&mut self, data: &[u8]) -> DbResult<u32> {
        let page_no = self.num_pages()?;
        self.write_page(page_no, data)?;
        Ok(page_no)
    }

    fn page_offset(&self, page_no: u32) -> u64 {
        page_no as u64 * self.page_size as u64
    }

    fn check_len(&self, len: usize) -> DbResult<()> {
        if len != self.page_size {
            return Err(DbError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("buffer must be {} bytes, got {}", self.page_size, len),
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    const PAGE_SIZE: usize = 512;

    #[test]
    fn test_create_and_reopen() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("t.dat");

        {
            let mut pm = PageManager::open_or_create(&path, PAGE_SIZE)?;
            assert_eq!(pm.num_pages()?, 0);
            pm.append_page(&vec![7u8; PAGE_SIZE])?;
        }
        // Reopening keeps existing pages.
        let mut pm = PageManager::open_or_create(&path, PAGE_SIZE)?;
        assert_eq!(pm.num_pages()?, 1);
        let mut buf = vec![0u8; PAGE_SIZE];
        pm.read_page(0, &mut buf)?;
        assert!(buf.iter().all(|&b| b == 7));
        Ok(())
    }

    #[test]
    fn test_write_and_read_pages() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::open_or_create(&dir.path().join("t.dat"), PAGE_SIZE)?;

        for i in 0..4u32 {
            pm.write_page(i, &vec![i as u8 + 1; PAGE_SIZE])?;
        }
        assert_eq!(pm.num_pages()?, 4);

        let mut buf = vec![0u8; PAGE_SIZE];
        for i in 0..4u32 {
            pm.read_page(i, &mut buf)?;
            assert!(buf.iter().all(|&b| b == i as u8 + 1));
        }
        Ok(())
    }

    #[test]
    fn test_page_offsets() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("t.dat");
        let mut pm = PageManager::open_or_create(&path, PAGE_SIZE)?;
        pm.write_page(0, &vec![1u8; PAGE_SIZE])?;
        pm.write_page(1, &vec![2u8; PAGE_SIZE])?;

        let raw = std::fs::read(&path)?;
        assert_eq!(raw.len(), 2 * PAGE_SIZE);
        assert_eq!(raw[PAGE_SIZE - 1], 1);
        assert_eq!(raw[PAGE_SIZE], 2);
        Ok(())
    }

    #[test]
    fn test_read_beyond_end() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::open_or_create(&dir.path().join("t.dat"), PAGE_SIZE)?;
        let mut buf = vec![0u8; PAGE_SIZE];
        assert!(pm.read_page(3, &mut buf).is_err());
        Ok(())
    }

    #[test]
    fn test_wrong_buffer_size() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::open_or_create(&dir.path().join("t.dat"), PAGE_SIZE)?;
        let mut small = vec![0u8; 10];
        assert!(pm.read_page(0, &mut small).is_err());
        assert!(pm.write_page(0, &small).is_err());
        Ok(())
    }

    #[test]
    fn test_sparse_write_and_append() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::open_or_create(&dir.path().join("t.dat"), PAGE_SIZE)?;
        pm.write_page(2, &vec![9u8; PAGE_SIZE])?;
        assert_eq!(pm.num_pages()?, 3);

        let mut buf = vec![1u8; PAGE_SIZE];
        pm.read_page(1, &mut buf)?;
        assert!(buf.iter().all(|&b| b == 0));

        assert_eq!(pm.append_page(&vec![0u8; PAGE_SIZE])?, 3);
        assert_eq!(pm.num_pages()?, 4);
        Ok(())
    }
}
