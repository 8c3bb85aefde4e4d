//! Random-access reader over an uploaded ZIP archive.
//!
//! Entries are addressed by their index in the central directory, which is
//! stable for a given file, so a run can be continued at any offset without
//! re-scanning earlier entries.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;
use zip_content_replacer_core::error::{ImportError, ImportResult};

/// Leading bytes of a ZIP local header, an empty archive, or a spanned archive.
const ZIP_MAGICS: [&[u8; 4]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

/// True when `bytes` starts like a ZIP container.
pub fn sniff_zip(bytes: &[u8]) -> bool {
    ZIP_MAGICS.iter().any(|m| bytes.starts_with(&m[..]))
}

/// A failure confined to one entry; the run carries on.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("entry {0} does not exist")]
    OutOfRange(usize),
    #[error("could not read entry: {0}")]
    Unreadable(String),
    #[error("entry exceeds size limit ({0} bytes)")]
    TooLarge(u64),
}

/// One archive member with its undecoded contents.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub index: usize,
    pub name: String,
    pub raw_bytes: Vec<u8>,
}

pub struct ArchiveReader {
    archive: zip::ZipArchive<File>,
    max_entry_bytes: u64,
}

impl ArchiveReader {
    /// Open `path`. Missing files, corrupt archives and non-ZIP files all
    /// fail with [`ImportError::ArchiveUnreadable`].
    pub fn open(path: &Path, max_entry_bytes: u64) -> ImportResult<Self> {
        let file = File::open(path)
            .map_err(|e| ImportError::ArchiveUnreadable(format!("{}: {}", path.display(), e)))?;
        let archive = zip::ZipArchive::new(file)
            .map_err(|e| ImportError::ArchiveUnreadable(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            archive,
            max_entry_bytes,
        })
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// Name of entry `index` without decompressing it.
    pub fn entry_name(&mut self, index: usize) -> Result<String, EntryError> {
        let entry = self
            .archive
            .by_index_raw(index)
            .map_err(|e| map_zip_error(index, e))?;
        Ok(entry.name().to_string())
    }

    /// Read entry `index`, refusing to decompress more than the size limit.
    pub fn entry_at(&mut self, index: usize) -> Result<ArchiveEntry, EntryError> {
        let max_bytes = self.max_entry_bytes;
        let entry = self
            .archive
            .by_index(index)
            .map_err(|e| map_zip_error(index, e))?;
        let name = entry.name().to_string();
        if entry.size() > max_bytes {
            return Err(EntryError::TooLarge(max_bytes));
        }
        let mut raw_bytes = Vec::new();
        entry
            .take(max_bytes + 1)
            .read_to_end(&mut raw_bytes)
            .map_err(|e| EntryError::Unreadable(e.to_string()))?;
        if raw_bytes.len() as u64 > max_bytes {
            return Err(EntryError::TooLarge(max_bytes));
        }
        Ok(ArchiveEntry {
            index,
            name,
            raw_bytes,
        })
    }

    /// Release the underlying file handle.
    pub fn close(self) {
        drop(self.archive);
    }
}

fn map_zip_error(index: usize, err: zip::result::ZipError) -> EntryError {
    match err {
        zip::result::ZipError::FileNotFound => EntryError::OutOfRange(index),
        other => EntryError::Unreadable(other.to_string()),
    }
}

/// True for directory entries.
pub fn is_directory(name: &str) -> bool {
    name.ends_with('/') || name.ends_with('\\')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, data) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                zip.write_all(data).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn random_access_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        write_zip(
            &path,
            &[("one.txt", b"1"), ("sub/", b""), ("two.md", b"# two")],
        );
        let mut reader = ArchiveReader::open(&path, 1024).unwrap();
        assert_eq!(reader.len(), 3);
        assert!(is_directory(&reader.entry_name(1).unwrap()));
        let entry = reader.entry_at(2).unwrap();
        assert_eq!(entry.name, "two.md");
        assert_eq!(entry.raw_bytes, b"# two");
        assert!(matches!(
            reader.entry_at(9),
            Err(EntryError::OutOfRange(9))
        ));
        reader.close();
    }

    #[test]
    fn oversize_entry_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.zip");
        let data = vec![b'x'; 4096];
        write_zip(&path, &[("big.txt", &data)]);
        let mut reader = ArchiveReader::open(&path, 100).unwrap();
        assert!(matches!(reader.entry_at(0), Err(EntryError::TooLarge(100))));
    }

    #[test]
    fn non_zip_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.zip");
        std::fs::write(&path, b"not a zip at all").unwrap();
        assert!(matches!(
            ArchiveReader::open(&path, 100),
            Err(ImportError::ArchiveUnreadable(_))
        ));
        assert!(matches!(
            ArchiveReader::open(&dir.path().join("missing.zip"), 100),
            Err(ImportError::ArchiveUnreadable(_))
        ));
    }

    #[test]
    fn sniffing() {
        assert!(sniff_zip(b"PK\x03\x04rest"));
        assert!(sniff_zip(b"PK\x05\x06"));
        assert!(!sniff_zip(b"%PDF-1.7"));
        assert!(!sniff_zip(b"PK"));
    }
}
