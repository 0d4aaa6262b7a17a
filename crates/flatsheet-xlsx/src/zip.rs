//! Secure ZIP container access
//!
//! Wraps `zip::ZipArchive` with the defenses a converter that accepts
//! untrusted packages needs: entry-count, entry-size and total-uncompressed
//! limits (zip bombs), path sanitization and traversal rejection (zip slip),
//! and refusal of encrypted entries.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::{debug, warn};

use crate::error::{XlsxError, XlsxResult};

/// Decompression happens in chunks of this size.
const READ_CHUNK_SIZE: usize = 512 * 1024;

/// Maximum accepted entry path length.
const MAX_PATH_LEN: usize = 1024;

/// Limits enforced while enumerating and reading archive entries.
#[derive(Debug, Clone, Copy)]
pub struct SecurityLimits {
    /// Maximum number of entries in the archive
    pub max_entries: usize,
    /// Maximum declared uncompressed size of a single entry
    pub max_entry_size: u64,
    /// Maximum declared uncompressed size of the whole archive
    pub max_total_uncompressed: u64,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_entry_size: 256 * 1024 * 1024,
            max_total_uncompressed: 2 * 1024 * 1024 * 1024,
        }
    }
}

/// One archive entry as seen through the sanitized listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// Sanitized entry path (forward slashes, no leading slash)
    pub path: String,
    /// Compressed size in bytes
    pub compressed_size: u64,
    /// Declared uncompressed size in bytes
    pub uncompressed_size: u64,
    /// Whether the entry's encryption bit is set
    pub is_encrypted: bool,
}

/// A ZIP archive opened for reading, with entries enumerated and validated
/// up front.
pub struct ZipReader {
    archive: zip::ZipArchive<BufReader<File>>,
    limits: SecurityLimits,
    entries: Vec<ZipEntry>,
    /// Sanitized path -> archive index
    index: HashMap<String, usize>,
}

impl ZipReader {
    /// Open an archive and enumerate its entries.
    ///
    /// Fails with [`XlsxError::NotFound`] when the path does not exist,
    /// [`XlsxError::MalformedZip`] when it is not a readable ZIP, and
    /// [`XlsxError::LimitExceeded`] / [`XlsxError::EncryptedEntry`] when
    /// enumeration violates the limits.
    pub fn open<P: AsRef<Path>>(path: P, limits: SecurityLimits) -> XlsxResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(XlsxError::NotFound(path.display().to_string()));
        }

        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

        if archive.len() > limits.max_entries {
            return Err(XlsxError::LimitExceeded(format!(
                "archive contains {} entries (limit {})",
                archive.len(),
                limits.max_entries
            )));
        }

        let mut entries = Vec::with_capacity(archive.len());
        let mut index = HashMap::with_capacity(archive.len());
        let mut total_uncompressed: u64 = 0;

        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i)?;
            let sanitized = sanitize_path(entry.name());

            if sanitized.is_empty() || is_path_suspicious(&sanitized) {
                warn!("skipping suspicious archive entry: {:?}", entry.name());
                continue;
            }

            if entry.size() > limits.max_entry_size {
                return Err(XlsxError::LimitExceeded(format!(
                    "entry '{}' declares {} uncompressed bytes (limit {})",
                    sanitized,
                    entry.size(),
                    limits.max_entry_size
                )));
            }

            total_uncompressed += entry.size();
            if total_uncompressed > limits.max_total_uncompressed {
                return Err(XlsxError::LimitExceeded(format!(
                    "total uncompressed size exceeds limit of {} bytes",
                    limits.max_total_uncompressed
                )));
            }

            if entry.encrypted() {
                return Err(XlsxError::EncryptedEntry(sanitized));
            }

            index.insert(sanitized.clone(), i);
            entries.push(ZipEntry {
                path: sanitized,
                compressed_size: entry.compressed_size(),
                uncompressed_size: entry.size(),
                is_encrypted: false,
            });
        }

        debug!(
            "opened {} with {} entries ({} bytes uncompressed)",
            path.display(),
            entries.len(),
            total_uncompressed
        );

        Ok(Self {
            archive,
            limits,
            entries,
            index,
        })
    }

    /// The sanitized entry listing, in archive order.
    pub fn list_entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Whether an entry with this canonical name exists.
    pub fn has_entry(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// Read an entry into memory.
    ///
    /// The caller supplies the canonical (sanitized) name; suspicious paths
    /// are refused even if they were admitted by the listing.
    pub fn read_entry(&mut self, path: &str) -> XlsxResult<Vec<u8>> {
        if is_path_suspicious(path) {
            return Err(XlsxError::LimitExceeded(format!(
                "suspicious path rejected: {}",
                path
            )));
        }

        let idx = *self
            .index
            .get(path)
            .ok_or_else(|| XlsxError::MissingPart(path.to_string()))?;

        let mut entry = self.archive.by_index(idx)?;

        let declared = entry.size();
        if declared > self.limits.max_entry_size {
            return Err(XlsxError::LimitExceeded(format!(
                "entry '{}' declares {} uncompressed bytes (limit {})",
                path, declared, self.limits.max_entry_size
            )));
        }

        let mut data = Vec::with_capacity(declared as usize);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let n = entry.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);
            // The declared size can lie; re-check against actual output.
            if data.len() as u64 > self.limits.max_entry_size {
                return Err(XlsxError::LimitExceeded(format!(
                    "entry '{}' inflated past the {} byte limit",
                    path, self.limits.max_entry_size
                )));
            }
        }

        Ok(data)
    }

    /// Read an entry and interpret the bytes as UTF-8 text.
    pub fn read_entry_as_string(&mut self, path: &str) -> XlsxResult<String> {
        let data = self.read_entry(path)?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// The limits this reader enforces.
    pub fn security_limits(&self) -> &SecurityLimits {
        &self.limits
    }
}

/// Normalize separators to `/` and strip leading slashes.
fn sanitize_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    normalized.trim_start_matches('/').to_string()
}

/// Paths that could escape the extraction root or confuse downstream
/// consumers are refused outright.
fn is_path_suspicious(path: &str) -> bool {
    path.contains("..") || path.starts_with('/') || path.contains('\0') || path.len() > MAX_PATH_LEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Seek, Write};

    fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let cursor = Cursor::new(&mut buf);
            let mut zip = zip::ZipWriter::new(cursor);
            let options = zip::write::SimpleFileOptions::default();
            for (name, data) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f.as_file_mut().rewind().unwrap();
        f
    }

    #[test]
    fn test_open_missing_file() {
        let err = ZipReader::open("/nonexistent/archive.xlsx", SecurityLimits::default());
        assert!(matches!(err, Err(XlsxError::NotFound(_))));
    }

    #[test]
    fn test_open_not_a_zip() {
        let f = write_temp(b"this is not a zip archive");
        let err = ZipReader::open(f.path(), SecurityLimits::default());
        assert!(matches!(err, Err(XlsxError::MalformedZip(_))));
    }

    #[test]
    fn test_list_and_read() {
        let bytes = build_archive(&[("a.xml", b"<a/>"), ("dir/b.xml", b"<b/>")]);
        let f = write_temp(&bytes);
        let mut reader = ZipReader::open(f.path(), SecurityLimits::default()).unwrap();

        assert_eq!(reader.list_entries().len(), 2);
        assert!(reader.has_entry("a.xml"));
        assert!(reader.has_entry("dir/b.xml"));
        assert!(!reader.has_entry("missing.xml"));

        assert_eq!(reader.read_entry("a.xml").unwrap(), b"<a/>");
        assert_eq!(reader.read_entry_as_string("dir/b.xml").unwrap(), "<b/>");
    }

    #[test]
    fn test_traversal_entries_are_skipped() {
        let bytes = build_archive(&[("../evil.xml", b"x"), ("ok.xml", b"y")]);
        let f = write_temp(&bytes);
        let mut reader = ZipReader::open(f.path(), SecurityLimits::default()).unwrap();

        assert_eq!(reader.list_entries().len(), 1);
        assert!(reader.has_entry("ok.xml"));
        assert!(matches!(
            reader.read_entry("../evil.xml"),
            Err(XlsxError::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_entry_count_limit() {
        let bytes = build_archive(&[("a.xml", b"x"), ("b.xml", b"y"), ("c.xml", b"z")]);
        let f = write_temp(&bytes);
        let limits = SecurityLimits {
            max_entries: 2,
            ..Default::default()
        };
        assert!(matches!(
            ZipReader::open(f.path(), limits),
            Err(XlsxError::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_entry_size_limit() {
        let big = vec![b'x'; 4096];
        let bytes = build_archive(&[("big.xml", big.as_slice())]);
        let f = write_temp(&bytes);
        let limits = SecurityLimits {
            max_entry_size: 1024,
            ..Default::default()
        };
        assert!(matches!(
            ZipReader::open(f.path(), limits),
            Err(XlsxError::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_total_uncompressed_limit() {
        let chunk = vec![b'x'; 1024];
        let bytes = build_archive(&[
            ("a.bin", chunk.as_slice()),
            ("b.bin", chunk.as_slice()),
            ("c.bin", chunk.as_slice()),
        ]);
        let f = write_temp(&bytes);
        let limits = SecurityLimits {
            max_total_uncompressed: 2048,
            ..Default::default()
        };
        assert!(matches!(
            ZipReader::open(f.path(), limits),
            Err(XlsxError::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("/xl/workbook.xml"), "xl/workbook.xml");
        assert_eq!(sanitize_path("xl\\styles.xml"), "xl/styles.xml");
        assert_eq!(sanitize_path("plain.xml"), "plain.xml");
    }

    #[test]
    fn test_suspicious_paths() {
        assert!(is_path_suspicious("../etc/passwd"));
        assert!(is_path_suspicious("xl/../../etc/passwd"));
        assert!(is_path_suspicious("/absolute"));
        assert!(is_path_suspicious("nul\0byte"));
        assert!(is_path_suspicious(&"x".repeat(2000)));
        assert!(!is_path_suspicious("xl/worksheets/sheet1.xml"));
    }
}
