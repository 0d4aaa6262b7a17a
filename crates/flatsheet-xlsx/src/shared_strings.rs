//! Shared-string table (`xl/sharedStrings.xml`)
//!
//! Worksheets reference repeated strings by numeric id into this table, so
//! it must give O(1) random access to up to millions of entries. Two
//! backing stores exist:
//!
//! - an in-memory arena: one contiguous byte buffer of NUL-terminated
//!   strings plus a parallel vector of 32-bit byte offsets indexed by id;
//! - a spill file: `{len: u32 LE}{bytes}` records appended in id order to a
//!   temp file, with only the record offsets kept in memory.
//!
//! `Auto` mode pre-scans the XML to estimate the total size and spills to
//! disk when the estimate exceeds the configured threshold. The spill file
//! is append-only during parse and random-access read-only afterwards; it
//! is unlinked when the table is dropped.

use std::io::{Read, Seek, SeekFrom, Write};

use log::{debug, warn};
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::reader::Reader;
use tempfile::NamedTempFile;

use crate::error::{XlsxError, XlsxResult};
use crate::package::OpcPackage;

const SHARED_STRINGS_PATH: &str = "xl/sharedStrings.xml";

/// Rough pre-scan heuristic for the size of one string entry.
const ESTIMATED_BYTES_PER_STRING: usize = 50;

/// Initial arena reservation.
const INITIAL_ARENA_SIZE: usize = 8 * 1024 * 1024;

/// Backing-store selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SharedStringsMode {
    /// Pre-scan and pick a store based on the estimated size
    #[default]
    Auto,
    /// Always keep strings in the arena
    InMemory,
    /// Always spill to a temp file
    External,
}

/// Shared-string parsing and storage configuration.
#[derive(Debug, Clone)]
pub struct SharedStringsConfig {
    /// Backing-store selection
    pub mode: SharedStringsMode,
    /// `Auto` spills to disk when the size estimate exceeds this
    pub memory_threshold: usize,
    /// Strings longer than this many bytes are truncated
    pub max_string_length: usize,
    /// Whether rich-text runs (`<r><t>`) contribute to the flattened string
    pub flatten_rich_text: bool,
}

impl Default for SharedStringsConfig {
    fn default() -> Self {
        Self {
            mode: SharedStringsMode::Auto,
            memory_threshold: 64 * 1024 * 1024,
            max_string_length: 32_767,
            flatten_rich_text: true,
        }
    }
}

enum Storage {
    Arena {
        /// NUL-terminated strings, end to end
        arena: Vec<u8>,
        /// Byte offset of each string's start, indexed by id
        offsets: Vec<u32>,
    },
    Spill {
        file: NamedTempFile,
        /// File offset of each `{len}{bytes}` record, indexed by id
        offsets: Vec<u64>,
    },
}

/// An indexed, random-access store of the package's shared strings.
pub struct SharedStringTable {
    storage: Storage,
    memory_bytes: usize,
}

impl SharedStringTable {
    /// A table with no strings, as used when `sharedStrings.xml` is absent.
    pub fn empty() -> Self {
        Self {
            storage: Storage::Arena {
                arena: Vec::new(),
                offsets: Vec::new(),
            },
            memory_bytes: 0,
        }
    }

    /// Parse the package's shared-string part.
    ///
    /// A package without `sharedStrings.xml` is valid; the result is an
    /// empty table.
    pub fn parse(package: &mut OpcPackage, config: &SharedStringsConfig) -> XlsxResult<Self> {
        if !package.zip().has_entry(SHARED_STRINGS_PATH) {
            return Ok(Self::empty());
        }

        let xml = package.zip_mut().read_entry(SHARED_STRINGS_PATH)?;
        Self::from_xml(&xml, config)
    }

    /// Parse shared strings from raw XML bytes.
    pub fn from_xml(xml: &[u8], config: &SharedStringsConfig) -> XlsxResult<Self> {
        let (si_count, declared_count) = pre_scan(xml)?;
        let estimated = si_count * ESTIMATED_BYTES_PER_STRING;

        let spill = match config.mode {
            SharedStringsMode::InMemory => false,
            SharedStringsMode::External => true,
            SharedStringsMode::Auto => estimated > config.memory_threshold,
        };

        let count_hint = declared_count.unwrap_or(si_count);
        let storage = if spill {
            let file = tempfile::Builder::new()
                .prefix("flatsheet_strings_")
                .suffix(".tmp")
                .tempfile()?;
            Storage::Spill {
                file,
                offsets: Vec::with_capacity(count_hint),
            }
        } else if si_count > 0 {
            Storage::Arena {
                arena: Vec::with_capacity(INITIAL_ARENA_SIZE.max(estimated * 2)),
                offsets: Vec::with_capacity(count_hint),
            }
        } else {
            return Ok(Self::empty());
        };

        debug!(
            "shared strings: {} entries, ~{} bytes estimated, {} storage",
            si_count,
            estimated,
            if spill { "spill-file" } else { "arena" }
        );

        let mut table = Self {
            storage,
            memory_bytes: 0,
        };
        table.extract_strings(xml, config)?;
        Ok(table)
    }

    /// Number of strings in the table.
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Arena { offsets, .. } => offsets.len(),
            Storage::Spill { offsets, .. } => offsets.len(),
        }
    }

    /// Whether the table holds no strings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a string by id; fatal if out of range.
    pub fn get(&self, index: u32) -> XlsxResult<String> {
        match &self.storage {
            Storage::Arena { arena, offsets } => {
                let offset = *offsets
                    .get(index as usize)
                    .ok_or(XlsxError::ValueOutOfRange(index, offsets.len()))?;
                Ok(read_arena_string(arena, offset))
            }
            Storage::Spill { file, offsets } => {
                let offset = *offsets
                    .get(index as usize)
                    .ok_or(XlsxError::ValueOutOfRange(index, offsets.len()))?;
                read_spill_record(file.as_file(), offset)
            }
        }
    }

    /// Look up a string by id; absent when out of range.
    pub fn try_get(&self, index: u32) -> Option<String> {
        if (index as usize) >= self.len() {
            return None;
        }
        match self.get(index) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("shared string {} unreadable: {}", index, e);
                None
            }
        }
    }

    /// Whether the spill-file store is active.
    pub fn is_on_disk(&self) -> bool {
        matches!(self.storage, Storage::Spill { .. })
    }

    /// Bytes of string data held in memory (arena mode only).
    pub fn memory_bytes(&self) -> usize {
        self.memory_bytes
    }

    /// Second pass: pull every `<si>` out of the XML and store it.
    fn extract_strings(&mut self, xml: &[u8], config: &SharedStringsConfig) -> XlsxResult<()> {
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();
        let mut skip_buf = Vec::new();

        let mut in_si = false;
        let mut in_t = false;
        let mut current = String::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => match e.name().as_ref() {
                    b"si" => {
                        in_si = true;
                        current.clear();
                    }
                    b"t" if in_si => in_t = true,
                    b"r" if in_si && !config.flatten_rich_text => {
                        // Drop the whole rich-text run
                        reader.read_to_end_into(QName(b"r"), &mut skip_buf)?;
                    }
                    _ => {}
                },
                Event::End(e) => match e.name().as_ref() {
                    b"si" => {
                        let mut decoded = crate::escape::decode_escapes(&current).into_owned();
                        truncate_at_char_boundary(&mut decoded, config.max_string_length);
                        self.store(&decoded)?;
                        in_si = false;
                    }
                    b"t" => in_t = false,
                    _ => {}
                },
                Event::Empty(e) if e.name().as_ref() == b"si" => {
                    self.store("")?;
                }
                Event::Text(e) if in_t => {
                    if let Ok(text) = e.unescape() {
                        current.push_str(&text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if let Storage::Spill { file, .. } = &mut self.storage {
            file.as_file_mut().flush()?;
        }

        Ok(())
    }

    /// Append one string at the next id.
    fn store(&mut self, value: &str) -> XlsxResult<()> {
        match &mut self.storage {
            Storage::Arena { arena, offsets } => {
                offsets.push(arena.len() as u32);
                arena.extend_from_slice(value.as_bytes());
                arena.push(0);
                self.memory_bytes += value.len() + 1;
            }
            Storage::Spill { file, offsets } => {
                let f = file.as_file_mut();
                let offset = f.seek(SeekFrom::End(0))?;
                f.write_all(&(value.len() as u32).to_le_bytes())?;
                f.write_all(value.as_bytes())?;
                offsets.push(offset);
            }
        }
        Ok(())
    }
}

/// First pass: count `<si>` elements and read the declared `sst/@count`.
fn pre_scan(xml: &[u8]) -> XlsxResult<(usize, Option<usize>)> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut si_count = 0usize;
    let mut declared = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                b"sst" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"count" {
                            declared = attr
                                .unescape_value()
                                .ok()
                                .and_then(|s| s.parse::<usize>().ok());
                        }
                    }
                }
                b"si" => si_count += 1,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok((si_count, declared))
}

/// Read a NUL-terminated string starting at `offset`.
fn read_arena_string(arena: &[u8], offset: u32) -> String {
    let start = offset as usize;
    let end = arena[start..]
        .iter()
        .position(|&b| b == 0)
        .map(|p| start + p)
        .unwrap_or(arena.len());
    String::from_utf8_lossy(&arena[start..end]).into_owned()
}

/// Read one `{len: u32 LE}{bytes}` record at `offset`.
fn read_spill_record(mut file: &std::fs::File, offset: u64) -> XlsxResult<String> {
    file.seek(SeekFrom::Start(offset))?;

    let mut len_bytes = [0u8; 4];
    file.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    let mut data = vec![0u8; len];
    file.read_exact(&mut data)?;
    Ok(String::from_utf8_lossy(&data).into_owned())
}

/// Truncate to at most `max_len` bytes without splitting a code point.
fn truncate_at_char_boundary(s: &mut String, max_len: usize) {
    if s.len() <= max_len {
        return;
    }
    let mut n = max_len;
    while !s.is_char_boundary(n) {
        n -= 1;
    }
    s.truncate(n);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: SharedStringsMode) -> SharedStringsConfig {
        SharedStringsConfig {
            mode,
            ..Default::default()
        }
    }

    const SIMPLE_SST: &[u8] = br#"<?xml version="1.0"?>
        <sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3">
            <si><t>alpha</t></si>
            <si><t>beta</t></si>
            <si><t>gamma</t></si>
        </sst>"#;

    #[test]
    fn test_arena_lookup() {
        let table =
            SharedStringTable::from_xml(SIMPLE_SST, &config(SharedStringsMode::InMemory)).unwrap();

        assert_eq!(table.len(), 3);
        assert!(!table.is_on_disk());
        assert_eq!(table.get(0).unwrap(), "alpha");
        assert_eq!(table.get(1).unwrap(), "beta");
        assert_eq!(table.get(2).unwrap(), "gamma");
        assert!(table.memory_bytes() > 0);
    }

    #[test]
    fn test_spill_lookup() {
        let table =
            SharedStringTable::from_xml(SIMPLE_SST, &config(SharedStringsMode::External)).unwrap();

        assert_eq!(table.len(), 3);
        assert!(table.is_on_disk());
        assert_eq!(table.get(0).unwrap(), "alpha");
        assert_eq!(table.get(2).unwrap(), "gamma");
        // Random access, not sequential
        assert_eq!(table.get(1).unwrap(), "beta");
    }

    #[test]
    fn test_out_of_range() {
        let table =
            SharedStringTable::from_xml(SIMPLE_SST, &config(SharedStringsMode::InMemory)).unwrap();

        assert!(matches!(
            table.get(3),
            Err(XlsxError::ValueOutOfRange(3, 3))
        ));
        assert_eq!(table.try_get(3), None);
        assert_eq!(table.try_get(0).as_deref(), Some("alpha"));
    }

    #[test]
    fn test_rich_text_flattened() {
        let xml = br#"<sst>
            <si><r><rPr><b/></rPr><t>Bold</t></r><r><t xml:space="preserve"> plain</t></r></si>
        </sst>"#;

        let table = SharedStringTable::from_xml(xml, &config(SharedStringsMode::InMemory)).unwrap();
        assert_eq!(table.get(0).unwrap(), "Bold plain");
    }

    #[test]
    fn test_rich_text_runs_dropped_when_not_flattening() {
        let xml = br#"<sst>
            <si><t>top</t><r><t>run</t></r></si>
        </sst>"#;

        let cfg = SharedStringsConfig {
            mode: SharedStringsMode::InMemory,
            flatten_rich_text: false,
            ..Default::default()
        };
        let table = SharedStringTable::from_xml(xml, &cfg).unwrap();
        assert_eq!(table.get(0).unwrap(), "top");
    }

    #[test]
    fn test_empty_si() {
        let xml = br#"<sst><si/><si><t>x</t></si></sst>"#;
        let table = SharedStringTable::from_xml(xml, &config(SharedStringsMode::InMemory)).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).unwrap(), "");
        assert_eq!(table.get(1).unwrap(), "x");
    }

    #[test]
    fn test_excel_escape_decoding() {
        let xml = br#"<sst><si><t>a_x000d__x000a_b</t></si></sst>"#;
        let table = SharedStringTable::from_xml(xml, &config(SharedStringsMode::InMemory)).unwrap();
        assert_eq!(table.get(0).unwrap(), "a\r\nb");
    }

    #[test]
    fn test_entity_unescaping() {
        let xml = br#"<sst><si><t>a &amp; b &lt;c&gt;</t></si></sst>"#;
        let table = SharedStringTable::from_xml(xml, &config(SharedStringsMode::InMemory)).unwrap();
        assert_eq!(table.get(0).unwrap(), "a & b <c>");
    }

    #[test]
    fn test_truncation_ascii_exact() {
        let xml = br#"<sst><si><t>abcdefghij</t></si></sst>"#;
        let cfg = SharedStringsConfig {
            mode: SharedStringsMode::InMemory,
            max_string_length: 4,
            ..Default::default()
        };
        let table = SharedStringTable::from_xml(xml, &cfg).unwrap();
        assert_eq!(table.get(0).unwrap(), "abcd");
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        // "aé" is three bytes: 0x61 0xC3 0xA9; a 2-byte cut would split é
        let xml = "<sst><si><t>a\u{e9}x</t></si></sst>".to_string();
        let cfg = SharedStringsConfig {
            mode: SharedStringsMode::InMemory,
            max_string_length: 2,
            ..Default::default()
        };
        let table = SharedStringTable::from_xml(xml.as_bytes(), &cfg).unwrap();
        assert_eq!(table.get(0).unwrap(), "a");
    }

    #[test]
    fn test_auto_mode_spills_past_threshold() {
        let cfg = SharedStringsConfig {
            mode: SharedStringsMode::Auto,
            memory_threshold: 100, // 3 entries * 50 bytes estimate > 100
            ..Default::default()
        };
        let table = SharedStringTable::from_xml(SIMPLE_SST, &cfg).unwrap();
        assert!(table.is_on_disk());
        assert_eq!(table.get(1).unwrap(), "beta");
    }

    #[test]
    fn test_auto_mode_stays_in_memory_below_threshold() {
        let table =
            SharedStringTable::from_xml(SIMPLE_SST, &config(SharedStringsMode::Auto)).unwrap();
        assert!(!table.is_on_disk());
    }

    #[test]
    fn test_empty_table() {
        let table = SharedStringTable::empty();
        assert_eq!(table.len(), 0);
        assert!(table.is_empty());
        assert_eq!(table.try_get(0), None);
    }

    #[test]
    fn test_spill_file_removed_on_drop() {
        let path;
        {
            let table =
                SharedStringTable::from_xml(SIMPLE_SST, &config(SharedStringsMode::External))
                    .unwrap();
            path = match &table.storage {
                Storage::Spill { file, .. } => file.path().to_path_buf(),
                _ => panic!("expected spill storage"),
            };
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
