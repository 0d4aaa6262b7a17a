//! OPC (Open Packaging Conventions) package layer
//!
//! An XLSX file is an OPC package: a ZIP of parts plus two bootstrap files,
//! `[Content_Types].xml` and `_rels/.rels`. This layer reads both and can
//! locate the main workbook part. Only the fixed set of well-known targets
//! is ever followed; the relationship graph is never walked recursively.

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{XlsxError, XlsxResult};
use crate::zip::{SecurityLimits, ZipReader};

const CONTENT_TYPES_PATH: &str = "[Content_Types].xml";
const ROOT_RELS_PATH: &str = "_rels/.rels";

/// A typed, id-keyed link from the package root to a part.
#[derive(Debug, Clone)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
}

/// An opened XLSX package.
pub struct OpcPackage {
    zip: ZipReader,
    content_types: Vec<String>,
    relationships: Vec<Relationship>,
}

impl OpcPackage {
    /// Open a package and parse its bootstrap parts.
    pub fn open<P: AsRef<Path>>(path: P, limits: SecurityLimits) -> XlsxResult<Self> {
        let mut zip = ZipReader::open(path, limits)?;

        if !zip.has_entry(CONTENT_TYPES_PATH) {
            return Err(XlsxError::MalformedPackage(format!(
                "missing {}",
                CONTENT_TYPES_PATH
            )));
        }
        let content_types = parse_content_types(&zip.read_entry(CONTENT_TYPES_PATH)?)?;

        if !zip.has_entry(ROOT_RELS_PATH) {
            return Err(XlsxError::MalformedPackage(format!(
                "missing {}",
                ROOT_RELS_PATH
            )));
        }
        let relationships = parse_relationships(&zip.read_entry(ROOT_RELS_PATH)?)?;
        if relationships.is_empty() {
            return Err(XlsxError::MalformedPackage(format!(
                "no relationships in {}",
                ROOT_RELS_PATH
            )));
        }

        Ok(Self {
            zip,
            content_types,
            relationships,
        })
    }

    /// Locate the main document (workbook) part: the target of the first
    /// relationship whose type URI contains `officeDocument`.
    pub fn find_workbook_part(&self) -> XlsxResult<String> {
        self.relationships
            .iter()
            .find(|r| r.rel_type.contains("officeDocument"))
            .map(|r| r.target.trim_start_matches('/').to_string())
            .ok_or_else(|| {
                XlsxError::MalformedPackage("no officeDocument relationship found".into())
            })
    }

    /// All declared content types, in declaration order.
    pub fn content_types(&self) -> &[String] {
        &self.content_types
    }

    /// Shared access to the underlying ZIP reader.
    pub fn zip(&self) -> &ZipReader {
        &self.zip
    }

    /// Mutable access for reading parts.
    pub fn zip_mut(&mut self) -> &mut ZipReader {
        &mut self.zip
    }
}

/// Collect every `Default` and `Override` content-type declaration.
fn parse_content_types(xml: &[u8]) -> XlsxResult<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut types = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e)
                if matches!(e.name().as_ref(), b"Default" | b"Override") =>
            {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"ContentType" {
                        if let Ok(value) = attr.unescape_value() {
                            types.push(value.to_string());
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(types)
}

/// Collect `Relationship` elements from a `.rels` part, in document order.
pub(crate) fn parse_relationships(xml: &[u8]) -> XlsxResult<Vec<Relationship>> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut rels = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) if e.name().as_ref() == b"Relationship" => {
                let mut id = None;
                let mut rel_type = None;
                let mut target = None;

                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = attr.unescape_value().ok().map(|s| s.to_string()),
                        b"Type" => rel_type = attr.unescape_value().ok().map(|s| s.to_string()),
                        b"Target" => target = attr.unescape_value().ok().map(|s| s.to_string()),
                        _ => {}
                    }
                }

                if let (Some(id), Some(rel_type), Some(target)) = (id, rel_type, target) {
                    rels.push(Relationship {
                        id,
                        rel_type,
                        target,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}
