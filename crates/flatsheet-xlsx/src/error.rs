//! XLSX error types

use thiserror::Error;

/// Result type for XLSX operations
pub type XlsxResult<T> = std::result::Result<T, XlsxError>;

/// Errors that can occur while reading an XLSX package
#[derive(Debug, Error)]
pub enum XlsxError {
    /// Input path does not exist
    #[error("Input file not found: {0}")]
    NotFound(String),

    /// The archive is not a readable ZIP
    #[error("Malformed ZIP archive: {0}")]
    MalformedZip(#[from] zip::result::ZipError),

    /// An entry has the encryption bit set
    #[error("Encrypted ZIP entries are not supported: {0}")]
    EncryptedEntry(String),

    /// A ZIP security limit was exceeded
    #[error("ZIP security limit exceeded: {0}")]
    LimitExceeded(String),

    /// OPC structural fault ([Content_Types].xml, _rels/.rels)
    #[error("Malformed OPC package: {0}")]
    MalformedPackage(String),

    /// A required part is absent from the package
    #[error("Missing required part: {0}")]
    MissingPart(String),

    /// A sheet references a relationship id with no mapping
    #[error("Missing relationship: {0}")]
    MissingRelationship(String),

    /// Fatal parse fault in an XML part
    #[error("Malformed XML: {0}")]
    MalformedXml(#[from] quick_xml::Error),

    /// Shared-string index beyond the table
    #[error("Shared string index {0} out of range (count: {1})")]
    ValueOutOfRange(u32, usize),

    /// Spill-file or other internal I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
