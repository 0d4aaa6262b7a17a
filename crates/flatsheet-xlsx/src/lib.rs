//! # flatsheet-xlsx
//!
//! Read-only access to XLSX (Office Open XML spreadsheet) packages for the
//! flatsheet conversion pipeline.
//!
//! The crate is organized along the package structure itself:
//! - [`ZipReader`] - the ZIP container, with zip-bomb and zip-slip defenses
//! - [`OpcPackage`] - content types, package relationships, workbook lookup
//! - [`SharedStringTable`] - `xl/sharedStrings.xml`, arena or spill file
//! - [`StyleRegistry`] - `xl/styles.xml`, with date/time format detection
//! - [`Workbook`] - sheet list, visibility, and the workbook date system
//! - [`SheetStreamReader`] - streaming worksheet parse into a [`RowHandler`]
//!
//! Cached formula values are consumed; formulas are never evaluated.

pub mod error;
pub mod escape;
pub mod package;
pub mod shared_strings;
pub mod sheet;
pub mod styles;
pub mod workbook;
pub mod zip;

pub use error::{XlsxError, XlsxResult};
pub use package::OpcPackage;
pub use shared_strings::{SharedStringTable, SharedStringsConfig, SharedStringsMode};
pub use sheet::{RowHandler, SheetStreamReader};
pub use styles::{CellStyle, NumberFormat, NumberFormatCategory, StyleRegistry};
pub use workbook::{DateSystem, SheetInfo, Workbook, WorkbookProperties};
pub use zip::{SecurityLimits, ZipEntry, ZipReader};
