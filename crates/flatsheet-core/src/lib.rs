//! # flatsheet-core
//!
//! Core data structures for the flatsheet conversion pipeline.
//!
//! This crate provides the types that flow between the streaming worksheet
//! reader and the CSV row collector:
//! - [`CellCoordinate`] and [`MergedRange`] - A1-style addressing
//! - [`CellType`], [`CellValue`], [`CellData`] - typed cells
//! - [`RowData`], [`ColumnInfo`], [`WorksheetMetadata`] - row stream payloads

pub mod cell;
pub mod coordinate;
pub mod error;
pub mod row;

// Re-exports for convenience
pub use cell::{CellData, CellType, CellValue};
pub use coordinate::{CellCoordinate, MergedRange};
pub use error::{Error, Result};
pub use row::{ColumnInfo, RowData, WorksheetMetadata};

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u32 = 16_384;
