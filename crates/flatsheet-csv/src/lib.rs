//! # flatsheet-csv
//!
//! The output half of the flatsheet pipeline: turns the typed rows emitted
//! by the streaming worksheet reader into RFC 4180 CSV text.
//!
//! - [`CellConverter`] renders one cell as a presentable string (resolving
//!   shared strings and date-styled serials on demand)
//! - [`CsvRowCollector`] is a row handler that applies hidden-row/column
//!   filters and merged-cell propagation, then buffers the CSV bytes

pub mod collector;
pub mod convert;
pub mod options;

pub use collector::CsvRowCollector;
pub use convert::CellConverter;
pub use options::{CsvOptions, DateMode, MergedHandling, Newline};
