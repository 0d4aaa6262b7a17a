//! Row records and worksheet-level metadata delivered to row handlers

use crate::cell::CellData;
use crate::coordinate::{CellCoordinate, MergedRange};

/// One worksheet row as delivered to a row handler.
///
/// Cells are sparse: only cells present in the source XML appear, in
/// ascending column order.
#[derive(Debug, Clone, Default)]
pub struct RowData {
    /// 1-based row number (`r` attribute; defaults to 1 when absent)
    pub row_number: u32,
    /// Whether the row is marked hidden
    pub hidden: bool,
    /// Cells present in the row, ordered by column
    pub cells: Vec<CellData>,
}

impl RowData {
    /// Look up the cell at a 1-based column, if present.
    ///
    /// Relies on the column ordering invariant to binary-search.
    pub fn find_cell(&self, column: u32) -> Option<&CellData> {
        self.cells
            .binary_search_by_key(&column, |c| c.coordinate.column)
            .ok()
            .map(|i| &self.cells[i])
    }

    /// Highest 1-based column present in the row, or 0 for an empty row.
    pub fn max_column(&self) -> u32 {
        self.cells.iter().map(|c| c.coordinate.column).max().unwrap_or(0)
    }
}

/// One column's layout properties from a `<col>` declaration.
///
/// A `<col min="2" max="4">` span expands to one descriptor per covered
/// column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnInfo {
    /// 1-based column number
    pub column_index: u32,
    /// Whether the column is marked hidden
    pub hidden: bool,
    /// Declared column width (0.0 when unspecified)
    pub width: f64,
}

/// Worksheet-level metadata accumulated during a sheet parse.
///
/// Snapshots are delivered to the row handler as sections complete and are
/// monotonic: merged ranges and column descriptors only grow.
#[derive(Debug, Clone, Default)]
pub struct WorksheetMetadata {
    /// Merged-cell regions, in document order
    pub merged_ranges: Vec<MergedRange>,
    /// Column descriptors, one per covered column
    pub columns: Vec<ColumnInfo>,
}

impl WorksheetMetadata {
    /// Find the merged region containing a coordinate, if any.
    pub fn find_merged_range(&self, coord: CellCoordinate) -> Option<&MergedRange> {
        self.merged_ranges.iter().find(|r| r.contains(coord))
    }

    /// Whether a 1-based column is marked hidden. Undeclared columns are
    /// visible.
    pub fn is_column_hidden(&self, column: u32) -> bool {
        self.columns
            .iter()
            .find(|c| c.column_index == column)
            .map(|c| c.hidden)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellData, CellValue};

    fn cell_at(row: u32, column: u32, value: f64) -> CellData {
        let mut cell = CellData::new(CellCoordinate::new(row, column));
        cell.value = CellValue::Number(value);
        cell
    }

    #[test]
    fn test_find_cell_sparse() {
        let row = RowData {
            row_number: 1,
            hidden: false,
            cells: vec![cell_at(1, 1, 1.0), cell_at(1, 4, 4.0), cell_at(1, 9, 9.0)],
        };

        assert_eq!(row.find_cell(1).unwrap().value.as_number(), Some(1.0));
        assert_eq!(row.find_cell(4).unwrap().value.as_number(), Some(4.0));
        assert!(row.find_cell(2).is_none());
        assert!(row.find_cell(10).is_none());
        assert_eq!(row.max_column(), 9);
    }

    #[test]
    fn test_empty_row_max_column() {
        assert_eq!(RowData::default().max_column(), 0);
    }

    #[test]
    fn test_column_hidden_lookup() {
        let meta = WorksheetMetadata {
            merged_ranges: Vec::new(),
            columns: vec![
                ColumnInfo {
                    column_index: 2,
                    hidden: true,
                    width: 8.43,
                },
                ColumnInfo {
                    column_index: 3,
                    hidden: false,
                    width: 12.0,
                },
            ],
        };

        assert!(meta.is_column_hidden(2));
        assert!(!meta.is_column_hidden(3));
        assert!(!meta.is_column_hidden(1)); // Undeclared
    }

    #[test]
    fn test_find_merged_range() {
        let meta = WorksheetMetadata {
            merged_ranges: vec![MergedRange::parse("A1:B2").unwrap()],
            columns: Vec::new(),
        };

        assert!(meta.find_merged_range(CellCoordinate::new(1, 2)).is_some());
        assert!(meta.find_merged_range(CellCoordinate::new(3, 1)).is_none());
    }
}
