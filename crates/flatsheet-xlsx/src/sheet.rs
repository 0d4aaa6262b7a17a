//! Streaming worksheet parser
//!
//! Pull-parses a worksheet part and emits typed rows to a [`RowHandler`]
//! without ever building a DOM. Rows arrive in document order; cells within
//! a row in ascending column order. Worksheet metadata (merged ranges,
//! column descriptors) is delivered as snapshots that only ever grow: once
//! after `<cols>`, once after `<mergeCells>`, and once at the end of the
//! sheet.
//!
//! Malformed XML is fatal. Malformed individual cells are reported through
//! `handle_error` and skipped; a bad `<v>` payload empties the cell and is
//! reported the same way.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use flatsheet_core::{
    CellCoordinate, CellData, CellType, CellValue, ColumnInfo, MergedRange, RowData,
    WorksheetMetadata,
};

use crate::error::XlsxResult;
use crate::package::OpcPackage;

/// Receiver for the streaming parse.
pub trait RowHandler {
    /// One completed row, cells in ascending column order.
    fn handle_row(&mut self, row: RowData);
    /// A metadata snapshot; may be delivered more than once, monotonic.
    fn handle_metadata(&mut self, metadata: &WorksheetMetadata);
    /// A non-fatal, per-cell parse problem.
    fn handle_error(&mut self, message: &str);
}

/// Streaming parser for worksheet parts.
pub struct SheetStreamReader;

impl SheetStreamReader {
    /// Parse the worksheet at `sheet_target` (as resolved from the workbook
    /// relationships) and stream it into `handler`.
    pub fn parse_sheet(
        package: &mut OpcPackage,
        sheet_target: &str,
        handler: &mut dyn RowHandler,
    ) -> XlsxResult<()> {
        // Relationship targets are relative to xl/ unless rooted
        let full_path = if let Some(absolute) = sheet_target.strip_prefix('/') {
            absolute.to_string()
        } else if sheet_target.starts_with("xl/") {
            sheet_target.to_string()
        } else {
            format!("xl/{}", sheet_target)
        };

        let xml = package.zip_mut().read_entry(&full_path)?;
        Self::parse_sheet_data(&xml, handler)
    }

    /// Parse a worksheet from raw XML bytes.
    pub fn parse_sheet_data(xml: &[u8], handler: &mut dyn RowHandler) -> XlsxResult<()> {
        let mut reader = Reader::from_reader(xml);

        let mut buf = Vec::new();
        let mut metadata = WorksheetMetadata::default();

        let mut in_cols = false;
        let mut current_row: Option<RowData> = None;
        let mut current_cell: Option<CellData> = None;
        let mut in_cell = false;
        let mut in_v = false;
        let mut in_is = false;
        let mut in_is_t = false;
        let mut value_text = String::new();
        let mut inline_text = String::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => match e.name().as_ref() {
                    b"cols" => in_cols = true,
                    b"col" if in_cols => push_columns(&e, &mut metadata),
                    b"mergeCells" => {}
                    b"mergeCell" => push_merge(&e, &mut metadata),
                    b"row" => current_row = Some(row_from_attrs(&e)),
                    b"c" if current_row.is_some() => {
                        in_cell = true;
                        current_cell = cell_from_attrs(&e, handler);
                    }
                    b"v" if in_cell => {
                        in_v = true;
                        value_text.clear();
                    }
                    b"is" if in_cell => {
                        in_is = true;
                        inline_text.clear();
                    }
                    b"t" if in_is => in_is_t = true,
                    _ => {}
                },
                Event::Empty(e) => match e.name().as_ref() {
                    b"cols" => handler.handle_metadata(&metadata),
                    b"col" if in_cols => push_columns(&e, &mut metadata),
                    b"mergeCells" => handler.handle_metadata(&metadata),
                    b"mergeCell" => push_merge(&e, &mut metadata),
                    b"row" => handler.handle_row(row_from_attrs(&e)),
                    b"c" => {
                        if let Some(row) = current_row.as_mut() {
                            if let Some(cell) = cell_from_attrs(&e, handler) {
                                push_cell(row, cell, handler);
                            }
                        }
                    }
                    _ => {}
                },
                Event::End(e) => match e.name().as_ref() {
                    b"cols" => {
                        in_cols = false;
                        handler.handle_metadata(&metadata);
                    }
                    b"mergeCells" => handler.handle_metadata(&metadata),
                    b"row" => {
                        if let Some(row) = current_row.take() {
                            handler.handle_row(row);
                        }
                    }
                    b"c" => {
                        if let (Some(row), Some(cell)) = (current_row.as_mut(), current_cell.take())
                        {
                            push_cell(row, cell, handler);
                        }
                        in_cell = false;
                    }
                    b"v" => {
                        in_v = false;
                        if let Some(cell) = current_cell.as_mut() {
                            let value = interpret_value(&value_text, cell, handler);
                            cell.value = value;
                        }
                    }
                    b"is" => {
                        in_is = false;
                        if let Some(cell) = current_cell.as_mut() {
                            cell.cell_type = CellType::InlineString;
                            cell.value = CellValue::Text(
                                crate::escape::decode_escapes(&inline_text).into_owned(),
                            );
                            inline_text.clear();
                        }
                    }
                    b"t" => in_is_t = false,
                    _ => {}
                },
                Event::Text(e) => {
                    if in_v {
                        if let Ok(text) = e.unescape() {
                            value_text.push_str(&text);
                        }
                    } else if in_is_t {
                        if let Ok(text) = e.unescape() {
                            inline_text.push_str(&text);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        handler.handle_metadata(&metadata);
        Ok(())
    }
}

/// Parse `<row>` attributes: `r` (default 1), `hidden`, and the `spans`
/// reserve hint.
fn row_from_attrs(e: &BytesStart) -> RowData {
    let mut row = RowData {
        row_number: 1,
        hidden: false,
        cells: Vec::new(),
    };

    let mut reserve = 0usize;

    for attr in e.attributes().flatten() {
        let value = match attr.unescape_value() {
            Ok(v) => v,
            Err(_) => continue,
        };
        match attr.key.as_ref() {
            b"r" => {
                if let Ok(n) = value.parse::<u32>() {
                    if n > 0 {
                        row.row_number = n;
                    }
                }
            }
            b"hidden" => {
                row.hidden = value.as_ref() == "1" || value.as_ref() == "true";
            }
            b"spans" => {
                if let Some((first, last)) = value.split_once(':') {
                    if let (Ok(first), Ok(last)) = (first.parse::<u32>(), last.parse::<u32>()) {
                        if last >= first {
                            reserve = ((last - first + 1) as usize).min(16_384);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    if reserve > 0 {
        row.cells.reserve(reserve);
    }

    row
}

/// Parse `<c>` attributes. A missing or unparseable `r` makes the cell
/// malformed: it is reported and dropped.
fn cell_from_attrs(e: &BytesStart, handler: &mut dyn RowHandler) -> Option<CellData> {
    let mut coordinate = None;
    let mut cell_type = CellType::Number;
    let mut style_index = 0u32;

    for attr in e.attributes().flatten() {
        let value = match attr.unescape_value() {
            Ok(v) => v,
            Err(_) => continue,
        };
        match attr.key.as_ref() {
            b"r" => match CellCoordinate::parse(&value) {
                Ok(c) => coordinate = Some(c),
                Err(err) => {
                    handler.handle_error(&format!("invalid cell reference '{}': {}", value, err));
                    return None;
                }
            },
            b"t" => {
                cell_type = match value.as_ref() {
                    "b" => CellType::Boolean,
                    "n" => CellType::Number,
                    "s" => CellType::SharedString,
                    "str" => CellType::String,
                    "inlineStr" => CellType::InlineString,
                    "e" => CellType::Error,
                    _ => CellType::Unknown,
                };
            }
            b"s" => style_index = value.parse().unwrap_or(0),
            _ => {}
        }
    }

    let Some(coordinate) = coordinate else {
        handler.handle_error("cell without a reference attribute");
        return None;
    };

    Some(CellData {
        coordinate,
        cell_type,
        style_index,
        value: CellValue::Empty,
    })
}

/// Append a cell, holding the row-membership and column-order invariants.
fn push_cell(row: &mut RowData, cell: CellData, handler: &mut dyn RowHandler) {
    if cell.coordinate.row != row.row_number {
        handler.handle_error(&format!(
            "cell {} does not belong to row {}",
            cell.coordinate, row.row_number
        ));
        return;
    }

    if let Some(last) = row.cells.last() {
        if cell.coordinate.column < last.coordinate.column {
            handler.handle_error(&format!(
                "cell {} out of column order after {}",
                cell.coordinate, last.coordinate
            ));
            return;
        }
    }

    row.cells.push(cell);
}

/// Interpret `<v>` text according to the declared cell type.
fn interpret_value(raw: &str, cell: &CellData, handler: &mut dyn RowHandler) -> CellValue {
    if raw.is_empty() {
        return CellValue::Empty;
    }

    match cell.cell_type {
        CellType::Boolean => match raw.trim() {
            "1" => CellValue::Bool(true),
            "0" => CellValue::Bool(false),
            _ => CellValue::Empty,
        },
        CellType::Number => match raw.trim().parse::<f64>() {
            Ok(n) => CellValue::Number(n),
            Err(_) => {
                handler.handle_error(&format!(
                    "cell {}: invalid numeric value '{}'",
                    cell.coordinate, raw
                ));
                CellValue::Empty
            }
        },
        CellType::SharedString => match raw.trim().parse::<u32>() {
            Ok(i) => CellValue::SharedIndex(i),
            Err(_) => {
                handler.handle_error(&format!(
                    "cell {}: invalid shared string index '{}'",
                    cell.coordinate, raw
                ));
                CellValue::Empty
            }
        },
        CellType::String | CellType::InlineString => {
            CellValue::Text(crate::escape::decode_escapes(raw).into_owned())
        }
        CellType::Error | CellType::Unknown => CellValue::Text(raw.to_string()),
    }
}

/// Expand one `<col min=.. max=..>` span into per-column descriptors.
fn push_columns(e: &BytesStart, metadata: &mut WorksheetMetadata) {
    let mut min = 1u32;
    let mut max = None;
    let mut hidden = false;
    let mut width = 0.0f64;

    for attr in e.attributes().flatten() {
        let value = match attr.unescape_value() {
            Ok(v) => v,
            Err(_) => continue,
        };
        match attr.key.as_ref() {
            b"min" => min = value.parse().unwrap_or(1),
            b"max" => max = value.parse::<u32>().ok(),
            b"hidden" => hidden = value.as_ref() == "1" || value.as_ref() == "true",
            b"width" => width = value.parse().unwrap_or(0.0),
            _ => {}
        }
    }

    let max = max.unwrap_or(min);
    for column_index in min..=max.min(flatsheet_core::MAX_COLS) {
        metadata.columns.push(ColumnInfo {
            column_index,
            hidden,
            width,
        });
    }
}

/// Record one `<mergeCell ref="A1:C3"/>`.
fn push_merge(e: &BytesStart, metadata: &mut WorksheetMetadata) {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"ref" {
            if let Ok(value) = attr.unescape_value() {
                if let Ok(range) = MergedRange::parse(&value) {
                    metadata.merged_ranges.push(range);
                }
            }
        }
    }
}
