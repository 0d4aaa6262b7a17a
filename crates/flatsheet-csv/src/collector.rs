//! CSV row collector
//!
//! A [`RowHandler`] that converts each incoming row straight to CSV text.
//! Rows are walked column by column up to the row's highest populated
//! column, with a single advancing cursor over the sparse cell list; gaps
//! become empty fields (or propagated merged values). The buffered output
//! is materialized by [`CsvRowCollector::csv_bytes`], which applies the
//! BOM and newline conversion.

use std::collections::HashMap;

use flatsheet_core::{CellCoordinate, RowData, WorksheetMetadata};
use flatsheet_xlsx::{DateSystem, RowHandler, SharedStringTable, StyleRegistry};

use crate::convert::CellConverter;
use crate::options::{CsvOptions, MergedHandling, Newline};

/// Accumulates CSV text from a streamed sheet.
pub struct CsvRowCollector<'a> {
    converter: CellConverter<'a>,
    options: CsvOptions,
    metadata: WorksheetMetadata,
    /// Converted text of merged top-left cells, keyed by range reference
    merged_values: HashMap<String, String>,
    out: String,
    row_count: usize,
    errors: Vec<String>,
}

impl<'a> CsvRowCollector<'a> {
    pub fn new(
        shared_strings: Option<&'a SharedStringTable>,
        styles: Option<&'a StyleRegistry>,
        date_system: DateSystem,
        options: CsvOptions,
    ) -> Self {
        let converter = CellConverter::new(shared_strings, styles, date_system, options.date_mode);
        Self {
            converter,
            options,
            metadata: WorksheetMetadata::default(),
            merged_values: HashMap::new(),
            out: String::new(),
            row_count: 0,
            errors: Vec::new(),
        }
    }

    /// The collected CSV, with BOM and newline conversion applied.
    pub fn csv_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.out.len() + 3);
        if self.options.include_bom {
            bytes.extend_from_slice(&[0xEF, 0xBB, 0xBF]);
        }
        match self.options.newline {
            Newline::LF => bytes.extend_from_slice(self.out.as_bytes()),
            Newline::CRLF => {
                for &b in self.out.as_bytes() {
                    if b == b'\n' {
                        bytes.push(b'\r');
                    }
                    bytes.push(b);
                }
            }
        }
        bytes
    }

    /// Number of emitted CSV rows.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Non-fatal problems reported during the parse.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Value for an absent cell: the cached merged-range text, if the cell
    /// lies inside a known range and propagation is on.
    fn propagated_value(&self, coord: CellCoordinate) -> String {
        if self.options.merged_handling != MergedHandling::Propagate {
            return String::new();
        }
        let Some(range) = self.metadata.find_merged_range(coord) else {
            return String::new();
        };
        self.merged_values
            .get(&range.to_reference())
            .cloned()
            .unwrap_or_default()
    }

    fn write_field(&mut self, field: &str) {
        let delimiter = self.options.delimiter as char;
        let needs_quoting = self.options.quote_all
            || field.contains(delimiter)
            || field.contains('"')
            || field.contains('\n')
            || field.contains('\r');

        if !needs_quoting {
            self.out.push_str(field);
            return;
        }

        self.out.push('"');
        for c in field.chars() {
            if c == '"' {
                self.out.push('"');
            }
            self.out.push(c);
        }
        self.out.push('"');
    }
}

impl RowHandler for CsvRowCollector<'_> {
    fn handle_row(&mut self, row: RowData) {
        if row.hidden && !self.options.include_hidden_rows {
            return;
        }

        if row.cells.is_empty() {
            self.out.push('\n');
            self.row_count += 1;
            return;
        }

        let max_column = row.max_column();
        let mut cursor = 0usize;
        let mut first = true;

        for column in 1..=max_column {
            while cursor < row.cells.len() && row.cells[cursor].coordinate.column < column {
                cursor += 1;
            }

            if !self.options.include_hidden_columns && self.metadata.is_column_hidden(column) {
                continue;
            }

            let cell = row
                .cells
                .get(cursor)
                .filter(|c| c.coordinate.column == column);

            let text = match cell {
                Some(cell) => {
                    let mut text = self.converter.convert(cell);
                    if self.options.merged_handling == MergedHandling::Propagate {
                        if let Some(range) = self.metadata.find_merged_range(cell.coordinate) {
                            if range.top_left == cell.coordinate {
                                self.merged_values.insert(range.to_reference(), text.clone());
                            } else if cell.is_empty() {
                                // Placeholder cell covered by a merged range
                                text = self
                                    .merged_values
                                    .get(&range.to_reference())
                                    .cloned()
                                    .unwrap_or_default();
                            }
                        }
                    }
                    text
                }
                None => self.propagated_value(CellCoordinate::new(row.row_number, column)),
            };

            if !first {
                self.out.push(self.options.delimiter as char);
            }
            first = false;
            self.write_field(&text);
        }

        self.out.push('\n');
        self.row_count += 1;
    }

    fn handle_metadata(&mut self, metadata: &WorksheetMetadata) {
        self.metadata = metadata.clone();
    }

    fn handle_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatsheet_core::{CellData, CellType, CellValue, ColumnInfo, MergedRange};

    fn text_cell(row: u32, column: u32, text: &str) -> CellData {
        CellData {
            coordinate: CellCoordinate::new(row, column),
            cell_type: CellType::InlineString,
            style_index: 0,
            value: CellValue::Text(text.into()),
        }
    }

    fn number_cell(row: u32, column: u32, n: f64) -> CellData {
        CellData {
            coordinate: CellCoordinate::new(row, column),
            cell_type: CellType::Number,
            style_index: 0,
            value: CellValue::Number(n),
        }
    }

    fn row(row_number: u32, cells: Vec<CellData>) -> RowData {
        RowData {
            row_number,
            hidden: false,
            cells,
        }
    }

    fn collector(options: CsvOptions) -> CsvRowCollector<'static> {
        CsvRowCollector::new(None, None, DateSystem::Date1900, options)
    }

    fn csv_string(c: &CsvRowCollector) -> String {
        String::from_utf8(c.csv_bytes()).unwrap()
    }

    #[test]
    fn test_simple_row() {
        let mut c = collector(CsvOptions::default());
        c.handle_row(row(1, vec![text_cell(1, 1, "Hello")]));

        assert_eq!(csv_string(&c), "Hello\n");
        assert_eq!(c.row_count(), 1);
    }

    #[test]
    fn test_sparse_row_with_escaping() {
        let mut c = collector(CsvOptions::default());
        c.handle_row(row(
            1,
            vec![
                text_cell(1, 1, "Hello, World"),
                text_cell(1, 2, "Say \"Hi\""),
                number_cell(1, 4, 42.0),
            ],
        ));

        assert_eq!(csv_string(&c), "\"Hello, World\",\"Say \"\"Hi\"\"\",,42\n");
    }

    #[test]
    fn test_quoting_on_newlines() {
        let mut c = collector(CsvOptions::default());
        c.handle_row(row(1, vec![text_cell(1, 1, "two\nlines")]));

        assert_eq!(csv_string(&c), "\"two\nlines\"\n");
    }

    #[test]
    fn test_quote_all() {
        let mut c = collector(CsvOptions {
            quote_all: true,
            ..Default::default()
        });
        c.handle_row(row(1, vec![text_cell(1, 1, "a"), number_cell(1, 2, 1.0)]));

        assert_eq!(csv_string(&c), "\"a\",\"1\"\n");
    }

    #[test]
    fn test_custom_delimiter() {
        let mut c = collector(CsvOptions {
            delimiter: b';',
            ..Default::default()
        });
        c.handle_row(row(
            1,
            vec![text_cell(1, 1, "a;b"), text_cell(1, 2, "plain,comma")],
        ));

        // The comma no longer forces quoting; the semicolon does
        assert_eq!(csv_string(&c), "\"a;b\";plain,comma\n");
    }

    #[test]
    fn test_empty_row_emits_bare_newline() {
        let mut c = collector(CsvOptions::default());
        c.handle_row(row(1, Vec::new()));
        c.handle_row(row(2, vec![text_cell(2, 1, "x")]));

        assert_eq!(csv_string(&c), "\nx\n");
        assert_eq!(c.row_count(), 2);
    }

    #[test]
    fn test_hidden_row_skipped() {
        let mut c = collector(CsvOptions {
            include_hidden_rows: false,
            ..Default::default()
        });

        let mut hidden = row(1, vec![text_cell(1, 1, "secret")]);
        hidden.hidden = true;
        c.handle_row(hidden);
        c.handle_row(row(2, vec![text_cell(2, 1, "visible")]));

        assert_eq!(csv_string(&c), "visible\n");
        assert_eq!(c.row_count(), 1);
    }

    #[test]
    fn test_hidden_row_kept_by_default() {
        let mut c = collector(CsvOptions::default());
        let mut hidden = row(1, vec![text_cell(1, 1, "secret")]);
        hidden.hidden = true;
        c.handle_row(hidden);

        assert_eq!(csv_string(&c), "secret\n");
    }

    #[test]
    fn test_hidden_column_skipped() {
        let mut c = collector(CsvOptions {
            include_hidden_columns: false,
            ..Default::default()
        });

        c.handle_metadata(&WorksheetMetadata {
            merged_ranges: Vec::new(),
            columns: vec![ColumnInfo {
                column_index: 2,
                hidden: true,
                width: 0.0,
            }],
        });

        c.handle_row(row(
            1,
            vec![
                number_cell(1, 1, 1.0),
                number_cell(1, 2, 2.0),
                number_cell(1, 3, 3.0),
            ],
        ));

        assert_eq!(csv_string(&c), "1,3\n");
    }

    #[test]
    fn test_hidden_filters_idempotent() {
        let make = || {
            let mut c = collector(CsvOptions {
                include_hidden_columns: false,
                include_hidden_rows: false,
                ..Default::default()
            });
            c.handle_metadata(&WorksheetMetadata {
                merged_ranges: Vec::new(),
                columns: vec![ColumnInfo {
                    column_index: 1,
                    hidden: true,
                    width: 0.0,
                }],
            });
            c.handle_row(row(1, vec![number_cell(1, 1, 1.0), number_cell(1, 2, 2.0)]));
            csv_string(&c)
        };

        assert_eq!(make(), make());
        assert_eq!(make(), "2\n");
    }

    #[test]
    fn test_merged_propagation() {
        let mut c = collector(CsvOptions {
            merged_handling: MergedHandling::Propagate,
            ..Default::default()
        });

        c.handle_metadata(&WorksheetMetadata {
            merged_ranges: vec![MergedRange::parse("A1:B1").unwrap()],
            columns: Vec::new(),
        });

        c.handle_row(row(
            1,
            vec![text_cell(1, 1, "Group"), text_cell(1, 3, "x")],
        ));

        assert_eq!(csv_string(&c), "Group,Group,x\n");
    }

    #[test]
    fn test_merged_propagation_fills_placeholder_cells() {
        let mut c = collector(CsvOptions {
            merged_handling: MergedHandling::Propagate,
            ..Default::default()
        });

        c.handle_metadata(&WorksheetMetadata {
            merged_ranges: vec![MergedRange::parse("A1:B1").unwrap()],
            columns: Vec::new(),
        });

        // B1 present but empty, the shape Excel writes for merged cells
        let placeholder = CellData {
            coordinate: CellCoordinate::new(1, 2),
            cell_type: CellType::Number,
            style_index: 0,
            value: CellValue::Empty,
        };
        c.handle_row(row(1, vec![text_cell(1, 1, "Group"), placeholder]));

        assert_eq!(csv_string(&c), "Group,Group\n");
    }

    #[test]
    fn test_merged_propagation_across_rows() {
        let mut c = collector(CsvOptions {
            merged_handling: MergedHandling::Propagate,
            ..Default::default()
        });

        c.handle_metadata(&WorksheetMetadata {
            merged_ranges: vec![MergedRange::parse("A1:A2").unwrap()],
            columns: Vec::new(),
        });

        c.handle_row(row(1, vec![text_cell(1, 1, "v"), text_cell(1, 2, "b")]));
        c.handle_row(row(2, vec![text_cell(2, 2, "c")]));

        assert_eq!(csv_string(&c), "v,b\nv,c\n");
    }

    #[test]
    fn test_no_propagation_by_default() {
        let mut c = collector(CsvOptions::default());

        c.handle_metadata(&WorksheetMetadata {
            merged_ranges: vec![MergedRange::parse("A1:B1").unwrap()],
            columns: Vec::new(),
        });

        c.handle_row(row(1, vec![text_cell(1, 1, "Group")]));

        // B1 is past the row's last populated column, so the row ends at A1
        assert_eq!(csv_string(&c), "Group\n");
    }

    #[test]
    fn test_bom_and_crlf_bytes() {
        let mut c = collector(CsvOptions {
            include_bom: true,
            newline: Newline::CRLF,
            ..Default::default()
        });
        c.handle_row(row(1, vec![text_cell(1, 1, "x")]));

        assert_eq!(c.csv_bytes(), vec![0xEF, 0xBB, 0xBF, b'x', b'\r', b'\n']);
    }

    #[test]
    fn test_errors_recorded() {
        let mut c = collector(CsvOptions::default());
        c.handle_error("something went wrong");
        assert_eq!(c.errors(), ["something went wrong"]);
    }

    #[test]
    fn test_output_parses_back_as_csv() {
        let mut c = collector(CsvOptions::default());
        c.handle_row(row(
            1,
            vec![
                text_cell(1, 1, "a,b"),
                text_cell(1, 2, "line\nbreak"),
                text_cell(1, 3, "quote\"inside"),
            ],
        ));
        c.handle_row(row(2, vec![number_cell(2, 1, 7.0)]));

        let bytes = c.csv_bytes();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(bytes.as_slice());

        let records: Vec<csv::StringRecord> =
            reader.records().collect::<Result<_, _>>().unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][0], "a,b");
        assert_eq!(&records[0][1], "line\nbreak");
        assert_eq!(&records[0][2], "quote\"inside");
        assert_eq!(&records[1][0], "7");
    }
}
