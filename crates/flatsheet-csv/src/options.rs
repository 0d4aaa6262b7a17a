//! CSV output options

/// Row terminator style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Newline {
    /// Unix-style (`\n`)
    #[default]
    LF,
    /// Windows-style (`\r\n`)
    CRLF,
}

/// What to do with cells covered by a merged range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergedHandling {
    /// Only the top-left cell carries the value; covered cells stay empty
    #[default]
    None,
    /// Covered cells repeat the top-left cell's converted text
    Propagate,
}

/// How date-styled numeric cells are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateMode {
    /// Convert serials to ISO-8601 dates/times
    #[default]
    Iso,
    /// Leave serials as plain numbers
    Raw,
}

/// Options for the CSV row collector.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Field delimiter (default: comma)
    pub delimiter: u8,
    /// Row terminator
    pub newline: Newline,
    /// Prefix the output with the UTF-8 BOM (`EF BB BF`)
    pub include_bom: bool,
    /// Quote every field, not just the ones that need it
    pub quote_all: bool,
    /// Merged-cell handling
    pub merged_handling: MergedHandling,
    /// Emit rows marked hidden
    pub include_hidden_rows: bool,
    /// Emit columns marked hidden
    pub include_hidden_columns: bool,
    /// Date rendering mode
    pub date_mode: DateMode,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            newline: Newline::default(),
            include_bom: false,
            quote_all: false,
            merged_handling: MergedHandling::default(),
            include_hidden_rows: true,
            include_hidden_columns: true,
            date_mode: DateMode::default(),
        }
    }
}
