//! # flatsheet
//!
//! Convert worksheets from XLSX packages into RFC 4180 CSV.
//!
//! The conversion is read-only and streaming: the package is never
//! modified, formulas are never evaluated (cached values are used), and
//! worksheets are parsed row by row under bounded memory. Charts, pivot
//! tables, images, comments and rich-text formatting are ignored.
//!
//! ## Example
//!
//! ```no_run
//! use flatsheet::{render, RenderOptions, SheetSelector};
//!
//! let csv = render("report.xlsx", &SheetSelector::First, &RenderOptions::default())?;
//! std::io::Write::write_all(&mut std::io::stdout(), &csv)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::path::Path;

use thiserror::Error;

// Re-export the pipeline types
pub use flatsheet_core::{
    CellCoordinate, CellData, CellType, CellValue, ColumnInfo, MergedRange, RowData,
    WorksheetMetadata, MAX_COLS, MAX_ROWS,
};
pub use flatsheet_csv::{
    CellConverter, CsvOptions, CsvRowCollector, DateMode, MergedHandling, Newline,
};
pub use flatsheet_xlsx::{
    DateSystem, OpcPackage, RowHandler, SecurityLimits, SharedStringTable, SharedStringsConfig,
    SharedStringsMode, SheetInfo, SheetStreamReader, StyleRegistry, Workbook, XlsxError, ZipEntry,
    ZipReader,
};

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced at the conversion boundary
#[derive(Debug, Error)]
pub enum Error {
    /// Any package-level fault (ZIP, OPC, XML, shared strings, styles)
    #[error(transparent)]
    Xlsx(#[from] XlsxError),

    /// Sheet-name selector did not resolve
    #[error("Sheet not found: {0}")]
    UnknownSheet(String),

    /// Sheet-index selector did not resolve
    #[error("Sheet index {index} out of range (count: {count})")]
    SheetIndexOutOfRange { index: usize, count: usize },

    /// The sheet parsed, but cells had problems
    #[error("Sheet '{sheet}' had parse errors: {messages}")]
    SheetErrors { sheet: String, messages: String },
}

/// Which worksheet to convert.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SheetSelector {
    /// The first sheet in workbook order
    #[default]
    First,
    /// A 0-based sheet position
    Index(usize),
    /// A sheet display name
    Name(String),
}

/// Everything that configures a conversion.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// CSV shaping (delimiter, newline, BOM, filters, merged handling)
    pub csv: CsvOptions,
    /// Shared-string storage tuning
    pub shared_strings: SharedStringsConfig,
    /// ZIP security limits
    pub limits: SecurityLimits,
}

/// Convert one worksheet to CSV bytes.
pub fn render<P: AsRef<Path>>(
    path: P,
    selector: &SheetSelector,
    options: &RenderOptions,
) -> Result<Vec<u8>> {
    let mut package = OpcPackage::open(path, options.limits)?;
    let workbook = Workbook::open(&mut package)?;
    let styles = open_styles(&mut package)?;
    let shared_strings = SharedStringTable::parse(&mut package, &options.shared_strings)?;

    let sheet = select_sheet(&workbook, selector)?.clone();
    render_one(
        &mut package,
        &workbook,
        styles.as_ref(),
        &shared_strings,
        &sheet,
        options,
    )
}

/// Convert several worksheets (by name) from one package, sharing a single
/// workbook/styles/shared-strings parse. Results come back in request
/// order; any sheet failing fails the batch.
pub fn render_sheets<P: AsRef<Path>>(
    path: P,
    sheet_names: &[&str],
    options: &RenderOptions,
) -> Result<Vec<(String, Vec<u8>)>> {
    let mut package = OpcPackage::open(path, options.limits)?;
    let workbook = Workbook::open(&mut package)?;
    let styles = open_styles(&mut package)?;
    let shared_strings = SharedStringTable::parse(&mut package, &options.shared_strings)?;

    let mut results = Vec::with_capacity(sheet_names.len());
    for &name in sheet_names {
        let sheet = workbook
            .find_by_name(name)
            .ok_or_else(|| Error::UnknownSheet(name.to_string()))?
            .clone();

        let csv = render_one(
            &mut package,
            &workbook,
            styles.as_ref(),
            &shared_strings,
            &sheet,
            options,
        )?;
        results.push((sheet.name, csv));
    }

    Ok(results)
}

/// List every sheet in the workbook, in document order.
pub fn list_sheets<P: AsRef<Path>>(path: P) -> Result<Vec<SheetInfo>> {
    let mut package = OpcPackage::open(path, SecurityLimits::default())?;
    let workbook = Workbook::open(&mut package)?;
    Ok(workbook.sheets().to_vec())
}

/// List only the sheets not marked hidden.
pub fn visible_sheets<P: AsRef<Path>>(path: P) -> Result<Vec<SheetInfo>> {
    Ok(list_sheets(path)?
        .into_iter()
        .filter(|s| s.visible)
        .collect())
}

/// Stream one sheet through a collector and materialize the CSV.
fn render_one(
    package: &mut OpcPackage,
    workbook: &Workbook,
    styles: Option<&StyleRegistry>,
    shared_strings: &SharedStringTable,
    sheet: &SheetInfo,
    options: &RenderOptions,
) -> Result<Vec<u8>> {
    let mut collector = CsvRowCollector::new(
        Some(shared_strings),
        styles,
        workbook.date_system(),
        options.csv.clone(),
    );

    SheetStreamReader::parse_sheet(package, &sheet.target, &mut collector)?;

    if !collector.errors().is_empty() {
        return Err(Error::SheetErrors {
            sheet: sheet.name.clone(),
            messages: collector.errors().join("; "),
        });
    }

    Ok(collector.csv_bytes())
}

/// Absent styles.xml is tolerated (no date detection); anything else that
/// goes wrong with it is fatal.
fn open_styles(package: &mut OpcPackage) -> Result<Option<StyleRegistry>> {
    match StyleRegistry::parse(package) {
        Ok(styles) => Ok(Some(styles)),
        Err(XlsxError::MissingPart(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn select_sheet<'w>(workbook: &'w Workbook, selector: &SheetSelector) -> Result<&'w SheetInfo> {
    match selector {
        SheetSelector::First => workbook.find_by_index(0).ok_or(Error::SheetIndexOutOfRange {
            index: 0,
            count: 0,
        }),
        SheetSelector::Index(index) => {
            workbook
                .find_by_index(*index)
                .ok_or(Error::SheetIndexOutOfRange {
                    index: *index,
                    count: workbook.count(),
                })
        }
        SheetSelector::Name(name) => workbook
            .find_by_name(name)
            .ok_or_else(|| Error::UnknownSheet(name.clone())),
    }
}
