//! Style registry (`xl/styles.xml`)
//!
//! The only style information that changes CSV output is the number format:
//! a numeric cell whose format classifies as date/time is rendered as a
//! date instead of a number. Fonts, fills and borders are parsed for
//! completeness but influence nothing.
//!
//! Each `<xf>` in `<cellXfs>` contributes one entry to a precomputed
//! date/time mask, so `is_datetime_style` is a plain indexed load on the
//! hot path.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{XlsxError, XlsxResult};
use crate::package::OpcPackage;

const STYLES_PATH: &str = "xl/styles.xml";

/// Custom number formats start at this id by convention.
pub const CUSTOM_FORMAT_BASE: u32 = 164;

/// Coarse classification of a number-format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberFormatCategory {
    General,
    Integer,
    Decimal,
    Percentage,
    Currency,
    Scientific,
    Fraction,
    Date,
    Time,
    DateTime,
    Text,
    Custom,
}

impl NumberFormatCategory {
    /// Whether values with this format render as dates/times.
    pub fn is_datetime(self) -> bool {
        matches!(self, Self::Date | Self::Time | Self::DateTime)
    }
}

/// One number format: id, code, and its classification.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberFormat {
    pub format_id: u32,
    pub format_code: String,
    pub category: NumberFormatCategory,
    pub is_built_in: bool,
}

impl NumberFormat {
    fn general(format_id: u32) -> Self {
        Self {
            format_id,
            format_code: "General".into(),
            category: NumberFormatCategory::General,
            is_built_in: true,
        }
    }
}

/// Font description from `<fonts>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FontInfo {
    pub name: String,
    pub size: f64,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub color: String,
}

/// Fill description from `<fills>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillInfo {
    pub pattern_type: String,
}

/// Border description from `<borders>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BorderInfo {
    pub left: String,
    pub right: String,
    pub top: String,
    pub bottom: String,
    pub diagonal: String,
}

/// One resolved `<cellXfs>/<xf>` record.
#[derive(Debug, Clone, PartialEq)]
pub struct CellStyle {
    pub style_index: u32,
    pub number_format: NumberFormat,
    pub font: FontInfo,
    pub fill: FillInfo,
    pub border: BorderInfo,
}

/// Parsed styles part with the precomputed date/time mask.
pub struct StyleRegistry {
    custom_formats: HashMap<u32, NumberFormat>,
    fonts: Vec<FontInfo>,
    fills: Vec<FillInfo>,
    borders: Vec<BorderInfo>,
    cell_styles: Vec<CellStyle>,
    datetime_mask: Vec<bool>,
}

/// Which container element of styles.xml the parser is inside.
#[derive(PartialEq)]
enum Section {
    None,
    NumFmts,
    Fonts,
    Fills,
    Borders,
    CellXfs,
}

impl StyleRegistry {
    /// Parse `xl/styles.xml`; its absence is a [`XlsxError::MissingPart`].
    pub fn parse(package: &mut OpcPackage) -> XlsxResult<Self> {
        if !package.zip().has_entry(STYLES_PATH) {
            return Err(XlsxError::MissingPart(STYLES_PATH.into()));
        }

        let xml = package.zip_mut().read_entry(STYLES_PATH)?;
        Self::from_xml(&xml)
    }

    /// Parse a styles part from raw XML bytes.
    pub fn from_xml(xml: &[u8]) -> XlsxResult<Self> {
        let mut registry = Self {
            custom_formats: HashMap::new(),
            fonts: Vec::new(),
            fills: Vec::new(),
            borders: Vec::new(),
            cell_styles: Vec::new(),
            datetime_mask: Vec::new(),
        };

        let mut reader = Reader::from_reader(xml);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut section = Section::None;
        let mut in_font = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => match e.name().as_ref() {
                    b"numFmts" => section = Section::NumFmts,
                    b"fonts" => section = Section::Fonts,
                    b"fills" => section = Section::Fills,
                    b"borders" => section = Section::Borders,
                    b"cellXfs" => section = Section::CellXfs,
                    b"numFmt" if section == Section::NumFmts => registry.add_custom_format(&e),
                    b"font" if section == Section::Fonts => {
                        registry.fonts.push(FontInfo::default());
                        in_font = true;
                    }
                    b"fill" if section == Section::Fills => {
                        registry.fills.push(FillInfo::default());
                    }
                    b"patternFill" if section == Section::Fills => {
                        registry.set_fill_pattern(&e);
                    }
                    b"border" if section == Section::Borders => {
                        registry.borders.push(BorderInfo::default());
                    }
                    b"left" | b"right" | b"top" | b"bottom" | b"diagonal"
                        if section == Section::Borders =>
                    {
                        registry.set_border_edge(&e);
                    }
                    b"xf" if section == Section::CellXfs => registry.add_cell_xf(&e),
                    _ if in_font => registry.apply_font_child(&e),
                    _ => {}
                },
                Event::Empty(e) => match e.name().as_ref() {
                    b"numFmt" if section == Section::NumFmts => registry.add_custom_format(&e),
                    b"font" if section == Section::Fonts => {
                        registry.fonts.push(FontInfo::default());
                    }
                    b"patternFill" if section == Section::Fills => {
                        registry.set_fill_pattern(&e);
                    }
                    b"left" | b"right" | b"top" | b"bottom" | b"diagonal"
                        if section == Section::Borders =>
                    {
                        registry.set_border_edge(&e);
                    }
                    b"xf" if section == Section::CellXfs => registry.add_cell_xf(&e),
                    _ if in_font => registry.apply_font_child(&e),
                    _ => {}
                },
                Event::End(e) => match e.name().as_ref() {
                    b"numFmts" | b"fonts" | b"fills" | b"borders" | b"cellXfs" => {
                        section = Section::None;
                        in_font = false;
                    }
                    b"font" => in_font = false,
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(registry)
    }

    /// The style record for a `<c s="...">` index.
    pub fn cell_style(&self, style_index: u32) -> Option<&CellStyle> {
        self.cell_styles.get(style_index as usize)
    }

    /// Resolve a format id against the custom map, then the built-in table.
    pub fn number_format(&self, format_id: u32) -> Option<NumberFormat> {
        self.custom_formats
            .get(&format_id)
            .cloned()
            .or_else(|| builtin_number_format(format_id))
    }

    /// O(1) date/time test for a style index.
    pub fn is_datetime_style(&self, style_index: u32) -> bool {
        self.datetime_mask
            .get(style_index as usize)
            .copied()
            .unwrap_or(false)
    }

    /// Number of `<cellXfs>` records.
    pub fn style_count(&self) -> usize {
        self.cell_styles.len()
    }

    /// Number of custom number formats.
    pub fn custom_format_count(&self) -> usize {
        self.custom_formats.len()
    }

    fn add_custom_format(&mut self, e: &quick_xml::events::BytesStart) {
        let mut format_id = None;
        let mut format_code = None;

        for attr in e.attributes().flatten() {
            match attr.key.as_ref() {
                b"numFmtId" => {
                    format_id = attr
                        .unescape_value()
                        .ok()
                        .and_then(|s| s.parse::<u32>().ok());
                }
                b"formatCode" => {
                    format_code = attr.unescape_value().ok().map(|s| s.to_string());
                }
                _ => {}
            }
        }

        if let (Some(format_id), Some(format_code)) = (format_id, format_code) {
            let category = classify(&format_code);
            self.custom_formats.insert(
                format_id,
                NumberFormat {
                    format_id,
                    format_code,
                    category,
                    is_built_in: false,
                },
            );
        }
    }

    fn apply_font_child(&mut self, e: &quick_xml::events::BytesStart) {
        let Some(font) = self.fonts.last_mut() else {
            return;
        };

        match e.name().as_ref() {
            b"name" => {
                if let Some(val) = attr_value(e, b"val") {
                    font.name = val;
                }
            }
            b"sz" => {
                if let Some(val) = attr_value(e, b"val") {
                    font.size = val.parse().unwrap_or(0.0);
                }
            }
            b"b" => font.bold = true,
            b"i" => font.italic = true,
            b"u" => font.underline = true,
            b"color" => {
                if let Some(rgb) = attr_value(e, b"rgb") {
                    font.color = rgb;
                }
            }
            _ => {}
        }
    }

    fn set_fill_pattern(&mut self, e: &quick_xml::events::BytesStart) {
        if let Some(fill) = self.fills.last_mut() {
            if let Some(pattern) = attr_value(e, b"patternType") {
                fill.pattern_type = pattern;
            }
        }
    }

    fn set_border_edge(&mut self, e: &quick_xml::events::BytesStart) {
        let style = attr_value(e, b"style").unwrap_or_else(|| "none".into());
        if let Some(border) = self.borders.last_mut() {
            match e.name().as_ref() {
                b"left" => border.left = style,
                b"right" => border.right = style,
                b"top" => border.top = style,
                b"bottom" => border.bottom = style,
                b"diagonal" => border.diagonal = style,
                _ => {}
            }
        }
    }

    fn add_cell_xf(&mut self, e: &quick_xml::events::BytesStart) {
        let mut num_fmt_id = 0u32;
        let mut font_id = None;
        let mut fill_id = None;
        let mut border_id = None;

        for attr in e.attributes().flatten() {
            let value = match attr.unescape_value() {
                Ok(v) => v,
                Err(_) => continue,
            };
            match attr.key.as_ref() {
                b"numFmtId" => num_fmt_id = value.parse().unwrap_or(0),
                b"fontId" => font_id = value.parse::<usize>().ok(),
                b"fillId" => fill_id = value.parse::<usize>().ok(),
                b"borderId" => border_id = value.parse::<usize>().ok(),
                _ => {}
            }
        }

        let number_format = self
            .number_format(num_fmt_id)
            .unwrap_or_else(|| NumberFormat::general(num_fmt_id));

        let style = CellStyle {
            style_index: self.cell_styles.len() as u32,
            font: font_id
                .and_then(|id| self.fonts.get(id))
                .cloned()
                .unwrap_or_default(),
            fill: fill_id
                .and_then(|id| self.fills.get(id))
                .cloned()
                .unwrap_or_default(),
            border: border_id
                .and_then(|id| self.borders.get(id))
                .cloned()
                .unwrap_or_default(),
            number_format,
        };

        self.datetime_mask
            .push(style.number_format.category.is_datetime());
        self.cell_styles.push(style);
    }
}

fn attr_value(e: &quick_xml::events::BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok())
        .map(|s| s.to_string())
}

/// Classify a number-format code.
///
/// Date detection: `y`/`Y`, `d`, or `M` outside the literal `AM/PM`.
/// Time detection: `h`/`H`/`s`/`S` (a lone `m` is a month unless hours or
/// seconds appear alongside it). Everything else falls through a chain of
/// marker characters.
pub fn classify(format_code: &str) -> NumberFormatCategory {
    if format_code.is_empty() || format_code == "General" {
        return NumberFormatCategory::General;
    }

    let has_date = format_code.contains(['y', 'Y', 'd'])
        || (format_code.contains('M') && !format_code.contains("AM/PM"));
    let has_time = format_code.contains(['h', 'H', 's', 'S']);

    match (has_date, has_time) {
        (true, true) => return NumberFormatCategory::DateTime,
        (true, false) => return NumberFormatCategory::Date,
        (false, true) => return NumberFormatCategory::Time,
        (false, false) => {}
    }

    if format_code.contains('%') {
        NumberFormatCategory::Percentage
    } else if format_code.contains('$') || format_code.contains('\u{a4}') {
        NumberFormatCategory::Currency
    } else if has_scientific_marker(format_code) {
        NumberFormatCategory::Scientific
    } else if format_code.contains('/') {
        NumberFormatCategory::Fraction
    } else if format_code.contains('@') {
        NumberFormatCategory::Text
    } else if format_code.contains('.') {
        NumberFormatCategory::Decimal
    } else if format_code.contains(['0', '#']) {
        NumberFormatCategory::Integer
    } else {
        NumberFormatCategory::Custom
    }
}

/// `e+` / `e-` / `E+` / `E-` anywhere in the code.
fn has_scientific_marker(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.windows(2).any(|w| {
        (w[0] == b'e' || w[0] == b'E') && (w[1] == b'+' || w[1] == b'-')
    })
}

/// The fixed table of built-in number formats (ids 0-49).
pub fn builtin_number_format(format_id: u32) -> Option<NumberFormat> {
    use NumberFormatCategory::*;

    let (code, category) = match format_id {
        0 => ("General", General),
        1 => ("0", Integer),
        2 => ("0.00", Decimal),
        3 => ("#,##0", Integer),
        4 => ("#,##0.00", Decimal),
        9 => ("0%", Percentage),
        10 => ("0.00%", Percentage),
        11 => ("0.00E+00", Scientific),
        12 => ("# ?/?", Fraction),
        13 => ("# ??/??", Fraction),
        14 => ("mm-dd-yy", Date),
        15 => ("d-mmm-yy", Date),
        16 => ("d-mmm", Date),
        17 => ("mmm-yy", Date),
        18 => ("h:mm AM/PM", Time),
        19 => ("h:mm:ss AM/PM", Time),
        20 => ("h:mm", Time),
        21 => ("h:mm:ss", Time),
        22 => ("m/d/yy h:mm", DateTime),
        37 => ("#,##0 ;(#,##0)", Currency),
        38 => ("#,##0 ;[Red](#,##0)", Currency),
        39 => ("#,##0.00;(#,##0.00)", Currency),
        40 => ("#,##0.00;[Red](#,##0.00)", Currency),
        45 => ("mm:ss", Time),
        46 => ("[h]:mm:ss", Time),
        47 => ("mmss.0", Time),
        49 => ("@", Text),
        _ => return None,
    };

    Some(NumberFormat {
        format_id,
        format_code: code.into(),
        category,
        is_built_in: true,
    })
}
