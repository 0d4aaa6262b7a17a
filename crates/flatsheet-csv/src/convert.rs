//! Cell-to-string conversion
//!
//! Turns a typed cell plus its style index into the text that lands in a
//! CSV field. Shared strings resolve through the table here, not in the
//! parser; numeric cells whose style classifies as date/time render as
//! ISO-8601 via Excel serial-date arithmetic.

use chrono::{Duration, NaiveDate};

use flatsheet_core::{CellData, CellType, CellValue};
use flatsheet_xlsx::{DateSystem, SharedStringTable, StyleRegistry};

use crate::options::DateMode;

/// Days from 1899-12-31 (serial 1 = 1900-01-01) to 1970-01-01.
const UNIX_EPOCH_OFFSET_DAYS: i64 = 25_568;

/// Days from 1899-12-31 to 1904-01-01, the Date1904 epoch.
const DATE1904_OFFSET_DAYS: f64 = 1461.0;

/// Serial for 9999-12-31; anything later is not a representable date.
const MAX_DAY_SERIAL: i64 = 2_958_465;

/// Renders cells as CSV field text.
pub struct CellConverter<'a> {
    shared_strings: Option<&'a SharedStringTable>,
    styles: Option<&'a StyleRegistry>,
    date_system: DateSystem,
    date_mode: DateMode,
}

impl<'a> CellConverter<'a> {
    pub fn new(
        shared_strings: Option<&'a SharedStringTable>,
        styles: Option<&'a StyleRegistry>,
        date_system: DateSystem,
        date_mode: DateMode,
    ) -> Self {
        Self {
            shared_strings,
            styles,
            date_system,
            date_mode,
        }
    }

    /// Convert one cell to its presentable text.
    pub fn convert(&self, cell: &CellData) -> String {
        if cell.value.is_empty() {
            return String::new();
        }

        match cell.cell_type {
            CellType::Boolean => {
                if cell.value.as_bool().unwrap_or(false) {
                    "TRUE".into()
                } else {
                    "FALSE".into()
                }
            }
            CellType::Error => {
                let text = cell.value.as_str().unwrap_or("");
                if text.is_empty() {
                    "#N/A".into()
                } else {
                    text.into()
                }
            }
            CellType::InlineString | CellType::String => {
                cell.value.as_str().unwrap_or("").to_string()
            }
            CellType::SharedString => match cell.value {
                CellValue::SharedIndex(index) => self
                    .shared_strings
                    .and_then(|table| table.try_get(index))
                    .unwrap_or_default(),
                // Already resolved to text
                _ => cell.value.as_str().unwrap_or("").to_string(),
            },
            CellType::Number => self.convert_number(cell),
            CellType::Unknown => match &cell.value {
                CellValue::Text(s) => s.clone(),
                CellValue::Number(n) => format_number(*n),
                _ => String::new(),
            },
        }
    }

    fn convert_number(&self, cell: &CellData) -> String {
        let value = cell.value.as_number().unwrap_or(0.0);

        let is_date = self.date_mode == DateMode::Iso
            && self
                .styles
                .map(|s| s.is_datetime_style(cell.style_index))
                .unwrap_or(false);

        if is_date {
            format_serial_date(value, self.date_system)
        } else {
            format_number(value)
        }
    }
}

/// Render a plain number.
///
/// Integer-valued doubles inside ±10^15 print without a fraction; the rest
/// print in fixed notation with six fractional digits, trailing zeros
/// stripped.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "#NUM!".into();
    }
    if value.is_infinite() {
        return if value > 0.0 {
            "#DIV/0!".into()
        } else {
            "-#DIV/0!".into()
        };
    }

    if value == value.floor() && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }

    let mut text = format!("{:.6}", value);
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    text
}

/// Render an Excel date/time serial as ISO-8601.
///
/// The serial's integer part counts days from the workbook epoch and the
/// fractional part is the time of day. In the 1900 system serials at or
/// past 60 are one too large because Excel believes in 1900-02-29.
pub fn format_serial_date(serial: f64, date_system: DateSystem) -> String {
    let mut adjusted = serial;
    if date_system == DateSystem::Date1904 {
        adjusted += DATE1904_OFFSET_DAYS;
    }

    if adjusted <= 0.0 {
        return "1900-01-01".into();
    }

    if date_system == DateSystem::Date1900 && serial >= 60.0 {
        adjusted -= 1.0;
    }

    let day_serial = adjusted.floor() as i64;
    if day_serial > MAX_DAY_SERIAL {
        return format_number(serial);
    }
    let frac = adjusted - adjusted.floor();

    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("fixed date");
    let date = match epoch.checked_add_signed(Duration::days(day_serial - UNIX_EPOCH_OFFSET_DAYS))
    {
        Some(d) => d,
        None => return format_number(serial),
    };

    let day_hours = frac * 24.0;
    let hours = day_hours.floor();
    let day_minutes = (day_hours - hours) * 60.0;
    let minutes = day_minutes.floor();
    let seconds = ((day_minutes - minutes) * 60.0).floor();

    let is_date_only = frac < 0.001;
    let is_time_only = frac > 0.999;

    if is_date_only {
        date.format("%Y-%m-%d").to_string()
    } else if is_time_only {
        format!(
            "{:02}:{:02}:{:02}",
            hours as u32, minutes as u32, seconds as u32
        )
    } else {
        format!(
            "{}T{:02}:{:02}:{:02}",
            date.format("%Y-%m-%d"),
            hours as u32,
            minutes as u32,
            seconds as u32
        )
    }
}
