use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;

use super::types::DateKind;

/// Accepted input layouts, tried in order.
const INPUT_FORMATS: &[&str] = &["%d/%m/%Y", "%d.%m.%Y", "%Y/%m/%d", "%Y.%m.%d", "%Y-%m-%d"];

/// Canonical output layout.
pub const OUTPUT_FORMAT: &str = "%d/%m/%Y";

#[derive(Error, Debug, PartialEq)]
#[error("Invalid date format: {0}")]
pub struct DateError(pub String);

static ADMISSION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"תאריך\s*קבלה:?\s*(\d{1,2}[./]\d{1,2}[./]\d{4})",
        r"התקבל\s*ב:?\s*(\d{1,2}[./]\d{1,2}[./]\d{4})",
        r"קבלה:?\s*(\d{1,2}[./]\d{1,2}[./]\d{4})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static DISCHARGE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"תאריך\s*שחרור:?\s*(\d{1,2}[./]\d{1,2}[./]\d{4})",
        r"שוחרר\s*ב:?\s*(\d{1,2}[./]\d{1,2}[./]\d{4})",
        r"שחרור:?\s*(\d{1,2}[./]\d{1,2}[./]\d{4})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static ANY_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2}[./]\d{1,2}[./]\d{4})").unwrap());

pub fn parse_date(date_str: &str) -> Result<NaiveDate, DateError> {
    let trimmed = date_str.trim();
    INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| DateError(date_str.to_string()))
}

/// Normalize any accepted layout to `dd/mm/yyyy`.
pub fn normalize_date(date_str: &str) -> Result<String, DateError> {
    parse_date(date_str).map(|d| d.format(OUTPUT_FORMAT).to_string())
}

/// Find the admission or discharge date of a document.
///
/// Kind-specific labels are tried first; matches that do not parse are
/// skipped. Otherwise the first date-looking token in the text is used.
pub fn extract_date(text: &str, kind: DateKind) -> Option<String> {
    let patterns = match kind {
        DateKind::Admission => &*ADMISSION_PATTERNS,
        DateKind::Discharge => &*DISCHARGE_PATTERNS,
    };

    for pattern in patterns {
        if let Some(caps) = pattern.captures(text) {
            if let Ok(date) = normalize_date(&caps[1]) {
                return Some(date);
            }
        }
    }

    ANY_DATE
        .captures(text)
        .and_then(|caps| normalize_date(&caps[1]).ok())
}
