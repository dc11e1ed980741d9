//! Field-specific validation and the fallback heuristics run for fields
//! neither the patterns nor the model produced.
//!
//! Every value that leaves the pipeline goes through [`validate_field_value`].

use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;

use super::dates::{extract_date, parse_date, OUTPUT_FORMAT};
use super::fuzzy::best_match;
use super::types::{DateKind, FieldMap, NOT_FOUND};

/// Plausible year range for clinical dates.
const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2100;

const FIM_TOTAL_MAX: u32 = 126;
const FIM_ITEM_MAX: u32 = 7;
const MMSE_MAX: u32 = 30;
const AGE_MAX: u32 = 120;

static FIM_ANYWHERE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"FIM[^0-9]*(\d+)(?:/126)?").unwrap());

const LIVING_ARRANGEMENTS: &[&str] = &["לבד", "בן זוג", "בת זוג", "משפחה"];

/// How a field's value is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Date,
    FimScore,
    MmseScore,
    /// Non-negative integer with an optional upper bound
    Count(Option<u32>),
    /// Nine-digit national ID
    PatientId,
    /// Enumerated when the catalogue lists options, free text otherwise
    Text,
}

pub fn field_kind(field: &str) -> FieldKind {
    match field {
        "date" | "admission_date" | "discharge_date" => FieldKind::Date,
        "fim_score" => FieldKind::FimScore,
        "mmse_score" => FieldKind::MmseScore,
        "age" | "age_at_admission" => FieldKind::Count(Some(AGE_MAX)),
        "floor_number" | "stairs_count" | "education_years" => FieldKind::Count(None),
        "patient_id" => FieldKind::PatientId,
        _ => FieldKind::Text,
    }
}

fn parse_number(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// A FIM total (`n` or `n/126`) or a FIM item (`n/7`).
pub fn is_valid_fim(text: &str) -> bool {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    match compact.split_once('/') {
        Some((num, total)) => match (parse_number(num), parse_number(total)) {
            (Some(n), Some(t)) => (t == FIM_ITEM_MAX || t == FIM_TOTAL_MAX) && n <= t,
            _ => false,
        },
        None => parse_number(&compact).is_some_and(|n| n <= FIM_TOTAL_MAX),
    }
}

pub fn is_valid_mmse(text: &str) -> bool {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let score = match compact.split_once('/') {
        Some((num, "30")) => num,
        Some(_) => return false,
        None => compact.as_str(),
    };
    parse_number(score).is_some_and(|n| n <= MMSE_MAX)
}

/// Well-formed calendar date inside the plausible year range.
pub fn is_valid_date(text: &str) -> bool {
    parse_date(text).is_ok_and(|d| (MIN_YEAR..=MAX_YEAR).contains(&d.year()))
}

fn is_valid_patient_id(text: &str) -> bool {
    let text = text.trim();
    text.len() == 9 && text.chars().all(|c| c.is_ascii_digit())
}

fn passes_kind(kind: FieldKind, text: &str) -> bool {
    match kind {
        FieldKind::Date => is_valid_date(text),
        FieldKind::FimScore => is_valid_fim(text),
        FieldKind::MmseScore => is_valid_mmse(text),
        FieldKind::Count(max) => {
            parse_number(text).is_some_and(|n| max.map_or(true, |m| n <= m))
        }
        FieldKind::PatientId => is_valid_patient_id(text),
        FieldKind::Text => text.trim().chars().count() >= 2,
    }
}

/// Accept or reject a raw entity occurrence.
pub fn validate_entity(text: &str, label: &str, confidence: f32, threshold: f32) -> bool {
    if confidence < threshold {
        return false;
    }
    if text.trim().is_empty() {
        return false;
    }
    passes_kind(field_kind(label), text)
}

/// Final gate for an emitted value. Returns the value to emit, or `None`
/// when it must be reported as not found.
///
/// Dates come back as `dd/mm/yyyy`. Text fields with options must be a
/// member; anything else is fuzzy-mapped onto the closest option.
pub fn validate_field_value(
    field: &str,
    value: &str,
    options: &[String],
    fuzzy_threshold: u8,
) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == NOT_FOUND {
        return None;
    }

    let kind = field_kind(field);
    if !passes_kind(kind, value) {
        return None;
    }

    match kind {
        FieldKind::Date => parse_date(value)
            .ok()
            .map(|d| d.format(OUTPUT_FORMAT).to_string()),
        FieldKind::FimScore | FieldKind::MmseScore => {
            Some(value.chars().filter(|c| !c.is_whitespace()).collect())
        }
        FieldKind::Count(_) | FieldKind::PatientId => Some(value.to_string()),
        FieldKind::Text if options.is_empty() => Some(value.to_string()),
        FieldKind::Text => {
            if options.iter().any(|o| o == value) {
                Some(value.to_string())
            } else {
                best_match(value, options, fuzzy_threshold).map(str::to_string)
            }
        }
    }
}

fn is_missing(fields: &FieldMap, field: &str) -> bool {
    fields.get(field).map_or(true, |v| v == NOT_FOUND)
}

/// Fill fields still missing from keyword heuristics over the whole text.
/// Returns the fields that were filled.
pub fn apply_fallbacks(fields: &mut FieldMap, text: &str) -> Vec<&'static str> {
    let mut filled = Vec::new();

    if is_missing(fields, "mobility") {
        let lowered = text.to_lowercase();
        let mobility = if lowered.contains("הליכון") {
            Some("עם הליכון")
        } else if lowered.contains("כסא גלגלים") {
            Some("כסא גלגלים")
        } else {
            None
        };
        if let Some(value) = mobility {
            fields.insert("mobility".into(), value.into());
            filled.push("mobility");
        }
    }

    if is_missing(fields, "fim_score") {
        if let Some(last) = FIM_ANYWHERE.captures_iter(text).last() {
            fields.insert("fim_score".into(), last[1].to_string());
            filled.push("fim_score");
        }
    }

    if is_missing(fields, "living_arrangement") {
        if let Some(arrangement) = LIVING_ARRANGEMENTS.iter().find(|a| text.contains(*a)) {
            fields.insert("living_arrangement".into(), arrangement.to_string());
            filled.push("living_arrangement");
        }
    }

    for kind in [DateKind::Admission, DateKind::Discharge] {
        if is_missing(fields, kind.field()) {
            if let Some(date) = extract_date(text, kind) {
                fields.insert(kind.field().into(), date);
                filled.push(kind.field());
            }
        }
    }

    filled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn fim_total_and_item_forms() {
        assert!(is_valid_fim("60/126"));
        assert!(is_valid_fim("6 / 7"));
        assert!(is_valid_fim("88"));
        assert!(!is_valid_fim("8/7"));
        assert!(!is_valid_fim("60/100"));
        assert!(!is_valid_fim("127"));
        assert!(!is_valid_fim("abc"));
    }

    #[test]
    fn mmse_range() {
        assert!(is_valid_mmse("29/30"));
        assert!(is_valid_mmse("0"));
        assert!(!is_valid_mmse("31"));
        assert!(!is_valid_mmse("20/40"));
    }

    #[test]
    fn date_year_range_enforced() {
        assert!(is_valid_date("01.02.2025"));
        assert!(!is_valid_date("01.02.1850"));
        assert!(!is_valid_date("30/02/2025"));
    }

    #[test]
    fn entity_below_threshold_rejected() {
        assert!(!validate_entity("עם הליכון", "mobility", 0.5, 0.7));
        assert!(validate_entity("עם הליכון", "mobility", 0.9, 0.7));
    }

    #[test]
    fn short_text_rejected_but_short_numbers_allowed() {
        assert!(!validate_entity("א", "mobility", 1.0, 0.7));
        assert!(validate_entity("5", "floor_number", 1.0, 0.7));
        assert!(validate_entity("7", "fim_score", 1.0, 0.7));
    }

    #[test]
    fn age_bounds() {
        assert!(validate_entity("75", "age_at_admission", 1.0, 0.7));
        assert!(!validate_entity("175", "age", 1.0, 0.7));
    }

    #[test]
    fn patient_id_requires_nine_digits() {
        assert_eq!(
            validate_field_value("patient_id", "123456789", &[], 60).as_deref(),
            Some("123456789")
        );
        assert_eq!(validate_field_value("patient_id", "12345", &[], 60), None);
    }

    #[test]
    fn dates_are_normalized_on_emission() {
        assert_eq!(
            validate_field_value("admission_date", "1.2.2025", &[], 60).as_deref(),
            Some("01/02/2025")
        );
    }

    #[test]
    fn not_found_is_never_validated() {
        assert_eq!(validate_field_value("mobility", NOT_FOUND, &[], 60), None);
    }

    #[test]
    fn categorical_member_kept() {
        let options = opts(&["עם מעלית", "ללא מעלית"]);
        assert_eq!(
            validate_field_value("elevator", "ללא מעלית", &options, 60).as_deref(),
            Some("ללא מעלית")
        );
    }

    #[test]
    fn categorical_non_member_mapped_or_dropped() {
        let options = opts(&["עם מעלית", "ללא מעלית"]);
        assert_eq!(
            validate_field_value("elevator", "מעלית ללא", &options, 60).as_deref(),
            Some("ללא מעלית")
        );
        assert_eq!(validate_field_value("elevator", "קומה שנייה", &options, 60), None);
    }

    #[test]
    fn numeric_fields_skip_membership() {
        let options = opts(&["60/126"]);
        assert_eq!(
            validate_field_value("fim_score", "88 / 126", &options, 60).as_deref(),
            Some("88/126")
        );
    }

    #[test]
    fn free_text_without_options_passes() {
        assert_eq!(
            validate_field_value("allergies", "פניצילין", &[], 60).as_deref(),
            Some("פניצילין")
        );
    }

    #[test]
    fn fallbacks_fill_missing_fields() {
        let mut fields = FieldMap::new();
        let text = "גר עם בן זוג. הולך עם הליכון. FIM בקבלה 60/126 FIM בשחרור 88/126. תאריך קבלה: 01/02/2025";
        let filled = apply_fallbacks(&mut fields, text);
        assert_eq!(fields["mobility"], "עם הליכון");
        assert_eq!(fields["fim_score"], "88");
        assert_eq!(fields["living_arrangement"], "בן זוג");
        assert_eq!(fields["admission_date"], "01/02/2025");
        // no discharge label, generic fallback picks the only date
        assert_eq!(fields["discharge_date"], "01/02/2025");
        assert!(filled.contains(&"mobility"));
    }

    #[test]
    fn fallbacks_do_not_overwrite_found_values() {
        let mut fields = FieldMap::new();
        fields.insert("mobility".into(), "עצמאי".into());
        fields.insert("fim_score".into(), NOT_FOUND.into());
        let filled = apply_fallbacks(&mut fields, "עם הליכון FIM: 70");
        assert_eq!(fields["mobility"], "עצמאי");
        assert_eq!(fields["fim_score"], "70");
        assert!(!filled.contains(&"mobility"));
    }

    #[test]
    fn wheelchair_fallback() {
        let mut fields = FieldMap::new();
        apply_fallbacks(&mut fields, "מתנייד בכסא גלגלים");
        assert_eq!(fields["mobility"], "כסא גלגלים");
    }
}
