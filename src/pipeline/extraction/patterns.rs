//! Fixed table of labeled regular expressions over normalized text.
//!
//! Capture group 1 holds the value; patterns without a group (presence
//! flags such as `holocaust_survivor`) emit the whole match.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::dates::normalize_date;
use super::types::{ExtractedEntity, FieldMap, Provenance};
use super::validators::{field_kind, validate_entity, FieldKind};

pub struct FieldPattern {
    pub field: &'static str,
    pub regex: Regex,
}

fn pattern(field: &'static str, re: &str) -> FieldPattern {
    FieldPattern {
        field,
        regex: Regex::new(re).unwrap(),
    }
}

pub static FIELD_PATTERNS: LazyLock<Vec<FieldPattern>> = LazyLock::new(|| {
    vec![
        pattern("patient_id", r"(?:ת\.?ז\.?:?\s*|מספר\s*תיק\s*רפואי:?\s*)(\d{9})"),
        pattern("name", r"(?:שם:?\s*|ת/המטופל:?\s*)([א-ת\s]+)"),
        pattern("admission_date", r"תאריך\s*קבלה:?\s*(\d{2}[./]\d{1,2}[./]\d{4})"),
        pattern("discharge_date", r"תאריך\s*שחרור:?\s*(\d{2}[./]\d{1,2}[./]\d{4})"),
        pattern("gender", r"(?:מגדר:?\s*)?\b(מר|גברת|זכר|נקבה)\b"),
        pattern("age_at_admission", r"(?:גיל:?\s*(?:בן|בת)?\s*|בן\s*)(\d+)"),
        pattern("holocaust_survivor", r"(?:ניצול|ניצולת)\s*שואה|מוכר\s*כניצול\s*שואה"),
        pattern("floor_number", r"קומה:?\s*(\d+)"),
        pattern("elevator", r"(?:עם|ללא)\s*מעלית"),
        pattern("mmse_score", r"MMSE:?\s*(\d+)/30"),
        pattern("fim_score", r#"FIM\s*(?:סה"כ|בקבלה|בשחרור)?:?\s*(\d+)/126"#),
        pattern(
            "admission_reason",
            r"(?:סיבת\s*(?:קבלה|אשפוז|הפניה)|התקבל\s*עקב):?\s*([^\.]+)",
        ),
        pattern("admission_source", r"(?:התקבל|הגיע)\s*מ:?\s*([^\.]+)"),
        pattern("allergies", r"אלרגיות:?\s*([^\.]+)"),
        pattern("tests", r"(?:בדיקות|בדיקה):?\s*([^\.]+)"),
        pattern("rehabilitation_type", r"סוג\s*שיקום:?\s*([^\.]+)"),
        pattern(
            "past_procedures",
            r"(?:פרוצדורות|טיפולים)\s*(?:בעבר|קודמים):?\s*([^\.]+)",
        ),
        pattern(
            "residence_type",
            r"(?:סוג\s*(?:מגורים|דיור)|מקום\s*מגורים):?\s*([^\.]+)",
        ),
        pattern("stairs_count", r"מדרגות:?\s*(\d+)"),
        pattern("general_appearance", r"מראה\s*כללי:?\s*([^\.]+)"),
        pattern("assistive_devices", r"(?:אביזרי|עזרי)\s*עזר:?\s*([^\.]+)"),
        pattern("pressure_ulcer", r"פצעי\s*לחץ:?\s*([^\.]+)"),
        pattern("pain_level", r"(?:רמת|עוצמת)\s*כאב:?\s*([^\.]+)"),
        pattern("sleep_issues", r"בעיות\s*שינה:?\s*([^\.]+)"),
        pattern("constipation", r"עצירות:?\s*([^\.]+)"),
        pattern("handedness", r"(?:דומיננטיות|יד\s*דומיננטית):?\s*([^\.]+)"),
        pattern("education_years", r"(?:שנות\s*לימוד|השכלה):?\s*(\d+)\s*(?:שנים)?"),
        pattern("covid_vaccine", r"חיסון\s*קורונה:?\s*([^\.]+)"),
        pattern("previous_functioning", r"תפקוד\s*קודם:?\s*([^\.]+)"),
        pattern(
            "outdoor_mobility",
            r"ניידות\s*(?:בחוץ|מחוץ\s*לבית):?\s*([^\.]+)",
        ),
        pattern("aid_law", r"(?:חוק\s*סיעוד|גמלת\s*סיעוד):?\s*([^\.]+)"),
        pattern("cognitive_assessment", r"הערכה\s*קוגניטיבית:?\s*([^\.]+)"),
        pattern("consciousness", r"(?:הכרה|מצב\s*הכרה):?\s*([^\.]+)"),
        pattern("sensation", r"תחושה:?\s*([^\.]+)"),
        pattern("gross_strength", r"כוח\s*גס:?\s*([^\.]+)"),
        pattern("ecg", r"(?:א\.?ק\.?ג|EKG|ECG):?\s*([^\.]+)"),
        pattern(
            "nursing_care_claim",
            r"(?:תביעת\s*סיעוד|תביעה\s*לגמלת\s*סיעוד):?\s*([^\.]+)",
        ),
        pattern("mood", r"מצב\s*רוח:?\s*([^\.]+)"),
        pattern("appetite", r"תיאבון:?\s*([^\.]+)"),
        pattern("anxiety", r"חרדה:?\s*([^\.]+)"),
        pattern("hospitalization_extension", r"הארכת\s*אשפוז:?\s*([^\.]+)"),
    ]
});

/// Value-bearing part of a match with its byte range.
fn value_span<'t>(caps: &Captures<'t>) -> Option<regex::Match<'t>> {
    caps.get(1).or_else(|| caps.get(0))
}

/// Normalized value for a raw match, `None` when a date does not parse.
fn normalize_value(field: &str, raw: &str) -> Option<String> {
    let raw = raw.trim();
    match field_kind(field) {
        FieldKind::Date => normalize_date(raw).ok(),
        _ => Some(raw.to_string()),
    }
}

/// First match of every pattern, keyed by field.
pub fn match_patterns(text: &str) -> FieldMap {
    let mut found = FieldMap::new();
    for fp in FIELD_PATTERNS.iter() {
        let Some(caps) = fp.regex.captures(text) else {
            continue;
        };
        let Some(m) = value_span(&caps) else {
            continue;
        };
        match normalize_value(fp.field, m.as_str()) {
            Some(value) => {
                found.insert(fp.field.to_string(), value);
            }
            None => {
                tracing::debug!(field = fp.field, raw = m.as_str(), "Dropped unparseable date");
            }
        }
    }
    found
}

/// Every match of every pattern, validated, as pattern-provenance entities.
pub fn extract_pattern_entities(text: &str, threshold: f32) -> Vec<ExtractedEntity> {
    let mut entities = Vec::new();
    for fp in FIELD_PATTERNS.iter() {
        for caps in fp.regex.captures_iter(text) {
            let Some(m) = value_span(&caps) else {
                continue;
            };
            let raw = m.as_str().trim();
            if !validate_entity(raw, fp.field, 1.0, threshold) {
                continue;
            }
            let Some(value) = normalize_value(fp.field, raw) else {
                continue;
            };
            entities.push(
                ExtractedEntity::new(fp.field, raw, value, Provenance::Pattern, 1.0)
                    .with_span(m.start(), m.end()),
            );
        }
    }
    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_compiles_and_fields_are_unique() {
        let mut fields: Vec<_> = FIELD_PATTERNS.iter().map(|p| p.field).collect();
        let total = fields.len();
        fields.sort_unstable();
        fields.dedup();
        assert_eq!(fields.len(), total);
    }

    #[test]
    fn identifiers_and_dates() {
        let text = "ת.ז. 123456789 תאריך קבלה: 01.02.2025 תאריך שחרור: 15/02/2025";
        let found = match_patterns(text);
        assert_eq!(found["patient_id"], "123456789");
        assert_eq!(found["admission_date"], "01/02/2025");
        assert_eq!(found["discharge_date"], "15/02/2025");
    }

    #[test]
    fn unparseable_date_is_dropped() {
        let found = match_patterns("תאריך קבלה: 45/02/2025");
        assert!(!found.contains_key("admission_date"));
    }

    #[test]
    fn scores_require_their_totals() {
        let found = match_patterns("MMSE: 28/30 FIM בקבלה: 60/126");
        assert_eq!(found["mmse_score"], "28");
        assert_eq!(found["fim_score"], "60");
        let found = match_patterns("MMSE: 28");
        assert!(!found.contains_key("mmse_score"));
    }

    #[test]
    fn presence_flags_emit_whole_match() {
        let found = match_patterns("מוכר כניצול שואה, גר בקומה 2 עם מעלית");
        assert_eq!(found["holocaust_survivor"], "מוכר כניצול שואה");
        assert_eq!(found["elevator"], "עם מעלית");
    }

    #[test]
    fn gender_needs_word_boundary() {
        let found = match_patterns("אמר שהוא בסדר");
        assert!(!found.contains_key("gender"));
        let found = match_patterns("מר כהן בן 82");
        assert_eq!(found["gender"], "מר");
        assert_eq!(found["age_at_admission"], "82");
    }

    #[test]
    fn free_text_stops_at_period() {
        let found = match_patterns("אלרגיות: פניצילין, אספירין. מצב רוח: תקין.");
        assert_eq!(found["allergies"], "פניצילין, אספירין");
        assert_eq!(found["mood"], "תקין");
    }

    #[test]
    fn ecg_abbreviation_variants() {
        assert_eq!(match_patterns("אקג: קצב סינוס.")["ecg"], "קצב סינוס");
        assert_eq!(match_patterns("ECG: תקין.")["ecg"], "תקין");
    }

    #[test]
    fn entities_carry_spans_and_full_confidence() {
        let text = "קומה: 3";
        let entities = extract_pattern_entities(text, 0.7);
        let floor = entities.iter().find(|e| e.label == "floor_number").unwrap();
        assert_eq!(floor.value, "3");
        assert_eq!(floor.confidence, 1.0);
        assert_eq!(floor.provenance, Provenance::Pattern);
        assert_eq!(&text[floor.start.unwrap()..floor.end.unwrap()], "3");
    }

    #[test]
    fn entities_include_every_occurrence() {
        let text = "FIM בקבלה: 60/126. FIM בשחרור: 88/126.";
        let fims: Vec<_> = extract_pattern_entities(text, 0.7)
            .into_iter()
            .filter(|e| e.label == "fim_score")
            .map(|e| e.value)
            .collect();
        assert_eq!(fims, vec!["60", "88"]);
    }

    #[test]
    fn invalid_occurrences_are_filtered() {
        let entities = extract_pattern_entities("בן 150", 0.7);
        assert!(entities.iter().all(|e| e.label != "age_at_admission"));
    }
}
