//! Marker annotation: wraps known diagnoses, section headers, treatments,
//! scores, statuses, dates and identifiers in bracketed markers so the
//! classifier sees a canonical token for each (`[SCORE] FIM_60/126 [/SCORE]`).
//!
//! Substitutions run in descending priority; equal priorities keep table order.

use std::sync::LazyLock;

use regex::Regex;

use super::normalize::{collapse_whitespace, strip_diacritics};

static OCR_QUOTES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"["“”״׳]"#).unwrap());
static PUNCT_SPACING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*([:.,\-])\s*").unwrap());
static OPEN_BRACKET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\[").unwrap());
static CLOSE_BRACKET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\]\s*").unwrap());

struct Marker {
    regex: Regex,
    replacement: &'static str,
    priority: u8,
}

fn marker(pattern: &str, replacement: &'static str, priority: u8) -> Marker {
    Marker {
        regex: Regex::new(pattern).unwrap(),
        replacement,
        priority,
    }
}

/// Applied before the entity markers (score items and spaced dates).
fn special_markers() -> Vec<Marker> {
    vec![
        marker(
            r"(\d+)\s*/\s*7(?:\s*,\s*)?(\d+)\s*/\s*7",
            "[SCORE]FIM_ITEM_${1}_${2}[/SCORE]",
            5,
        ),
        marker(r"(\d{1,2})\s*/\s*(\d{1,2})\s*/\s*(\d{4})", "${1}/${2}/${3}", 5),
    ]
}

fn entity_markers() -> Vec<Marker> {
    vec![
        // diagnoses
        marker(r"איסכמי", "[DIAG]ISCHEMIC[/DIAG]", 2),
        marker(r"המיספרה", "[DIAG]HEMISPHERE[/DIAG]", 2),
        marker(r"סוכרת", "[DIAG]DIABETES[/DIAG]", 2),
        marker(r"יתר לחץ דם", "[DIAG]HYPERTENSION[/DIAG]", 3),
        // section headers
        marker(r"אבחנות(?:\s*עיקריות)?\s*:", "[SECTION]DIAGNOSES[/SECTION]", 3),
        marker(r"טיפול תרופתי\s*:", "[SECTION]MEDICATIONS[/SECTION]", 3),
        marker(r"המלצות(?:\s*בשחרור)?\s*:", "[SECTION]RECOMMENDATIONS[/SECTION]", 3),
        marker(r"סיכום ותוכנית\s*:", "[SECTION]SUMMARY[/SECTION]", 3),
        // treatments
        marker(r"פיזיותרפיה", "[TREATMENT]PHYSIO[/TREATMENT]", 2),
        marker(r"שיקום", "[TREATMENT]REHAB[/TREATMENT]", 2),
        marker(r"ריפוי בעיסוק", "[TREATMENT]OCCUPATIONAL[/TREATMENT]", 2),
        // scores
        marker(
            r#"FIM(?:\s*סה"כ)?\s*:?\s*(\d+)(?:/126)?"#,
            "[SCORE]FIM_${1}/126[/SCORE]",
            4,
        ),
        marker(r"MMSE\s*:?\s*(\d+)(?:/30)?", "[SCORE]MMSE_${1}/30[/SCORE]", 4),
        // statuses
        marker(r"עצמאי", "[STATUS]INDEPENDENT[/STATUS]", 1),
        marker(r"חלקי", "[STATUS]PARTIAL[/STATUS]", 1),
        marker(r"תקין", "[STATUS]NORMAL[/STATUS]", 1),
        marker(r"לקוי", "[STATUS]IMPAIRED[/STATUS]", 1),
        // dated fields and identifiers
        marker(
            r"תאריך קבלה\s*:?\s*(\d{1,2}/\d{1,2}/\d{4})",
            "[DATE]ADMISSION_${1}[/DATE]",
            3,
        ),
        marker(
            r"תאריך שחרור\s*:?\s*(\d{1,2}/\d{1,2}/\d{4})",
            "[DATE]DISCHARGE_${1}[/DATE]",
            3,
        ),
        marker(
            r"תאריך לידה\s*:?\s*(\d{1,2}/\d{1,2}/\d{4})",
            "[DATE]BIRTH_${1}[/DATE]",
            3,
        ),
        marker(r"ת\s*\.?\s*ז\s*\.?\s*:?\s*(\d{9})", "[ID]${1}[/ID]", 3),
    ]
}

fn by_priority(mut markers: Vec<Marker>) -> Vec<Marker> {
    // stable sort keeps table order within a priority
    markers.sort_by(|a, b| b.priority.cmp(&a.priority));
    markers
}

pub struct MarkerAnnotator {
    special: Vec<Marker>,
    entity: Vec<Marker>,
}

impl Default for MarkerAnnotator {
    fn default() -> Self {
        Self {
            special: by_priority(special_markers()),
            entity: by_priority(entity_markers()),
        }
    }
}

impl MarkerAnnotator {
    pub fn annotate(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut text = basic_clean(text);
        for m in self.special.iter().chain(self.entity.iter()) {
            text = m.regex.replace_all(&text, m.replacement).into_owned();
        }
        final_clean(&text)
    }
}

fn basic_clean(text: &str) -> String {
    let text = strip_diacritics(text);
    let text = OCR_QUOTES.replace_all(&text, "\"");
    let text = PUNCT_SPACING.replace_all(&text, " $1 ");
    collapse_whitespace(&text)
}

fn final_clean(text: &str) -> String {
    let text = OPEN_BRACKET.replace_all(text, " [");
    let text = CLOSE_BRACKET.replace_all(&text, "] ");
    let text = collapse_whitespace(&text);
    let text = PUNCT_SPACING.replace_all(&text, "$1 ");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotate(text: &str) -> String {
        MarkerAnnotator::default().annotate(text)
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(annotate(""), "");
    }

    #[test]
    fn fim_total_score_marked() {
        assert_eq!(annotate("FIM: 60/126"), "[SCORE] FIM_60/126 [/SCORE]");
    }

    #[test]
    fn mmse_score_marked() {
        assert_eq!(annotate("MMSE 28/30"), "[SCORE] MMSE_28/30 [/SCORE]");
    }

    #[test]
    fn fim_item_pair_takes_precedence() {
        let out = annotate("4/7, 6/7");
        assert_eq!(out, "[SCORE] FIM_ITEM_4_6 [/SCORE]");
    }

    #[test]
    fn longer_diagnosis_wins_over_status() {
        let out = annotate("סוכרת ויתר לחץ דם");
        assert_eq!(
            out,
            "[DIAG] DIABETES [/DIAG] ו [DIAG] HYPERTENSION [/DIAG]"
        );
    }

    #[test]
    fn admission_date_marked_after_spacing() {
        let out = annotate("תאריך קבלה: 01 / 02 / 2025");
        assert_eq!(out, "[DATE] ADMISSION_01/02/2025 [/DATE]");
    }

    #[test]
    fn id_number_marked() {
        let out = annotate("ת.ז. 123456789");
        assert_eq!(out, "[ID] 123456789 [/ID]");
    }

    #[test]
    fn diacritics_removed_before_matching() {
        assert_eq!(annotate("תָּקִין"), "[STATUS] NORMAL [/STATUS]");
    }

    #[test]
    fn plain_text_only_respaced() {
        assert_eq!(annotate("מר כהן,   בן 80"), "מר כהן, בן 80");
    }
}
