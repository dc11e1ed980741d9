//! Text normalization applied before pattern and model extraction.

use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Export artifacts left by the PDF-to-text step.
static EXPORT_METADATA: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:discharge-letter|sample_form)\.pdf,\d+,",
        r"file:///.*?\.html",
        r"\d+/\d+/\d+,\s+\d+:\d+\s+[AP]M",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Anything outside Hebrew, word characters, whitespace and `:./,-`.
static DISALLOWED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\x{0590}-\x{05FF}\w\s:./,\-]").unwrap());

static HEBREW_POINTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{0591}-\x{05C7}]").unwrap());

static DIRECTION_MARKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{200E}\x{200F}]").unwrap());

static QUOTE_MARKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[«»"“”״׳]"#).unwrap());

/// Flatten a document to a single line with single spaces.
pub fn normalize_text(text: &str) -> String {
    collapse_whitespace(&text.replace('\n', " "))
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Strip export metadata, quotes and stray symbols, keeping Hebrew,
/// digits and the punctuation the field patterns depend on.
pub fn clean_document(text: &str) -> String {
    let mut cleaned = text.to_string();
    for pattern in EXPORT_METADATA.iter() {
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }
    cleaned = cleaned.replace('"', "");
    cleaned = DISALLOWED_CHARS.replace_all(&cleaned, " ").into_owned();
    collapse_whitespace(&cleaned)
}

/// Remove Hebrew vowel points and cantillation marks.
pub fn strip_diacritics(text: &str) -> String {
    HEBREW_POINTS.replace_all(text, "").into_owned()
}

/// Clean a span of model output before matching it against options.
pub fn clean_entity_text(text: &str) -> String {
    let text = DIRECTION_MARKS.replace_all(text, "");
    let text = QUOTE_MARKS.replace_all(&text, "");
    collapse_whitespace(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_flattens_lines() {
        let raw = "  מכתב שחרור\n\nתאריך:   05/02/2025 \n";
        assert_eq!(normalize_text(raw), "מכתב שחרור תאריך: 05/02/2025");
    }

    #[test]
    fn normalize_empty_is_empty() {
        assert_eq!(normalize_text(" \n\t "), "");
    }

    #[test]
    fn clean_strips_export_prefix_and_links() {
        let raw = "discharge-letter.pdf,3,מר בן 75 file:///tmp/out/page.html FIM: 60/126";
        assert_eq!(clean_document(raw), "מר בן 75 FIM: 60/126");
    }

    #[test]
    fn clean_strips_print_timestamps() {
        let raw = "2/5/2025, 10:42 AM תאריך קבלה: 01/02/2025";
        assert_eq!(clean_document(raw), "תאריך קבלה: 01/02/2025");
    }

    #[test]
    fn clean_removes_quotes_and_symbols() {
        let raw = r#"בי"ח (מיון) * FIM: 88/126!"#;
        assert_eq!(clean_document(raw), "ביח מיון FIM: 88/126");
    }

    #[test]
    fn clean_keeps_dates_and_punctuation() {
        let raw = "שחרור: 05.02.2025, מצב-כללי";
        assert_eq!(clean_document(raw), "שחרור: 05.02.2025, מצב-כללי");
    }

    #[test]
    fn diacritics_removed() {
        assert_eq!(strip_diacritics("שָׁלוֹם"), "שלום");
    }

    #[test]
    fn entity_text_drops_marks_and_quotes() {
        let raw = "\u{200f}«עם   הליכון»\u{200e}";
        assert_eq!(clean_entity_text(raw), "עם הליכון");
    }

    #[test]
    fn entity_text_drops_gershayim() {
        assert_eq!(clean_entity_text("בי״ח"), "ביח");
    }
}
