use std::sync::LazyLock;

use regex::Regex;

use super::types::SectionMap;

/// Section name → header pattern capturing the body up to the next known header.
static SECTION_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        (
            "personal_info",
            r"(?s)פרטי[ם\s]*(?:מטופל|אישיים):(.*?)(?:אבחנות|סיבת|מקור|$)",
        ),
        ("admission_info", r"(?s)מקור\s*הפניה:(.*?)(?:מצב|$)"),
        ("physical_exam", r"(?s)בדיקה\s*גופנית:(.*?)(?:אבחנות|$)"),
        ("diagnoses", r"(?s)אבחנות[^:]*:(.*?)(?:הערכת|סיכום|המלצות|$)"),
        ("fim_assessment", r"(?s)הערכת\s*FIM:(.*?)(?:סיכום|המלצות|$)"),
        ("discharge_summary", r"(?s)סיכום[^:]*:(.*?)(?:המלצות|$)"),
        ("recommendations", r"(?s)המלצות[^:]*:(.*?)(?:חתימה|$)"),
    ]
    .into_iter()
    .map(|(name, p)| (name, Regex::new(p).unwrap()))
    .collect()
});

/// Extract named free-text sections. Empty bodies are omitted.
pub fn extract_sections(text: &str) -> SectionMap {
    let mut sections = SectionMap::new();
    for (name, regex) in SECTION_PATTERNS.iter() {
        if let Some(caps) = regex.captures(text) {
            let body = caps[1].trim();
            if !body.is_empty() {
                sections.insert(name.to_string(), body.to_string());
            }
        }
    }
    sections
}
