//! Synthetic labeled documents built from templates and realistic values.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::TrainingError;
use crate::pipeline::extraction::bio::{create_bio_labels, merge_labels, BioTag, OUTSIDE};

pub const FILLS_PER_TEMPLATE: usize = 50;
pub const DATE_VARIATIONS: usize = 30;
const DATE_SPREAD_DAYS: i64 = 30;
const DATE_VARIATION_FORMATS: &[&str] = &["%d.%m.%Y", "%d/%m/%Y", "%Y-%m-%d"];
const DATE_FIELDS: &[&str] = &["admission_date", "discharge_date"];

pub const INSPECTION_FILE: &str = "training_examples.txt";
const INSPECTION_COUNT: usize = 10;

/// Field → values seen in real documents, in fill order.
pub const REALISTIC_VALUES: &[(&str, &[&str])] = &[
    ("gender", &["מר", "גברת"]),
    ("age_at_admission", &["75", "82", "68", "91", "70", "88", "65", "73"]),
    (
        "admission_date",
        &["01.02.2025", "15.02.2025", "20.02.2025", "01/02/2025", "15/02/2025", "20/02/2025"],
    ),
    (
        "admission_source",
        &[
            "בי\"ח", "מיון", "מחלקה פנימית", "מחלקה אורתופדית", "מחלקה נוירולוגית",
            "פנימית א", "פנימית ב", "מחלקת שיקום",
        ],
    ),
    (
        "discharge_date",
        &["05.02.2025", "19.02.2025", "25.02.2025", "05/02/2025", "19/02/2025", "25/02/2025"],
    ),
    (
        "discharge_destination",
        &["ביתו", "מוסד סיעודי", "בית אבות", "דיור מוגן", "מחלקה סיעודית", "אשפוז המשך"],
    ),
    (
        "holocaust_survivor",
        &["ניצול שואה", "ניצולת שואה", "מוכר כניצול שואה", "ניצול שואה מוכר", "ניצולת שואה מוכרת"],
    ),
    (
        "living_arrangement",
        &[
            "בן זוג", "לבד", "בת זוג", "משפחה", "ילדים", "מטפל צמוד", "גר עם בן זוג",
            "גרה עם בת זוג", "גר עם המשפחה",
        ],
    ),
    ("floor_number", &["1", "2", "3", "4", "5", "6", "7"]),
    ("elevator", &["עם מעלית", "ללא מעלית", "יש מעלית", "אין מעלית"]),
    (
        "mobility",
        &[
            "עם הליכון", "עצמאי", "זקוק לעזרה", "עם מקל הליכה", "כיסא גלגלים",
            "הליכה עם תמיכה", "מרותק למיטה", "הליכה עצמאית", "זקוק לעזרה בהליכה",
            "עצמאי בהליכה", "הליכה עם הליכון", "ניידות עם הליכון",
        ],
    ),
    (
        "transfers",
        &[
            "זקוק לעזרה קלה", "עצמאי", "תלוי חלקית", "זקוק להשגחה", "זקוק לעזרה מלאה",
            "עצמאי עם השגחה", "זקוק לתמיכה", "עצמאי במעברים", "זקוק לעזרה במעברים",
        ],
    ),
    (
        "dressing",
        &[
            "עצמאי בפלג גוף עליון", "זקוק לעזרה", "עצמאי", "תלוי חלקית", "זקוק לעזרה מלאה",
            "עצמאי עם השגחה", "עצמאי בלבוש", "זקוק לעזרה בלבוש", "עצמאי בהלבשה",
        ],
    ),
    (
        "bathing",
        &[
            "זקוק להשגחה במקלחת", "עצמאי", "זקוק לעזרה", "תלוי חלקית", "זקוק לעזרה מלאה",
            "עצמאי עם השגחה", "עצמאי ברחצה", "זקוק לעזרה ברחצה", "עצמאי במקלחת",
        ],
    ),
    (
        "eating_status",
        &[
            "עצמאי", "זקוק לעזרה בחיתוך", "אוכל לבד", "זקוק להאכלה", "אכילה עם השגחה",
            "זקוק לעזרה חלקית", "עצמאי באכילה", "זקוק לעזרה באכילה", "אוכל באופן עצמאי",
        ],
    ),
    (
        "continence",
        &[
            "שליטה מלאה", "חלקית", "ללא שליטה", "שליטה יום", "שליטה לילה",
            "שליטה מלאה בסוגרים", "ללא שליטה בסוגרים",
        ],
    ),
    (
        "ecg",
        &[
            "קצב סינוס", "תקין", "פרפור פרוזדורים", "היפרטרופיה", "איסכמיה", "קצב סינוס תקין",
            "פרפור פרוזדורים עם קצב מהיר",
        ],
    ),
    (
        "mmse_score",
        &[
            "29/30", "28/30", "25/30", "30/30", "27/30", "24/30", "29", "28", "25", "30", "27",
            "24",
        ],
    ),
    (
        "fim_score",
        &[
            "5", "6", "4", "7", "3", "8", "60/126", "88/126", "90/126", "100/126", "4/7", "6/7",
            "3/7", "5/7", "7/7",
        ],
    ),
    (
        "diagnoses",
        &[
            "CVA", "שבר צוואר ירך", "מחלת ריאות חסימתית", "יתר לחץ דם", "סוכרת", "אי ספיקת לב",
            "פרקינסון", "דמנציה", "אוסטאופורוזיס", "CVA איסכמי", "אירוע מוחי איסכמי",
            "שבר בצוואר הירך", "מחלת לב איסכמית", "יתר לחץ דם", "סוכרת סוג 2",
        ],
    ),
    (
        "physical_examination",
        &[
            "תקין", "ללא ממצאים חריגים", "חולשה בגפה ימין", "חולשה בגפה שמאל",
            "ירידה בטווחי תנועה", "כאב בתנועה", "חולשה בגפיים תחתונות", "חולשה בפלג גוף ימין",
            "ירידה בטווחי התנועה בכתף",
        ],
    ),
];

/// Discharge letter, status update, social assessment, short status.
pub const TEMPLATES: &[&str] = &[
    "מכתב שחרור\n\
     תאריך: {discharge_date}\n\n\
     פרטי מטופל:\n\
     {gender} בן {age_at_admission}\n\n\
     תאריך קבלה: {admission_date}\n\
     התקבל מ{admission_source}\n\n\
     אבחנות עיקריות:\n\
     {diagnoses}\n\n\
     בדיקות בקבלה:\n\
     א.ק.ג: {ecg}\n\
     MMSE: {mmse_score}\n\
     FIM: {fim_score}\n\n\
     מצב בשחרור:\n\
     {mobility}\n\
     {transfers}\n\
     {eating_status}\n\n\
     שוחרר ל{discharge_destination}",
    "עדכון סטטוס רפואי\n\n\
     {gender} {age_at_admission}\n\
     {holocaust_survivor}\n\n\
     מצב תפקודי:\n\
     ניידות: {mobility}\n\
     מעברים: {transfers}\n\
     רחצה: {bathing}\n\
     הלבשה: {dressing}\n\
     אכילה: {eating_status}\n\
     שליטה על סוגרים: {continence}\n\n\
     בדיקה גופנית: {physical_examination}",
    "הערכה סוציאלית\n\n\
     {gender} בן {age_at_admission}\n\
     {holocaust_survivor}\n\n\
     מצב מגורים:\n\
     גר {living_arrangement}\n\
     קומה {floor_number}\n\
     {elevator}\n\n\
     תפקוד:\n\
     {mobility}\n\
     {eating_status}\n\
     {bathing}",
    "{gender} {age_at_admission}\n\
     {mobility}\n\
     {physical_examination}\n\
     FIM: {fim_score}",
];

/// A labeled document. `labels` runs parallel to `tokens`.
///
/// Deserialization goes through [`TrainingExample::new`], so a JSON example
/// with mismatched lengths is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawExample")]
pub struct TrainingExample {
    pub text: String,
    pub tokens: Vec<String>,
    pub labels: Vec<String>,
}

#[derive(Deserialize)]
struct RawExample {
    text: String,
    tokens: Vec<String>,
    labels: Vec<String>,
}

impl TryFrom<RawExample> for TrainingExample {
    type Error = TrainingError;

    fn try_from(raw: RawExample) -> Result<Self, Self::Error> {
        Self::new(raw.text, raw.tokens, raw.labels)
    }
}

impl TrainingExample {
    pub fn new(text: String, tokens: Vec<String>, labels: Vec<String>) -> Result<Self, TrainingError> {
        if tokens.len() != labels.len() {
            return Err(TrainingError::LabelMismatch {
                tokens: tokens.len(),
                labels: labels.len(),
            });
        }
        Ok(Self {
            text,
            tokens,
            labels,
        })
    }

    /// Tokenize `text` on whitespace and label each `(field, value)` pair;
    /// later pairs overwrite earlier ones where they overlap.
    pub fn labeled<'a, I>(text: String, values: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let tokens: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        let mut labels = vec![OUTSIDE.to_string(); tokens.len()];
        for (field, value) in values {
            labels = merge_labels(&labels, &create_bio_labels(&tokens, value, field));
        }
        Self {
            text,
            tokens,
            labels,
        }
    }
}

fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |text, (field, value)| {
        text.replace(&format!("{{{field}}}"), value)
    })
}

/// One random fill of `template`.
pub fn fill_example<R: Rng + ?Sized>(template: &str, rng: &mut R) -> TrainingExample {
    let values: Vec<(&str, &str)> = REALISTIC_VALUES
        .iter()
        .filter(|(field, _)| template.contains(&format!("{{{field}}}")))
        .filter_map(|(field, choices)| choices.choose(rng).map(|v| (*field, *v)))
        .collect();
    TrainingExample::labeled(fill_template(template, &values), values)
}

/// Short `תאריך <kind>: <date>` lines in each date format.
fn date_variations<R: Rng + ?Sized>(rng: &mut R, today: NaiveDate) -> Vec<TrainingExample> {
    let mut examples = Vec::new();
    for field in DATE_FIELDS {
        let kind = field.trim_end_matches("_date");
        for _ in 0..DATE_VARIATIONS {
            let date = today + Duration::days(rng.gen_range(-DATE_SPREAD_DAYS..=DATE_SPREAD_DAYS));
            for format in DATE_VARIATION_FORMATS {
                let date_str = date.format(format).to_string();
                let text = format!("תאריך {kind}: {date_str}");
                examples.push(TrainingExample::labeled(text, [(*field, date_str.as_str())]));
            }
        }
    }
    examples
}

/// Exactly `min_examples` examples, dates spread around today.
pub fn create_training_examples<R: Rng + ?Sized>(rng: &mut R, min_examples: usize) -> Vec<TrainingExample> {
    create_training_examples_at(rng, min_examples, chrono::Local::now().date_naive())
}

pub fn create_training_examples_at<R: Rng + ?Sized>(
    rng: &mut R,
    min_examples: usize,
    today: NaiveDate,
) -> Vec<TrainingExample> {
    let mut examples = Vec::new();
    for template in TEMPLATES {
        for _ in 0..FILLS_PER_TEMPLATE {
            examples.push(fill_example(template, rng));
        }
    }
    examples.extend(date_variations(rng, today));

    while examples.len() < min_examples {
        let needed = (min_examples - examples.len()).min(examples.len());
        let resampled: Vec<TrainingExample> =
            examples.choose_multiple(rng, needed).cloned().collect();
        examples.extend(resampled);
    }
    tracing::info!(generated = examples.len(), "Training examples generated");

    examples.truncate(min_examples);
    examples
}

/// Labeled-token count per field, most frequent first.
pub fn field_distribution(examples: &[TrainingExample]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for label in examples.iter().flat_map(|e| &e.labels) {
        if let Ok(tag) = label.parse::<BioTag>() {
            if let Some(entity) = tag.entity() {
                *counts.entry(entity.to_string()).or_insert(0) += 1;
            }
        }
    }
    let mut sorted: Vec<_> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LengthStats {
    pub mean: f32,
    pub min: usize,
    pub max: usize,
    pub count: usize,
}

fn entity_runs(example: &TrainingExample) -> Vec<(String, usize)> {
    let mut runs = Vec::new();
    let mut current: Option<(String, usize)> = None;
    for label in &example.labels {
        match label.parse::<BioTag>() {
            Ok(BioTag::Begin(entity)) => {
                runs.extend(current.take());
                current = Some((entity, 1));
            }
            Ok(BioTag::Inside(_)) => {
                if let Some((_, len)) = current.as_mut() {
                    *len += 1;
                }
            }
            _ => runs.extend(current.take()),
        }
    }
    runs.extend(current);
    runs
}

/// Tokens per labeled entity, by field.
pub fn entity_length_stats(examples: &[TrainingExample]) -> BTreeMap<String, LengthStats> {
    let mut lengths: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (field, len) in examples.iter().flat_map(entity_runs) {
        lengths.entry(field).or_default().push(len);
    }
    lengths
        .into_iter()
        .map(|(field, lens)| {
            let stats = LengthStats {
                mean: lens.iter().sum::<usize>() as f32 / lens.len() as f32,
                min: lens.iter().copied().min().unwrap_or(0),
                max: lens.iter().copied().max().unwrap_or(0),
                count: lens.len(),
            };
            (field, stats)
        })
        .collect()
}

/// Write the first examples and their labeled tokens for eyeballing.
pub fn save_inspection(examples: &[TrainingExample], dir: &Path) -> Result<PathBuf, TrainingError> {
    std::fs::create_dir_all(dir)?;
    let mut out = String::new();
    for (i, example) in examples.iter().take(INSPECTION_COUNT).enumerate() {
        let _ = writeln!(out, "\nExample {}:", i + 1);
        let _ = writeln!(out, "Text: {}", example.text);
        let _ = writeln!(out, "Entities:");
        for (token, label) in example.tokens.iter().zip(&example.labels) {
            if label != OUTSIDE {
                let _ = writeln!(out, "  {token}: {label}");
            }
        }
        let _ = writeln!(out, "{}", "-".repeat(80));
    }
    let path = dir.join(INSPECTION_FILE);
    std::fs::write(&path, out)?;
    tracing::info!(path = %path.display(), "Saved example inspection");
    Ok(path)
}
