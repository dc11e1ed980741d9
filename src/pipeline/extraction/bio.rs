//! BIO tagging: labeling training tokens, decoding predicted spans and
//! aligning word labels onto subword tokens.

use std::fmt;
use std::str::FromStr;

use crate::catalogue::LabelMap;
use crate::pipeline::classifier::TokenPrediction;

pub const OUTSIDE: &str = "O";

/// Label id ignored by the training loss.
pub const IGNORE_INDEX: i64 = -100;

const SPECIAL_TOKENS: &[&str] = &["[CLS]", "[SEP]", "[PAD]", "[UNK]", "<s>", "</s>", "<pad>"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BioTag {
    Outside,
    Begin(String),
    Inside(String),
}

impl BioTag {
    pub fn entity(&self) -> Option<&str> {
        match self {
            BioTag::Outside => None,
            BioTag::Begin(e) | BioTag::Inside(e) => Some(e),
        }
    }
}

impl FromStr for BioTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == OUTSIDE {
            return Ok(BioTag::Outside);
        }
        match s.split_once('-') {
            Some(("B", e)) if !e.is_empty() => Ok(BioTag::Begin(e.to_string())),
            Some(("I", e)) if !e.is_empty() => Ok(BioTag::Inside(e.to_string())),
            _ => Err(format!("not a BIO label: '{s}'")),
        }
    }
}

impl fmt::Display for BioTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BioTag::Outside => f.write_str(OUTSIDE),
            BioTag::Begin(e) => write!(f, "B-{e}"),
            BioTag::Inside(e) => write!(f, "I-{e}"),
        }
    }
}

/// One-letter Hebrew prefixes that fuse onto the following word.
const PROCLITICS: &[char] = &['ב', 'ל', 'מ', 'ו', 'ה', 'ש', 'כ'];

/// `token` is `word`, or `word` behind one or two proclitic letters.
fn matches_with_prefix(token: &str, word: &str) -> bool {
    if token == word {
        return true;
    }
    let Some(prefix) = token.strip_suffix(word) else {
        return false;
    };
    let count = prefix.chars().count();
    (1..=2).contains(&count) && prefix.chars().all(|c| PROCLITICS.contains(&c))
}

/// Label every occurrence of `value`'s tokens inside `tokens` as `field`.
///
/// Matching is case-insensitive and aligned on token boundaries, except
/// that the first token may carry a proclitic prefix (`מבי"ח`, `לביתו`).
pub fn create_bio_labels(tokens: &[String], value: &str, field: &str) -> Vec<String> {
    let mut labels = vec![OUTSIDE.to_string(); tokens.len()];
    let needle: Vec<String> = value.split_whitespace().map(str::to_lowercase).collect();
    if needle.is_empty() || needle.len() > tokens.len() {
        return labels;
    }
    let hay: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();

    for start in 0..=hay.len() - needle.len() {
        let window = &hay[start..start + needle.len()];
        if matches_with_prefix(&window[0], &needle[0]) && window[1..] == needle[1..] {
            labels[start] = BioTag::Begin(field.to_string()).to_string();
            for label in &mut labels[start + 1..start + needle.len()] {
                *label = BioTag::Inside(field.to_string()).to_string();
            }
        }
    }
    labels
}

/// Overlay the non-`O` labels of `overlay` onto `base`.
pub fn merge_labels(base: &[String], overlay: &[String]) -> Vec<String> {
    base.iter()
        .enumerate()
        .map(|(i, b)| match overlay.get(i) {
            Some(o) if o != OUTSIDE => o.clone(),
            _ => b.clone(),
        })
        .collect()
}

/// A contiguous run of predicted tokens for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictedSpan {
    pub label: String,
    /// Byte range in the classified text
    pub start: usize,
    pub end: usize,
    /// Mean token score
    pub score: f32,
}

struct OpenSpan {
    label: String,
    start: usize,
    end: usize,
    scores: Vec<f32>,
}

impl OpenSpan {
    fn new(label: &str, p: &TokenPrediction) -> Self {
        Self {
            label: label.to_string(),
            start: p.start,
            end: p.end,
            scores: vec![p.score],
        }
    }

    fn extend(&mut self, p: &TokenPrediction) {
        self.end = self.end.max(p.end);
        self.scores.push(p.score);
    }

    fn close(self) -> PredictedSpan {
        let score = self.scores.iter().sum::<f32>() / self.scores.len() as f32;
        PredictedSpan {
            label: self.label,
            start: self.start,
            end: self.end,
            score,
        }
    }
}

/// Group token predictions into field spans.
///
/// `I-x` only continues an open `x` span and is ignored otherwise.
pub fn decode_spans(predictions: &[TokenPrediction]) -> Vec<PredictedSpan> {
    let mut spans = Vec::new();
    let mut open: Option<OpenSpan> = None;

    for p in predictions {
        if SPECIAL_TOKENS.contains(&p.token.as_str()) {
            continue;
        }
        if p.is_continuation {
            if let Some(span) = open.as_mut() {
                span.extend(p);
                continue;
            }
        }
        match p.label.parse::<BioTag>() {
            Ok(BioTag::Begin(entity)) => {
                if let Some(span) = open.take() {
                    spans.push(span.close());
                }
                open = Some(OpenSpan::new(&entity, p));
            }
            Ok(BioTag::Inside(entity)) => {
                if let Some(span) = open.as_mut().filter(|s| s.label == entity) {
                    span.extend(p);
                }
            }
            Ok(BioTag::Outside) => {
                if let Some(span) = open.take() {
                    spans.push(span.close());
                }
            }
            Err(e) => tracing::debug!(error = %e, "Skipping unparseable prediction label"),
        }
    }
    if let Some(span) = open {
        spans.push(span.close());
    }
    spans
}

/// Map word-level labels onto subword positions.
///
/// `word_ids[i]` is the word the i-th subword belongs to, `None` for special
/// tokens. The result has exactly `max_len` entries.
pub fn align_labels(
    word_labels: &[String],
    word_ids: &[Option<usize>],
    label2id: &LabelMap,
    max_len: usize,
) -> Vec<i64> {
    let mut aligned = Vec::with_capacity(max_len);
    let mut prev_word = None;

    for word_id in word_ids.iter().take(max_len) {
        let id = match (*word_id, word_id.and_then(|w| word_labels.get(w))) {
            (Some(w), Some(label)) => {
                if prev_word == Some(w) {
                    let inside = match label.parse::<BioTag>() {
                        Ok(BioTag::Begin(e)) => BioTag::Inside(e).to_string(),
                        _ => label.clone(),
                    };
                    label2id.id(&inside) as i64
                } else {
                    label2id.id(label) as i64
                }
            }
            _ => IGNORE_INDEX,
        };
        prev_word = *word_id;
        aligned.push(id);
    }
    aligned.resize(max_len, IGNORE_INDEX);
    aligned
}
