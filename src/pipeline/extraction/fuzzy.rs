//! Fuzzy mapping of free text onto a field's enumerated options.
//!
//! `token_sort_ratio` lowercases both sides, splits on anything that is not
//! alphanumeric, sorts the tokens and compares the rejoined strings with a
//! normalized indel similarity (`2·LCS / total length`, scaled to 0..=100).

use super::types::NOT_FOUND;

fn process(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Longest common subsequence length over chars.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

pub fn ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let score = 200.0 * lcs_len(&a, &b) as f64 / total as f64;
    score.round() as u8
}

pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    ratio(&process(a), &process(b))
}

/// Best option scoring strictly above `threshold`, earliest on ties.
pub fn best_match<'a>(text: &str, options: &'a [String], threshold: u8) -> Option<&'a str> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let mut best: Option<(&str, u8)> = None;
    for opt in options {
        let score = token_sort_ratio(text, opt);
        if score > threshold && best.map_or(true, |(_, s)| score > s) {
            best = Some((opt.as_str(), score));
        }
    }
    best.map(|(opt, _)| opt)
}

/// Same as [`best_match`], rendered as the emitted string.
pub fn fuzzy_find_match(text: &str, options: &[String], threshold: u8) -> String {
    best_match(text, options, threshold)
        .map(str::to_string)
        .unwrap_or_else(|| NOT_FOUND.to_string())
}
