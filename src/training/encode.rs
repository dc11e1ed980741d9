//! Subword encoding of training examples for transformer fine-tuning.
//!
//! Word labels are aligned onto subword positions and every feature row is
//! padded or truncated to the same length, so the JSONL export can be fed
//! straight into a token-classification trainer.

use std::io::{BufWriter, Write};
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::synth::TrainingExample;
use super::TrainingError;
use crate::catalogue::LabelMap;
use crate::pipeline::extraction::bio::align_labels;

pub const MAX_LENGTH: usize = 256;

/// Subword ids of one pre-split sentence, special tokens included.
#[derive(Debug, Clone, PartialEq)]
pub struct SubwordEncoding {
    pub ids: Vec<u32>,
    /// Source word per position, `None` for special tokens
    pub word_ids: Vec<Option<usize>>,
}

/// Subword tokenizer abstraction (allows mocking for tests)
pub trait SubwordTokenizer {
    fn encode_words(&self, words: &[String]) -> Result<SubwordEncoding, TrainingError>;

    fn pad_id(&self) -> u32 {
        0
    }
}

#[cfg(feature = "onnx")]
impl SubwordTokenizer for tokenizers::Tokenizer {
    fn encode_words(&self, words: &[String]) -> Result<SubwordEncoding, TrainingError> {
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        let encoding = self
            .encode(words, true)
            .map_err(|e| TrainingError::Tokenizer(e.to_string()))?;
        Ok(SubwordEncoding {
            ids: encoding.get_ids().to_vec(),
            word_ids: encoding
                .get_word_ids()
                .iter()
                .map(|w| w.map(|w| w as usize))
                .collect(),
        })
    }

    fn pad_id(&self) -> u32 {
        self.get_padding().map_or(0, |p| p.pad_id)
    }
}

/// One model-ready row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedFeature {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u8>,
    pub labels: Vec<i64>,
}

pub fn encode_example<T: SubwordTokenizer + ?Sized>(
    example: &TrainingExample,
    tokenizer: &T,
    label2id: &LabelMap,
    max_len: usize,
) -> Result<EncodedFeature, TrainingError> {
    let encoding = tokenizer.encode_words(&example.tokens)?;
    let labels = align_labels(&example.labels, &encoding.word_ids, label2id, max_len);

    let mut input_ids = encoding.ids;
    input_ids.truncate(max_len);
    let mut attention_mask = vec![1u8; input_ids.len()];
    input_ids.resize(max_len, tokenizer.pad_id());
    attention_mask.resize(max_len, 0);

    Ok(EncodedFeature {
        input_ids,
        attention_mask,
        labels,
    })
}

pub fn encode_dataset<T: SubwordTokenizer + ?Sized>(
    examples: &[TrainingExample],
    tokenizer: &T,
    label2id: &LabelMap,
    max_len: usize,
) -> Result<Vec<EncodedFeature>, TrainingError> {
    examples
        .iter()
        .map(|e| encode_example(e, tokenizer, label2id, max_len))
        .collect()
}

/// Shuffle and split off `ceil(len * test_size)` items for evaluation.
pub fn train_test_split<T, R: Rng + ?Sized>(
    mut items: Vec<T>,
    test_size: f32,
    rng: &mut R,
) -> (Vec<T>, Vec<T>) {
    items.shuffle(rng);
    let n_test = ((items.len() as f32) * test_size.clamp(0.0, 1.0)).ceil() as usize;
    let train = items.split_off(n_test.min(items.len()));
    (train, items)
}

/// One JSON object per line.
pub fn write_jsonl<S: Serialize>(rows: &[S], path: &Path) -> Result<(), TrainingError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(std::fs::File::create(path)?);
    for row in rows {
        serde_json::to_writer(&mut out, row)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::pipeline::extraction::bio::IGNORE_INDEX;

    /// `[CLS]` + one piece per two chars of each word + `[SEP]`.
    struct PairTokenizer;

    impl SubwordTokenizer for PairTokenizer {
        fn encode_words(&self, words: &[String]) -> Result<SubwordEncoding, TrainingError> {
            let mut ids = vec![101];
            let mut word_ids = vec![None];
            for (w, word) in words.iter().enumerate() {
                let pieces = word.chars().count().div_ceil(2);
                for _ in 0..pieces {
                    ids.push(1000 + w as u32);
                    word_ids.push(Some(w));
                }
            }
            ids.push(102);
            word_ids.push(None);
            Ok(SubwordEncoding { ids, word_ids })
        }
    }

    fn label_map() -> LabelMap {
        let id2label: BTreeMap<u32, String> = [(0, "O"), (1, "B-mobility"), (2, "I-mobility")]
            .into_iter()
            .map(|(i, l)| (i, l.to_string()))
            .collect();
        LabelMap::from_id2label(id2label)
    }

    fn example() -> TrainingExample {
        TrainingExample::labeled("הולך עם הליכון".into(), [("mobility", "עם הליכון")])
    }

    #[test]
    fn features_are_padded_and_aligned() {
        let feature = encode_example(&example(), &PairTokenizer, &label_map(), 12).unwrap();
        assert_eq!(feature.input_ids.len(), 12);
        assert_eq!(feature.attention_mask.len(), 12);
        assert_eq!(feature.labels.len(), 12);
        // [CLS] הו לך עם הל יכ ון [SEP]
        assert_eq!(&feature.attention_mask[..8], &[1; 8]);
        assert_eq!(feature.attention_mask[8], 0);
        assert_eq!(
            &feature.labels[..8],
            &[IGNORE_INDEX, 0, 0, 1, 2, 2, 2, IGNORE_INDEX]
        );
        assert_eq!(feature.input_ids[8], 0);
    }

    #[test]
    fn long_examples_truncate() {
        let feature = encode_example(&example(), &PairTokenizer, &label_map(), 4).unwrap();
        assert_eq!(feature.input_ids, vec![101, 1000, 1000, 1001]);
        assert_eq!(feature.attention_mask, vec![1, 1, 1, 1]);
        assert_eq!(feature.labels.len(), 4);
    }

    #[test]
    fn split_sizes() {
        let mut rng = StdRng::seed_from_u64(9);
        let (train, test) = train_test_split((0..10).collect::<Vec<_>>(), 0.2, &mut rng);
        assert_eq!((train.len(), test.len()), (8, 2));
        let (train, test) = train_test_split((0..3).collect::<Vec<_>>(), 0.2, &mut rng);
        assert_eq!((train.len(), test.len()), (2, 1));
        let (train, test) = train_test_split(Vec::<u8>::new(), 0.2, &mut rng);
        assert!(train.is_empty() && test.is_empty());
    }

    #[test]
    fn jsonl_one_row_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("final").join("train.jsonl");
        let features =
            encode_dataset(&[example(), example()], &PairTokenizer, &label_map(), MAX_LENGTH).unwrap();
        write_jsonl(&features, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<EncodedFeature> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].input_ids.len(), MAX_LENGTH);
    }
}
