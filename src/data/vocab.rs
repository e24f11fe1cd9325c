// ============================================================
// Layer 4 — Vocabulary Builder
// ============================================================
// Scans the training captions once and builds the finite word
// vocabulary the model is trained against:
//
//   1. Count token occurrences across all training sentences
//   2. Keep tokens occurring at least `word_count_threshold` times
//   3. Assign contiguous integer indices, index 0 reserved:
//        word_to_ix["#START#"] = 0   (start marker, input side)
//        ix_to_word[0]         = "." (end marker, output side)
//   4. Set the end-marker count to the number of sentences seen
//   5. Build the bias vector: log of normalized frequency per
//      index, shifted so the maximum entry is exactly 0 — this
//      keeps the values in a safe range when the model output
//      bias is later exponentiated by the softmax
//
// The assignment order of indices 1.. is whatever the counting
// HashMap yields. It is stable for the duration of a run, which
// is the only guarantee downstream code relies on.
//
// Tokens that did not survive the threshold are simply skipped
// when captions are mapped to index sequences — never an error.
//
// Reference: Rust Book §8 (HashMaps)

use ndarray::Array1;
use std::collections::HashMap;
use std::time::Instant;

use crate::domain::records::SentenceRecord;

/// Input-side marker mapped to index 0.
pub const START_TOKEN: &str = "#START#";

/// Output-side marker decoded from index 0.
pub const END_TOKEN: &str = ".";

/// Bidirectional token/index mapping plus the output-bias vector.
/// Built once per run from training data; immutable afterward.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    word_to_ix: HashMap<String, usize>,
    ix_to_word: HashMap<usize, String>,

    /// Occurrence count per index (end marker = sentence count)
    counts: Vec<usize>,

    /// log(count / total) per index, shifted so max is 0
    bias_init: Array1<f64>,
}

impl Vocabulary {
    /// Build the vocabulary from an iterator over sentence records.
    pub fn build<'a, I>(sentences: I, word_count_threshold: usize) -> Self
    where
        I: IntoIterator<Item = &'a SentenceRecord>,
    {
        tracing::info!(
            "Preprocessing word counts, vocab threshold = {}",
            word_count_threshold
        );
        let t0 = Instant::now();

        let mut word_counts: HashMap<String, usize> = HashMap::new();
        let mut nsents = 0usize;
        for sent in sentences {
            nsents += 1;
            for w in &sent.tokens {
                *word_counts.entry(w.clone()).or_insert(0) += 1;
            }
        }

        let kept: Vec<&String> = word_counts
            .iter()
            .filter(|(_, &c)| c >= word_count_threshold)
            .map(|(w, _)| w)
            .collect();

        tracing::info!(
            "Filtered words from {} to {} in {:.2?}",
            word_counts.len(),
            kept.len(),
            t0.elapsed()
        );

        let mut word_to_ix = HashMap::new();
        let mut ix_to_word = HashMap::new();
        ix_to_word.insert(0, END_TOKEN.to_string());
        word_to_ix.insert(START_TOKEN.to_string(), 0);
        for (ix, w) in kept.iter().enumerate() {
            word_to_ix.insert((*w).clone(), ix + 1);
            ix_to_word.insert(ix + 1, (*w).clone());
        }

        // The end marker terminates every sentence exactly once
        let mut word_counts = word_counts;
        word_counts.insert(END_TOKEN.to_string(), nsents);

        let size = ix_to_word.len();
        let counts: Vec<usize> = (0..size)
            .map(|i| word_counts[&ix_to_word[&i]])
            .collect();

        let total: f64 = counts.iter().sum::<usize>() as f64;
        let mut bias_init = Array1::from_iter(
            counts.iter().map(|&c| (c as f64 / total).ln()),
        );
        let max = bias_init.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        bias_init.mapv_inplace(|v| v - max);

        Self { word_to_ix, ix_to_word, counts, bias_init }
    }

    /// Number of indices, i.e. kept tokens + 1 for the marker.
    pub fn size(&self) -> usize {
        self.ix_to_word.len()
    }

    pub fn encode(&self, word: &str) -> Option<usize> {
        self.word_to_ix.get(word).copied()
    }

    pub fn decode(&self, ix: usize) -> Option<&String> {
        self.ix_to_word.get(&ix)
    }

    /// Occurrence count per index; the end marker carries the
    /// number of sentences the vocabulary was built from.
    pub fn index_counts(&self) -> &[usize] {
        &self.counts
    }

    /// The output-bias initialization vector, one entry per index.
    pub fn bias_init(&self) -> &Array1<f64> {
        &self.bias_init
    }

    /// Map caption tokens to the ground-truth index sequence:
    /// unmapped tokens are skipped silently, and the end-marker
    /// index is appended. Never shorter than one entry.
    pub fn ground_truth_indices(&self, tokens: &[String]) -> Vec<usize> {
        let mut gtix: Vec<usize> = tokens
            .iter()
            .filter_map(|w| self.encode(w))
            .collect();
        gtix.push(0);
        gtix
    }

    /// Both index maps, cloned for checkpoint persistence.
    pub fn maps(&self) -> (HashMap<String, usize>, HashMap<usize, String>) {
        (self.word_to_ix.clone(), self.ix_to_word.clone())
    }
}
