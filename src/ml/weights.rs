// ============================================================
// Layer 5 — Per-Word Loss Weight Table
// ============================================================
// The training objective does not treat every caption word the
// same: each ground-truth position carries a scalar weight that
// scales its contribution to the loss. Weights emphasise rare,
// content-bearing words over frequent filler ("a", "the", ...).
//
// weight(imgid, ix) = ln(total_tokens / count(ix)), normalized
// so the mean weight over the vocabulary is 1.0. The table holds
// an entry for every (image id, token index) pair that actually
// occurs in that image's training captions, plus the end marker.
//
// Lookups never fail: an unknown pair falls back to a neutral
// weight of 1.0, so an unweighted run and a run over unseen
// pairs behave identically.

use ndarray::Array1;
use std::collections::HashMap;

use crate::data::vocab::Vocabulary;
use crate::domain::records::ImageRecord;

/// Scalar loss weight per (image id, vocabulary index).
#[derive(Debug, Clone)]
pub struct WordWeightTable {
    weights: HashMap<(usize, usize), f64>,
}

impl WordWeightTable {
    /// A table with no entries — every lookup yields 1.0.
    pub fn neutral() -> Self {
        Self { weights: HashMap::new() }
    }

    /// Compute rarity weights from the training split.
    pub fn compute(vocab: &Vocabulary, train_images: &[&ImageRecord]) -> Self {
        let counts = vocab.index_counts();
        let total: f64 = counts.iter().sum::<usize>() as f64;

        // global inverse-log-frequency per index
        let raw: Vec<f64> = counts
            .iter()
            .map(|&c| if c > 0 { (total / c as f64).ln() } else { 0.0 })
            .collect();
        let mean = raw.iter().sum::<f64>() / raw.len().max(1) as f64;
        let scale = if mean > 0.0 { 1.0 / mean } else { 1.0 };

        let mut weights = HashMap::new();
        for img in train_images {
            // the end marker terminates every caption of this image
            weights.insert((img.imgid, 0), raw[0] * scale);
            for sent in &img.sentences {
                for tok in &sent.tokens {
                    if let Some(ix) = vocab.encode(tok) {
                        weights.insert((img.imgid, ix), raw[ix] * scale);
                    }
                }
            }
        }

        tracing::info!("Word weight table ready: {} entries", weights.len());
        Self { weights }
    }

    /// One weight per ground-truth position, fallback 1.0.
    pub fn lookup(&self, imgid: usize, gtix: &[usize]) -> Array1<f64> {
        Array1::from_iter(
            gtix.iter()
                .map(|&ix| self.weights.get(&(imgid, ix)).copied().unwrap_or(1.0)),
        )
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}
