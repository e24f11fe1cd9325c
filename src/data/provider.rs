// ============================================================
// Layer 4 — JSON Data Provider
// ============================================================
// Loads a captioning dataset from disk and implements the
// DataProvider trait from Layer 3.
//
// Expected file layout:
//   <data_root>/<dataset>/dataset.json
//
// The JSON document contains one "images" array. Every image
// record carries its split name, a precomputed feature vector
// and its annotated caption sentences (already tokenized).
//
// Sampling: training batches are drawn uniformly over all
// (image, sentence) pairs of the train split. The pair index
// is precomputed once at load time so sampling is O(1).
//
// A missing dataset file or malformed JSON is a fatal error —
// there is nothing sensible to train on without data.
//
// Reference: Rust Book §9 (Error Handling)
//            rand crate documentation

use anyhow::{Context, Result};
use rand::Rng;
use serde::Deserialize;
use std::{fs, path::PathBuf};

use crate::domain::records::{ImageRecord, ImageSentencePair, SentenceRecord, Split, SplitCount};
use crate::domain::traits::DataProvider;

/// Top-level shape of dataset.json
#[derive(Debug, Deserialize)]
struct DatasetFile {
    images: Vec<ImageRecord>,
}

/// Serves dataset splits loaded from a single JSON file.
pub struct JsonDataProvider {
    /// All image records of the dataset, every split
    images: Vec<ImageRecord>,

    /// (image index, sentence index) for every train-split pair,
    /// precomputed for uniform O(1) sampling
    train_pairs: Vec<(usize, usize)>,
}

impl JsonDataProvider {
    /// Load `<data_root>/<dataset>/dataset.json` from disk.
    pub fn load(data_root: &str, dataset: &str) -> Result<Self> {
        let path: PathBuf = [data_root, dataset, "dataset.json"].iter().collect();

        tracing::info!("Loading dataset from '{}'", path.display());

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read dataset file '{}'", path.display()))?;

        let file: DatasetFile = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed dataset JSON in '{}'", path.display()))?;

        Ok(Self::from_images(file.images))
    }

    /// Build a provider directly from in-memory records.
    /// Used by tests and by any caller that constructs data on the fly.
    pub fn from_images(images: Vec<ImageRecord>) -> Self {
        let mut train_pairs = Vec::new();
        for (i, img) in images.iter().enumerate() {
            if img.split == Split::Train.as_str() {
                for s in 0..img.sentences.len() {
                    train_pairs.push((i, s));
                }
            }
        }

        tracing::info!(
            "Dataset ready: {} images, {} train pairs",
            images.len(),
            train_pairs.len()
        );

        Self { images, train_pairs }
    }
}

impl DataProvider for JsonDataProvider {
    fn split_images(&self, split: Split) -> Vec<&ImageRecord> {
        self.images
            .iter()
            .filter(|img| img.split == split.as_str())
            .collect()
    }

    fn iter_sentences(&self, split: Split) -> Box<dyn Iterator<Item = &SentenceRecord> + '_> {
        Box::new(
            self.images
                .iter()
                .filter(move |img| img.split == split.as_str())
                .flat_map(|img| img.sentences.iter()),
        )
    }

    fn split_size(&self, split: Split, of: SplitCount) -> usize {
        match of {
            SplitCount::Images    => self.split_images(split).len(),
            SplitCount::Sentences => self.iter_sentences(split).count(),
        }
    }

    fn sample_image_sentence_pair(&self) -> Result<ImageSentencePair> {
        if self.train_pairs.is_empty() {
            anyhow::bail!("Training split is empty — cannot sample a pair");
        }

        let mut rng = rand::thread_rng();
        let (i, s) = self.train_pairs[rng.gen_range(0..self.train_pairs.len())];
        let image  = &self.images[i];
        Ok(ImageSentencePair::new(image, &image.sentences[s]))
    }
}
