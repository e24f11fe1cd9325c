// ============================================================
// Layer 3 — Dataset Record Types
// ============================================================
// Plain data structs describing the captioning dataset.
// An ImageRecord carries a precomputed CNN feature vector and
// one or more tokenized caption sentences. A training batch is
// an ephemeral list of (image, sentence) pairs sampled from the
// training split.
//
// Using #[derive(Debug, Clone, Serialize, Deserialize)] gives us:
//   - Debug: lets us print the struct with {:?}
//   - Clone: lets us make copies of the struct
//   - Serialize/Deserialize: lets us load the dataset JSON
//
// Reference: Rust Book §5 (Structs and Methods)
//            Karpathy & Fei-Fei (2015) Deep Visual-Semantic Alignments

use serde::{Deserialize, Serialize};

/// Which dataset split a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val   => "val",
            Split::Test  => "test",
        }
    }
}

/// What a split size is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitCount {
    Images,
    Sentences,
}

/// One tokenized caption sentence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceRecord {
    /// Sentence id, unique within the dataset
    pub sentid: usize,

    /// The caption, already split into word tokens
    pub tokens: Vec<String>,
}

/// One image with its precomputed feature vector and captions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Image id, unique within the dataset
    pub imgid: usize,

    /// Source image filename — kept for traceability
    pub filename: String,

    /// Which split this image belongs to: "train" / "val" / "test"
    pub split: String,

    /// Precomputed CNN feature vector for this image
    pub feature: Vec<f64>,

    /// All caption sentences annotated for this image
    pub sentences: Vec<SentenceRecord>,
}

/// One (image, sentence) training pair.
/// Ephemeral — batches of these are regenerated every iteration.
#[derive(Debug, Clone)]
pub struct ImageSentencePair {
    /// Id of the image this pair was sampled from
    pub imgid: usize,

    /// The image feature vector
    pub feature: Vec<f64>,

    /// The caption tokens for this pair
    pub tokens: Vec<String>,
}

impl ImageSentencePair {
    pub fn new(image: &ImageRecord, sentence: &SentenceRecord) -> Self {
        Self {
            imgid:   image.imgid,
            feature: image.feature.clone(),
            tokens:  sentence.tokens.clone(),
        }
    }
}
