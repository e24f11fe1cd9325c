// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// Traits are Rust's way of defining shared behaviour —
// similar to interfaces in Java or abstract classes in Python.
//
// By programming against traits instead of concrete types,
// we can swap implementations without changing the code
// that uses them. For example:
//   - JsonDataProvider implements DataProvider
//   - A future CocoProvider could also implement DataProvider
//   - The application layer only sees DataProvider
//     and works with both without any changes
//
// This is the Dependency Inversion Principle from SOLID,
// applied using Rust's trait system.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)
//            Rust Book §17 (Object Oriented Patterns)

use anyhow::Result;
use crate::domain::records::{ImageRecord, ImageSentencePair, SentenceRecord, Split, SplitCount};

// ─── DataProvider ─────────────────────────────────────────────────────────────
/// Any component that can serve dataset splits and sample training pairs.
///
/// Implementations:
///   - JsonDataProvider → loads a dataset.json from disk
///   - (future) CocoProvider → loads the COCO annotation format
pub trait DataProvider {
    /// All image records belonging to the given split.
    fn split_images(&self, split: Split) -> Vec<&ImageRecord>;

    /// Lazy iteration over every sentence record in the given split.
    fn iter_sentences(&self, split: Split) -> Box<dyn Iterator<Item = &SentenceRecord> + '_>;

    /// How many images or sentences the given split contains.
    fn split_size(&self, split: Split, of: SplitCount) -> usize;

    /// Sample one (image, sentence) pair uniformly from the training split.
    /// Errors if the training split is empty.
    fn sample_image_sentence_pair(&self) -> Result<ImageSentencePair>;
}
