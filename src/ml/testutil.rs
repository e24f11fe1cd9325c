// Shared fixtures for the ml-layer tests: a tiny configuration,
// vocabulary and corpus small enough that finite-difference checks
// stay fast while still exercising every code path.

use crate::application::train_use_case::TrainConfig;
use crate::data::vocab::Vocabulary;
use crate::domain::records::{ImageRecord, ImageSentencePair, SentenceRecord};

/// Feature dimension every tiny fixture uses.
pub const TINY_FEATURE_DIM: usize = 3;

pub fn tiny_config(generator: &str) -> TrainConfig {
    TrainConfig {
        generator: generator.to_string(),
        image_encoding_size: 4,
        word_encoding_size: 4,
        hidden_size: 5,
        drop_prob_encoder: 0.0,
        drop_prob_decoder: 0.0,
        regc: 0.0,
        ..TrainConfig::default()
    }
}

fn sentence(sentid: usize, words: &[&str]) -> SentenceRecord {
    SentenceRecord {
        sentid,
        tokens: words.iter().map(|w| w.to_string()).collect(),
    }
}

/// Vocabulary over {a, cat, dog, sat} plus the end token.
pub fn tiny_vocab() -> Vocabulary {
    let sentences = vec![
        sentence(0, &["a", "cat", "sat"]),
        sentence(1, &["a", "dog", "sat"]),
    ];
    Vocabulary::build(&sentences, 1)
}

pub fn tiny_pair(words: &[&str]) -> ImageSentencePair {
    ImageSentencePair {
        imgid: 0,
        feature: vec![0.3, -0.2, 0.5],
        tokens: words.iter().map(|w| w.to_string()).collect(),
    }
}

/// Two train images, one val image, each carrying one sentence.
pub fn tiny_corpus() -> Vec<ImageRecord> {
    vec![
        ImageRecord {
            imgid: 0,
            filename: "img0.jpg".to_string(),
            split: "train".to_string(),
            feature: vec![0.3, -0.2, 0.5],
            sentences: vec![sentence(0, &["a", "cat", "sat"])],
        },
        ImageRecord {
            imgid: 1,
            filename: "img1.jpg".to_string(),
            split: "train".to_string(),
            feature: vec![-0.1, 0.4, 0.2],
            sentences: vec![sentence(1, &["a", "dog", "sat"])],
        },
        ImageRecord {
            imgid: 2,
            filename: "img2.jpg".to_string(),
            split: "val".to_string(),
            feature: vec![0.0, 0.1, -0.3],
            sentences: vec![sentence(2, &["a", "cat", "sat"])],
        },
    ]
}
