// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores the full training state as a single JSON
// document.
//
// What gets saved per checkpoint:
//   1. Every parameter matrix of the model
//   2. The complete TrainConfig that produced it
//   3. Both vocabulary maps (word→index and index→word)
//   4. Iteration / epoch position and the perplexity stamp
//
// Why one self-contained file?
//   Resuming (--init-model-from) and later caption generation
//   both need the architecture hyperparameters AND the exact
//   vocabulary the model was trained against. Bundling them
//   with the weights means a checkpoint can never be paired
//   with the wrong vocabulary.
//
// File naming convention:
//   cv/
//     model_checkpoint_<dataset>_<host>_<fappend>_<ppl>.json
//
// The perplexity in the filename keeps successive runs from
// silently overwriting each other only when their quality
// actually differs; identical stamps overwrite, which matches
// the "keep the latest" behaviour we want for repeated runs
// of the same configuration.
//
// Reference: Rust Book §9 (Error Handling)
//            serde_json documentation (Serialize/Deserialize)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::generator::Model;

/// Everything needed to resume training or generate captions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Iteration the snapshot was taken at (0-based)
    pub iteration: usize,

    /// Fractional epoch position at that iteration
    pub epoch: f64,

    /// All parameter matrices by name
    pub model: Model,

    /// The full configuration of the run that produced this model
    pub params: TrainConfig,

    /// Validation perplexity stamp used in the filename
    pub perplexity: f64,

    /// word → vocabulary index
    pub word_to_ix: HashMap<String, usize>,

    /// vocabulary index → word
    pub ix_to_word: HashMap<usize, String>,
}

/// Manages saving and loading of model checkpoints.
/// All files are stored in the configured directory.
pub struct CheckpointManager {
    /// Path to the directory where checkpoints are stored
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a new CheckpointManager.
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating checkpoint directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Serialize a checkpoint to disk and return the path written.
    pub fn save(&self, record: &CheckpointRecord) -> Result<PathBuf> {
        let filename = format!(
            "model_checkpoint_{}_{}_{}_{:.2}.json",
            record.params.dataset,
            hostname(),
            record.params.fappend,
            record.perplexity
        );
        let path = self.dir.join(filename);

        let json = serde_json::to_string(record).context("serializing checkpoint")?;
        fs::write(&path, json)
            .with_context(|| format!("writing checkpoint {}", path.display()))?;
        Ok(path)
    }

    /// Load a previously saved checkpoint from an arbitrary path.
    pub fn load(path: impl AsRef<Path>) -> Result<CheckpointRecord> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading checkpoint {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("parsing checkpoint {}", path.display()))
    }
}

/// Host tag for the checkpoint filename, so runs from different
/// machines sharing a filesystem don't collide.
fn hostname() -> String {
    env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
