// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load the dataset JSON       (Layer 4 - data)
//   Step 2: Build the vocabulary        (Layer 4 - data)
//   Step 3: Compute per-word weights    (Layer 5 - ml)
//   Step 4: Initialize the generator    (Layer 5 - ml)
//   Step 5: Optionally resume weights   (Layer 6 - infra)
//   Step 6: Run the training loop       (Layer 5 - ml)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Karpathy & Fei-Fei (2015) Deep Visual-Semantic Alignments

use anyhow::{bail, Context, Result};
use ndarray::Axis;
use serde::{Deserialize, Serialize};

use crate::data::{provider::JsonDataProvider, vocab::Vocabulary};
use crate::domain::records::Split;
use crate::domain::traits::DataProvider;
use crate::infra::{
    checkpoint::CheckpointManager,
    history::HistoryLogger,
};
use crate::ml::{
    generator::CaptionGenerator,
    lstm::LstmGenerator,
    rnn::RnnGenerator,
    trainer::{run_training, RunState},
    weights::WordWeightTable,
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Serialisable so it travels inside every checkpoint and a saved
// model can always be rebuilt with the architecture that trained it.
// The #[derive(Serialize, Deserialize)] macros from serde handle
// reading/writing this struct to JSON automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    // global setup
    pub dataset:                     String,
    pub data_root:                   String,
    pub fappend:                     String,
    pub checkpoint_output_directory: String,
    pub status_output_directory:     String,
    pub init_model_from:             Option<String>,

    // model
    pub generator:           String,
    pub image_encoding_size: usize,
    pub word_encoding_size:  usize,
    pub hidden_size:         usize,
    pub tanhc_version:       bool,
    pub rnn_relu_encoders:   bool,
    pub rnn_feed_once:       bool,

    // optimization
    pub regc:              f64,
    pub max_epochs:        usize,
    pub solver:            String,
    pub momentum:          f64,
    pub decay_rate:        f64,
    pub smooth_eps:        f64,
    pub learning_rate:     f64,
    pub batch_size:        usize,
    pub grad_clip:         f64,
    pub drop_prob_encoder: f64,
    pub drop_prob_decoder: f64,

    // data preprocessing
    pub word_count_threshold: usize,

    // evaluation
    pub eval_period: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset:                     "flickr8k".to_string(),
            data_root:                   "data".to_string(),
            fappend:                     "baseline".to_string(),
            checkpoint_output_directory: "cv".to_string(),
            status_output_directory:     "status".to_string(),
            init_model_from:             None,
            generator:                   "lstm".to_string(),
            image_encoding_size:         256,
            word_encoding_size:          256,
            hidden_size:                 256,
            tanhc_version:               false,
            rnn_relu_encoders:           false,
            rnn_feed_once:               false,
            regc:                        1e-8,
            max_epochs:                  10,
            solver:                      "rmsprop".to_string(),
            momentum:                    0.0,
            decay_rate:                  0.999,
            smooth_eps:                  1e-8,
            learning_rate:               1e-3,
            batch_size:                  100,
            grad_clip:                   5.0,
            drop_prob_encoder:           0.5,
            drop_prob_decoder:           0.5,
            word_count_threshold:        1,
            eval_period:                 1.0,
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
// Owns the config and runs the full training pipeline.
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    /// Create a new TrainUseCase with the given configuration
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;

        // ── Step 1: Load the dataset ─────────────────────────────────────────
        tracing::info!(
            "Loading dataset '{}' from '{}'",
            cfg.dataset,
            cfg.data_root
        );
        let provider = JsonDataProvider::load(&cfg.data_root, &cfg.dataset)?;

        // ── Step 2: Build the vocabulary from the train split ────────────────
        let vocab = Vocabulary::build(
            provider.iter_sentences(Split::Train),
            cfg.word_count_threshold,
        );
        tracing::info!(
            "Built vocabulary of {} words (threshold {})",
            vocab.size(),
            cfg.word_count_threshold
        );

        // ── Step 3: Per-(image, word) loss weights over the train split ──────
        let train_images = provider.split_images(Split::Train);
        let weights = WordWeightTable::compute(&vocab, &train_images);
        tracing::info!("Computed {} loss weight entries", weights.len());

        // ── Step 4..6: hand off to the chosen generator ───────────────────────
        match cfg.generator.as_str() {
            "rnn" => self.launch(RnnGenerator, &provider, &vocab, &weights),
            "lstm" => self.launch(LstmGenerator, &provider, &vocab, &weights),
            other => bail!("unknown generator '{other}' (expected rnn or lstm)"),
        }
    }

    /// Initialize the generator's parameters and run the training
    /// loop. Generic over the generator so the recurrence caches
    /// stay fully typed.
    fn launch<G: CaptionGenerator>(
        &self,
        generator: G,
        provider: &JsonDataProvider,
        vocab: &Vocabulary,
        weights: &WordWeightTable,
    ) -> Result<()> {
        let cfg = &self.config;

        let feature_dim = provider
            .split_images(Split::Train)
            .first()
            .map(|im| im.feature.len())
            .context("train split has no images to read the feature size from")?;

        let bundle = generator.init(cfg, feature_dim, vocab.size())?;
        let mut model = bundle.model;

        // start the decoder biases at the log word frequencies, so
        // the first iterations aren't spent learning the unigram
        // distribution
        model.insert(
            "bd".to_string(),
            vocab.bias_init().clone().insert_axis(Axis(0)),
        );

        let mut total_params = 0usize;
        for name in &bundle.update {
            let mat = &model[name];
            let (r, c) = mat.dim();
            tracing::info!("  {name}: [{r} x {c}] = {} parameters", r * c);
            total_params += r * c;
        }
        tracing::info!(
            "Initialized {} generator with {} total parameters",
            cfg.generator,
            total_params
        );

        // ── Step 5: Optionally resume from a saved checkpoint ─────────────────
        // Replaces the whole model, so the checkpoint must have been
        // produced by a compatible architecture and vocabulary.
        if let Some(path) = &cfg.init_model_from {
            let record = CheckpointManager::load(path)?;
            tracing::info!(
                "Resuming model from '{}' (iteration {}, epoch {:.2})",
                path,
                record.iteration,
                record.epoch
            );
            model = record.model;
        }

        // ── Step 6: Run the training loop ─────────────────────────────────────
        let checkpoints = CheckpointManager::new(&cfg.checkpoint_output_directory)?;
        let run_name = format!("{}_{}", cfg.dataset, cfg.fappend);
        let history = HistoryLogger::new(&cfg.status_output_directory, &run_name)?;

        let outcome = run_training(
            cfg,
            provider,
            vocab,
            weights,
            &generator,
            &mut model,
            &bundle.update,
            &bundle.regularize,
            &checkpoints,
            &history,
        )?;

        match outcome.state {
            RunState::Completed => tracing::info!(
                "Training completed after {} iterations",
                outcome.iterations
            ),
            RunState::Aborted => tracing::warn!(
                "Training aborted after {} iterations",
                outcome.iterations
            ),
        }
        Ok(())
    }
}
