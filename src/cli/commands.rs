// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the `train` subcommand and all its configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use crate::application::train_use_case::TrainConfig;

/// The top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the captioning model and write a final checkpoint
    Train(TrainArgs),
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    // ── Global setup and checkpoints ──────────────────────────────────────────
    /// Dataset to train on: flickr8k / flickr30k / coco
    #[arg(short = 'd', long, default_value = "flickr8k")]
    pub dataset: String,

    /// Root directory containing <data_root>/<dataset>/dataset.json
    #[arg(long, default_value = "data")]
    pub data_root: String,

    /// Append this string to checkpoint filenames
    #[arg(long, default_value = "baseline")]
    pub fappend: String,

    /// Output directory to write checkpoints to
    #[arg(short = 'o', long, default_value = "cv")]
    pub checkpoint_output_directory: String,

    /// Directory to write per-iteration training history to
    #[arg(long, default_value = "status")]
    pub status_output_directory: String,

    /// Initialize the model parameters from a specific checkpoint file
    #[arg(long)]
    pub init_model_from: Option<String>,

    // ── Model parameters ──────────────────────────────────────────────────────
    /// Generator to use: rnn / lstm
    #[arg(long, default_value = "lstm")]
    pub generator: String,

    /// Size of the image encoding
    #[arg(long, default_value_t = 256)]
    pub image_encoding_size: usize,

    /// Size of the word encoding
    #[arg(long, default_value_t = 256)]
    pub word_encoding_size: usize,

    /// Size of the hidden layer in the generator recurrence
    #[arg(long, default_value_t = 256)]
    pub hidden_size: usize,

    /// Use the tanh variant of the LSTM cell output
    #[arg(long)]
    pub tanhc_version: bool,

    /// Apply ReLU to the image/word encoders before the recurrence
    #[arg(long)]
    pub rnn_relu_encoders: bool,

    /// Feed the image to the recurrence only a single time
    #[arg(long)]
    pub rnn_feed_once: bool,

    // ── Optimization parameters ───────────────────────────────────────────────
    /// L2 regularization strength
    #[arg(short = 'c', long, default_value_t = 1e-8)]
    pub regc: f64,

    /// Number of epochs to train for
    #[arg(short = 'm', long, default_value_t = 10)]
    pub max_epochs: usize,

    /// Solver type: vanilla / adagrad / adadelta / rmsprop
    #[arg(long, default_value = "rmsprop")]
    pub solver: String,

    /// Momentum for vanilla sgd
    #[arg(long, default_value_t = 0.0)]
    pub momentum: f64,

    /// Decay rate for adadelta/rmsprop
    #[arg(long, default_value_t = 0.999)]
    pub decay_rate: f64,

    /// Epsilon smoothing for rmsprop/adagrad/adadelta
    #[arg(long, default_value_t = 1e-8)]
    pub smooth_eps: f64,

    /// Solver learning rate
    #[arg(short = 'l', long, default_value_t = 1e-3)]
    pub learning_rate: f64,

    /// Batch size
    #[arg(short = 'b', long, default_value_t = 100)]
    pub batch_size: usize,

    /// Clip gradients elementwise (after batch normalization) at this
    /// threshold; non-positive disables clipping
    #[arg(long, default_value_t = 5.0)]
    pub grad_clip: f64,

    /// Dropout applied right after the encoders
    #[arg(long, default_value_t = 0.5)]
    pub drop_prob_encoder: f64,

    /// Dropout applied right before the decoder
    #[arg(long, default_value_t = 0.5)]
    pub drop_prob_decoder: f64,

    // ── Data preprocessing parameters ─────────────────────────────────────────
    /// Words occurring fewer than this many times in training data are discarded
    #[arg(long, default_value_t = 1)]
    pub word_count_threshold: usize,

    // ── Evaluation parameters ─────────────────────────────────────────────────
    /// In units of epochs, how often we would evaluate on the val set
    #[arg(short = 'p', long, default_value_t = 1.0)]
    pub eval_period: f64,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// This is the boundary between Layer 1 and Layer 2 —
/// the application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            dataset:                     a.dataset,
            data_root:                   a.data_root,
            fappend:                     a.fappend,
            checkpoint_output_directory: a.checkpoint_output_directory,
            status_output_directory:     a.status_output_directory,
            init_model_from:             a.init_model_from,
            generator:                   a.generator,
            image_encoding_size:         a.image_encoding_size,
            word_encoding_size:          a.word_encoding_size,
            hidden_size:                 a.hidden_size,
            tanhc_version:               a.tanhc_version,
            rnn_relu_encoders:           a.rnn_relu_encoders,
            rnn_feed_once:               a.rnn_feed_once,
            regc:                        a.regc,
            max_epochs:                  a.max_epochs,
            solver:                      a.solver,
            momentum:                    a.momentum,
            decay_rate:                  a.decay_rate,
            smooth_eps:                  a.smooth_eps,
            learning_rate:               a.learning_rate,
            batch_size:                  a.batch_size,
            grad_clip:                   a.grad_clip,
            drop_prob_encoder:           a.drop_prob_encoder,
            drop_prob_decoder:           a.drop_prob_decoder,
            word_count_threshold:        a.word_count_threshold,
            eval_period:                 a.eval_period,
        }
    }
}
