// ============================================================
// Layer 5 — Generator Contract and Shared Plumbing
// ============================================================
// A caption generator owns three operations:
//
//   init     — allocate the named parameter matrices and say
//              which of them are updated / L2-regularized
//   forward  — per (image, sentence) pair, produce one score
//              matrix with a row of vocabulary scores for every
//              ground-truth position, plus an opaque cache
//   backward — fold per-example score gradients back through
//              the cached state into parameter gradients
//
// The model itself is nothing but a HashMap from parameter name
// to a 2-D matrix. The trainer owns it, the solver mutates it in
// place, and a checkpoint can replace it wholesale. A missing
// parameter or a shape mismatch is a programming error and is
// allowed to terminate the process.
//
// Both generator variants share the same encoder and decoder:
//
//   image feature ──We,be──▶ x_img ─┐
//                                   ├─▶ recurrence ──▶ hidden ──Wd,bd──▶ scores
//   word index ───Ws──▶ embedding ──┘
//
// The recurrence input sequence for a caption with ground-truth
// indices g_1..g_n is [x_img, START, w(g_1), .., w(g_{n-1})] —
// n+1 steps. The image-step prediction is discarded, so the
// score matrix has exactly n rows: row t scores g_{t+1}.
//
// Dropout is the inverted kind: surviving activations are scaled
// by 1/keep at train time so prediction needs no rescaling.
//
// Reference: Rust Book §10 (Traits)
//            Karpathy & Fei-Fei (2015) Deep Visual-Semantic Alignments
//            Srivastava et al. (2014) Dropout

use anyhow::Result;
use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;

use crate::application::train_use_case::TrainConfig;
use crate::data::vocab::Vocabulary;
use crate::domain::records::ImageSentencePair;

/// Named model parameters. Every value is a 2-D matrix; vectors
/// are stored as single-row matrices.
pub type Model = HashMap<String, Array2<f64>>;

/// Parameter gradients, same keys and shapes as the model.
pub type Gradients = HashMap<String, Array2<f64>>;

/// What `init` hands back to the trainer.
pub struct InitBundle {
    /// Freshly initialized parameter matrices
    pub model: Model,

    /// Parameter names the solver updates
    pub update: Vec<String>,

    /// Parameter names the L2 penalty applies to (weights only,
    /// never biases)
    pub regularize: Vec<String>,
}

// ─── CaptionGenerator ─────────────────────────────────────────────────────────
/// The contract both generator variants implement. The cache type
/// is opaque to everyone but the implementation itself.
pub trait CaptionGenerator {
    type Cache;

    /// Allocate parameters for the given feature dimensionality
    /// and vocabulary size.
    fn init(&self, cfg: &TrainConfig, feature_dim: usize, vocab_size: usize)
        -> Result<InitBundle>;

    /// Run the recurrence over every pair in the batch. Returns one
    /// score matrix per example (rows = ground-truth length, columns
    /// = vocabulary size) and the caches backward needs.
    fn forward(
        &self,
        batch: &[ImageSentencePair],
        model: &Model,
        cfg: &TrainConfig,
        vocab: &Vocabulary,
        predict_mode: bool,
    ) -> (Vec<Array2<f64>>, Vec<Self::Cache>);

    /// Fold per-example score gradients back into parameter
    /// gradients, summed over the batch.
    fn backward(&self, d_scores: &[Array2<f64>], caches: &[Self::Cache], model: &Model)
        -> Gradients;
}

// ─── Initialization helpers ───────────────────────────────────────────────────

/// A (rows × cols) matrix of small centered gaussian values.
pub(crate) fn gaussian(rows: usize, cols: usize, std: f64) -> Array2<f64> {
    let normal = Normal::new(0.0, std).expect("std must be finite");
    let mut rng = rand::thread_rng();
    Array2::from_shape_fn((rows, cols), |_| normal.sample(&mut rng))
}

/// The encoder/decoder parameters shared by both generators.
/// The recurrent parameters are added by each variant.
pub(crate) fn base_model(
    cfg: &TrainConfig,
    feature_dim: usize,
    vocab_size: usize,
    hidden_size: usize,
) -> Model {
    let d = cfg.word_encoding_size;
    let mut model = Model::new();
    model.insert("We".to_string(), gaussian(feature_dim, d, 0.01));
    model.insert("be".to_string(), Array2::zeros((1, d)));
    model.insert("Ws".to_string(), gaussian(vocab_size, d, 0.01));
    model.insert("Wd".to_string(), gaussian(hidden_size, vocab_size, 0.01));
    model.insert("bd".to_string(), Array2::zeros((1, vocab_size)));
    model
}

/// init-time guard: the image encoding is fed through the same
/// recurrence input as the word encoding, so the two sizes must
/// agree.
pub(crate) fn check_encoding_sizes(cfg: &TrainConfig) -> Result<()> {
    if cfg.image_encoding_size != cfg.word_encoding_size {
        anyhow::bail!(
            "image_encoding_size ({}) must equal word_encoding_size ({}) — \
             both feed the same recurrence input",
            cfg.image_encoding_size,
            cfg.word_encoding_size
        );
    }
    Ok(())
}

// ─── Dropout ──────────────────────────────────────────────────────────────────

/// Inverted-dropout mask: entries are 1/keep with probability keep
/// and 0 otherwise. All-ones when inactive so callers can multiply
/// unconditionally.
pub(crate) fn dropout_mask(rows: usize, cols: usize, drop_prob: f64, active: bool) -> Array2<f64> {
    if !active || drop_prob <= 0.0 {
        return Array2::ones((rows, cols));
    }
    let keep = 1.0 - drop_prob;
    let mut rng = rand::thread_rng();
    Array2::from_shape_fn((rows, cols), |_| {
        if rng.gen::<f64>() < keep { 1.0 / keep } else { 0.0 }
    })
}

// ─── Encoder ──────────────────────────────────────────────────────────────────

/// Everything the encoders produced for one example, kept around
/// for the backward pass. Masks are all-ones when the matching
/// feature (ReLU, dropout) is disabled, so backward can multiply
/// through them unconditionally.
pub(crate) struct EncodedSequence {
    /// Image feature as a 1×F row
    pub feature: Array2<f64>,

    /// Processed recurrence inputs, one 1×d row per step
    /// (index 0 is the image step)
    pub xs: Vec<Array2<f64>>,

    /// Ws row used at each word step (START first)
    pub word_ix: Vec<usize>,

    pub img_relu_mask: Array2<f64>,
    pub img_drop_mask: Array2<f64>,
    pub word_relu_masks: Vec<Array2<f64>>,
    pub word_drop_masks: Vec<Array2<f64>>,

    /// Whether the image vector was fed only at step 0
    pub feed_once: bool,
}

/// Encode one (image, sentence) pair into the recurrence input
/// sequence: [x_img, START, w(g_1), .., w(g_{n-1})].
pub(crate) fn encode_sequence(
    pair: &ImageSentencePair,
    gtix: &[usize],
    model: &Model,
    cfg: &TrainConfig,
    predict_mode: bool,
) -> EncodedSequence {
    let n = gtix.len();
    let d = cfg.word_encoding_size;
    let training = !predict_mode;

    let we = &model["We"];
    let be = &model["be"];
    let ws = &model["Ws"];

    let feature = Array1::from(pair.feature.clone()).insert_axis(Axis(0));

    // image encoder: feature → 1×d, optional ReLU, dropout
    let x_img_raw = feature.dot(we) + be;
    let img_relu_mask = relu_mask(&x_img_raw, cfg.rnn_relu_encoders);
    let img_drop_mask = dropout_mask(1, d, cfg.drop_prob_encoder, training);
    let x_img = &x_img_raw * &img_relu_mask * &img_drop_mask;

    let mut xs = Vec::with_capacity(n + 1);
    let mut word_ix = Vec::with_capacity(n);
    let mut word_relu_masks = Vec::with_capacity(n);
    let mut word_drop_masks = Vec::with_capacity(n);
    xs.push(x_img.clone());

    // word steps: START, then every ground-truth word except the
    // final end marker (which is only ever predicted, never fed)
    for t in 0..n {
        let ix = if t == 0 { 0 } else { gtix[t - 1] };
        let emb_raw = ws.row(ix).insert_axis(Axis(0)).to_owned();
        let rmask = relu_mask(&emb_raw, cfg.rnn_relu_encoders);
        let dmask = dropout_mask(1, d, cfg.drop_prob_encoder, training);
        let emb = &emb_raw * &rmask * &dmask;

        let x = if cfg.rnn_feed_once { emb } else { emb + &x_img };
        xs.push(x);
        word_ix.push(ix);
        word_relu_masks.push(rmask);
        word_drop_masks.push(dmask);
    }

    EncodedSequence {
        feature,
        xs,
        word_ix,
        img_relu_mask,
        img_drop_mask,
        word_relu_masks,
        word_drop_masks,
        feed_once: cfg.rnn_feed_once,
    }
}

/// 1/0 mask selecting the positive entries; all-ones when ReLU is
/// not applied.
fn relu_mask(raw: &Array2<f64>, apply: bool) -> Array2<f64> {
    if apply {
        raw.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
    } else {
        Array2::ones(raw.raw_dim())
    }
}

/// Encoder parameter gradients for one example.
pub(crate) struct EncoderGrads {
    pub d_we: Array2<f64>,
    pub d_be: Array2<f64>,
    pub d_ws: Array2<f64>,
}

/// Backprop through the encoders given the gradient on every
/// processed recurrence input.
pub(crate) fn encoder_backward(
    enc: &EncodedSequence,
    d_xs: &[Array2<f64>],
    ws_shape: (usize, usize),
) -> EncoderGrads {
    let d = enc.xs[0].ncols();
    let mut d_ws = Array2::zeros(ws_shape);
    let mut d_x_img: Array2<f64> = Array2::zeros((1, d));
    d_x_img += &d_xs[0];

    for t in 0..enc.word_ix.len() {
        let d_x = &d_xs[t + 1];
        if !enc.feed_once {
            d_x_img += d_x;
        }
        let d_emb_raw = d_x * &enc.word_drop_masks[t] * &enc.word_relu_masks[t];
        let mut row = d_ws.row_mut(enc.word_ix[t]);
        row += &d_emb_raw.row(0);
    }

    let d_img_raw = &d_x_img * &enc.img_drop_mask * &enc.img_relu_mask;
    let d_we = enc.feature.t().dot(&d_img_raw);
    let d_be = d_img_raw;

    EncoderGrads { d_we, d_be, d_ws }
}

// ─── Decoder ──────────────────────────────────────────────────────────────────

/// Decoder outputs for one example, with the dropped hidden rows
/// cached for backward.
pub(crate) struct DecodedSequence {
    /// n × vocab_size score matrix
    pub scores: Array2<f64>,

    /// Hidden rows after decoder dropout, one per score row
    pub hdrop: Vec<Array2<f64>>,

    pub drop_masks: Vec<Array2<f64>>,
}

/// Apply decoder dropout and the Wd/bd projection to each hidden
/// row that carries a prediction.
pub(crate) fn decode_hidden(
    hidden: &[Array2<f64>],
    model: &Model,
    cfg: &TrainConfig,
    predict_mode: bool,
) -> DecodedSequence {
    let wd = &model["Wd"];
    let bd = &model["bd"];
    let n = hidden.len();
    let h = wd.nrows();
    let vocab_size = wd.ncols();
    let training = !predict_mode;

    let mut scores = Array2::zeros((n, vocab_size));
    let mut hdrop = Vec::with_capacity(n);
    let mut drop_masks = Vec::with_capacity(n);

    for (t, row) in hidden.iter().enumerate() {
        let mask = dropout_mask(1, h, cfg.drop_prob_decoder, training);
        let dropped = row * &mask;
        let y = dropped.dot(wd) + bd;
        scores.row_mut(t).assign(&y.row(0));
        hdrop.push(dropped);
        drop_masks.push(mask);
    }

    DecodedSequence { scores, hdrop, drop_masks }
}

/// Decoder parameter gradients plus the gradient flowing back
/// into each decoded hidden row.
pub(crate) struct DecoderGrads {
    pub d_wd: Array2<f64>,
    pub d_bd: Array2<f64>,
    pub d_hidden: Vec<Array2<f64>>,
}

pub(crate) fn decoder_backward(
    dec: &DecodedSequence,
    d_scores: &Array2<f64>,
    wd: &Array2<f64>,
) -> DecoderGrads {
    let n = dec.hdrop.len();
    let mut d_wd = Array2::zeros(wd.raw_dim());
    let mut d_bd = Array2::zeros((1, wd.ncols()));
    let mut d_hidden = Vec::with_capacity(n);

    for t in 0..n {
        let dy = d_scores.row(t).insert_axis(Axis(0));
        d_wd += &dec.hdrop[t].t().dot(&dy);
        d_bd += &dy;
        let d_h = dy.dot(&wd.t()) * &dec.drop_masks[t];
        d_hidden.push(d_h);
    }

    DecoderGrads { d_wd, d_bd, d_hidden }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropout_mask_inactive_is_all_ones() {
        let m = dropout_mask(2, 3, 0.5, false);
        assert!(m.iter().all(|&v| v == 1.0));
        let m = dropout_mask(2, 3, 0.0, true);
        assert!(m.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_dropout_mask_scales_survivors() {
        let m = dropout_mask(50, 50, 0.5, true);
        // every entry is either dropped or scaled by 1/keep
        assert!(m.iter().all(|&v| v == 0.0 || (v - 2.0).abs() < 1e-12));
        // with 2500 entries both outcomes occur with near certainty
        assert!(m.iter().any(|&v| v == 0.0));
        assert!(m.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_gaussian_shape() {
        let g = gaussian(4, 7, 0.01);
        assert_eq!(g.dim(), (4, 7));
    }
}
