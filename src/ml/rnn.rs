// ============================================================
// Layer 5 — Plain RNN Generator
// ============================================================
// The simpler of the two generator variants:
//
//   h_t = max(0, x_t·Wxh + h_{t-1}·Whh + bhh)
//   y_t = drop(h_t)·Wd + bd
//
// The hidden nonlinearity is always ReLU; the --rnn-relu-encoders
// flag only affects the encoders in front of the recurrence.
//
// Backward is written out by hand, step by step in reverse:
// the gradient on each hidden state is the sum of the decoder
// contribution and the recurrent contribution from the next
// step, gated by the ReLU mask before it reaches the weights.
//
// Parameters: We, be, Ws (encoders) · Wxh, Whh, bhh (recurrence)
//             · Wd, bd (decoder).
// Regularized: the five weight matrices, never the biases.

use anyhow::Result;
use ndarray::Array2;

use crate::application::train_use_case::TrainConfig;
use crate::data::vocab::Vocabulary;
use crate::domain::records::ImageSentencePair;
use crate::ml::generator::{
    base_model, check_encoding_sizes, decode_hidden, decoder_backward, encode_sequence,
    encoder_backward, gaussian, CaptionGenerator, DecodedSequence, EncodedSequence, Gradients,
    InitBundle, Model,
};

/// One cached example: everything forward computed that backward
/// needs again.
pub struct RnnCache {
    enc: EncodedSequence,
    /// Hidden states h_0..h_{n+1}; h_0 is the zero state
    hs: Vec<Array2<f64>>,
    dec: DecodedSequence,
}

#[derive(Debug, Default)]
pub struct RnnGenerator;

impl CaptionGenerator for RnnGenerator {
    type Cache = RnnCache;

    fn init(&self, cfg: &TrainConfig, feature_dim: usize, vocab_size: usize)
        -> Result<InitBundle>
    {
        check_encoding_sizes(cfg)?;
        let d = cfg.word_encoding_size;
        let h = cfg.hidden_size;

        let mut model = base_model(cfg, feature_dim, vocab_size, h);
        model.insert("Wxh".to_string(), gaussian(d, h, 0.01));
        model.insert("Whh".to_string(), gaussian(h, h, 0.01));
        model.insert("bhh".to_string(), Array2::zeros((1, h)));

        let update = ["We", "be", "Ws", "Wxh", "Whh", "bhh", "Wd", "bd"]
            .iter().map(|s| s.to_string()).collect();
        let regularize = ["We", "Ws", "Wxh", "Whh", "Wd"]
            .iter().map(|s| s.to_string()).collect();

        Ok(InitBundle { model, update, regularize })
    }

    fn forward(
        &self,
        batch: &[ImageSentencePair],
        model: &Model,
        cfg: &TrainConfig,
        vocab: &Vocabulary,
        predict_mode: bool,
    ) -> (Vec<Array2<f64>>, Vec<RnnCache>) {
        let wxh = &model["Wxh"];
        let whh = &model["Whh"];
        let bhh = &model["bhh"];
        let h = whh.nrows();

        let mut scores = Vec::with_capacity(batch.len());
        let mut caches = Vec::with_capacity(batch.len());

        for pair in batch {
            let gtix = vocab.ground_truth_indices(&pair.tokens);
            let n = gtix.len();
            let enc = encode_sequence(pair, &gtix, model, cfg, predict_mode);

            let mut hs: Vec<Array2<f64>> = Vec::with_capacity(n + 2);
            hs.push(Array2::zeros((1, h)));
            for x in &enc.xs {
                let raw = x.dot(wxh) + hs[hs.len() - 1].dot(whh) + bhh;
                hs.push(raw.mapv(|v| v.max(0.0)));
            }

            // discard the image-step prediction: the first scored
            // hidden state is the one after [image, START]
            let dec = decode_hidden(&hs[2..], model, cfg, predict_mode);

            scores.push(dec.scores.clone());
            caches.push(RnnCache { enc, hs, dec });
        }

        (scores, caches)
    }

    fn backward(&self, d_scores: &[Array2<f64>], caches: &[RnnCache], model: &Model)
        -> Gradients
    {
        let wxh = &model["Wxh"];
        let whh = &model["Whh"];
        let wd = &model["Wd"];

        let mut d_wxh = Array2::zeros(wxh.raw_dim());
        let mut d_whh = Array2::zeros(whh.raw_dim());
        let mut d_bhh = Array2::zeros(model["bhh"].raw_dim());
        let mut d_wd = Array2::zeros(wd.raw_dim());
        let mut d_bd = Array2::zeros(model["bd"].raw_dim());
        let mut d_we = Array2::zeros(model["We"].raw_dim());
        let mut d_be = Array2::zeros(model["be"].raw_dim());
        let mut d_ws = Array2::zeros(model["Ws"].raw_dim());

        for (dy, cache) in d_scores.iter().zip(caches) {
            let steps = cache.enc.xs.len(); // n + 1
            let h = whh.nrows();

            let dg = decoder_backward(&cache.dec, dy, wd);
            d_wd += &dg.d_wd;
            d_bd += &dg.d_bd;

            // gradient on every hidden state, decoder part first
            let mut d_hs: Vec<Array2<f64>> =
                (0..steps + 1).map(|_| Array2::zeros((1, h))).collect();
            for (t, d_h) in dg.d_hidden.iter().enumerate() {
                d_hs[t + 2] += d_h;
            }

            // backprop through time
            let mut d_xs: Vec<Array2<f64>> = vec![Array2::zeros((1, 0)); steps];
            for s in (0..steps).rev() {
                let k = s + 1;
                let relu_gate = cache.hs[k].mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
                let d_raw = &d_hs[k] * &relu_gate;

                d_wxh += &cache.enc.xs[s].t().dot(&d_raw);
                d_whh += &cache.hs[s].t().dot(&d_raw);
                d_bhh += &d_raw;
                d_xs[s] = d_raw.dot(&wxh.t());
                if s > 0 {
                    let d_prev = d_raw.dot(&whh.t());
                    d_hs[s] += &d_prev;
                }
            }

            let eg = encoder_backward(&cache.enc, &d_xs, d_ws.dim());
            d_we += &eg.d_we;
            d_be += &eg.d_be;
            d_ws += &eg.d_ws;
        }

        let mut grads = Gradients::new();
        grads.insert("We".to_string(), d_we);
        grads.insert("be".to_string(), d_be);
        grads.insert("Ws".to_string(), d_ws);
        grads.insert("Wxh".to_string(), d_wxh);
        grads.insert("Whh".to_string(), d_whh);
        grads.insert("bhh".to_string(), d_bhh);
        grads.insert("Wd".to_string(), d_wd);
        grads.insert("bd".to_string(), d_bd);
        grads
    }
}
