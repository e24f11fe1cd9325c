// ============================================================
// Layer 5 — LSTM Generator
// ============================================================
// The default generator variant. All four gates live in one
// concatenated matrix so a step is a single matmul:
//
//   z_t    = [1, x_t, h_{t-1}]                 (the 1 is the bias column)
//   ifog   = z_t · WLSTM                      (1 × 4·hidden)
//   i,f,o  = σ(ifog[..3h]),  g = tanh(ifog[3h..])
//   c_t    = f ⊙ c_{t-1} + i ⊙ g
//   h_t    = o ⊙ tanh(c_t)     (--tanhc-version)
//   h_t    = o ⊙ c_t           (otherwise)
//   y_t    = drop(h_t)·Wd + bd
//
// Backward unrolls the same steps in reverse, carrying both the
// hidden-state gradient and the cell-state gradient across steps.
//
// Parameters: We, be, Ws (encoders) · WLSTM (recurrence)
//             · Wd, bd (decoder).
// Regularized: We, Ws, WLSTM, Wd.
//
// Reference: Hochreiter & Schmidhuber (1997) Long Short-Term Memory

use anyhow::Result;
use ndarray::{s, Array2};

use crate::application::train_use_case::TrainConfig;
use crate::data::vocab::Vocabulary;
use crate::domain::records::ImageSentencePair;
use crate::ml::generator::{
    base_model, check_encoding_sizes, decode_hidden, decoder_backward, encode_sequence,
    encoder_backward, gaussian, CaptionGenerator, DecodedSequence, EncodedSequence, Gradients,
    InitBundle, Model,
};

fn sigmoid(a: &Array2<f64>) -> Array2<f64> {
    a.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

/// One cached example. The per-step vectors are all 1×hidden rows;
/// hs and cs carry the zero state at index 0 so index s is always
/// "the state entering step s".
pub struct LstmCache {
    enc: EncodedSequence,
    hs: Vec<Array2<f64>>,
    cs: Vec<Array2<f64>>,
    /// Gate inputs [1, x, h_prev], one per step
    zs: Vec<Array2<f64>>,
    gate_i: Vec<Array2<f64>>,
    gate_f: Vec<Array2<f64>>,
    gate_o: Vec<Array2<f64>>,
    gate_g: Vec<Array2<f64>>,
    /// Cell output per step: tanh(c) or c depending on the variant
    cts: Vec<Array2<f64>>,
    tanhc: bool,
    dec: DecodedSequence,
}

#[derive(Debug, Default)]
pub struct LstmGenerator;

impl CaptionGenerator for LstmGenerator {
    type Cache = LstmCache;

    fn init(&self, cfg: &TrainConfig, feature_dim: usize, vocab_size: usize)
        -> Result<InitBundle>
    {
        check_encoding_sizes(cfg)?;
        let d = cfg.word_encoding_size;
        let h = cfg.hidden_size;

        let mut model = base_model(cfg, feature_dim, vocab_size, h);
        model.insert("WLSTM".to_string(), gaussian(1 + d + h, 4 * h, 0.01));

        let update = ["We", "be", "Ws", "WLSTM", "Wd", "bd"]
            .iter().map(|s| s.to_string()).collect();
        let regularize = ["We", "Ws", "WLSTM", "Wd"]
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
    ) -> (Vec<Array2<f64>>, Vec<LstmCache>) {
        let wlstm = &model["WLSTM"];
        let h = wlstm.ncols() / 4;
        let d = cfg.word_encoding_size;

        let mut scores = Vec::with_capacity(batch.len());
        let mut caches = Vec::with_capacity(batch.len());

        for pair in batch {
            let gtix = vocab.ground_truth_indices(&pair.tokens);
            let n = gtix.len();
            let enc = encode_sequence(pair, &gtix, model, cfg, predict_mode);

            let mut hs = vec![Array2::zeros((1, h))];
            let mut cs = vec![Array2::zeros((1, h))];
            let mut zs = Vec::with_capacity(n + 1);
            let mut gate_i = Vec::with_capacity(n + 1);
            let mut gate_f = Vec::with_capacity(n + 1);
            let mut gate_o = Vec::with_capacity(n + 1);
            let mut gate_g = Vec::with_capacity(n + 1);
            let mut cts = Vec::with_capacity(n + 1);

            for (step, x) in enc.xs.iter().enumerate() {
                let mut z = Array2::zeros((1, 1 + d + h));
                z[[0, 0]] = 1.0;
                z.slice_mut(s![0..1, 1..1 + d]).assign(x);
                z.slice_mut(s![0..1, 1 + d..]).assign(&hs[step]);

                let ifog = z.dot(wlstm);
                let gi = sigmoid(&ifog.slice(s![0..1, 0..h]).to_owned());
                let gf = sigmoid(&ifog.slice(s![0..1, h..2 * h]).to_owned());
                let go = sigmoid(&ifog.slice(s![0..1, 2 * h..3 * h]).to_owned());
                let gg = ifog.slice(s![0..1, 3 * h..4 * h]).mapv(f64::tanh);

                let c = &gf * &cs[step] + &gi * &gg;
                let ct = if cfg.tanhc_version { c.mapv(f64::tanh) } else { c.clone() };
                let h_new = &go * &ct;

                zs.push(z);
                gate_i.push(gi);
                gate_f.push(gf);
                gate_o.push(go);
                gate_g.push(gg);
                cts.push(ct);
                cs.push(c);
                hs.push(h_new);
            }

            // discard the image-step prediction
            let dec = decode_hidden(&hs[2..], model, cfg, predict_mode);

            scores.push(dec.scores.clone());
            caches.push(LstmCache {
                enc, hs, cs, zs, gate_i, gate_f, gate_o, gate_g, cts,
                tanhc: cfg.tanhc_version,
                dec,
            });
        }

        (scores, caches)
    }

    fn backward(&self, d_scores: &[Array2<f64>], caches: &[LstmCache], model: &Model)
        -> Gradients
    {
        let wlstm = &model["WLSTM"];
        let wd = &model["Wd"];
        let h = wlstm.ncols() / 4;

        let mut d_wlstm = Array2::zeros(wlstm.raw_dim());
        let mut d_wd = Array2::zeros(wd.raw_dim());
        let mut d_bd = Array2::zeros(model["bd"].raw_dim());
        let mut d_we = Array2::zeros(model["We"].raw_dim());
        let mut d_be = Array2::zeros(model["be"].raw_dim());
        let mut d_ws = Array2::zeros(model["Ws"].raw_dim());

        for (dy, cache) in d_scores.iter().zip(caches) {
            let steps = cache.enc.xs.len(); // n + 1
            let d = cache.enc.xs[0].ncols();
            let tanhc = cache.tanhc;

            let dg = decoder_backward(&cache.dec, dy, wd);
            d_wd += &dg.d_wd;
            d_bd += &dg.d_bd;

            let mut d_hs: Vec<Array2<f64>> =
                (0..steps + 1).map(|_| Array2::zeros((1, h))).collect();
            for (t, d_h) in dg.d_hidden.iter().enumerate() {
                d_hs[t + 2] += d_h;
            }

            let mut d_xs: Vec<Array2<f64>> = vec![Array2::zeros((1, 0)); steps];
            let mut d_c_next: Array2<f64> = Array2::zeros((1, h));

            for s_ix in (0..steps).rev() {
                let k = s_ix + 1;
                let d_h = &d_hs[k];
                let gi = &cache.gate_i[s_ix];
                let gf = &cache.gate_f[s_ix];
                let go = &cache.gate_o[s_ix];
                let gg = &cache.gate_g[s_ix];
                let ct = &cache.cts[s_ix];

                let (d_o, d_c) = if tanhc {
                    let d_o = d_h * ct;
                    let d_ct = d_h * go;
                    let d_c = d_c_next + d_ct * &ct.mapv(|v| 1.0 - v * v);
                    (d_o, d_c)
                } else {
                    let d_o = d_h * &cache.cs[k];
                    let d_c = d_c_next + d_h * go;
                    (d_o, d_c)
                };

                let d_i = &d_c * gg;
                let d_g = &d_c * gi;
                let d_f = &d_c * &cache.cs[s_ix];
                d_c_next = &d_c * gf;

                let d_raw_i = d_i * &gi.mapv(|v| v * (1.0 - v));
                let d_raw_f = d_f * &gf.mapv(|v| v * (1.0 - v));
                let d_raw_o = d_o * &go.mapv(|v| v * (1.0 - v));
                let d_raw_g = d_g * &gg.mapv(|v| 1.0 - v * v);

                let mut d_ifog = Array2::zeros((1, 4 * h));
                d_ifog.slice_mut(s![0..1, 0..h]).assign(&d_raw_i);
                d_ifog.slice_mut(s![0..1, h..2 * h]).assign(&d_raw_f);
                d_ifog.slice_mut(s![0..1, 2 * h..3 * h]).assign(&d_raw_o);
                d_ifog.slice_mut(s![0..1, 3 * h..4 * h]).assign(&d_raw_g);

                d_wlstm += &cache.zs[s_ix].t().dot(&d_ifog);
                let d_z = d_ifog.dot(&wlstm.t());
                d_xs[s_ix] = d_z.slice(s![0..1, 1..1 + d]).to_owned();
                let d_h_prev = d_z.slice(s![0..1, 1 + d..]).to_owned();
                d_hs[s_ix] += &d_h_prev;
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
        grads.insert("WLSTM".to_string(), d_wlstm);
        grads.insert("Wd".to_string(), d_wd);
        grads.insert("bd".to_string(), d_bd);
        grads
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::testutil::{tiny_config, tiny_pair, tiny_vocab};

    #[test]
    fn test_init_shapes() {
        let cfg = tiny_config("lstm");
        let bundle = LstmGenerator.init(&cfg, 3, 5).unwrap();
        let d = cfg.word_encoding_size;
        let h = cfg.hidden_size;
        assert_eq!(bundle.model["WLSTM"].dim(), (1 + d + h, 4 * h));
        assert_eq!(bundle.model["Wd"].dim(), (h, 5));
        assert!(bundle.regularize.contains(&"WLSTM".to_string()));
        assert!(!bundle.regularize.contains(&"bd".to_string()));
    }

    #[test]
    fn test_forward_score_shapes() {
        let cfg = tiny_config("lstm");
        let vocab = tiny_vocab();
        let bundle = LstmGenerator.init(&cfg, 3, vocab.size()).unwrap();

        let pair = tiny_pair(&["a", "dog", "sat"]);
        let (scores, _) =
            LstmGenerator.forward(&[pair], &bundle.model, &cfg, &vocab, true);
        assert_eq!(scores[0].dim(), (4, vocab.size()));
        assert!(scores[0].iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_tanhc_variant_changes_output() {
        let mut cfg = tiny_config("lstm");
        let vocab = tiny_vocab();
        let bundle = LstmGenerator.init(&cfg, 3, vocab.size()).unwrap();
        let pair = tiny_pair(&["a", "cat"]);

        let (plain, _) =
            LstmGenerator.forward(&[pair.clone()], &bundle.model, &cfg, &vocab, true);
        cfg.tanhc_version = true;
        let (tanhc, _) =
            LstmGenerator.forward(&[pair], &bundle.model, &cfg, &vocab, true);

        let diff: f64 = (&plain[0] - &tanhc[0]).mapv(f64::abs).sum();
        assert!(diff > 0.0, "tanhc variant should produce different scores");
    }

    #[test]
    fn test_backward_gradient_shapes_match_parameters() {
        let cfg = tiny_config("lstm");
        let vocab = tiny_vocab();
        let bundle = LstmGenerator.init(&cfg, 3, vocab.size()).unwrap();

        let batch = vec![tiny_pair(&["a", "cat", "sat"])];
        let (scores, caches) =
            LstmGenerator.forward(&batch, &bundle.model, &cfg, &vocab, true);
        let grads = LstmGenerator.backward(&scores, &caches, &bundle.model);

        assert_eq!(grads.len(), bundle.model.len());
        for (name, param) in &bundle.model {
            assert_eq!(grads[name].dim(), param.dim(), "shape mismatch for {name}");
        }
    }
}
