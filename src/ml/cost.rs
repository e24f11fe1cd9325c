// ============================================================
// Layer 5 — Weighted Softmax Cross-Entropy Cost
// ============================================================
// Computes the training cost and all parameter gradients for a
// batch of (image, sentence) pairs:
//
//   1. forward the generator → one score matrix per example
//   2. per row: numerically-stable softmax (shift by the row max
//      before exponentiating)
//   3. loss += weight(imgid, true index) × −log(P[true] + 1e-20)
//   4. gradient row = P with 1 subtracted at the true index
//   5. backward the generator → parameter gradients
//   6. L2 penalty over the regularized weight matrices
//   7. divide cost and every gradient by the batch size
//
// Note the asymmetry in steps 3 and 4: the per-position weight
// scales the forward loss term but the backward gradient row is
// the plain unweighted softmax derivative. This mismatch is part
// of the training objective being reproduced here — do not "fix"
// one side without the other.
//
// Gradients are accumulated in an owned buffer; the forward-pass
// score matrices are never written to.

use ndarray::Array2;

use crate::application::train_use_case::TrainConfig;
use crate::data::vocab::Vocabulary;
use crate::domain::records::ImageSentencePair;
use crate::ml::generator::{CaptionGenerator, Gradients, Model};
use crate::ml::weights::WordWeightTable;

/// Floor inside the log so a zero probability cannot produce inf.
const LOG_SMOOTHING: f64 = 1e-20;

/// The three cost figures of one batch, already batch-normalized.
#[derive(Debug, Clone, Copy)]
pub struct CostSummary {
    pub reg_cost: f64,
    pub loss_cost: f64,
    pub total_cost: f64,
}

/// What a cost evaluation hands to the solver.
pub struct CostOutput {
    pub cost: CostSummary,
    pub grads: Gradients,
}

/// Evaluate cost and gradients for one batch.
pub fn generation_cost<G: CaptionGenerator>(
    generator: &G,
    batch: &[ImageSentencePair],
    model: &Model,
    cfg: &TrainConfig,
    vocab: &Vocabulary,
    regularize: &[String],
    weights: &WordWeightTable,
) -> CostOutput {
    if batch.is_empty() {
        return CostOutput {
            cost: CostSummary { reg_cost: 0.0, loss_cost: 0.0, total_cost: 0.0 },
            grads: Gradients::new(),
        };
    }

    let (ys, caches) = generator.forward(batch, model, cfg, vocab, false);

    let mut loss_cost = 0.0;
    let mut d_ys: Vec<Array2<f64>> = Vec::with_capacity(batch.len());

    for (pair, y) in batch.iter().zip(&ys) {
        let gtix = vocab.ground_truth_indices(&pair.tokens);
        let word_weights = weights.lookup(pair.imgid, &gtix);

        // row-wise stable softmax into an owned probability buffer
        let mut p = Array2::zeros(y.raw_dim());
        for (t, row) in y.outer_iter().enumerate() {
            let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            let mut e = row.mapv(|v| (v - max).exp());
            let sum = e.sum();
            e.mapv_inplace(|v| v / sum);
            p.row_mut(t).assign(&e);
        }

        // weighted negative log-likelihood of the true indices
        for (t, &ix) in gtix.iter().enumerate() {
            loss_cost -= word_weights[t] * (LOG_SMOOTHING + p[[t, ix]]).ln();
        }

        // softmax gradient, NOT scaled by the per-position weight
        for (t, &ix) in gtix.iter().enumerate() {
            p[[t, ix]] -= 1.0;
        }
        d_ys.push(p);
    }

    let mut grads = generator.backward(&d_ys, &caches, model);

    // L2 regularization over the weight matrices
    let mut reg_cost = 0.0;
    if cfg.regc > 0.0 {
        for pname in regularize {
            let mat = &model[pname.as_str()];
            reg_cost += 0.5 * cfg.regc * mat.mapv(|v| v * v).sum();
            let g = grads
                .get_mut(pname.as_str())
                .expect("regularized parameter missing from gradients");
            *g += &(mat * cfg.regc);
        }
    }

    // normalize cost and gradients by the batch size
    let bs = batch.len() as f64;
    reg_cost /= bs;
    loss_cost /= bs;
    for g in grads.values_mut() {
        *g /= bs;
    }

    CostOutput {
        cost: CostSummary {
            reg_cost,
            loss_cost,
            total_cost: loss_cost + reg_cost,
        },
        grads,
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::lstm::LstmGenerator;
    use crate::ml::rnn::RnnGenerator;
    use crate::ml::testutil::{tiny_config, tiny_pair, tiny_vocab};

    #[test]
    fn test_gradient_shapes_match_parameters() {
        let cfg = tiny_config("rnn");
        let vocab = tiny_vocab();
        let bundle = RnnGenerator.init(&cfg, 3, vocab.size()).unwrap();
        let batch = vec![tiny_pair(&["a", "cat", "sat"]), tiny_pair(&["a", "dog"])];

        let out = generation_cost(
            &RnnGenerator, &batch, &bundle.model, &cfg, &vocab,
            &bundle.regularize, &WordWeightTable::neutral(),
        );

        assert_eq!(out.grads.len(), bundle.model.len());
        for (name, param) in &bundle.model {
            assert_eq!(out.grads[name].dim(), param.dim(), "shape mismatch for {name}");
        }
    }

    #[test]
    fn test_total_is_loss_plus_reg() {
        let mut cfg = tiny_config("rnn");
        cfg.regc = 1e-3;
        let vocab = tiny_vocab();
        let bundle = RnnGenerator.init(&cfg, 3, vocab.size()).unwrap();
        let batch = vec![tiny_pair(&["a", "cat"])];

        let out = generation_cost(
            &RnnGenerator, &batch, &bundle.model, &cfg, &vocab,
            &bundle.regularize, &WordWeightTable::neutral(),
        );
        assert!(out.cost.reg_cost > 0.0);
        assert!(out.cost.loss_cost > 0.0);
        let expected = out.cost.loss_cost + out.cost.reg_cost;
        assert!((out.cost.total_cost - expected).abs() < 1e-12);
    }

    #[test]
    fn test_loss_matches_direct_recomputation() {
        // independently recompute the weighted NLL from the same
        // probabilities and weights and compare
        let cfg = tiny_config("rnn");
        let vocab = tiny_vocab();
        let bundle = RnnGenerator.init(&cfg, 3, vocab.size()).unwrap();
        let batch = vec![tiny_pair(&["a", "cat", "sat"]), tiny_pair(&["a", "dog"])];
        let weights = WordWeightTable::neutral();

        let out = generation_cost(
            &RnnGenerator, &batch, &bundle.model, &cfg, &vocab,
            &bundle.regularize, &weights,
        );

        // dropout is zero in the tiny config so a second forward is identical
        let (ys, _) = RnnGenerator.forward(&batch, &bundle.model, &cfg, &vocab, false);
        let mut expected = 0.0;
        for (pair, y) in batch.iter().zip(&ys) {
            let gtix = vocab.ground_truth_indices(&pair.tokens);
            let ww = weights.lookup(pair.imgid, &gtix);
            for (t, &ix) in gtix.iter().enumerate() {
                let row = y.row(t);
                let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
                let denom: f64 = row.iter().map(|&v| (v - max).exp()).sum();
                let p = (y[[t, ix]] - max).exp() / denom;
                expected -= ww[t] * (1e-20 + p).ln();
            }
        }
        expected /= batch.len() as f64;

        assert!(
            (out.cost.loss_cost - expected).abs() < 1e-9,
            "got {}, expected {}",
            out.cost.loss_cost,
            expected
        );
    }

    #[test]
    fn test_weights_scale_loss_but_not_gradients() {
        // the per-position weight enters the forward loss term only;
        // the backward gradient is the plain softmax derivative
        let cfg = tiny_config("rnn");
        let vocab = tiny_vocab();
        let bundle = RnnGenerator.init(&cfg, 3, vocab.size()).unwrap();
        let batch = vec![tiny_pair(&["a", "cat", "sat"])];

        let images = crate::ml::testutil::tiny_corpus();
        let refs: Vec<_> = images.iter().collect();
        let weighted = WordWeightTable::compute(&vocab, &refs);

        let out_neutral = generation_cost(
            &RnnGenerator, &batch, &bundle.model, &cfg, &vocab,
            &bundle.regularize, &WordWeightTable::neutral(),
        );
        let out_weighted = generation_cost(
            &RnnGenerator, &batch, &bundle.model, &cfg, &vocab,
            &bundle.regularize, &weighted,
        );

        assert!(
            (out_neutral.cost.loss_cost - out_weighted.cost.loss_cost).abs() > 1e-9,
            "weights should change the loss"
        );
        for (name, g) in &out_neutral.grads {
            let diff: f64 = (g - &out_weighted.grads[name]).mapv(f64::abs).sum();
            assert!(diff < 1e-12, "weights leaked into gradient of {name}");
        }
    }

    #[test]
    fn test_empty_caption_contributes_without_crashing() {
        let cfg = tiny_config("rnn");
        let vocab = tiny_vocab();
        let bundle = RnnGenerator.init(&cfg, 3, vocab.size()).unwrap();
        let batch = vec![tiny_pair(&[])];

        let out = generation_cost(
            &RnnGenerator, &batch, &bundle.model, &cfg, &vocab,
            &bundle.regularize, &WordWeightTable::neutral(),
        );
        assert!(out.cost.total_cost.is_finite());
    }

    // ── Finite-difference gradient checks ─────────────────────────────────────
    // Perturb single parameter entries and compare the analytic
    // gradient against a central difference of the total cost.

    fn gradcheck<G: CaptionGenerator>(generator: &G, cfg: &TrainConfig) {
        use crate::ml::generator::gaussian;

        let vocab = tiny_vocab();
        let bundle = generator.init(cfg, 3, vocab.size()).unwrap();
        let batch = vec![tiny_pair(&["a", "cat", "sat"]), tiny_pair(&["dog"])];
        let weights = WordWeightTable::neutral();

        // redraw parameters at a coarser scale so no ReLU
        // pre-activation sits within a finite-difference step of
        // its kink
        let mut model = bundle.model.clone();
        for m in model.values_mut() {
            *m = gaussian(m.nrows(), m.ncols(), 0.3);
        }

        let cost_of = |m: &Model| {
            generation_cost(generator, &batch, m, cfg, &vocab, &bundle.regularize, &weights)
                .cost
                .total_cost
        };

        let out = generation_cost(
            generator, &batch, &model, cfg, &vocab, &bundle.regularize, &weights,
        );

        let eps = 1e-5;
        for (name, param) in &model {
            let (rows, cols) = param.dim();
            // probe the two corners of every parameter matrix
            for &(r, c) in &[(0usize, 0usize), (rows - 1, cols - 1)] {
                let mut plus = model.clone();
                plus.get_mut(name).unwrap()[[r, c]] += eps;
                let mut minus = model.clone();
                minus.get_mut(name).unwrap()[[r, c]] -= eps;

                let numeric = (cost_of(&plus) - cost_of(&minus)) / (2.0 * eps);
                let analytic = out.grads[name][[r, c]];
                let denom = analytic.abs().max(numeric.abs()).max(1e-8);
                assert!(
                    (analytic - numeric).abs() / denom < 1e-4
                        || (analytic - numeric).abs() < 1e-8,
                    "{name}[{r},{c}]: analytic {analytic} vs numeric {numeric}"
                );
            }
        }
    }

    #[test]
    fn test_gradcheck_rnn() {
        let mut cfg = tiny_config("rnn");
        cfg.regc = 1e-3;
        gradcheck(&RnnGenerator, &cfg);
    }

    #[test]
    fn test_gradcheck_rnn_relu_encoders_feed_once() {
        let mut cfg = tiny_config("rnn");
        cfg.regc = 1e-3;
        cfg.rnn_relu_encoders = true;
        cfg.rnn_feed_once = true;
        gradcheck(&RnnGenerator, &cfg);
    }

    #[test]
    fn test_gradcheck_lstm() {
        let mut cfg = tiny_config("lstm");
        cfg.regc = 1e-3;
        gradcheck(&LstmGenerator, &cfg);
    }

    #[test]
    fn test_gradcheck_lstm_tanhc() {
        let mut cfg = tiny_config("lstm");
        cfg.regc = 1e-3;
        cfg.tanhc_version = true;
        gradcheck(&LstmGenerator, &cfg);
    }
}
