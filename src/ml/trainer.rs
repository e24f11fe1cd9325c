// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Drives the whole optimization: sample a batch of image/sentence
// pairs, take one solver step, log the costs, and watch for a
// diverging objective.
//
// Loop shape per iteration:
//   1. abort flag check (set by the previous iteration)
//   2. sample batch_size pairs uniformly from the train split
//   3. solver step over the weighted generation cost
//   4. log + append a history row
//   5. divergence check against the iteration-0 cost
//   6. on the final iteration only, write the checkpoint
//
// The divergence guard compares every iteration's total cost to
// the very first one; once the cost exceeds twice the starting
// cost the learning rate is considered too hot and the run is
// abandoned at the top of the NEXT iteration. The iteration that
// detected the blow-up still finishes, so its history row (and,
// if it was the last one, its checkpoint) is kept.
//
// Reference: Karpathy & Fei-Fei (2015) Deep Visual-Semantic Alignments

use anyhow::{ensure, Result};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::application::train_use_case::TrainConfig;
use crate::data::vocab::Vocabulary;
use crate::domain::records::{Split, SplitCount};
use crate::domain::traits::DataProvider;
use crate::infra::checkpoint::{CheckpointManager, CheckpointRecord};
use crate::infra::history::{HistoryLogger, IterationStats};
use crate::ml::cost::generation_cost;
use crate::ml::generator::{CaptionGenerator, Model};
use crate::ml::solver::Solver;
use crate::ml::weights::WordWeightTable;

/// How a training run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// All planned iterations ran
    Completed,

    /// The divergence guard abandoned the run early
    Aborted,
}

/// What a finished run hands back to the application layer.
#[derive(Debug)]
pub struct TrainOutcome {
    pub state: RunState,

    /// Iterations that actually ran
    pub iterations: usize,

    /// Path of the final checkpoint, when one was written
    pub checkpoint_path: Option<PathBuf>,
}

/// Watches the total cost and trips once it exceeds twice the
/// cost observed at iteration 0.
#[derive(Debug, Default)]
pub struct DivergenceGuard {
    baseline: Option<f64>,
}

impl DivergenceGuard {
    /// Feed one iteration's total cost. Returns true when the run
    /// has diverged. The first observation only sets the baseline.
    pub fn observe(&mut self, total_cost: f64) -> bool {
        match self.baseline {
            None => {
                self.baseline = Some(total_cost);
                false
            }
            Some(baseline) => total_cost > 2.0 * baseline,
        }
    }
}

/// Run the full optimization over the train split, mutating
/// `model` in place. Writes a checkpoint only after the final
/// planned iteration.
#[allow(clippy::too_many_arguments)]
pub fn run_training<G, P>(
    cfg: &TrainConfig,
    provider: &P,
    vocab: &Vocabulary,
    weights: &WordWeightTable,
    generator: &G,
    model: &mut Model,
    update: &[String],
    regularize: &[String],
    checkpoints: &CheckpointManager,
    history: &HistoryLogger,
) -> Result<TrainOutcome>
where
    G: CaptionGenerator,
    P: DataProvider,
{
    let num_sentences = provider.split_size(Split::Train, SplitCount::Sentences);
    let num_iters_one_epoch = num_sentences / cfg.batch_size;
    ensure!(
        num_iters_one_epoch > 0,
        "batch size {} exceeds the {} training sentences available",
        cfg.batch_size,
        num_sentences
    );
    let max_iters = cfg.max_epochs * num_iters_one_epoch;

    // kept for parity with the evaluation schedule; validation
    // scoring itself is out of scope for the training driver
    let eval_period_in_iters = (num_iters_one_epoch as f64 * cfg.eval_period).max(1.0);
    debug!(eval_period_in_iters, "evaluation schedule");

    info!(
        num_sentences,
        num_iters_one_epoch, max_iters, "starting training"
    );

    let mut solver = Solver::new();
    let mut guard = DivergenceGuard::default();
    let mut abort = false;
    let mut iterations = 0;
    let mut checkpoint_path = None;

    for it in 0..max_iters {
        if abort {
            break;
        }
        let t0 = Instant::now();

        let batch = (0..cfg.batch_size)
            .map(|_| provider.sample_image_sentence_pair())
            .collect::<Result<Vec<_>>>()?;
        let epoch = it as f64 / num_iters_one_epoch as f64;

        let step = solver.step(model, update, cfg, |m| {
            generation_cost(generator, &batch, m, cfg, vocab, regularize, weights)
        })?;
        let cost = step.cost;
        let seconds = t0.elapsed().as_secs_f64();

        info!(
            "{}/{} batch done in {:.3}s. at epoch {:.2}. loss cost = {:.6}, reg cost = {:.6}",
            it, max_iters, seconds, epoch, cost.loss_cost, cost.reg_cost
        );
        history.append(&IterationStats {
            iteration: it,
            epoch,
            loss_cost: cost.loss_cost,
            reg_cost: cost.reg_cost,
            total_cost: cost.total_cost,
            seconds,
        })?;

        if guard.observe(cost.total_cost) {
            warn!(
                "loss seems to be exploding: total cost {:.6} exceeded twice the starting cost. \
                 try a lower learning rate. abandoning run",
                cost.total_cost
            );
            abort = true;
        }

        iterations = it + 1;

        if it + 1 == max_iters {
            let (word_to_ix, ix_to_word) = vocab.maps();
            let record = CheckpointRecord {
                iteration: it,
                epoch,
                model: model.clone(),
                params: cfg.clone(),
                perplexity: vocab.size() as f64,
                word_to_ix,
                ix_to_word,
            };
            // a failed write should not take down a finished run
            match checkpoints.save(&record) {
                Ok(path) => {
                    info!("wrote checkpoint to {}", path.display());
                    checkpoint_path = Some(path);
                }
                Err(err) => {
                    warn!("tried to write checkpoint but failed: {err:#}");
                }
            }
        }
    }

    let state = if abort { RunState::Aborted } else { RunState::Completed };
    Ok(TrainOutcome { state, iterations, checkpoint_path })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::JsonDataProvider;
    use crate::domain::records::{ImageRecord, SentenceRecord};
    use crate::ml::rnn::RnnGenerator;
    use crate::ml::testutil::{tiny_config, TINY_FEATURE_DIM};

    fn corpus_of_five() -> Vec<ImageRecord> {
        let captions: [&[&str]; 5] = [
            &["a", "cat", "sat"],
            &["a", "dog", "sat"],
            &["a", "dog", "ran"],
            &["a", "cat", "ran"],
            &["a", "bird", "sat"],
        ];
        captions
            .iter()
            .enumerate()
            .map(|(i, words)| ImageRecord {
                imgid: i,
                filename: format!("img{i}.jpg"),
                split: "train".to_string(),
                feature: vec![0.1 * i as f64, -0.2, 0.4],
                sentences: vec![SentenceRecord {
                    sentid: i,
                    tokens: words.iter().map(|w| w.to_string()).collect(),
                }],
            })
            .collect()
    }

    struct Harness {
        cfg: TrainConfig,
        provider: JsonDataProvider,
        vocab: Vocabulary,
    }

    fn harness(learning_rate: f64) -> Harness {
        let images = corpus_of_five();
        let sentences: Vec<SentenceRecord> = images
            .iter()
            .flat_map(|im| im.sentences.clone())
            .collect();
        let vocab = Vocabulary::build(&sentences, 1);
        let provider = JsonDataProvider::from_images(images);

        let mut cfg = tiny_config("rnn");
        cfg.solver = "vanilla".to_string();
        cfg.momentum = 0.0;
        cfg.learning_rate = learning_rate;
        cfg.batch_size = 1;
        cfg.max_epochs = 1; // 5 sentences, batch 1 → 5 iterations

        Harness { cfg, provider, vocab }
    }

    fn run(h: &Harness, dir: &std::path::Path) -> (TrainOutcome, HistoryLogger) {
        let generator = RnnGenerator;
        let bundle = generator
            .init(&h.cfg, TINY_FEATURE_DIM, h.vocab.size())
            .unwrap();
        let mut model = bundle.model;

        let checkpoints = CheckpointManager::new(dir.join("cv")).unwrap();
        let history = HistoryLogger::new(dir.join("status"), "run").unwrap();
        let outcome = run_training(
            &h.cfg,
            &h.provider,
            &h.vocab,
            &WordWeightTable::neutral(),
            &generator,
            &mut model,
            &bundle.update,
            &bundle.regularize,
            &checkpoints,
            &history,
        )
        .unwrap();
        (outcome, history)
    }

    #[test]
    fn test_guard_first_observation_sets_baseline() {
        let mut guard = DivergenceGuard::default();
        assert!(!guard.observe(100.0)); // huge, but it IS the baseline
        assert!(!guard.observe(150.0));
        assert!(!guard.observe(200.0)); // exactly 2x is still tolerated
        assert!(guard.observe(200.1));
    }

    #[test]
    fn test_run_completes_and_writes_one_final_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (outcome, history) = run(&harness(0.0), dir.path());

        assert_eq!(outcome.state, RunState::Completed);
        assert_eq!(outcome.iterations, 5);

        let path = outcome.checkpoint_path.expect("final checkpoint written");
        assert!(path.is_file());
        let written: Vec<_> = std::fs::read_dir(dir.path().join("cv"))
            .unwrap()
            .collect();
        assert_eq!(written.len(), 1, "only the final iteration checkpoints");

        let body = std::fs::read_to_string(history.path()).unwrap();
        assert_eq!(body.lines().count(), 6); // header + one row per iteration
    }

    #[test]
    fn test_exploding_cost_aborts_the_run() {
        // a negative learning rate walks uphill, so the cost is
        // guaranteed past the 2x threshold by iteration 1
        let dir = tempfile::tempdir().unwrap();
        let (outcome, _) = run(&harness(-1e3), dir.path());

        assert_eq!(outcome.state, RunState::Aborted);
        // iteration 1 trips the guard, iteration 2 sees the flag
        assert_eq!(outcome.iterations, 2);
        assert!(outcome.checkpoint_path.is_none());

        let cv: Vec<_> = std::fs::read_dir(dir.path().join("cv")).unwrap().collect();
        assert!(cv.is_empty(), "aborted runs leave no checkpoint behind");
    }

    #[test]
    fn test_batch_larger_than_train_split_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(0.0);
        h.cfg.batch_size = 50;

        let generator = RnnGenerator;
        let bundle = generator
            .init(&h.cfg, TINY_FEATURE_DIM, h.vocab.size())
            .unwrap();
        let mut model = bundle.model;
        let checkpoints = CheckpointManager::new(dir.path().join("cv")).unwrap();
        let history = HistoryLogger::new(dir.path().join("status"), "run").unwrap();

        let result = run_training(
            &h.cfg,
            &h.provider,
            &h.vocab,
            &WordWeightTable::neutral(),
            &generator,
            &mut model,
            &bundle.update,
            &bundle.regularize,
            &checkpoints,
            &history,
        );
        assert!(result.is_err());
    }
}
