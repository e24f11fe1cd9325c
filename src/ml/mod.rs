// ============================================================
// Layer 5 — ML / Model Layer
// ============================================================
// This layer contains ALL numeric model code. The model is a
// plain mapping from parameter name to a 2-D ndarray matrix,
// and every forward/backward pass is written out by hand.
// No other layer touches ndarray matrices directly.
//
// What's in this layer:
//
//   generator.rs — The CaptionGenerator contract plus the
//                  encoder/decoder plumbing shared by both
//                  generator variants (image/word encoding,
//                  dropout, the Wd/bd decoder)
//
//   rnn.rs       — Plain recurrent generator: ReLU hidden
//                  state, manual backprop through time
//
//   lstm.rs      — LSTM generator with a single concatenated
//                  gate matrix, optional tanh cell output
//
//   cost.rs      — Weighted softmax cross-entropy cost and
//                  its gradients, plus L2 regularization
//
//   solver.rs    — In-place parameter updates:
//                  vanilla / adagrad / rmsprop / adadelta
//
//   weights.rs   — Per-(image, word) loss weight table
//
//   trainer.rs   — The training loop: batch sampling, solver
//                  steps, divergence abort, final checkpoint
//
// Reference: Karpathy & Fei-Fei (2015) Deep Visual-Semantic Alignments
//            Hochreiter & Schmidhuber (1997) Long Short-Term Memory

/// Generator contract and shared encoder/decoder plumbing
pub mod generator;

/// Plain RNN generator
pub mod rnn;

/// LSTM generator
pub mod lstm;

/// Weighted softmax cross-entropy cost function
pub mod cost;

/// First-order solvers applying updates in place
pub mod solver;

/// Per-(image, word) loss weight table
pub mod weights;

/// Training loop with divergence abort and final checkpoint
pub mod trainer;

#[cfg(test)]
pub mod testutil;
