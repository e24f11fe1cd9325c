// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from the raw dataset JSON
// up to the vocabulary the model is trained against.
//
// The pipeline flows in this order:
//
//   data/<dataset>/dataset.json
//       │
//       ▼
//   JsonDataProvider  → loads records, serves splits,
//       │               samples (image, sentence) pairs
//       ▼
//   Vocabulary        → counts words, filters by threshold,
//                       assigns indices, builds the bias vector
//
// Each module is responsible for exactly one step.
// This makes each step independently testable and replaceable.
//
// Reference: Rust Book §13 (Iterators and Closures)

/// Loads the dataset JSON and implements the DataProvider trait
pub mod provider;

/// Word vocabulary with index maps and log-frequency bias vector
pub mod vocab;
