// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Handles all cross-cutting concerns that don't belong in
// any specific business layer:
//
//   checkpoint.rs — Saving and loading model snapshots
//                   Serializes the parameter matrices together
//                   with the TrainConfig and both vocabulary
//                   maps as one self-contained JSON file, so a
//                   checkpoint can always be resumed or used
//                   for generation on its own.
//
//   history.rs    — Per-iteration training statistics
//                   Writes iteration-level costs and timing to
//                   a CSV file for later analysis and plotting.
//
// Why is this a separate layer?
//   These concerns are used by multiple other layers but
//   don't belong to any one of them. Keeping them here:
//   - Prevents duplication across layers
//   - Makes it easy to swap implementations
//     (e.g. swap file checkpoints for S3 cloud storage)
//   - Keeps other layers focused on their core logic
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Per-iteration training history CSV logger
pub mod history;
