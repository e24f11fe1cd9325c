// ============================================================
// Layer 6 — Training History Logger
// ============================================================
// Records per-iteration training statistics to a CSV file.
//
// Why log every iteration to CSV?
//   - Easy to open in Excel or Google Sheets
//   - Can plot loss curves to diagnose training issues
//   - Provides a permanent record of each training run
//
// Stats recorded per iteration:
//   - iteration:  the iteration number (0, 1, 2, ...)
//   - epoch:      fractional epoch position
//   - loss_cost:  weighted cross-entropy part of the objective
//   - reg_cost:   L2 penalty part of the objective
//   - total_cost: loss_cost + reg_cost
//   - seconds:    wall-clock time the iteration took
//
// Example CSV output:
//   iteration,epoch,loss_cost,reg_cost,total_cost,seconds
//   0,0.00,23.412051,0.000213,23.412264,0.184
//   1,0.02,21.907445,0.000214,21.907659,0.171
//   ...
//
// How to read the history:
//   - total_cost should trend down (model is learning)
//   - a sudden jump past 2× the starting cost aborts the run
//   - seconds flags batches that hit slow disk or paging
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

/// One row of statistics for a single training iteration.
#[derive(Debug, Clone, Copy)]
pub struct IterationStats {
    /// The iteration number (starts at 0)
    pub iteration: usize,

    /// Fractional epoch position, iteration / iterations-per-epoch
    pub epoch: f64,

    /// Weighted cross-entropy cost, normalized by batch size
    pub loss_cost: f64,

    /// L2 regularization cost, normalized by batch size
    pub reg_cost: f64,

    /// loss_cost + reg_cost — the value the divergence guard watches
    pub total_cost: f64,

    /// Wall-clock seconds the iteration took
    pub seconds: f64,
}

/// Appends iteration stats to a CSV file as training runs.
pub struct HistoryLogger {
    /// Path to the CSV file being written
    path: PathBuf,
}

impl HistoryLogger {
    /// Create the logger, its parent directory, and the CSV header.
    /// Truncates any history left over from a previous run.
    pub fn new(dir: impl Into<PathBuf>, run_name: &str) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating status directory {}", dir.display()))?;

        let path = dir.join(format!("history_{run_name}.csv"));
        fs::write(&path, "iteration,epoch,loss_cost,reg_cost,total_cost,seconds\n")
            .with_context(|| format!("writing history header to {}", path.display()))?;
        Ok(Self { path })
    }

    /// Append one row to the CSV file.
    pub fn append(&self, stats: &IterationStats) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening history file {}", self.path.display()))?;

        writeln!(
            file,
            "{},{:.2},{:.6},{:.6},{:.6},{:.3}",
            stats.iteration,
            stats.epoch,
            stats.loss_cost,
            stats.reg_cost,
            stats.total_cost,
            stats.seconds
        )
        .with_context(|| format!("appending to history file {}", self.path.display()))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}
