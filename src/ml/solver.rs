// ============================================================
// Layer 5 — First-Order Solvers
// ============================================================
// One step = evaluate the cost function, then apply an update to
// the model parameters IN PLACE. The solver owns the per-parameter
// state (gradient caches, momentum buffers) across iterations;
// state matrices are allocated lazily the first time a parameter
// is seen.
//
// Update rules, selected by --solver:
//
//   vanilla:  dx = momentum·prev − lr·g              (plain SGD)
//   adagrad:  cache += g²;        dx = −lr·g/√(cache+eps)
//   rmsprop:  cache = γ·cache + (1−γ)·g²
//                                 dx = −lr·g/√(cache+eps)
//   adadelta: cache  = γ·cache  + (1−γ)·g²
//             dx     = −√((cache2+eps)/(cache+eps))·g
//             cache2 = γ·cache2 + (1−γ)·dx²   (lr is ignored)
//
// Gradients are clipped elementwise at ±grad_clip (after batch
// normalization) when the threshold is positive.
//
// Reference: Duchi et al. (2011) Adagrad
//            Tieleman & Hinton (2012) RMSProp, lecture 6.5
//            Zeiler (2012) Adadelta

use anyhow::Result;
use ndarray::Array2;
use std::collections::HashMap;

use crate::application::train_use_case::TrainConfig;
use crate::ml::cost::{CostOutput, CostSummary};
use crate::ml::generator::Model;

/// What one solver step reports back to the training loop.
pub struct StepResult {
    pub cost: CostSummary,
}

/// Applies parameter updates in place, carrying per-parameter
/// state across iterations.
#[derive(Debug, Default)]
pub struct Solver {
    /// Squared-gradient cache (adagrad/rmsprop/adadelta) or the
    /// previous update (vanilla momentum)
    step_cache: HashMap<String, Array2<f64>>,

    /// Second cache for adadelta's accumulated update magnitudes
    step_cache2: HashMap<String, Array2<f64>>,
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate the cost function on the current model, then update
    /// every parameter in `update` in place.
    pub fn step<F>(
        &mut self,
        model: &mut Model,
        update: &[String],
        cfg: &TrainConfig,
        cost_fn: F,
    ) -> Result<StepResult>
    where
        F: FnOnce(&Model) -> CostOutput,
    {
        let out = cost_fn(model);
        let mut grads = out.grads;

        // elementwise gradient clipping
        if cfg.grad_clip > 0.0 {
            let clip = cfg.grad_clip;
            for g in grads.values_mut() {
                g.mapv_inplace(|v| v.clamp(-clip, clip));
            }
        }

        for pname in update {
            let g = match grads.get(pname.as_str()) {
                Some(g) => g,
                None => continue, // parameter received no gradient this step
            };
            let param = model
                .get_mut(pname.as_str())
                .ok_or_else(|| anyhow::anyhow!("update list names unknown parameter '{pname}'"))?;

            let dx = match cfg.solver.as_str() {
                "vanilla" => {
                    let step = -cfg.learning_rate * g;
                    if cfg.momentum > 0.0 {
                        let prev = cache_entry(&mut self.step_cache, pname, param.dim());
                        let dx = &*prev * cfg.momentum + step;
                        prev.assign(&dx);
                        dx
                    } else {
                        step
                    }
                }
                "adagrad" => {
                    let cache = cache_entry(&mut self.step_cache, pname, param.dim());
                    *cache += &g.mapv(|v| v * v);
                    -cfg.learning_rate * g / cache.mapv(|v| (v + cfg.smooth_eps).sqrt())
                }
                "rmsprop" => {
                    let gamma = cfg.decay_rate;
                    let cache = cache_entry(&mut self.step_cache, pname, param.dim());
                    let decayed = &*cache * gamma + g.mapv(|v| v * v) * (1.0 - gamma);
                    cache.assign(&decayed);
                    -cfg.learning_rate * g / cache.mapv(|v| (v + cfg.smooth_eps).sqrt())
                }
                "adadelta" => {
                    let gamma = cfg.decay_rate;
                    let cache = cache_entry(&mut self.step_cache, pname, param.dim());
                    let decayed = &*cache * gamma + g.mapv(|v| v * v) * (1.0 - gamma);
                    cache.assign(&decayed);
                    let denom = cache.mapv(|v| v + cfg.smooth_eps);
                    let cache2 = cache_entry(&mut self.step_cache2, pname, param.dim());
                    let scale = (&cache2.mapv(|v| v + cfg.smooth_eps) / &denom).mapv(f64::sqrt);
                    let dx = -(scale * g);
                    let decayed2 = &*cache2 * gamma + dx.mapv(|v| v * v) * (1.0 - gamma);
                    cache2.assign(&decayed2);
                    dx
                }
                other => anyhow::bail!(
                    "unknown solver '{other}' (expected vanilla/adagrad/rmsprop/adadelta)"
                ),
            };

            *param += &dx;
        }

        Ok(StepResult { cost: out.cost })
    }
}

/// Fetch the state matrix for a parameter, allocating zeros on
/// first use.
fn cache_entry<'a>(
    cache: &'a mut HashMap<String, Array2<f64>>,
    pname: &str,
    dim: (usize, usize),
) -> &'a mut Array2<f64> {
    cache
        .entry(pname.to_string())
        .or_insert_with(|| Array2::zeros(dim))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::cost::CostSummary;
    use crate::ml::generator::Gradients;
    use crate::ml::testutil::tiny_config;
    use ndarray::array;

    /// Quadratic bowl ½‖w‖² — gradient is w itself, so any sane
    /// solver must walk the single parameter toward zero.
    fn quadratic(model: &Model) -> CostOutput {
        let w = &model["w"];
        let total = 0.5 * w.mapv(|v| v * v).sum();
        let mut grads = Gradients::new();
        grads.insert("w".to_string(), w.clone());
        CostOutput {
            cost: CostSummary { reg_cost: 0.0, loss_cost: total, total_cost: total },
            grads,
        }
    }

    fn bowl_model() -> (Model, Vec<String>) {
        let mut model = Model::new();
        model.insert("w".to_string(), array![[2.0, -3.0], [1.0, 4.0]]);
        (model, vec!["w".to_string()])
    }

    fn run_steps(solver_name: &str, lr: f64, n: usize) -> f64 {
        let mut cfg = tiny_config("rnn");
        cfg.solver = solver_name.to_string();
        cfg.learning_rate = lr;
        cfg.grad_clip = -1.0;

        let (mut model, update) = bowl_model();
        let mut solver = Solver::new();
        let mut last = f64::INFINITY;
        for _ in 0..n {
            let r = solver.step(&mut model, &update, &cfg, quadratic).unwrap();
            last = r.cost.total_cost;
        }
        last
    }

    #[test]
    fn test_vanilla_descends_quadratic() {
        let start = 0.5 * (4.0 + 9.0 + 1.0 + 16.0);
        assert!(run_steps("vanilla", 0.1, 20) < start * 0.1);
    }

    #[test]
    fn test_adagrad_descends_quadratic() {
        let start = 0.5 * (4.0 + 9.0 + 1.0 + 16.0);
        assert!(run_steps("adagrad", 0.5, 50) < start);
    }

    #[test]
    fn test_rmsprop_descends_quadratic() {
        let start = 0.5 * (4.0 + 9.0 + 1.0 + 16.0);
        assert!(run_steps("rmsprop", 0.05, 50) < start);
    }

    #[test]
    fn test_adadelta_descends_quadratic() {
        let start = 0.5 * (4.0 + 9.0 + 1.0 + 16.0);
        assert!(run_steps("adadelta", 1.0, 200) < start);
    }

    #[test]
    fn test_unknown_solver_errors() {
        let mut cfg = tiny_config("rnn");
        cfg.solver = "adam".to_string();
        let (mut model, update) = bowl_model();
        let mut solver = Solver::new();
        assert!(solver.step(&mut model, &update, &cfg, quadratic).is_err());
    }

    #[test]
    fn test_grad_clip_limits_update() {
        let mut cfg = tiny_config("rnn");
        cfg.solver = "vanilla".to_string();
        cfg.learning_rate = 1.0;
        cfg.momentum = 0.0;
        cfg.grad_clip = 0.5;

        let (mut model, update) = bowl_model();
        let before = model["w"].clone();
        let mut solver = Solver::new();
        solver.step(&mut model, &update, &cfg, quadratic).unwrap();

        // every entry moved by at most lr × clip
        let moved = (&model["w"] - &before).mapv(f64::abs);
        assert!(moved.iter().all(|&m| m <= 0.5 + 1e-12));
    }

    #[test]
    fn test_momentum_accumulates_velocity() {
        let mut cfg = tiny_config("rnn");
        cfg.solver = "vanilla".to_string();
        cfg.learning_rate = 0.01;
        cfg.momentum = 0.9;
        cfg.grad_clip = -1.0;

        let (mut model, update) = bowl_model();
        let mut solver = Solver::new();
        let first = {
            let before = model["w"].clone();
            solver.step(&mut model, &update, &cfg, quadratic).unwrap();
            (&model["w"] - &before).mapv(f64::abs).sum()
        };
        let second = {
            let before = model["w"].clone();
            solver.step(&mut model, &update, &cfg, quadratic).unwrap();
            (&model["w"] - &before).mapv(f64::abs).sum()
        };
        assert!(second > first, "momentum should grow early step sizes");
    }

    #[test]
    fn test_solver_state_shapes_match_parameters() {
        let mut cfg = tiny_config("rnn");
        cfg.solver = "rmsprop".to_string();
        let (mut model, update) = bowl_model();
        let mut solver = Solver::new();
        solver.step(&mut model, &update, &cfg, quadratic).unwrap();
        assert_eq!(solver.step_cache["w"].dim(), model["w"].dim());
    }
}
