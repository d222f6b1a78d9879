// ============================================================
// Layer 5 — Dynamic Loss Scaler
// ============================================================
// Loss scaling for mixed-precision training.
//
// Small gradients underflow in half precision. Multiplying the loss
// by a large factor S before backward lifts them into range; the
// gradients are divided by S again before the optimizer sees them.
//
// Per step:
//   1. loss_scaled = loss × S
//   2. backward(loss_scaled)
//   3. grad ← grad / S for every parameter
//   4. any non-finite value?
//        yes → skip the optimizer step, S ← S × backoff
//        no  → step; after `growth_interval` clean steps S ← S × growth
//
// With scaling disabled every method is a pass-through.

use std::marker::PhantomData;

use burn::{
    module::{AutodiffModule, ModuleVisitor, Param},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

pub const DEFAULT_INIT_SCALE: f64 = 65536.0;
const GROWTH_FACTOR: f64 = 2.0;
const BACKOFF_FACTOR: f64 = 0.5;
const DEFAULT_GROWTH_INTERVAL: usize = 2000;
const MIN_SCALE: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct LossScaler {
    enabled:         bool,
    scale:           f64,
    growth_interval: usize,
    clean_steps:     usize,
    skipped_steps:   usize,
}

impl LossScaler {
    pub fn new(enabled: bool) -> Self {
        Self::with_params(enabled, DEFAULT_INIT_SCALE, DEFAULT_GROWTH_INTERVAL)
    }

    pub fn with_params(enabled: bool, init_scale: f64, growth_interval: usize) -> Self {
        Self {
            enabled,
            scale: init_scale.max(MIN_SCALE),
            growth_interval: growth_interval.max(1),
            clean_steps: 0,
            skipped_steps: 0,
        }
    }

    /// Current multiplier (1 when disabled).
    pub fn scale(&self) -> f64 {
        if self.enabled { self.scale } else { 1.0 }
    }

    pub fn skipped_steps(&self) -> usize {
        self.skipped_steps
    }

    pub fn scale_loss<B: Backend>(&self, loss: Tensor<B, 1>) -> Tensor<B, 1> {
        if self.enabled {
            loss.mul_scalar(self.scale)
        } else {
            loss
        }
    }

    /// Divide every gradient of `module` by the current scale.
    /// Returns the unscaled gradients and whether all of them are finite.
    pub fn unscale<B, M>(&self, module: &M, mut grads: GradientsParams) -> (GradientsParams, bool)
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
    {
        let mut visitor = Unscale::<B> {
            grads:     &mut grads,
            inv_scale: 1.0 / self.scale(),
            rescale:   self.enabled,
            finite:    true,
            _backend:  PhantomData,
        };
        module.visit(&mut visitor);
        let finite = visitor.finite;
        (grads, finite)
    }

    /// Record the outcome of one step. Returns `true` if the optimizer
    /// should apply the gradients.
    pub fn update(&mut self, finite: bool) -> bool {
        if finite {
            self.clean_steps += 1;
            if self.enabled && self.clean_steps >= self.growth_interval {
                self.scale *= GROWTH_FACTOR;
                self.clean_steps = 0;
                tracing::debug!("Loss scale grew to {}", self.scale);
            }
            return true;
        }

        self.skipped_steps += 1;
        self.clean_steps = 0;
        if self.enabled {
            self.scale = (self.scale * BACKOFF_FACTOR).max(MIN_SCALE);
            tracing::warn!("Non-finite gradients, skipping step; loss scale now {}", self.scale);
        } else {
            tracing::warn!("Non-finite gradients, skipping step");
        }
        false
    }
}

struct Unscale<'a, B: AutodiffBackend> {
    grads:     &'a mut GradientsParams,
    inv_scale: f64,
    rescale:   bool,
    finite:    bool,
    _backend:  PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Unscale<'_, B> {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        let id = param.id;
        let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) else {
            return;
        };
        let grad = if self.rescale { grad.mul_scalar(self.inv_scale) } else { grad };

        let total: f64 = grad.clone().sum().into_scalar().elem();
        if !total.is_finite() {
            self.finite = false;
        }
        self.grads.register::<B::InnerBackend, D>(id, grad);
    }
}
