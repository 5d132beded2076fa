//! Model backends.
//!
//! The pipeline only constructs model inputs; everything behind the
//! [`ModelBackend`] trait (weight storage, adapter math, gradient updates,
//! sampling kernels) is owned by the concrete backend.

mod candle;
mod simulated;

pub use candle::CandleBackend;
pub use simulated::SimulatedBackend;

use crate::config::{AdapterConfig, SamplingConfig, TrainingConfig};
use crate::error::Result;
use crate::types::{ShapedBatch, TokenSequence};

/// Opaque model capability surface.
#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    /// Inject low-rank adapters into the loaded model.
    async fn adapt(&mut self, config: &AdapterConfig) -> Result<()>;

    /// Run fine-tuning over pre-shaped batches.
    async fn train(
        &mut self,
        train_batches: &[ShapedBatch],
        eval_batches: &[ShapedBatch],
        hyperparameters: &TrainingConfig,
    ) -> Result<TrainingReport>;

    /// Generate a continuation for one shaped sequence.
    ///
    /// Returns the full token stream: the attended prompt tokens echoed back
    /// followed by generated tokens, stopping at
    /// `sampling.eos_token_id` or after `sampling.max_new_tokens`.
    async fn generate(
        &self,
        input: &TokenSequence,
        sampling: &SamplingConfig,
    ) -> Result<Vec<u32>>;
}

/// Summary returned by a completed training run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub epochs_completed: usize,
    pub train_batches: usize,
    pub eval_batches: usize,
    pub final_train_loss: Option<f32>,
    pub final_eval_loss: Option<f32>,
}
