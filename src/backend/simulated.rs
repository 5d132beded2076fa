//! Scripted backend for tests and demos.
//!
//! Echoes the attended prompt tokens and appends a configured continuation,
//! mimicking the shape of real generation output. Every call is recorded so
//! drivers can be asserted against.

use parking_lot::Mutex;
use tracing::debug;

use crate::config::{AdapterConfig, SamplingConfig, TrainingConfig};
use crate::error::Result;
use crate::types::{ShapedBatch, TokenSequence};

use super::{ModelBackend, TrainingReport};

#[derive(Debug, Clone)]
pub struct RecordedGenerate {
    pub input: TokenSequence,
    pub sampling: SamplingConfig,
}

#[derive(Debug, Clone)]
pub struct RecordedTrain {
    pub train_batches: usize,
    pub eval_batches: usize,
    pub sequence_lengths: Vec<usize>,
}

#[derive(Default)]
pub struct SimulatedBackend {
    continuation: Vec<u32>,
    adapter: Mutex<Option<AdapterConfig>>,
    train_calls: Mutex<Vec<RecordedTrain>>,
    generate_calls: Mutex<Vec<RecordedGenerate>>,
}

impl SimulatedBackend {
    /// A backend whose every generation appends `continuation` after the
    /// echoed prompt.
    pub fn new(continuation: Vec<u32>) -> Self {
        Self {
            continuation,
            ..Self::default()
        }
    }

    pub fn adapter(&self) -> Option<AdapterConfig> {
        self.adapter.lock().clone()
    }

    pub fn train_calls(&self) -> Vec<RecordedTrain> {
        self.train_calls.lock().clone()
    }

    pub fn generate_calls(&self) -> Vec<RecordedGenerate> {
        self.generate_calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl ModelBackend for SimulatedBackend {
    async fn adapt(&mut self, config: &AdapterConfig) -> Result<()> {
        *self.adapter.lock() = Some(config.clone());
        Ok(())
    }

    async fn train(
        &mut self,
        train_batches: &[ShapedBatch],
        eval_batches: &[ShapedBatch],
        hyperparameters: &TrainingConfig,
    ) -> Result<TrainingReport> {
        self.train_calls.lock().push(RecordedTrain {
            train_batches: train_batches.len(),
            eval_batches: eval_batches.len(),
            sequence_lengths: train_batches
                .iter()
                .map(|batch| batch.sequence_length)
                .collect(),
        });

        debug!(
            train = train_batches.len(),
            eval = eval_batches.len(),
            epochs = hyperparameters.num_epochs,
            "Simulated training run"
        );

        Ok(TrainingReport {
            epochs_completed: hyperparameters.num_epochs,
            train_batches: train_batches.len(),
            eval_batches: eval_batches.len(),
            final_train_loss: Some(0.42),
            final_eval_loss: Some(0.57),
        })
    }

    async fn generate(
        &self,
        input: &TokenSequence,
        sampling: &SamplingConfig,
    ) -> Result<Vec<u32>> {
        self.generate_calls.lock().push(RecordedGenerate {
            input: input.clone(),
            sampling: sampling.clone(),
        });

        let mut output = input.content_ids().to_vec();
        let budget = sampling.max_new_tokens;
        let take = self.continuation.len().min(budget.saturating_sub(1));
        output.extend_from_slice(&self.continuation[..take]);
        if let Some(eos) = sampling.eos_token_id {
            output.push(eos);
        }
        Ok(output)
    }
}
