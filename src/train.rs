//! Training driver: turns records into shaped batches and hands them to the
//! opaque backend.

use std::sync::Arc;
use tracing::info;

use crate::backend::{ModelBackend, TrainingReport};
use crate::batch::BatchShaper;
use crate::config::TunerConfig;
use crate::data::{split_train_eval, PatientRecord};
use crate::error::{Result, TunerError};
use crate::prompt::PromptTemplate;
use crate::types::ShapedBatch;

pub struct Trainer {
    config: Arc<TunerConfig>,
    template: PromptTemplate,
    shaper: Arc<BatchShaper>,
}

/// Shaped dataset ready for the backend, plus the realized width that the
/// inference side must be able to reproduce.
#[derive(Debug)]
pub struct PreparedData {
    pub train_batches: Vec<ShapedBatch>,
    pub eval_batches: Vec<ShapedBatch>,
    /// Largest sequence width over every shaped batch
    pub max_sequence_length: usize,
}

/// Outcome of one complete training run.
#[derive(Debug)]
pub struct TrainingOutcome {
    pub report: TrainingReport,
    pub max_sequence_length: usize,
}

impl Trainer {
    pub fn new(
        config: Arc<TunerConfig>,
        template: PromptTemplate,
        shaper: Arc<BatchShaper>,
    ) -> Self {
        Self {
            config,
            template,
            shaper,
        }
    }

    /// Split, render, and shape the dataset. Pure with respect to the model:
    /// no backend is touched, so this is where shaping behavior is tested.
    pub fn prepare(&self, records: Vec<PatientRecord>) -> Result<PreparedData> {
        if records.is_empty() {
            return Err(TunerError::DataError {
                message: "Training requires at least one record".to_string(),
                source: None,
            });
        }

        let (train_records, eval_records) = split_train_eval(
            records,
            self.config.data.eval_fraction,
            self.config.data.seed,
        );

        let train_batches =
            self.shape_set(&train_records, self.config.training.train_batch_size)?;
        let eval_batches = self.shape_set(&eval_records, self.config.training.eval_batch_size)?;

        let max_sequence_length = train_batches
            .iter()
            .chain(eval_batches.iter())
            .map(|batch| batch.sequence_length)
            .max()
            .unwrap_or(0);

        info!(
            train_batches = train_batches.len(),
            eval_batches = eval_batches.len(),
            max_sequence_length,
            "Prepared dataset"
        );

        Ok(PreparedData {
            train_batches,
            eval_batches,
            max_sequence_length,
        })
    }

    /// Run adaptation and training on the backend.
    pub async fn run(
        &self,
        backend: &mut dyn ModelBackend,
        records: Vec<PatientRecord>,
    ) -> Result<TrainingOutcome> {
        let prepared = self.prepare(records)?;

        backend.adapt(&self.config.adapter).await?;
        let report = backend
            .train(
                &prepared.train_batches,
                &prepared.eval_batches,
                &self.config.training,
            )
            .await?;

        info!(
            epochs = report.epochs_completed,
            train_loss = ?report.final_train_loss,
            eval_loss = ?report.final_eval_loss,
            "Training complete"
        );

        Ok(TrainingOutcome {
            max_sequence_length: prepared.max_sequence_length,
            report,
        })
    }

    fn shape_set(
        &self,
        records: &[PatientRecord],
        batch_size: usize,
    ) -> Result<Vec<ShapedBatch>> {
        let mut batches = Vec::new();
        for chunk in records.chunks(batch_size) {
            let prompts: Vec<String> = chunk
                .iter()
                .map(|record| self.template.render(record))
                .collect();
            batches.push(self.shaper.shape(&prompts)?);
        }
        Ok(batches)
    }
}
