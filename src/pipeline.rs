//! Pipeline assembly: one configuration, one tokenizer policy, one backend,
//! shared by the training and inference drivers so the two phases cannot
//! drift apart.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::backend::{ModelBackend, TrainingReport};
use crate::batch::BatchShaper;
use crate::config::{LengthStrategy, PadTokenStrategy, PromptStyle, TunerConfig};
use crate::data::{load_records, PatientRecord};
use crate::error::{Result, TunerError};
use crate::infer::Predictor;
use crate::prompt::PromptTemplate;
use crate::tokenizer::TokenizerAdapter;
use crate::train::Trainer;
use crate::types::Prediction;

/// State produced by training that inference depends on.
#[derive(Debug, Default)]
struct RunState {
    /// Realized maximum batch width from the last training run
    trained_length: Option<usize>,
}

/// Serializable record of one run's tokenization policy, saved alongside the
/// trained adapter so a restarted process can reproduce inference-time
/// shaping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub prompt_style: PromptStyle,
    pub pad_token: PadTokenStrategy,
    pub length: LengthStrategy,
    pub eos_token_id: u32,
    pub pad_token_id: u32,
    pub trained_length: Option<usize>,
}

/// Main entry point for the library.
pub struct TunerPipeline {
    config: Arc<TunerConfig>,
    adapter: Arc<TokenizerAdapter>,
    template: PromptTemplate,
    shaper: Arc<BatchShaper>,
    backend: Mutex<Box<dyn ModelBackend>>,
    run_state: RwLock<RunState>,
}

/// Builder for constructing a [`TunerPipeline`].
pub struct PipelineBuilder {
    config: TunerConfig,
    tokenizer: Option<TokenizerAdapter>,
    backend: Option<Box<dyn ModelBackend>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: TunerConfig::default(),
            tokenizer: None,
            backend: None,
        }
    }

    pub fn with_config(mut self, config: TunerConfig) -> Self {
        self.config = config;
        self
    }

    /// Supply an already constructed tokenizer adapter instead of loading
    /// one from `tokenizer_path`.
    pub fn with_tokenizer(mut self, adapter: TokenizerAdapter) -> Self {
        self.tokenizer = Some(adapter);
        self
    }

    pub fn with_backend(mut self, backend: Box<dyn ModelBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> Result<TunerPipeline> {
        self.config.validate()?;

        let backend = self.backend.ok_or_else(|| TunerError::ConfigurationError {
            message: "A model backend is required".to_string(),
            parameter: "backend".to_string(),
        })?;

        let adapter = match self.tokenizer {
            Some(adapter) => adapter,
            None => TokenizerAdapter::from_file(
                &self.config.tokenizer.tokenizer_path,
                &self.config.tokenizer,
            )?,
        };
        let adapter = Arc::new(adapter);

        let config = Arc::new(self.config);
        let template = PromptTemplate::new(config.tokenizer.prompt_style);
        let shaper = Arc::new(BatchShaper::new(adapter.clone(), config.tokenizer.length));

        info!(
            prompt_style = ?config.tokenizer.prompt_style,
            length = ?config.tokenizer.length,
            eos_token_id = adapter.eos_token_id(),
            pad_token_id = adapter.pad_token_id(),
            "Pipeline assembled"
        );

        Ok(TunerPipeline {
            config,
            adapter,
            template,
            shaper,
            backend: Mutex::new(backend),
            run_state: RwLock::new(RunState::default()),
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TunerPipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    /// Load the configured CSV and train on it.
    pub async fn train_from_csv(&self) -> Result<TrainingReport> {
        let records = load_records(&self.config.data.csv_path)?;
        self.train(records).await
    }

    /// Train on already loaded records. The realized batch width is retained
    /// for inference-time shaping.
    pub async fn train(&self, records: Vec<PatientRecord>) -> Result<TrainingReport> {
        let trainer = Trainer::new(self.config.clone(), self.template, self.shaper.clone());

        let mut backend = self.backend.lock().await;
        let outcome = trainer.run(backend.as_mut(), records).await?;

        self.run_state.write().trained_length = Some(outcome.max_sequence_length);
        Ok(outcome.report)
    }

    /// Predict the procedure for one record, using the same template and
    /// shaping configuration as training.
    pub async fn predict(&self, record: &PatientRecord) -> Result<String> {
        Ok(self.predict_detailed(record).await?.text)
    }

    /// Like [`predict`](Self::predict) but returns timing and raw tokens.
    pub async fn predict_detailed(&self, record: &PatientRecord) -> Result<Prediction> {
        let predictor = Predictor::new(
            self.config.clone(),
            self.template,
            self.shaper.clone(),
            self.adapter.clone(),
        );

        let trained_length = self.run_state.read().trained_length;
        let backend = self.backend.lock().await;
        predictor
            .predict(backend.as_ref(), record, trained_length)
            .await
    }

    /// Snapshot of the run's tokenization policy and trained width.
    pub fn run_metadata(&self) -> RunMetadata {
        RunMetadata {
            prompt_style: self.config.tokenizer.prompt_style,
            pad_token: self.config.tokenizer.pad_token.clone(),
            length: self.config.tokenizer.length,
            eos_token_id: self.adapter.eos_token_id(),
            pad_token_id: self.adapter.pad_token_id(),
            trained_length: self.run_state.read().trained_length,
        }
    }

    /// Write the run metadata next to the trained adapter.
    pub fn persist_run_metadata(&self, path: impl AsRef<Path>) -> Result<()> {
        let metadata = self.run_metadata();
        let json =
            serde_json::to_string_pretty(&metadata).map_err(|e| TunerError::DataError {
                message: format!("Failed to serialize run metadata: {}", e),
                source: Some(Box::new(e)),
            })?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Restore metadata persisted by a previous training run. The stored
    /// policy must match this pipeline's configuration; a mismatch is the
    /// latent training/inference inconsistency this check exists to catch.
    pub fn restore_run_metadata(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let metadata: RunMetadata =
            serde_json::from_str(&json).map_err(|e| TunerError::DataError {
                message: format!("Failed to parse run metadata: {}", e),
                source: Some(Box::new(e)),
            })?;

        let current = self.run_metadata();
        if metadata.prompt_style != current.prompt_style
            || metadata.pad_token != current.pad_token
            || metadata.length != current.length
            || metadata.eos_token_id != current.eos_token_id
            || metadata.pad_token_id != current.pad_token_id
        {
            return Err(TunerError::ConfigurationError {
                message: "Persisted run metadata does not match this pipeline's \
                          tokenization policy"
                    .to_string(),
                parameter: "run_metadata".to_string(),
            });
        }

        self.run_state.write().trained_length = metadata.trained_length;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;
    use crate::tokenizer::testing;
    use std::path::PathBuf;

    const WORDS: &[&str] = &["chest", "pain", "hypertension", "angiography"];

    fn test_config() -> TunerConfig {
        let mut config = TunerConfig::instruction_style();
        config.data.csv_path = PathBuf::from("data/patients.csv");
        config
    }

    fn test_pipeline() -> TunerPipeline {
        let config = test_config();
        let adapter = testing::adapter(WORDS, &config.tokenizer);
        TunerPipeline::builder()
            .with_config(config)
            .with_tokenizer(adapter)
            .with_backend(Box::new(SimulatedBackend::new(vec![5])))
            .build()
            .unwrap()
    }

    fn example_records(count: usize) -> Vec<PatientRecord> {
        (0..count)
            .map(|i| PatientRecord {
                age: 40 + i as u32,
                gender: "Male".to_string(),
                symptoms: "chest pain".to_string(),
                diagnoses: "hypertension".to_string(),
                procedures: "angiography".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_builder_requires_backend() {
        let result = TunerPipeline::builder().with_config(test_config()).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_validates_config() {
        // default config has an empty csv path
        let result = TunerPipeline::builder()
            .with_backend(Box::new(SimulatedBackend::new(vec![])))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_train_then_predict() {
        let pipeline = test_pipeline();

        let report = pipeline.train(example_records(10)).await.unwrap();
        assert_eq!(report.epochs_completed, 4);

        let mut record = example_records(1).remove(0);
        record.procedures = String::new();
        let text = pipeline.predict(&record).await.unwrap();
        assert!(!text.is_empty());
    }

    #[tokio::test]
    async fn test_training_width_flows_into_inference() {
        let pipeline = test_pipeline();
        pipeline.train(example_records(10)).await.unwrap();

        let trained = pipeline.run_metadata().trained_length.unwrap();
        assert!(trained > 0);
    }

    #[tokio::test]
    async fn test_metadata_round_trip() {
        let pipeline = test_pipeline();
        pipeline.train(example_records(10)).await.unwrap();

        let file = tempfile::NamedTempFile::new().unwrap();
        pipeline.persist_run_metadata(file.path()).unwrap();

        // a fresh pipeline with the same policy restores the trained width
        let restored = test_pipeline();
        assert_eq!(restored.run_metadata().trained_length, None);
        restored.restore_run_metadata(file.path()).unwrap();
        assert_eq!(
            restored.run_metadata().trained_length,
            pipeline.run_metadata().trained_length
        );
    }

    #[tokio::test]
    async fn test_metadata_mismatch_is_rejected() {
        let pipeline = test_pipeline();
        pipeline.train(example_records(10)).await.unwrap();

        let file = tempfile::NamedTempFile::new().unwrap();
        pipeline.persist_run_metadata(file.path()).unwrap();

        // chat-style pipeline must refuse instruction-style metadata
        let mut config = TunerConfig::chat_style();
        config.data.csv_path = PathBuf::from("data/patients.csv");
        let other_adapter = testing::adapter(WORDS, &config.tokenizer);
        let other = TunerPipeline::builder()
            .with_config(config)
            .with_tokenizer(other_adapter)
            .with_backend(Box::new(SimulatedBackend::new(vec![])))
            .build()
            .unwrap();

        let result = other.restore_run_metadata(file.path());
        assert!(matches!(
            result,
            Err(TunerError::ConfigurationError { .. })
        ));
    }
}
