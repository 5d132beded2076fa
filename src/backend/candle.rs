//! Local generation backend built on candle.
//!
//! Loads a Llama checkpoint from safetensors and serves the `generate` side
//! of [`ModelBackend`]. Adapter training is delegated to an external trainer;
//! this backend expects adapter weights to already be merged into the
//! checkpoint it loads.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::llama::{Cache, Config as LlamaConfig, Llama};
use candle_transformers::utils::apply_repeat_penalty;
use tracing::{debug, info, warn};

use crate::config::{AdapterConfig, ComputeDtype, SamplingConfig, TrainingConfig, TunerConfig};
use crate::error::{Result, TunerError};
use crate::types::{ShapedBatch, TokenSequence};

use super::{ModelBackend, TrainingReport};

// Fixed sampling seed, kept stable across calls
const SAMPLING_SEED: u64 = 299_792_458;

pub struct CandleBackend {
    model: Llama,
    llama_config: LlamaConfig,
    device: Device,
    dtype: DType,
    adapter: Option<AdapterConfig>,
}

impl CandleBackend {
    /// Load the checkpoint named by the configuration.
    pub async fn load(config: &TunerConfig) -> Result<Self> {
        let device = Device::cuda_if_available(0)?;
        let dtype = compute_dtype(config.quantization.compute_dtype);

        if config.quantization.load_in_4bit {
            warn!(
                "4-bit weight storage is owned by the external trainer; \
                 loading this checkpoint at {:?}",
                dtype
            );
        }

        let paths = weight_files(&config.model.model_path)?;
        let llama_config = config.model.to_llama_config(false);

        info!(
            model_id = %config.model.model_id,
            files = paths.len(),
            "Loading model weights"
        );

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&paths, dtype, &device)? };
        let model = Llama::load(vb, &llama_config).map_err(|e| TunerError::BackendError {
            message: format!("Failed to load model: {}", e),
            source: Some(Box::new(e)),
        })?;

        Ok(Self {
            model,
            llama_config,
            device,
            dtype,
            adapter: None,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

#[async_trait::async_trait]
impl ModelBackend for CandleBackend {
    async fn adapt(&mut self, config: &AdapterConfig) -> Result<()> {
        debug!(
            rank = config.rank,
            alpha = config.alpha,
            targets = config.target_modules.len(),
            "Recording adapter configuration"
        );
        self.adapter = Some(config.clone());
        Ok(())
    }

    async fn train(
        &mut self,
        _train_batches: &[ShapedBatch],
        _eval_batches: &[ShapedBatch],
        _hyperparameters: &TrainingConfig,
    ) -> Result<TrainingReport> {
        Err(TunerError::BackendError {
            message: "The candle backend is inference-only; run adapter training \
                      on an external trainer and load the merged checkpoint"
                .to_string(),
            source: None,
        })
    }

    async fn generate(
        &self,
        input: &TokenSequence,
        sampling: &SamplingConfig,
    ) -> Result<Vec<u32>> {
        let prompt_ids: Vec<u32> = input.content_ids().to_vec();
        if prompt_ids.is_empty() {
            return Err(TunerError::BackendError {
                message: "Cannot generate from an empty prompt".to_string(),
                source: None,
            });
        }

        let mut cache = Cache::new(true, self.dtype, &self.llama_config, &self.device)?;
        let mut logits_processor = LogitsProcessor::new(
            SAMPLING_SEED,
            Some(sampling.temperature),
            Some(sampling.top_p),
        );

        let mut all_tokens = prompt_ids.clone();
        let mut current = prompt_ids;
        let mut index_pos = 0;

        for _ in 0..sampling.max_new_tokens {
            let input_tensor = Tensor::new(current.as_slice(), &self.device)?.unsqueeze(0)?;
            let logits = self.model.forward(&input_tensor, index_pos, &mut cache)?;
            let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;

            let logits = if sampling.repetition_penalty != 1.0 {
                let start_at = all_tokens
                    .len()
                    .saturating_sub(sampling.repetition_context_size);
                apply_repeat_penalty(
                    &logits,
                    sampling.repetition_penalty,
                    &all_tokens[start_at..],
                )?
            } else {
                logits
            };

            let next_token = logits_processor.sample(&logits)?;
            index_pos += current.len();
            all_tokens.push(next_token);

            if sampling.eos_token_id == Some(next_token) {
                break;
            }
            current = vec![next_token];
        }

        Ok(all_tokens)
    }
}

fn compute_dtype(dtype: ComputeDtype) -> DType {
    match dtype {
        ComputeDtype::Bf16 => DType::BF16,
        ComputeDtype::F16 => DType::F16,
        ComputeDtype::F32 => DType::F32,
    }
}

/// Collect the safetensors shards under a checkpoint directory, in name
/// order.
fn weight_files(model_path: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(model_path).map_err(|e| TunerError::BackendError {
        message: format!("Cannot read model directory {}: {}", model_path.display(), e),
        source: Some(Box::new(e)),
    })? {
        let entry = entry.map_err(|e| TunerError::BackendError {
            message: format!("Cannot read model directory entry: {}", e),
            source: Some(Box::new(e)),
        })?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "safetensors") {
            paths.push(path);
        }
    }
    paths.sort();

    if paths.is_empty() {
        return Err(TunerError::BackendError {
            message: format!(
                "No safetensors files found under {}",
                model_path.display()
            ),
            source: None,
        });
    }
    Ok(paths)
}
