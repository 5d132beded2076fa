use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use candle_transformers::models::llama::{Config as LlamaConfig, LlamaEosToks};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunerConfig {
    pub model: ModelConfig,
    pub adapter: AdapterConfig,
    pub quantization: QuantizationConfig,
    pub data: DataConfig,
    pub tokenizer: TokenizerConfig,
    pub training: TrainingConfig,
    pub sampling: SamplingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to model weight files (safetensors)
    pub model_path: PathBuf,

    /// Model identifier (e.g., "meta-llama/Llama-3.2-3B-Instruct")
    pub model_id: String,

    /// Maximum sequence length the model accepts
    pub max_sequence_length: usize,

    /// Model hidden size
    pub hidden_size: usize,

    /// Number of attention heads
    pub num_attention_heads: usize,

    /// Number of key/value heads (grouped-query attention)
    pub num_key_value_heads: usize,

    /// Number of hidden layers
    pub num_hidden_layers: usize,

    /// Intermediate size for feed forward layers
    pub intermediate_size: usize,

    /// RMS normalization epsilon
    pub rms_norm_eps: f64,

    /// Vocabulary size
    pub vocab_size: usize,
}

/// Low-rank adapter settings, passed through to the backend as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Low-rank dimension
    pub rank: usize,

    /// Alpha scaling factor
    pub alpha: usize,

    /// Dropout for stability
    pub dropout: f32,

    /// Module names the adapter is injected into
    pub target_modules: Vec<String>,

    /// Whether bias terms are trained
    pub train_bias: bool,
}

/// 4-bit weight storage settings, passed through to the backend as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantizationConfig {
    pub load_in_4bit: bool,
    pub double_quant: bool,
    pub quant_type: QuantType,
    pub compute_dtype: ComputeDtype,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantType {
    Nf4,
    Fp4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDtype {
    Bf16,
    F16,
    F32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// CSV file with columns age, gender, symptoms, diagnoses, procedures
    pub csv_path: PathBuf,

    /// Fraction of records held out for evaluation
    pub eval_fraction: f64,

    /// Shuffle seed for the train/eval split
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizerConfig {
    /// Path to tokenizer.json
    pub tokenizer_path: PathBuf,

    /// Prompt template variant; must match between training and inference
    pub prompt_style: PromptStyle,

    /// How the pad token is obtained
    pub pad_token: PadTokenStrategy,

    /// How batch width is determined
    pub length: LengthStrategy,
}

/// Prompt template variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    /// Chat-style with role headers and explicit turn delimiters
    Chat,
    /// Instruction/response style
    Instruction,
}

/// Pad token policy. The strategies are mutually exclusive and fixed for the
/// lifetime of one training+inference run: the embedding table size depends
/// on whether a token was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PadTokenStrategy {
    /// Reuse the end-of-sequence token as pad
    ReuseEos,
    /// Register a reserved token as pad
    Reserve { token: String },
}

/// Batch width policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum LengthStrategy {
    /// Every sequence is truncated or padded to one constant width
    Fixed { max_length: usize },
    /// Width is the longest natural length in the batch plus one eos slot
    Dynamic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub train_batch_size: usize,
    pub eval_batch_size: usize,
    pub num_epochs: usize,
    pub weight_decay: f64,
    pub logging_steps: usize,
    pub save_total_limit: usize,
    pub output_dir: PathBuf,
    pub mixed_precision: bool,
}

/// Sampling settings for one generation call. `eos_token_id` is filled in by
/// the inference driver from the tokenizer adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub repetition_penalty: f32,
    /// Context window the repetition penalty looks back over
    pub repetition_context_size: usize,
    pub eos_token_id: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            model_id: "meta-llama/Llama-3.2-3B-Instruct".to_string(),
            max_sequence_length: 4096,
            hidden_size: 3072,
            num_attention_heads: 24,
            num_key_value_heads: 8,
            num_hidden_layers: 28,
            intermediate_size: 8192,
            rms_norm_eps: 1e-5,
            vocab_size: 128_256,
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            rank: 16,
            alpha: 32,
            dropout: 0.1,
            target_modules: [
                "q_proj", "k_proj", "v_proj", "o_proj",
                "gate_proj", "up_proj", "down_proj",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            train_bias: false,
        }
    }
}

impl Default for QuantizationConfig {
    fn default() -> Self {
        Self {
            load_in_4bit: true,
            double_quant: true,
            quant_type: QuantType::Nf4,
            compute_dtype: ComputeDtype::Bf16,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::new(),
            eval_fraction: 0.2,
            seed: 42,
        }
    }
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            tokenizer_path: PathBuf::new(),
            prompt_style: PromptStyle::Chat,
            pad_token: PadTokenStrategy::ReuseEos,
            length: LengthStrategy::Fixed { max_length: 256 },
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 2e-4,
            train_batch_size: 2,
            eval_batch_size: 2,
            num_epochs: 4,
            weight_decay: 0.01,
            logging_steps: 200,
            save_total_limit: 3,
            output_dir: PathBuf::from("./results"),
            mixed_precision: true,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 100,
            temperature: 0.8,
            top_p: 0.9,
            repetition_penalty: 1.3,
            repetition_context_size: 128,
            eos_token_id: None,
        }
    }
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            adapter: AdapterConfig::default(),
            quantization: QuantizationConfig::default(),
            data: DataConfig::default(),
            tokenizer: TokenizerConfig::default(),
            training: TrainingConfig::default(),
            sampling: SamplingConfig::default(),
        }
    }
}

impl ModelConfig {
    pub fn to_llama_config(&self, use_flash_attn: bool) -> LlamaConfig {
        LlamaConfig {
            hidden_size: self.hidden_size,
            intermediate_size: self.intermediate_size,
            vocab_size: self.vocab_size,
            num_hidden_layers: self.num_hidden_layers,
            num_attention_heads: self.num_attention_heads,
            num_key_value_heads: self.num_key_value_heads,
            use_flash_attn,
            rms_norm_eps: self.rms_norm_eps,
            rope_theta: 500_000.0,
            bos_token_id: Some(128_000),
            eos_token_id: Some(LlamaEosToks::Single(128_009)),
            rope_scaling: None,
            max_position_embeddings: self.max_sequence_length,
            tie_word_embeddings: false,
        }
    }
}

impl TunerConfig {
    /// Preset matching the chat-style template run: pad reuses eos and every
    /// batch is shaped to a constant 256 tokens.
    pub fn chat_style() -> Self {
        Self {
            tokenizer: TokenizerConfig {
                prompt_style: PromptStyle::Chat,
                pad_token: PadTokenStrategy::ReuseEos,
                length: LengthStrategy::Fixed { max_length: 256 },
                ..TokenizerConfig::default()
            },
            ..Self::default()
        }
    }

    /// Preset matching the instruction-style template run: a reserved pad
    /// token and per-batch dynamic width with an explicit eos slot.
    pub fn instruction_style() -> Self {
        Self {
            tokenizer: TokenizerConfig {
                prompt_style: PromptStyle::Instruction,
                pad_token: PadTokenStrategy::Reserve {
                    token: "<|pad|>".to_string(),
                },
                length: LengthStrategy::Dynamic,
                ..TokenizerConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.data.csv_path.as_os_str().is_empty() {
            return Err(crate::error::TunerError::ConfigurationError {
                message: "CSV path cannot be empty".to_string(),
                parameter: "csv_path".to_string(),
            });
        }

        if !(self.data.eval_fraction > 0.0 && self.data.eval_fraction < 1.0) {
            return Err(crate::error::TunerError::ConfigurationError {
                message: "Eval fraction must be strictly between 0 and 1".to_string(),
                parameter: "eval_fraction".to_string(),
            });
        }

        if let LengthStrategy::Fixed { max_length } = self.tokenizer.length {
            if max_length == 0 {
                return Err(crate::error::TunerError::ConfigurationError {
                    message: "Fixed max length must be positive".to_string(),
                    parameter: "max_length".to_string(),
                });
            }
            if max_length > self.model.max_sequence_length {
                return Err(crate::error::TunerError::ConfigurationError {
                    message: "Fixed max length exceeds the model's sequence limit"
                        .to_string(),
                    parameter: "max_length".to_string(),
                });
            }
        }

        if let PadTokenStrategy::Reserve { token } = &self.tokenizer.pad_token {
            if token.is_empty() {
                return Err(crate::error::TunerError::ConfigurationError {
                    message: "Reserved pad token cannot be empty".to_string(),
                    parameter: "pad_token".to_string(),
                });
            }
        }

        if self.adapter.rank == 0 {
            return Err(crate::error::TunerError::ConfigurationError {
                message: "Adapter rank must be positive".to_string(),
                parameter: "rank".to_string(),
            });
        }

        if self.training.train_batch_size == 0 || self.training.eval_batch_size == 0 {
            return Err(crate::error::TunerError::ConfigurationError {
                message: "Batch sizes must be positive".to_string(),
                parameter: "train_batch_size".to_string(),
            });
        }

        if self.sampling.max_new_tokens == 0 {
            return Err(crate::error::TunerError::ConfigurationError {
                message: "Generation must allow at least one new token".to_string(),
                parameter: "max_new_tokens".to_string(),
            });
        }

        if self.sampling.temperature <= 0.0 {
            return Err(crate::error::TunerError::ConfigurationError {
                message: "Temperature must be positive".to_string(),
                parameter: "temperature".to_string(),
            });
        }

        if !(self.sampling.top_p > 0.0 && self.sampling.top_p <= 1.0) {
            return Err(crate::error::TunerError::ConfigurationError {
                message: "Top-p must be in (0, 1]".to_string(),
                parameter: "top_p".to_string(),
            });
        }

        Ok(())
    }
}
