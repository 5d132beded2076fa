//! proctune - parameter-efficient fine-tuning pipeline for medical
//! procedure prediction
//!
//! This crate turns a small tabular dataset of patient records into
//! shape-aligned token batches for adapter fine-tuning of a causal language
//! model, and runs single-example inference against the trained model. The
//! model itself is opaque: anything that touches weights sits behind the
//! [`ModelBackend`] trait, while prompt rendering, tokenization policy, and
//! batch shaping are owned here and guaranteed identical between the
//! training and inference phases.

use std::fmt;
use candle_core::Device;

// Public modules
pub mod backend;
pub mod batch;
pub mod config;
pub mod data;
pub mod error;
pub mod infer;
pub mod pipeline;
pub mod prompt;
pub mod tokenizer;
pub mod train;
pub mod types;
pub mod utils;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-exports for public API
pub use backend::{CandleBackend, ModelBackend, SimulatedBackend, TrainingReport};
pub use batch::BatchShaper;
pub use config::{LengthStrategy, PadTokenStrategy, PromptStyle, SamplingConfig, TunerConfig};
pub use data::{load_records, PatientRecord};
pub use error::{Result, TunerError};
pub use pipeline::{PipelineBuilder, RunMetadata, TunerPipeline};
pub use prompt::PromptTemplate;
pub use tokenizer::TokenizerAdapter;
pub use types::{Prediction, ShapedBatch, TokenSequence};

/// Feature detection for supported compute devices
pub struct Features {
    /// Whether CUDA support is enabled
    pub cuda: bool,
    /// Number of detected CUDA devices
    pub cuda_devices: usize,
}

impl Features {
    /// Detect available features at runtime
    pub fn detect() -> Self {
        #[cfg(feature = "cuda")]
        let (cuda, cuda_devices) = {
            match Device::new_cuda(0) {
                Ok(_) => {
                    let count = (0..8).filter(|&i| Device::new_cuda(i).is_ok()).count();
                    (true, count)
                }
                Err(_) => (false, 0),
            }
        };

        #[cfg(not(feature = "cuda"))]
        let (cuda, cuda_devices) = {
            let _ = Device::Cpu;
            (false, 0)
        };

        Self { cuda, cuda_devices }
    }
}

impl fmt::Display for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CUDA support: {}", if self.cuda { "yes" } else { "no" })?;
        if self.cuda {
            writeln!(f, "CUDA devices: {}", self.cuda_devices)?;
        }
        Ok(())
    }
}
