//! Batch shaping: turning formatted prompts into width-aligned token
//! sequences with attention masks.

use std::sync::Arc;
use tracing::trace;

use crate::config::LengthStrategy;
use crate::error::{Result, TunerError};
use crate::tokenizer::TokenizerAdapter;
use crate::types::{ShapedBatch, TokenSequence};

/// Shapes formatted prompts into batches.
///
/// Inference-time single examples flow through the same [`shape`] code path
/// as training batches, so the two can never diverge.
///
/// [`shape`]: BatchShaper::shape
pub struct BatchShaper {
    adapter: Arc<TokenizerAdapter>,
    strategy: LengthStrategy,
}

impl BatchShaper {
    pub fn new(adapter: Arc<TokenizerAdapter>, strategy: LengthStrategy) -> Self {
        Self { adapter, strategy }
    }

    pub fn strategy(&self) -> LengthStrategy {
        self.strategy
    }

    /// Shape a batch of prompts. Every sequence in the result shares one
    /// width; masks are a run of 1s followed by a run of 0s.
    pub fn shape(&self, prompts: &[String]) -> Result<ShapedBatch> {
        if prompts.is_empty() {
            return Err(TunerError::ShapingError {
                message: "Cannot shape an empty batch".to_string(),
            });
        }

        let mut encoded = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            encoded.push(self.adapter.encode(prompt)?);
        }

        let batch = match self.strategy {
            LengthStrategy::Fixed { max_length } => self.shape_fixed(encoded, max_length),
            LengthStrategy::Dynamic => self.shape_dynamic(encoded),
        };

        trace!(
            batch_size = batch.batch_size(),
            sequence_length = batch.sequence_length,
            "Shaped batch"
        );
        Ok(batch)
    }

    /// Shape one prompt through the batch path.
    pub fn shape_one(&self, prompt: &str) -> Result<TokenSequence> {
        let batch = self.shape(std::slice::from_ref(&prompt.to_string()))?;
        Ok(batch
            .sequences
            .into_iter()
            .next()
            .expect("batch of one has one sequence"))
    }

    /// Every sequence truncated or right-padded to one constant width.
    fn shape_fixed(&self, encoded: Vec<Vec<u32>>, max_length: usize) -> ShapedBatch {
        let pad_id = self.adapter.pad_token_id();
        let sequences = encoded
            .into_iter()
            .map(|ids| {
                let mut sequence = TokenSequence::new(ids);
                sequence.truncate_to(max_length);
                sequence.pad_to(max_length, pad_id);
                sequence
            })
            .collect();

        ShapedBatch {
            sequences,
            sequence_length: max_length,
        }
    }

    /// Width is the longest natural length plus one slot for an explicit
    /// end-of-sequence token, which every sequence receives before pad
    /// filler.
    fn shape_dynamic(&self, encoded: Vec<Vec<u32>>) -> ShapedBatch {
        let eos_id = self.adapter.eos_token_id();
        let pad_id = self.adapter.pad_token_id();

        let max_natural = encoded.iter().map(|ids| ids.len()).max().unwrap_or(0);
        let target = max_natural + 1;

        let sequences = encoded
            .into_iter()
            .map(|ids| {
                let mut sequence = TokenSequence::new(ids);
                sequence.append_eos(eos_id);
                sequence.pad_to(target, pad_id);
                sequence
            })
            .collect();

        ShapedBatch {
            sequences,
            sequence_length: target,
        }
    }
}
