//! Common type definitions used throughout the pipeline

use std::time::Duration;
use serde::{Deserialize, Serialize};

/// A tokenized sequence with its attention mask.
///
/// Invariant: `ids.len() == mask.len()`. Padding is always applied on the
/// right, so the mask is a contiguous run of 1s followed by a contiguous run
/// of 0s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSequence {
    /// Token IDs
    pub ids: Vec<u32>,
    /// Attention mask (1 = real token, 0 = padding)
    pub mask: Vec<u8>,
}

impl TokenSequence {
    /// Create a sequence of real tokens, all attended.
    pub fn new(ids: Vec<u32>) -> Self {
        let mask = vec![1u8; ids.len()];
        Self { ids, mask }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of attended (non-padding) positions.
    pub fn content_len(&self) -> usize {
        self.mask.iter().filter(|&&m| m == 1).count()
    }

    /// The attended prefix of the sequence.
    pub fn content_ids(&self) -> &[u32] {
        &self.ids[..self.content_len()]
    }

    /// Append an explicit end-of-sequence token as real content.
    pub fn append_eos(&mut self, eos_token_id: u32) {
        self.ids.push(eos_token_id);
        self.mask.push(1);
    }

    /// Right-pad with `pad_token_id` up to `target_len`. No-op when the
    /// sequence is already at least that long.
    pub fn pad_to(&mut self, target_len: usize, pad_token_id: u32) {
        if self.len() >= target_len {
            return;
        }
        let pad_len = target_len - self.len();
        self.ids.extend(std::iter::repeat(pad_token_id).take(pad_len));
        self.mask.extend(std::iter::repeat(0u8).take(pad_len));
    }

    /// Truncate to `target_len`, keeping the prefix.
    pub fn truncate_to(&mut self, target_len: usize) {
        self.ids.truncate(target_len);
        self.mask.truncate(target_len);
    }

    /// Check the padding invariant: no attended position after a padded one.
    pub fn mask_is_contiguous(&self) -> bool {
        self.ids.len() == self.mask.len()
            && self.mask.windows(2).all(|w| w[0] >= w[1])
    }
}

/// A batch of sequences sharing one width, ready for the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapedBatch {
    pub sequences: Vec<TokenSequence>,
    /// Shared width of every sequence in the batch.
    pub sequence_length: usize,
}

impl ShapedBatch {
    pub fn batch_size(&self) -> usize {
        self.sequences.len()
    }

    /// Flatten into row-major (ids, mask) buffers for tensor construction.
    pub fn flatten(&self) -> (Vec<u32>, Vec<u8>) {
        let capacity = self.sequences.len() * self.sequence_length;
        let mut ids = Vec::with_capacity(capacity);
        let mut mask = Vec::with_capacity(capacity);
        for sequence in &self.sequences {
            ids.extend_from_slice(&sequence.ids);
            mask.extend_from_slice(&sequence.mask);
        }
        (ids, mask)
    }
}

/// Result of one inference call.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Predicted procedure text, prompt echo removed.
    pub text: String,
    /// Raw token IDs returned by the backend.
    pub tokens: Vec<u32>,
    /// Time taken to generate.
    pub processing_time: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sequence_fully_attended() {
        let sequence = TokenSequence::new(vec![5, 6, 7]);
        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence.mask, vec![1, 1, 1]);
        assert_eq!(sequence.content_len(), 3);
    }

    #[test]
    fn test_pad_to_extends_right() {
        let mut sequence = TokenSequence::new(vec![1, 2, 3]);
        sequence.pad_to(5, 0);
        assert_eq!(sequence.ids, vec![1, 2, 3, 0, 0]);
        assert_eq!(sequence.mask, vec![1, 1, 1, 0, 0]);
        assert!(sequence.mask_is_contiguous());
    }

    #[test]
    fn test_pad_to_shorter_target_is_noop() {
        let mut sequence = TokenSequence::new(vec![1, 2, 3]);
        sequence.pad_to(2, 0);
        assert_eq!(sequence.len(), 3);
    }

    #[test]
    fn test_truncate_keeps_prefix() {
        let mut sequence = TokenSequence::new(vec![1, 2, 3, 4]);
        sequence.truncate_to(2);
        assert_eq!(sequence.ids, vec![1, 2]);
        assert_eq!(sequence.mask, vec![1, 1]);
    }

    #[test]
    fn test_append_eos_is_attended() {
        let mut sequence = TokenSequence::new(vec![1, 2]);
        sequence.append_eos(99);
        assert_eq!(sequence.ids, vec![1, 2, 99]);
        assert_eq!(sequence.mask, vec![1, 1, 1]);
    }

    #[test]
    fn test_content_ids_stops_at_padding() {
        let mut sequence = TokenSequence::new(vec![1, 2]);
        sequence.pad_to(4, 0);
        assert_eq!(sequence.content_ids(), &[1, 2]);
    }

    #[test]
    fn test_flatten_row_major() {
        let mut a = TokenSequence::new(vec![1, 2]);
        a.pad_to(3, 0);
        let b = TokenSequence::new(vec![4, 5, 6]);
        let batch = ShapedBatch {
            sequences: vec![a, b],
            sequence_length: 3,
        };
        let (ids, mask) = batch.flatten();
        assert_eq!(ids, vec![1, 2, 0, 4, 5, 6]);
        assert_eq!(mask, vec![1, 1, 0, 1, 1, 1]);
    }
}
