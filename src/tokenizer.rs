//! Tokenizer adapter owning all special-token policy.
//!
//! The pad token id, end-of-sequence id, and padding side are resolved once
//! at construction and never mutated afterwards, so training-time and
//! inference-time tokenization cannot drift apart within one run.

use std::path::Path;
use tokenizers::{AddedToken, Tokenizer as HfTokenizer};

use crate::config::{PadTokenStrategy, TokenizerConfig};
use crate::error::{Result, TunerError};

/// End-of-sequence token names probed in order.
const EOS_CANDIDATES: &[&str] = &["</s>", "<|end_of_text|>", "<|eot_id|>", "<|endoftext|>"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub eos_token_id: u32,
    pub pad_token_id: u32,
}

pub struct TokenizerAdapter {
    tokenizer: HfTokenizer,
    special: SpecialTokens,
    /// Whether a reserved pad token was registered. When true the model's
    /// embedding table must be resized by the backend before training.
    pad_token_added: bool,
}

impl TokenizerAdapter {
    /// Load a tokenizer from a file and resolve its special-token policy.
    pub fn from_file(path: impl AsRef<Path>, config: &TokenizerConfig) -> Result<Self> {
        let tokenizer =
            HfTokenizer::from_file(path.as_ref()).map_err(|e| TunerError::TokenizerError {
                message: format!("Failed to load tokenizer: {}", e),
            })?;
        Self::new(tokenizer, config)
    }

    /// Wrap an already constructed tokenizer.
    pub fn new(mut tokenizer: HfTokenizer, config: &TokenizerConfig) -> Result<Self> {
        let eos_token_id = EOS_CANDIDATES
            .iter()
            .find_map(|token| tokenizer.token_to_id(token))
            .ok_or_else(|| TunerError::TokenizerError {
                message: "Vocabulary has no end-of-sequence token".to_string(),
            })?;

        let (pad_token_id, pad_token_added) = match &config.pad_token {
            PadTokenStrategy::ReuseEos => (eos_token_id, false),
            PadTokenStrategy::Reserve { token } => match tokenizer.token_to_id(token) {
                Some(id) => (id, false),
                None => {
                    tokenizer.add_special_tokens(&[AddedToken::from(token.clone(), true)]);
                    let id = tokenizer.token_to_id(token).ok_or_else(|| {
                        TunerError::TokenizerError {
                            message: format!("Failed to register pad token {:?}", token),
                        }
                    })?;
                    (id, true)
                }
            },
        };

        Ok(Self {
            tokenizer,
            special: SpecialTokens {
                eos_token_id,
                pad_token_id,
            },
            pad_token_added,
        })
    }

    /// Encode text to its natural-length token IDs. Padding and truncation
    /// are applied downstream by the batch shaper.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self.tokenizer.encode(text, true).map_err(|e| {
            TunerError::TokenizerError {
                message: format!("Tokenization failed: {}", e),
            }
        })?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Decode token IDs back to text.
    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.tokenizer
            .decode(ids, skip_special_tokens)
            .map_err(|e| TunerError::TokenizerError {
                message: format!("Decoding failed: {}", e),
            })
    }

    pub fn special_tokens(&self) -> SpecialTokens {
        self.special
    }

    pub fn eos_token_id(&self) -> u32 {
        self.special.eos_token_id
    }

    pub fn pad_token_id(&self) -> u32 {
        self.special.pad_token_id
    }

    /// True when the pad token was registered as a new reserved token rather
    /// than reusing an existing vocabulary entry.
    pub fn pad_token_was_added(&self) -> bool {
        self.pad_token_added
    }

    /// Vocabulary size including added tokens.
    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenizerConfig;

    #[test]
    fn test_reuse_eos_strategy() {
        let config = TokenizerConfig::default();
        let adapter = testing::adapter(&["chest", "pain"], &config);

        assert_eq!(adapter.eos_token_id(), 1);
        assert_eq!(adapter.pad_token_id(), adapter.eos_token_id());
        assert!(!adapter.pad_token_was_added());
    }

    #[test]
    fn test_reserve_strategy_registers_new_token() {
        let config = TokenizerConfig {
            pad_token: PadTokenStrategy::Reserve {
                token: "<|pad|>".to_string(),
            },
            ..TokenizerConfig::default()
        };
        let adapter = testing::adapter(&["chest", "pain"], &config);

        assert_ne!(adapter.pad_token_id(), adapter.eos_token_id());
        assert!(adapter.pad_token_was_added());
        // The embedding table must grow to cover the new id
        assert!((adapter.pad_token_id() as usize) < adapter.vocab_size());
    }

    #[test]
    fn test_encode_natural_length() {
        let config = TokenizerConfig::default();
        let adapter = testing::adapter(&["chest", "pain"], &config);

        let ids = adapter.encode("chest pain").unwrap();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_decode_skips_special_tokens() {
        let config = TokenizerConfig::default();
        let adapter = testing::adapter(&["chest", "pain"], &config);

        let decoded = adapter.decode(&[2, 3, 1, 1], true).unwrap();
        assert_eq!(decoded.trim(), "chest pain");
    }

    #[test]
    fn test_round_trip_preserves_content_words() {
        let config = TokenizerConfig::default();
        let adapter = testing::adapter(
            &["chest", "pain", "shortness", "of", "breath"],
            &config,
        );

        let text = "chest pain shortness of breath";
        let ids = adapter.encode(text).unwrap();
        let decoded = adapter.decode(&ids, true).unwrap();
        for word in text.split_whitespace() {
            assert!(decoded.contains(word), "dropped content word {:?}", word);
        }
    }

    #[test]
    fn test_missing_eos_is_an_error() {
        use std::collections::HashMap;
        use tokenizers::models::wordlevel::WordLevel;

        let mut vocab = HashMap::new();
        vocab.insert("[UNK]".to_string(), 0u32);
        let model = WordLevel::builder()
            .vocab(vocab)
            .unk_token("[UNK]".to_string())
            .build()
            .unwrap();
        let tokenizer = tokenizers::Tokenizer::new(model);

        let result = TokenizerAdapter::new(tokenizer, &TokenizerConfig::default());
        assert!(result.is_err());
    }
}
