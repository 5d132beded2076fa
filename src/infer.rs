//! Inference driver: formats one record, generates, and strips the echoed
//! prompt from the decoded output.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::backend::ModelBackend;
use crate::batch::BatchShaper;
use crate::config::TunerConfig;
use crate::data::PatientRecord;
use crate::error::Result;
use crate::prompt::PromptTemplate;
use crate::tokenizer::TokenizerAdapter;
use crate::types::Prediction;

pub struct Predictor {
    config: Arc<TunerConfig>,
    template: PromptTemplate,
    shaper: Arc<BatchShaper>,
    adapter: Arc<TokenizerAdapter>,
}

impl Predictor {
    pub fn new(
        config: Arc<TunerConfig>,
        template: PromptTemplate,
        shaper: Arc<BatchShaper>,
        adapter: Arc<TokenizerAdapter>,
    ) -> Self {
        Self {
            config,
            template,
            shaper,
            adapter,
        }
    }

    /// Predict the procedure for one record.
    ///
    /// Uses the same template and the same shaping code path as training.
    /// `trained_length` is the persisted training-time width; when present,
    /// dynamic single-example sequences are padded up to it.
    pub async fn predict(
        &self,
        backend: &dyn ModelBackend,
        record: &PatientRecord,
        trained_length: Option<usize>,
    ) -> Result<Prediction> {
        let start = Instant::now();

        let prompt = self.template.render(record);
        let mut sequence = self.shaper.shape_one(&prompt)?;

        if let Some(length) = trained_length {
            if sequence.len() < length {
                sequence.pad_to(length, self.adapter.pad_token_id());
            } else if sequence.len() > length {
                warn!(
                    sequence_length = sequence.len(),
                    trained_length = length,
                    "Prompt is wider than the training-time width"
                );
            }
        }

        let mut sampling = self.config.sampling.clone();
        sampling.eos_token_id = Some(self.adapter.eos_token_id());

        let tokens = backend.generate(&sequence, &sampling).await?;
        let decoded = self.adapter.decode(&tokens, true)?;
        let text = strip_echoed_prompt(&decoded, &prompt);

        debug!(
            prompt_len = prompt.len(),
            decoded_len = decoded.len(),
            "Generated prediction"
        );

        Ok(Prediction {
            text,
            tokens,
            processing_time: start.elapsed(),
        })
    }
}

/// Remove the echoed prompt prefix from decoded output.
///
/// Tokenizer normalization can make the echo differ from the raw prompt, or
/// make the decoded text shorter than it; in that case the full decoded text
/// is returned rather than erroring. Byte-offset removal snaps forward to a
/// char boundary.
pub(crate) fn strip_echoed_prompt(decoded: &str, prompt: &str) -> String {
    if let Some(rest) = decoded.strip_prefix(prompt) {
        return rest.trim().to_string();
    }
    if decoded.len() <= prompt.len() {
        return decoded.to_string();
    }

    let mut cut = prompt.len();
    while cut < decoded.len() && !decoded.is_char_boundary(cut) {
        cut += 1;
    }
    decoded[cut..].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;
    use crate::config::{LengthStrategy, PromptStyle, TokenizerConfig};
    use crate::tokenizer::testing;

    const WORDS: &[&str] = &[
        "chest", "pain", "hypertension", "angiography", "coronary", "Age",
        "Gender", "Female", "Symptoms", "Diagnoses", "Response",
    ];

    fn example_record() -> PatientRecord {
        PatientRecord {
            age: 55,
            gender: "Female".to_string(),
            symptoms: "chest pain, shortness of breath".to_string(),
            diagnoses: "hypertension, coronary artery disease".to_string(),
            procedures: String::new(),
        }
    }

    fn predictor(strategy: LengthStrategy) -> (Predictor, Arc<BatchShaper>) {
        let config = Arc::new(TunerConfig::default());
        let adapter = Arc::new(testing::adapter(WORDS, &TokenizerConfig::default()));
        let shaper = Arc::new(BatchShaper::new(adapter.clone(), strategy));
        (
            Predictor::new(
                config,
                PromptTemplate::new(PromptStyle::Instruction),
                shaper.clone(),
                adapter,
            ),
            shaper,
        )
    }

    #[tokio::test]
    async fn test_predict_sends_exact_prompt_tokens() {
        let (predictor, shaper) = predictor(LengthStrategy::Dynamic);
        let backend = SimulatedBackend::new(vec![5]);

        predictor
            .predict(&backend, &example_record(), None)
            .await
            .unwrap();

        let expected_prompt = "### Instruction: Based on the provided patient \
             information, generate a precise medical procedure.### Context:  Age: 55, \
             Gender: Female, Symptoms: chest pain, shortness of breath, \
             Diagnoses: hypertension, coronary artery disease.\n### Response:";

        let calls = backend.generate_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].input,
            shaper.shape_one(expected_prompt).unwrap(),
            "inference must tokenize the exact training-template prompt"
        );
    }

    #[tokio::test]
    async fn test_predict_fills_eos_into_sampling() {
        let (predictor, _) = predictor(LengthStrategy::Dynamic);
        let backend = SimulatedBackend::new(vec![5]);

        predictor
            .predict(&backend, &example_record(), None)
            .await
            .unwrap();

        let calls = backend.generate_calls();
        assert_eq!(calls[0].sampling.eos_token_id, Some(1));
        assert_eq!(calls[0].sampling.max_new_tokens, 100);
    }

    #[tokio::test]
    async fn test_predict_pads_to_trained_length() {
        let (predictor, _) = predictor(LengthStrategy::Dynamic);
        let backend = SimulatedBackend::new(vec![5]);

        predictor
            .predict(&backend, &example_record(), Some(120))
            .await
            .unwrap();

        let calls = backend.generate_calls();
        assert_eq!(calls[0].input.len(), 120);
        assert!(calls[0].input.mask_is_contiguous());
    }

    #[tokio::test]
    async fn test_predict_returns_nonempty_suffix() {
        let (predictor, _) = predictor(LengthStrategy::Dynamic);
        // continuation decodes to a known content word
        let backend = SimulatedBackend::new(vec![5]);

        let prediction = predictor
            .predict(&backend, &example_record(), None)
            .await
            .unwrap();

        assert!(!prediction.text.is_empty());
    }

    #[test]
    fn test_strip_exact_prefix() {
        let stripped = strip_echoed_prompt("prompt text answer here", "prompt text");
        assert_eq!(stripped, "answer here");
    }

    #[test]
    fn test_strip_shorter_decode_returns_full_text() {
        let stripped = strip_echoed_prompt("short", "a much longer prompt than that");
        assert_eq!(stripped, "short");
    }

    #[test]
    fn test_strip_normalized_echo_drops_prompt_length() {
        // echo differs from the prompt but the continuation survives
        let stripped = strip_echoed_prompt("PROMPT TEXT answer", "prompt text");
        assert_eq!(stripped, "answer");
    }

    #[test]
    fn test_strip_snaps_to_char_boundary() {
        // the 4-byte offset lands inside the two-byte 'é'
        let stripped = strip_echoed_prompt("caf\u{00e9} au lait", "cafX");
        assert_eq!(stripped, "au lait");
    }
}
