//! Prompt rendering from structured patient records.
//!
//! The two template variants must not be mixed within one run: the variant
//! used for training must be the one used at inference, since tokenized
//! lengths and the decode/strip step both depend on the exact text.

use crate::config::PromptStyle;
use crate::data::PatientRecord;

const CHAT_SYSTEM_TURN: &str = "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\
You are a helpful AI assistant for medical procedure prediction. \
Remember, maintain a natural tone. Be precise, concise, and casual. \
Use only the procedures to generate answers. <|eot|>";

const INSTRUCTION_HEADER: &str = "### Instruction: Based on the provided patient \
information, generate a precise medical procedure.";

/// Renders a [`PatientRecord`] into a prompt string.
///
/// Rendering is deterministic: two calls with identical input are
/// byte-identical, and every field appears exactly once in a stable order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    style: PromptStyle,
}

impl PromptTemplate {
    pub fn new(style: PromptStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> PromptStyle {
        self.style
    }

    /// Render a record. An empty `procedures` field (the inference case) is
    /// substituted as-is and never an error.
    pub fn render(&self, record: &PatientRecord) -> String {
        match self.style {
            PromptStyle::Chat => format!(
                "{}<|start_header_id|>user<|end_header_id|>\
                 Given the patient information: Age: {}, Gender: {}, Symptoms: {}, Diagnoses: {} <|eot|>\
                 <|start_header_id|>assistant<|end_header_id|> {}. <|eot|><|end_of_text|>",
                CHAT_SYSTEM_TURN,
                record.age,
                record.gender,
                record.symptoms,
                record.diagnoses,
                record.procedures,
            ),
            PromptStyle::Instruction => {
                let mut prompt = format!(
                    "{}### Context:  Age: {}, Gender: {}, Symptoms: {}, Diagnoses: {}.\n### Response:",
                    INSTRUCTION_HEADER,
                    record.age,
                    record.gender,
                    record.symptoms,
                    record.diagnoses,
                );
                if !record.procedures.is_empty() {
                    prompt.push(' ');
                    prompt.push_str(&record.procedures);
                }
                prompt
            }
        }
    }
}
