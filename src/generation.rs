//! Grounded answer synthesis over retrieved chunks.
//!
//! The model only ever sees the retrieved `[chunk_id] text` lines. When no
//! retrieved chunk carries text, the canned [`NO_CONTEXT_ANSWER`] is returned
//! and the model is never called.
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::retriever::ScoredChunk;

pub const NO_CONTEXT_ANSWER: &str = "No context available to answer the question.";

const GROUNDING_INSTRUCTIONS: &str = "You are a helpful assistant that answers using ONLY the provided context. \
Cite the chunk ids you rely on using [chunk-id] notation. \
If the answer cannot be found in the context, say you do not know based on the provided context.";

/// Failure to pull answer text out of a model response.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("response body is not a valid Responses payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("response contained no output text")]
    NoText,
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generator misconfigured: {0}")]
    Misconfigured(String),

    #[error("generation request failed: {0}")]
    RequestFailed(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// A language model that completes one instruction + prompt pair.
pub trait Generator: Send + Sync {
    fn complete(
        &self,
        instructions: &str,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, GenerationError>;

    fn model_name(&self) -> &str;
}

/// `[chunk_id] text` lines for every context with non-blank text.
pub fn build_context_block(contexts: &[ScoredChunk]) -> String {
    contexts
        .iter()
        .filter(|c| !c.text.trim().is_empty())
        .map(|c| format!("[{}] {}", c.chunk_id, c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Answer `question` from `contexts` only.
pub fn generate_answer(
    generator: &dyn Generator,
    question: &str,
    contexts: &[ScoredChunk],
    max_output_tokens: u32,
) -> Result<String, GenerationError> {
    let context_block = build_context_block(contexts);
    if context_block.trim().is_empty() {
        return Ok(NO_CONTEXT_ANSWER.to_string());
    }

    let prompt =
        format!("Context:\n{context_block}\n\nQuestion: {question}\n\nAnswer with citations.");
    generator.complete(GROUNDING_INSTRUCTIONS, &prompt, max_output_tokens)
}

// ── Responses API decoding ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ResponsesEnvelope {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Pull the answer out of a Responses API body.
///
/// Prefers the convenience `output_text` field, then concatenates the text
/// blocks of the output items.
pub fn extract_text(body: serde_json::Value) -> Result<String, ExtractionError> {
    let envelope: ResponsesEnvelope = serde_json::from_value(body)?;

    if let Some(text) = envelope.output_text.as_deref()
        && !text.trim().is_empty()
    {
        return Ok(text.trim().to_string());
    }

    let joined: String = envelope
        .output
        .iter()
        .flat_map(|item| item.content.iter())
        .filter_map(|block| block.text.as_deref())
        .collect();
    if joined.trim().is_empty() {
        return Err(ExtractionError::NoText);
    }
    Ok(joined.trim().to_string())
}

// ── OpenAI client ────────────────────────────────────────────────────

pub struct OpenAiGenerator {
    client: Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: [InputMessage<'a>; 2],
    max_output_tokens: u32,
}

#[derive(Serialize)]
struct InputMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl OpenAiGenerator {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        if api_key.trim().is_empty() {
            return Err(GenerationError::Misconfigured(
                "OPENAI_API_KEY is not set".to_string(),
            ));
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
                .map_err(|_| GenerationError::Misconfigured("invalid API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| GenerationError::Misconfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/responses", base_url.trim_end_matches('/')),
            model,
        })
    }
}

impl Generator for OpenAiGenerator {
    fn complete(
        &self,
        instructions: &str,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, GenerationError> {
        let request = ResponsesRequest {
            model: &self.model,
            input: [
                InputMessage {
                    role: "system",
                    content: instructions,
                },
                InputMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_output_tokens,
        };

        debug!(model = %self.model, max_output_tokens, "requesting grounded answer");
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(GenerationError::RequestFailed(format!("{status}: {body}")));
        }

        let body: serde_json::Value = resp
            .json()
            .map_err(|e| GenerationError::RequestFailed(format!("unreadable body: {e}")))?;
        Ok(extract_text(body)?)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::chunker::ChunkMetadata;
    use parking_lot::Mutex;
    use serde_json::json;

    struct RecordingGenerator {
        calls: Mutex<Vec<(String, u32)>>,
    }

    impl Generator for RecordingGenerator {
        fn complete(
            &self,
            _instructions: &str,
            prompt: &str,
            max_output_tokens: u32,
        ) -> Result<String, GenerationError> {
            self.calls.lock().push((prompt.to_string(), max_output_tokens));
            Ok("Customers liked the service [record-1-chunk-0].".to_string())
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    fn scored(id: &str, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk_id: id.to_string(),
            score: 0.9,
            text: text.to_string(),
            metadata: ChunkMetadata {
                row_index: 1,
                sentiment: String::new(),
                source: String::new(),
                date: String::new(),
                user_id: String::new(),
                location: String::new(),
                confidence_score: 0.0,
                chunk_index: 0,
                char_start: 0,
                char_end: text.chars().count(),
            },
        }
    }

    #[test]
    fn test_no_context_skips_model() {
        let generator = RecordingGenerator {
            calls: Mutex::new(Vec::new()),
        };
        let answer = generate_answer(&generator, "why?", &[], 100).unwrap();
        assert_eq!(answer, NO_CONTEXT_ANSWER);

        let blank = vec![scored("record-1-chunk-0", "   ")];
        let answer = generate_answer(&generator, "why?", &blank, 100).unwrap();
        assert_eq!(answer, NO_CONTEXT_ANSWER);
        assert!(generator.calls.lock().is_empty());
    }

    #[test]
    fn test_prompt_carries_cited_context() {
        let generator = RecordingGenerator {
            calls: Mutex::new(Vec::new()),
        };
        let contexts = vec![
            scored("record-1-chunk-0", "Great service"),
            scored("record-2-chunk-0", ""),
            scored("record-3-chunk-1", "Slow checkout"),
        ];
        generate_answer(&generator, "How was service?", &contexts, 256).unwrap();

        let calls = generator.calls.lock();
        assert_eq!(calls.len(), 1);
        let (prompt, tokens) = &calls[0];
        assert_eq!(*tokens, 256);
        assert!(prompt.starts_with("Context:\n[record-1-chunk-0] Great service\n\n[record-3-chunk-1] Slow checkout"));
        assert!(!prompt.contains("record-2-chunk-0"));
        assert!(prompt.contains("Question: How was service?"));
    }

    #[test]
    fn test_extract_output_text() {
        let body = json!({"output_text": "  Answer [record-1-chunk-0]  ", "output": []});
        assert_eq!(extract_text(body).unwrap(), "Answer [record-1-chunk-0]");
    }

    #[test]
    fn test_extract_falls_back_to_blocks() {
        let body = json!({
            "output_text": "",
            "output": [{
                "type": "message",
                "content": [
                    {"type": "output_text", "text": "Part one. "},
                    {"type": "refusal"},
                    {"type": "output_text", "text": "Part two."}
                ]
            }]
        });
        assert_eq!(extract_text(body).unwrap(), "Part one. Part two.");
    }

    #[test]
    fn test_extract_no_text() {
        let body = json!({"output": [{"type": "reasoning", "content": []}]});
        assert!(matches!(extract_text(body), Err(ExtractionError::NoText)));
    }

    #[test]
    fn test_extract_malformed() {
        let body = json!({"output": "not a list"});
        assert!(matches!(extract_text(body), Err(ExtractionError::Malformed(_))));
    }

    #[test]
    fn test_generator_requires_key() {
        assert!(matches!(
            OpenAiGenerator::new("", "https://api.openai.com/v1", "gpt".into(), Duration::from_secs(1)),
            Err(GenerationError::Misconfigured(_))
        ));
    }
}
