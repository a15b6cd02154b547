//! Translation client: wraps a text generator with prompt construction,
//! retries and line count alignment.

use super::{prompt, IndexedLine, TranslationRequest, Translator};
use crate::config::{RetryPolicy, TranslationConfig};
use crate::error::GenerationError;
use async_trait::async_trait;
use tracing::{debug, error, warn};

/// Text stored for every line whose translation failed for good.
pub const TRANSLATION_ERROR: &str = "TRANSLATION_ERROR";

/// Stands for a line break inside one subtitle while it travels through the prompt.
pub const LINE_BREAK_MARKER: &str = "<br>";

/// A remote text-generation endpoint.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate text for a single prompt.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// [`Translator`] backed by a [`Generator`].
///
/// Never fails: once every attempt is used up each requested line comes
/// back as [`TRANSLATION_ERROR`].
pub struct TranslationClient<G> {
    generator: G,
    source_language: String,
    target_language: String,
    retry: RetryPolicy,
}

impl<G: Generator> TranslationClient<G> {
    /// Create a client using the languages and retry policy from `config`.
    pub fn new(generator: G, config: &TranslationConfig) -> Self {
        Self {
            generator,
            source_language: config.source_language.clone(),
            target_language: config.target_language.clone(),
            retry: config.retry,
        }
    }
}

#[async_trait]
impl<G: Generator> Translator for TranslationClient<G> {
    async fn translate_batch(&self, request: &TranslationRequest) -> Vec<String> {
        let expected = request.lines.len();
        if expected == 0 {
            return Vec::new();
        }
        let lines: Vec<String> = request.lines.iter().map(|l| encode_line(l)).collect();
        let context: Vec<IndexedLine> = request
            .context
            .iter()
            .map(|c| IndexedLine {
                index: c.index,
                text: encode_line(&c.text),
            })
            .collect();
        let prompt = prompt::build(
            &self.source_language,
            &self.target_language,
            &lines,
            &context,
            request.scenario.as_deref(),
        );
        debug!("prompt has {} bytes for {expected} lines", prompt.len());

        let attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.generator.generate(&prompt).await {
                Ok(text) => {
                    return fit_line_count(&text, expected)
                        .iter()
                        .map(|l| decode_line(l))
                        .collect();
                }
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!("batch translation attempt {attempt} failed: {err}. Retrying...");
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                }
                Err(err) => {
                    error!("batch translation failed after {attempt} attempts: {err}");
                    break;
                }
            }
        }
        vec![TRANSLATION_ERROR.to_string(); expected]
    }
}

/// Split a generated blob into exactly `expected` lines.
/// Extra lines are dropped and missing ones are filled with empty strings.
pub fn fit_line_count(text: &str, expected: usize) -> Vec<String> {
    let mut lines: Vec<String> = text.trim().lines().map(str::to_string).collect();
    if lines.len() != expected {
        warn!(
            "translation returned {} lines, expected {expected}. Adjusting...",
            lines.len()
        );
        lines.resize(expected, String::new());
    }
    lines
}

/// Collapse a multi line subtitle into a single prompt line.
fn encode_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(&format!(" {LINE_BREAK_MARKER} "))
}

/// Undo [`encode_line`] on a generated line.
fn decode_line(line: &str) -> String {
    line.split(LINE_BREAK_MARKER)
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
}
