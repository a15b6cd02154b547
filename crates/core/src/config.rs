//! Configuration for a translation run.

use crate::error::ConfigError;
use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;

/// Default number of subtitle entries translated per batch.
pub const DEFAULT_BATCH_SIZE: usize = 60;

/// Batch sizes accepted from callers.
pub const BATCH_SIZE_RANGE: RangeInclusive<usize> = 10..=100;

/// Neighbouring entries used as context when translating a selection.
pub const DEFAULT_SELECTION_CONTEXT: usize = 5;

/// Default base URL of the Gemini REST API.
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default generation model.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-lite";

/// Settings for a whole document translation.
#[derive(Clone)]
pub struct TranslationConfig {
    /// Human readable name of the language the subtitles are written in.
    pub source_language: String,
    /// Human readable name of the language to translate into.
    pub target_language: String,
    /// Number of entries sent to the model per request.
    pub batch_size: usize,
    /// Credential for the generation endpoint.
    pub api_credential: String,
    /// Free form label such as a movie title, shown to the model.
    pub scenario: Option<String>,
    /// Entries before and after each batch supplied as context.
    pub context_radius: usize,
    /// Pause between two consecutive batches.
    pub batch_delay: Duration,
    pub retry: RetryPolicy,
    pub generation: GenerationSettings,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            source_language: "English".into(),
            target_language: "Malayalam".into(),
            batch_size: DEFAULT_BATCH_SIZE,
            api_credential: String::new(),
            scenario: None,
            context_radius: 0,
            batch_delay: Duration::from_secs(1),
            retry: RetryPolicy::default(),
            generation: GenerationSettings::default(),
        }
    }
}

impl TranslationConfig {
    /// Check the caller facing fields.
    /// The credential is only checked by [`TranslationConfig::validate_credential`]
    /// since injected translators do not need one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !BATCH_SIZE_RANGE.contains(&self.batch_size) {
            return Err(ConfigError::BatchSizeOutOfRange(self.batch_size));
        }
        if self.source_language.trim().is_empty() {
            return Err(ConfigError::EmptyLanguage("source"));
        }
        if self.target_language.trim().is_empty() {
            return Err(ConfigError::EmptyLanguage("target"));
        }
        Ok(())
    }

    /// Check that a credential for the generation endpoint is present.
    pub fn validate_credential(&self) -> Result<(), ConfigError> {
        if self.api_credential.trim().is_empty() {
            return Err(ConfigError::MissingCredential);
        }
        Ok(())
    }
}

impl fmt::Debug for TranslationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationConfig")
            .field("source_language", &self.source_language)
            .field("target_language", &self.target_language)
            .field("batch_size", &self.batch_size)
            .field("api_credential", &"<redacted>")
            .field("scenario", &self.scenario)
            .field("context_radius", &self.context_radius)
            .field("batch_delay", &self.batch_delay)
            .field("retry", &self.retry)
            .field("generation", &self.generation)
            .finish()
    }
}

/// How often and how patiently a failed request is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Attempt `k` waits `k * base_delay` before the next attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Fixed sampling parameters of the generation model.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            model: DEFAULT_MODEL.into(),
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 4096,
        }
    }
}
