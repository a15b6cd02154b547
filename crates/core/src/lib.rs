//! Core library for translating SRT subtitles with a text-generation model.
//! The binary crate is a thin front end over the functions exported here.

pub mod batch;
pub mod config;
pub mod error;
pub mod srt;
pub mod translate;

pub use config::{GenerationSettings, RetryPolicy, TranslationConfig};
pub use error::{ConfigError, GenerationError, ParseError, TranslateError};
pub use srt::{parse, SubtitleEntry};
pub use translate::{
    translate_document, Orchestrator, TranslationRequest, Translator, TRANSLATION_ERROR,
};
