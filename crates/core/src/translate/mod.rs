//! Translation orchestration utilities.
//! This module wires subtitle parsing, batched model calls and reassembly.

use crate::batch::{batch_ranges, context_ranges};
use crate::config::TranslationConfig;
use crate::error::TranslateError;
use crate::srt::{self, SubtitleEntry};
use async_trait::async_trait;
use std::ops::Range;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

pub mod client;
pub mod gemini;
pub mod prompt;

pub use client::{Generator, TranslationClient, TRANSLATION_ERROR};
pub use gemini::GeminiGenerator;

/// Represents a single line paired with its SRT index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedLine {
    /// SRT index associated with the line.
    pub index: u32,
    /// Text content of the line.
    pub text: String,
}

/// One batch handed to a [`Translator`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationRequest {
    /// Texts to translate, one per subtitle entry.
    pub lines: Vec<String>,
    /// Neighbouring entries shown to the model but not translated.
    pub context: Vec<IndexedLine>,
    /// Free form label such as a movie title.
    pub scenario: Option<String>,
}

/// Translates a batch of lines with optional context.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `request.lines`, returning one string per input line in
    /// the same order. Failures are absorbed by the implementation.
    async fn translate_batch(&self, request: &TranslationRequest) -> Vec<String>;
}

/// Drives parsing, batching, translation and reassembly of one document.
pub struct Orchestrator<T> {
    translator: T,
    config: TranslationConfig,
}

impl Orchestrator<TranslationClient<GeminiGenerator>> {
    /// Orchestrator talking to Gemini with the credential and settings in `config`.
    pub fn with_gemini(config: TranslationConfig) -> Result<Self, TranslateError> {
        config.validate()?;
        config.validate_credential()?;
        let generator =
            GeminiGenerator::new(config.api_credential.clone(), config.generation.clone());
        let client = TranslationClient::new(generator, &config);
        Ok(Self::new(client, config))
    }
}

impl<T: Translator> Orchestrator<T> {
    /// Create an orchestrator around an already built translator.
    pub fn new(translator: T, config: TranslationConfig) -> Self {
        Self { translator, config }
    }

    /// Translate every entry of `raw` and return the reassembled SRT text.
    ///
    /// `on_progress` receives the fraction of translated entries after each
    /// batch and 1.0 once the output is ready. Only a structural parse
    /// failure, an invalid configuration or cancellation end the run early.
    pub async fn translate_document<P>(
        &self,
        raw: &str,
        mut on_progress: P,
        cancel: &CancellationToken,
    ) -> Result<String, TranslateError>
    where
        P: FnMut(f64),
    {
        self.config.validate()?;
        let mut entries = srt::parse(raw)?;
        let positions: Vec<usize> = (0..entries.len()).collect();
        self.translate_positions(&mut entries, &positions, &mut on_progress, cancel)
            .await?;
        let out = srt::format(&entries);
        on_progress(1.0);
        Ok(out)
    }

    /// Translate only the entries with ids in `first..=last` and return them
    /// as SRT text. Entries around the selection are used as context.
    ///
    /// A missing or smaller `last` selects `first` alone.
    pub async fn translate_selection<P>(
        &self,
        raw: &str,
        first: u32,
        last: Option<u32>,
        mut on_progress: P,
        cancel: &CancellationToken,
    ) -> Result<String, TranslateError>
    where
        P: FnMut(f64),
    {
        self.config.validate()?;
        let last = last.filter(|l| *l >= first).unwrap_or(first);
        let mut entries = srt::parse(raw)?;
        let positions = selection_positions(&entries, first, last);
        if positions.is_empty() {
            return Err(TranslateError::EmptySelection { first, last });
        }
        info!(
            "selected entries {}-{} ({} of {})",
            first,
            last,
            positions.len(),
            entries.len()
        );
        self.translate_positions(&mut entries, &positions, &mut on_progress, cancel)
            .await?;
        let selected: Vec<SubtitleEntry> = positions.iter().map(|&p| entries[p].clone()).collect();
        let out = srt::format(&selected);
        on_progress(1.0);
        Ok(out)
    }

    /// Translate the entries at `positions` (ascending) batch by batch,
    /// recording a translation on every one of them.
    async fn translate_positions<P>(
        &self,
        entries: &mut [SubtitleEntry],
        positions: &[usize],
        on_progress: &mut P,
        cancel: &CancellationToken,
    ) -> Result<(), TranslateError>
    where
        P: FnMut(f64),
    {
        let total = positions.len();
        let batch_size = self.config.batch_size;
        let ranges: Vec<Range<usize>> = batch_ranges(total, batch_size).collect();
        let batch_count = ranges.len();
        let document = 0..entries.len();
        on_progress(0.0);

        let mut completed = 0;
        let mut last_ms: Option<u128> = None;
        for (n, range) in ranges.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!("translation cancelled after {completed} of {total} entries");
                return Err(TranslateError::Cancelled { completed, total });
            }
            let batch = &positions[range];
            info!(
                "translating batch {}/{}, subtitles {}-{} of {}",
                n + 1,
                batch_count,
                batch[0] + 1,
                batch[batch.len() - 1] + 1,
                document.end
            );
            let request = self.request_for(entries, batch, &document);
            let begin = Instant::now();
            let translated = self.translator.translate_batch(&request).await;
            let elapsed = begin.elapsed().as_millis();
            if translated.len() != batch.len() {
                warn!(
                    "translator returned {} lines for {} entries",
                    translated.len(),
                    batch.len()
                );
            }
            let mut translated = translated.into_iter();
            for &pos in batch {
                let text = translated
                    .next()
                    .unwrap_or_else(|| TRANSLATION_ERROR.to_string());
                entries[pos].set_translation(text);
            }
            completed += batch.len();
            info!(
                "translated lines {}-{} in {} ms",
                batch[0] + 1,
                batch[batch.len() - 1] + 1,
                elapsed
            );
            on_progress(completed as f64 / total as f64);
            info!("completed {}%", completed * 100 / total);

            let remaining = total - completed;
            if remaining == 0 {
                break;
            }
            if let Some(prev) = last_ms {
                let estimate = estimate_remaining(prev, elapsed, remaining, batch_size);
                info!("ETA: {}", format_eta(estimate));
            }
            last_ms = Some(elapsed);
            tokio::select! {
                _ = tokio::time::sleep(self.config.batch_delay) => {}
                _ = cancel.cancelled() => {}
            }
        }
        Ok(())
    }

    /// Build the request for `batch` (ascending positions). Context is every
    /// entry within `context_radius` of the batch that the batch does not
    /// itself translate.
    fn request_for(
        &self,
        entries: &[SubtitleEntry],
        batch: &[usize],
        document: &Range<usize>,
    ) -> TranslationRequest {
        let covered = batch[0]..batch[batch.len() - 1] + 1;
        let [before, after] = context_ranges(&covered, document, self.config.context_radius);
        let context = (before.start..after.end)
            .filter(|p| batch.binary_search(p).is_err())
            .map(|p| IndexedLine {
                index: entries[p].id(),
                text: entries[p].text().to_string(),
            })
            .collect();
        TranslationRequest {
            lines: batch.iter().map(|&p| entries[p].text().to_string()).collect(),
            context,
            scenario: self.config.scenario.clone(),
        }
    }
}

/// Translate a whole SRT document with the Gemini endpoint described by `config`.
///
/// Only structural failures are returned as errors; entries whose batch
/// could not be translated carry [`TRANSLATION_ERROR`].
pub async fn translate_document<P>(
    raw: &str,
    config: &TranslationConfig,
    on_progress: P,
) -> Result<String, TranslateError>
where
    P: FnMut(f64),
{
    Orchestrator::with_gemini(config.clone())?
        .translate_document(raw, on_progress, &CancellationToken::new())
        .await
}

/// Positions, in document order, of every entry whose id lies in `first..=last`.
fn selection_positions(entries: &[SubtitleEntry], first: u32, last: u32) -> Vec<usize> {
    let ids = first..=last;
    entries
        .iter()
        .enumerate()
        .filter(|(_, e)| ids.contains(&e.id()))
        .map(|(pos, _)| pos)
        .collect()
}

/// Estimate remaining time in milliseconds for the translation.
/// The way this works is by averaging `prev_ms` and `curr_ms` and
/// multiplying by the number of batches left.
fn estimate_remaining(prev_ms: u128, curr_ms: u128, remaining: usize, batch: usize) -> u128 {
    trace!(
        "estimate_remaining prev_ms={} curr_ms={} remaining={} batch={}",
        prev_ms,
        curr_ms,
        remaining,
        batch
    );
    let avg = (prev_ms + curr_ms) / 2;
    let batches = remaining.div_ceil(batch.max(1));
    avg * batches as u128
}

/// Format a duration in milliseconds as "X minutes Y seconds".
fn format_eta(ms: u128) -> String {
    let total_secs = ms / 1000;
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    let plural = |n: u128| if n == 1 { "" } else { "s" };
    if minutes > 0 {
        format!(
            "{minutes} minute{} {seconds} second{}",
            plural(minutes),
            plural(seconds)
        )
    } else {
        format!("{seconds} second{}", plural(seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::error::{GenerationError, ParseError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const TWO_ENTRIES: &str =
        "1\n00:00:01,000 --> 00:00:02,000\nHello\n\n2\n00:00:03,000 --> 00:00:04,000\nWorld\n\n";

    fn config(batch_size: usize) -> TranslationConfig {
        TranslationConfig {
            batch_size,
            batch_delay: Duration::ZERO,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::ZERO,
            },
            ..Default::default()
        }
    }

    /// Build `n` entries whose text is `line{id}`.
    fn document(n: u32) -> String {
        (1..=n)
            .map(|i| format!("{i}\n00:00:{i:02},000 --> 00:00:{i:02},500\nline{i}\n\n"))
            .collect()
    }

    /// Translator returning canned lines for every batch.
    struct FixedTr(Vec<&'static str>);

    #[async_trait]
    impl Translator for FixedTr {
        async fn translate_batch(&self, _request: &TranslationRequest) -> Vec<String> {
            self.0.iter().map(|s| s.to_string()).collect()
        }
    }

    /// Translate by prefixing each line with `pt:` and keep every request.
    #[derive(Clone, Default)]
    struct RecordingTr {
        requests: Arc<Mutex<Vec<TranslationRequest>>>,
    }

    #[async_trait]
    impl Translator for RecordingTr {
        async fn translate_batch(&self, request: &TranslationRequest) -> Vec<String> {
            self.requests.lock().unwrap().push(request.clone());
            request.lines.iter().map(|l| format!("pt:{l}")).collect()
        }
    }

    /// Generator failing every call.
    #[derive(Clone, Default)]
    struct DownGenerator {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Generator for DownGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(GenerationError::Status {
                status: 500,
                message: "down".into(),
            })
        }
    }

    #[tokio::test]
    async fn translates_two_entries_end_to_end() {
        let orch = Orchestrator::new(FixedTr(vec!["Bonjour", "Monde"]), config(60));
        let out = orch
            .translate_document(TWO_ENTRIES, |_| {}, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            out,
            "1\n00:00:01,000 --> 00:00:02,000\nBonjour\n\n2\n00:00:03,000 --> 00:00:04,000\nMonde\n\n"
        );
    }

    #[tokio::test]
    async fn keeps_ids_timestamps_and_count_across_batches() {
        let raw = document(25);
        let tr = RecordingTr::default();
        let mut progress = Vec::new();
        let out = Orchestrator::new(tr.clone(), config(10))
            .translate_document(&raw, |p| progress.push(p), &CancellationToken::new())
            .await
            .unwrap();

        let source = srt::parse(&raw).unwrap();
        let translated = srt::parse(&out).unwrap();
        assert_eq!(translated.len(), 25);
        for (src, dst) in source.iter().zip(&translated) {
            assert_eq!(src.id(), dst.id());
            assert_eq!(src.timestamp(), dst.timestamp());
            assert_eq!(dst.text(), format!("pt:{}", src.text()));
        }

        let sizes: Vec<usize> = tr
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.lines.len())
            .collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(progress, vec![0.0, 0.4, 0.8, 1.0, 1.0]);
    }

    #[tokio::test]
    async fn short_translator_output_is_filled_with_sentinel() {
        let orch = Orchestrator::new(FixedTr(vec!["only"]), config(10));
        let out = orch
            .translate_document(TWO_ENTRIES, |_| {}, &CancellationToken::new())
            .await
            .unwrap();
        let entries = srt::parse(&out).unwrap();
        assert_eq!(entries[0].text(), "only");
        assert_eq!(entries[1].text(), TRANSLATION_ERROR);
    }

    #[tokio::test]
    async fn failed_batches_get_sentinel_and_loop_continues() {
        let generator = DownGenerator::default();
        let cfg = config(10);
        let client = TranslationClient::new(generator.clone(), &cfg);
        let raw = document(15);
        let mut progress = Vec::new();
        let out = Orchestrator::new(client, cfg)
            .translate_document(&raw, |p| progress.push(p), &CancellationToken::new())
            .await
            .unwrap();
        let entries = srt::parse(&out).unwrap();
        assert_eq!(entries.len(), 15);
        assert!(entries.iter().all(|e| e.text() == TRANSLATION_ERROR));
        // two batches, three attempts each
        assert_eq!(generator.calls.load(Ordering::SeqCst), 6);
        assert_eq!(progress.last(), Some(&1.0));
    }

    #[tokio::test]
    async fn parse_failure_stops_before_translation() {
        let tr = RecordingTr::default();
        let mut progress = Vec::new();
        let err = Orchestrator::new(tr.clone(), config(10))
            .translate_document(
                "not a subtitle file",
                |p| progress.push(p),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TranslateError::Parse(ParseError::NoEntries)));
        assert!(tr.requests.lock().unwrap().is_empty());
        assert!(progress.is_empty());
    }

    #[tokio::test]
    async fn invalid_batch_size_is_rejected() {
        let err = Orchestrator::new(RecordingTr::default(), config(5))
            .translate_document(TWO_ENTRIES, |_| {}, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TranslateError::Config(_)));
    }

    #[tokio::test]
    async fn cancellation_is_checked_between_batches() {
        /// Cancels the token while translating the first batch.
        struct CancellingTr(CancellationToken, Arc<AtomicUsize>);

        #[async_trait]
        impl Translator for CancellingTr {
            async fn translate_batch(&self, request: &TranslationRequest) -> Vec<String> {
                self.1.fetch_add(1, Ordering::SeqCst);
                self.0.cancel();
                request.lines.clone()
            }
        }

        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut cfg = config(10);
        cfg.batch_delay = Duration::from_secs(3600);
        let orch = Orchestrator::new(CancellingTr(cancel.clone(), calls.clone()), cfg);
        let err = orch
            .translate_document(&document(30), |_| {}, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TranslateError::Cancelled {
                completed: 10,
                total: 30
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn batches_carry_neighbouring_context() {
        let tr = RecordingTr::default();
        let mut cfg = config(10);
        cfg.context_radius = 2;
        cfg.scenario = Some("Pilot".into());
        Orchestrator::new(tr.clone(), cfg)
            .translate_document(&document(20), |_| {}, &CancellationToken::new())
            .await
            .unwrap();
        let requests = tr.requests.lock().unwrap();
        let ctx: Vec<u32> = requests[0].context.iter().map(|c| c.index).collect();
        assert_eq!(ctx, vec![11, 12]);
        let ctx: Vec<u32> = requests[1].context.iter().map(|c| c.index).collect();
        assert_eq!(ctx, vec![9, 10]);
        assert_eq!(requests[1].context[0].text, "line9");
        assert_eq!(requests[0].scenario.as_deref(), Some("Pilot"));
    }

    #[tokio::test]
    async fn selection_translates_only_the_range() {
        let tr = RecordingTr::default();
        let mut cfg = config(10);
        cfg.context_radius = 5;
        let out = Orchestrator::new(tr.clone(), cfg)
            .translate_selection(&document(20), 8, Some(10), |_| {}, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            out,
            "8\n00:00:08,000 --> 00:00:08,500\npt:line8\n\n\
             9\n00:00:09,000 --> 00:00:09,500\npt:line9\n\n\
             10\n00:00:10,000 --> 00:00:10,500\npt:line10\n\n"
        );
        let requests = tr.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let ctx: Vec<u32> = requests[0].context.iter().map(|c| c.index).collect();
        assert_eq!(ctx, vec![3, 4, 5, 6, 7, 11, 12, 13, 14, 15]);
    }

    #[tokio::test]
    async fn selection_skips_out_of_range_ids_between_matches() {
        let raw = "2\nt2\ntwo\n\n9\nt9\nnine\n\n3\nt3\nthree\n\n";
        let tr = RecordingTr::default();
        let mut cfg = config(10);
        cfg.context_radius = 1;
        let out = Orchestrator::new(tr.clone(), cfg)
            .translate_selection(raw, 2, Some(3), |_| {}, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "2\nt2\npt:two\n\n3\nt3\npt:three\n\n");
        assert!(!out.contains("nine"));
        let requests = tr.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].lines, vec!["two", "three"]);
        let ctx: Vec<u32> = requests[0].context.iter().map(|c| c.index).collect();
        assert_eq!(ctx, vec![9]);
    }

    #[tokio::test]
    async fn selection_without_end_takes_single_entry() {
        let out = Orchestrator::new(RecordingTr::default(), config(10))
            .translate_selection(TWO_ENTRIES, 2, Some(1), |_| {}, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "2\n00:00:03,000 --> 00:00:04,000\npt:World\n\n");
    }

    #[tokio::test]
    async fn empty_selection_is_an_error() {
        let err = Orchestrator::new(RecordingTr::default(), config(10))
            .translate_selection(TWO_ENTRIES, 40, Some(50), |_| {}, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TranslateError::EmptySelection { first: 40, last: 50 }
        ));
    }

    #[tokio::test]
    async fn gemini_document_requires_credential() {
        let err = translate_document(TWO_ENTRIES, &config(10), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, TranslateError::Config(_)));
    }

    #[tokio::test]
    async fn gemini_document_end_to_end() {
        use httpmock::prelude::*;
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/gemini-2.0-flash-lite:generateContent")
                    .query_param("key", "secret")
                    .body_contains("Hello\\nWorld");
                then.status(200).json_body(serde_json::json!({
                    "candidates": [{"content": {"parts": [{"text": "Bonjour\nMonde\n"}]}}]
                }));
            })
            .await;
        let mut cfg = config(10);
        cfg.api_credential = "secret".into();
        cfg.generation.endpoint = server.base_url();
        let out = translate_document(TWO_ENTRIES, &cfg, |_| {}).await.unwrap();
        assert_eq!(
            out,
            "1\n00:00:01,000 --> 00:00:02,000\nBonjour\n\n2\n00:00:03,000 --> 00:00:04,000\nMonde\n\n"
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn gemini_outage_degrades_to_sentinel() {
        use httpmock::prelude::*;
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(503)
                    .json_body(serde_json::json!({"error": {"message": "unavailable"}}));
            })
            .await;
        let mut cfg = config(10);
        cfg.api_credential = "secret".into();
        cfg.generation.endpoint = server.base_url();
        let out = translate_document(TWO_ENTRIES, &cfg, |_| {}).await.unwrap();
        assert_eq!(
            out,
            "1\n00:00:01,000 --> 00:00:02,000\nTRANSLATION_ERROR\n\n\
             2\n00:00:03,000 --> 00:00:04,000\nTRANSLATION_ERROR\n\n"
        );
        mock.assert_hits_async(3).await;
    }

    /// Verify the time estimation uses the average of the last two calls and remaining batches.
    #[test]
    fn estimates_remaining_time() {
        let ms = estimate_remaining(1000, 2000, 65, 50);
        assert_eq!(ms, 3000);
    }

    /// Ensure the ETA formatter outputs minutes and seconds.
    #[test]
    fn formats_eta() {
        assert_eq!(format_eta(110_000), "1 minute 50 seconds");
        assert_eq!(format_eta(45_000), "45 seconds");
        assert_eq!(format_eta(61_000), "1 minute 1 second");
    }
}
