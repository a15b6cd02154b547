//! Binary entry point for the subtitle translator.

use anyhow::{Context, Result};
use clap::Parser;
use srtgem_core::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_SELECTION_CONTEXT,
};
use srtgem_core::{GenerationSettings, Orchestrator, TranslationConfig};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Command line options for the binary.
#[derive(Parser)]
#[command(version, about = "Translate SRT subtitles with Gemini")]
struct Cli {
    /// Enable verbose debug and trace logs.
    #[arg(long)]
    debug: bool,

    /// Language the subtitles are written in.
    #[arg(long, default_value = "English")]
    source: String,

    /// Language to translate into.
    #[arg(long, default_value = "Malayalam")]
    target: String,

    /// Number of subtitle entries to translate per request (10-100).
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Title or scenario shown to the model. Defaults to the input file name.
    #[arg(long)]
    scenario: Option<String>,

    /// Translate only entries starting at this id.
    #[arg(long)]
    from: Option<u32>,

    /// Last id of the selection. Defaults to `--from`.
    #[arg(long, requires = "from")]
    to: Option<u32>,

    /// Entries before and after each batch passed to the model as context.
    /// Defaults to 5 for selections and 0 otherwise.
    #[arg(long)]
    context: Option<usize>,

    /// Generation model identifier.
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Base URL of the generation API.
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Where to write the translation. Defaults to a file next to the input.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to the SRT file we want to translate.
    input: PathBuf,
}

impl fmt::Debug for Cli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cli")
            .field("debug", &self.debug)
            .field("source", &self.source)
            .field("target", &self.target)
            .field("batch_size", &self.batch_size)
            .field("api_key", &"<redacted>")
            .field("scenario", &self.scenario)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("context", &self.context)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("output", &self.output)
            .field("input", &self.input)
            .finish()
    }
}

impl Cli {
    /// Map the parsed flags onto a translation config.
    fn config(&self) -> TranslationConfig {
        let scenario = self.scenario.clone().or_else(|| {
            self.input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        });
        let default_context = if self.from.is_some() {
            DEFAULT_SELECTION_CONTEXT
        } else {
            0
        };
        TranslationConfig {
            source_language: self.source.clone(),
            target_language: self.target.clone(),
            batch_size: self.batch_size,
            api_credential: self.api_key.clone(),
            scenario,
            context_radius: self.context.unwrap_or(default_context),
            generation: GenerationSettings {
                endpoint: self.endpoint.clone(),
                model: self.model.clone(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// The `(first, last)` ids of the requested selection, if any.
    fn selection(&self) -> Option<(u32, u32)> {
        self.from
            .map(|first| (first, self.to.filter(|l| *l >= first).unwrap_or(first)))
    }
}

/// Build the output path next to `input`, e.g. `movie_malayalam.srt`.
fn output_path(input: &Path, target: &str, selection: Option<(u32, u32)>) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let lang: String = target
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let name = match selection {
        Some((first, last)) => format!("{stem}_{lang}_{first}-{last}.srt"),
        None => format!("{stem}_{lang}.srt"),
    };
    input.with_file_name(name)
}

/// Install the tracing subscriber, verbose when `debug` is set.
fn init_logging(debug: bool) -> Result<()> {
    let filter = if debug {
        EnvFilter::default()
            .add_directive("srtgem=trace".parse()?)
            .add_directive("srtgem_core=trace".parse()?)
            .add_directive("info".parse()?)
    } else {
        EnvFilter::default()
            .add_directive("srtgem=info".parse()?)
            .add_directive("srtgem_core=info".parse()?)
            .add_directive("warn".parse()?)
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Application entry point which parses CLI args and performs actions.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug)?;

    info!("reading subtitles from {}", cli.input.display());
    let raw = fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    let orchestrator = Orchestrator::with_gemini(cli.config())?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping before the next batch");
                cancel.cancel();
            }
        }
    });

    let progress = |p: f64| debug!("translation progress: {:.1}%", p * 100.0);
    let selection = cli.selection();
    let translated = match selection {
        Some((first, last)) => {
            orchestrator
                .translate_selection(&raw, first, Some(last), progress, &cancel)
                .await?
        }
        None => {
            orchestrator
                .translate_document(&raw, progress, &cancel)
                .await?
        }
    };

    let out_path = cli
        .output
        .clone()
        .unwrap_or_else(|| output_path(&cli.input, &cli.target, selection));
    info!("writing output to {}", out_path.display());
    fs::write(&out_path, translated)
        .with_context(|| format!("failed to write {}", out_path.display()))?;
    info!("wrote {}", out_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["srtgem", "--api-key", "k"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn output_path_sits_next_to_input() {
        let input = Path::new("/videos/Night Train.srt");
        assert_eq!(
            output_path(input, "Malayalam", None),
            PathBuf::from("/videos/Night Train_malayalam.srt")
        );
        assert_eq!(
            output_path(input, "Brazilian Portuguese", Some((3, 9))),
            PathBuf::from("/videos/Night Train_brazilian_portuguese_3-9.srt")
        );
    }

    #[test]
    fn defaults_map_onto_config() {
        let cli = parse(&["movie.srt"]);
        let cfg = cli.config();
        assert_eq!(cfg.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(cfg.source_language, "English");
        assert_eq!(cfg.target_language, "Malayalam");
        assert_eq!(cfg.scenario.as_deref(), Some("movie"));
        assert_eq!(cfg.context_radius, 0);
        assert_eq!(cfg.api_credential, "k");
        assert_eq!(cfg.generation.model, DEFAULT_MODEL);
        assert!(cli.selection().is_none());
    }

    #[test]
    fn selection_uses_context_by_default() {
        let cli = parse(&["--from", "12", "movie.srt"]);
        assert_eq!(cli.selection(), Some((12, 12)));
        assert_eq!(cli.config().context_radius, DEFAULT_SELECTION_CONTEXT);

        let cli = parse(&["--from", "12", "--to", "20", "--context", "2", "movie.srt"]);
        assert_eq!(cli.selection(), Some((12, 20)));
        assert_eq!(cli.config().context_radius, 2);
    }

    #[test]
    fn debug_output_hides_api_key() {
        let argv = ["srtgem", "--api-key", "super-secret", "movie.srt"];
        let cli = Cli::try_parse_from(argv).unwrap();
        let out = format!("{cli:?}");
        assert!(!out.contains("super-secret"));
        assert!(out.contains("<redacted>"));
        assert!(out.contains("movie.srt"));
    }

    #[test]
    fn to_requires_from() {
        let res = Cli::try_parse_from(["srtgem", "--api-key", "k", "--to", "3", "movie.srt"]);
        assert!(res.is_err());
    }

    #[test]
    fn explicit_scenario_wins() {
        let cli = parse(&["--scenario", "Pilot episode", "--target", "French", "s01e01.srt"]);
        let cfg = cli.config();
        assert_eq!(cfg.scenario.as_deref(), Some("Pilot episode"));
        assert_eq!(cfg.target_language, "French");
    }
}
