//! Prompt construction for subtitle batches.

use super::IndexedLine;
use std::fmt::Write;

/// Build the instruction sent to the model for one batch.
///
/// `lines` must already be single line strings; the caller encodes
/// embedded line breaks beforehand.
pub fn build(
    source_language: &str,
    target_language: &str,
    lines: &[String],
    context: &[IndexedLine],
    scenario: Option<&str>,
) -> String {
    let count = lines.len();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "You are an expert subtitle translator. Translate the following {source_language} subtitle lines into {target_language}."
    );
    if let Some(scenario) = scenario.map(str::trim).filter(|s| !s.is_empty()) {
        let _ = writeln!(out, "The subtitles belong to: {scenario}");
    }
    out.push('\n');
    out.push_str("Guidelines:\n");
    let _ = writeln!(
        out,
        "1. Write in proper {target_language} script using its native Unicode characters. Never answer with romanized or transliterated text."
    );
    let _ = writeln!(
        out,
        "2. Use natural, colloquial {target_language} dialogue instead of literal word-for-word translation."
    );
    out.push_str("3. Match the tone, emotion and register (formal or informal) of every line.\n");
    out.push_str("4. Keep character names, places and technical terms in their original form.\n");
    out.push_str("5. Keep translations concise enough to read on screen.\n");
    let _ = writeln!(
        out,
        "6. The text to translate has exactly {count} line(s). Answer with exactly {count} line(s), one translation per input line, in the same order."
    );
    let _ = writeln!(
        out,
        "7. Keep every {marker} marker where it appears; it stands for a line break inside one subtitle.",
        marker = super::client::LINE_BREAK_MARKER
    );
    out.push_str("8. Do not add numbering, explanations or any other text.\n");

    if !context.is_empty() {
        out.push_str("\nSurrounding subtitles, for reference only. Do not translate them:\n");
        for line in context {
            let _ = writeln!(out, "Line {}: {}", line.index, line.text);
        }
    }

    let _ = writeln!(out, "\n{source_language} subtitles:");
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    let _ = write!(
        out,
        "\nProvide only the {target_language} translations in {target_language} script, one per line, {count} line(s) in total."
    );
    out
}
