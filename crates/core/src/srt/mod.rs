//! This module is responsible for SRT parsing and reassembly.
//! Timestamps are kept as opaque strings so timing survives byte for byte.

use crate::error::ParseError;
use tracing::{debug, info, warn};

/// A single numbered subtitle block.
///
/// Everything except the translation is fixed once parsed. The
/// translation may be recorded once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleEntry {
    id: u32,
    timestamp: String,
    text: String,
    translated: Option<String>,
}

impl SubtitleEntry {
    /// Create an entry that has not been translated yet.
    pub fn new(id: u32, timestamp: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            timestamp: timestamp.into(),
            text: text.into(),
            translated: None,
        }
    }

    /// Subtitle number as it appeared in the input.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The time range line, e.g. `00:00:01,000 --> 00:00:02,000`.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Source dialogue, lines joined with `\n`.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The recorded translation, if any.
    pub fn translated(&self) -> Option<&str> {
        self.translated.as_deref()
    }

    /// Record the translation for this entry.
    /// Returns `false` and leaves the entry untouched if one was already recorded.
    pub fn set_translation(&mut self, text: impl Into<String>) -> bool {
        if self.translated.is_some() {
            warn!(id = self.id, "ignoring second translation for entry");
            return false;
        }
        self.translated = Some(text.into());
        true
    }

    /// Text written out by [`format`]: the translation when present,
    /// otherwise the source text.
    pub fn output_text(&self) -> &str {
        self.translated.as_deref().unwrap_or(&self.text)
    }
}

/// Parse SRT text into a list of entries.
///
/// The input is scanned line by line: blank lines are skipped, a line
/// holding an integer opens a block, the next line is its timestamp and
/// every following non blank line that is not a bare integer belongs to
/// its text. Malformed blocks are skipped with a warning. Every line is
/// trimmed before it is stored. Entries keep input order; ids are neither
/// sorted nor deduplicated.
pub fn parse(input: &str) -> Result<Vec<SubtitleEntry>, ParseError> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let lines: Vec<&str> = input.trim_end().lines().map(str::trim).collect();
    let mut entries = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        i += 1;
        if line.is_empty() {
            continue;
        }
        let id: u32 = match line.parse() {
            Ok(id) => id,
            Err(_) => {
                warn!(line_no = i, "skipping block without a numeric id: {line:?}");
                i = skip_body(&lines, i);
                continue;
            }
        };
        if lines.len() - i < 2 {
            warn!(id, "skipping truncated block at end of input");
            break;
        }
        let timestamp = lines[i];
        i += 1;
        if timestamp.is_empty() {
            warn!(id, "skipping block with an empty timestamp line");
            continue;
        }
        let start = i;
        i = skip_body(&lines, i);
        let text = lines[start..i].join("\n");
        debug!(id, timestamp, "parsed entry");
        entries.push(SubtitleEntry::new(id, timestamp, text));
    }
    if entries.is_empty() {
        return Err(ParseError::NoEntries);
    }
    info!("parsed {} subtitle entries", entries.len());
    Ok(entries)
}

/// Return the index of the first line after the text body starting at `from`.
fn skip_body(lines: &[&str], mut from: usize) -> usize {
    while from < lines.len() && !lines[from].is_empty() && !is_bare_integer(lines[from]) {
        from += 1;
    }
    from
}

fn is_bare_integer(line: &str) -> bool {
    !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit())
}

/// Format entries back to SRT text.
/// The way this works is by writing each block sequentially, each one
/// followed by a blank line.
pub fn format(entries: &[SubtitleEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!(
            "{}\n{}\n{}\n\n",
            entry.id,
            entry.timestamp,
            entry.output_text()
        ));
    }
    out
}
