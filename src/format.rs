//! Output formats and caption-cue rendering.
//!
//! Five formats are supported: `json` (structured document, handled by the
//! worker via serde), `srt` and `webvtt` (subtitle formats with timing), and
//! `text` / `pretty` (plain text, optionally timestamped per line). The
//! comment prefix used by stats headers is format-dependent: subtitle formats
//! use `NOTE `, text formats use `# `.

use clap::ValueEnum;

use crate::transport::Cue;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Structured JSON document with metadata, stats, and raw cues.
    Json,
    /// SubRip subtitles (numbered blocks, `,`-separated milliseconds).
    Srt,
    /// WebVTT subtitles (`WEBVTT` preamble, `.`-separated milliseconds).
    Webvtt,
    /// Plain text, one cue per line (`-t` adds timestamps).
    Text,
    /// Plain text with timestamps always on.
    Pretty,
}

impl Format {
    /// File extension for this format, without the leading dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Srt => "srt",
            Format::Webvtt => "vtt",
            Format::Text | Format::Pretty => "txt",
        }
    }

    /// Comment prefix for stats headers (`NOTE ` for subtitle formats,
    /// `# ` for text formats). JSON embeds stats structurally instead.
    #[must_use]
    pub fn comment_prefix(self) -> &'static str {
        match self {
            Format::Srt | Format::Webvtt => "NOTE ",
            _ => "# ",
        }
    }

    /// Whether `pretty`-style per-line timestamps are forced on.
    #[must_use]
    pub fn forces_timestamps(self) -> bool {
        matches!(self, Format::Pretty)
    }

    /// Renders a cue list as the body text for this format.
    ///
    /// `show_timestamps` only affects `text`/`pretty`; `pretty` forces it on.
    /// JSON documents are serialized via serde by the caller, so the `Json`
    /// arm renders the plain-text fallback.
    #[must_use]
    pub fn render_cues(self, cues: &[Cue], show_timestamps: bool) -> String {
        match self {
            Format::Srt => render_srt(cues),
            Format::Webvtt => render_webvtt(cues),
            Format::Text | Format::Json => render_text(cues, show_timestamps),
            Format::Pretty => render_text(cues, true),
        }
    }
}

/// `HH:MM:SS<sep>mmm` timestamp used by the subtitle formats.
fn subtitle_timestamp(seconds: f64, ms_separator: char) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02}{}{:03}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        ms_separator,
        ms
    )
}

/// `H:MM:SS.mmm` timestamp used for the `[..]` prefix in timestamped text.
fn text_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{}:{:02}:{:02}.{:03}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        ms
    )
}

fn render_srt(cues: &[Cue]) -> String {
    let blocks: Vec<String> = cues
        .iter()
        .enumerate()
        .map(|(i, cue)| {
            format!(
                "{}\n{} --> {}\n{}",
                i + 1,
                subtitle_timestamp(cue.start, ','),
                subtitle_timestamp(cue.start + cue.duration, ','),
                cue.text
            )
        })
        .collect();
    blocks.join("\n\n") + "\n"
}

fn render_webvtt(cues: &[Cue]) -> String {
    let blocks: Vec<String> = cues
        .iter()
        .map(|cue| {
            format!(
                "{} --> {}\n{}",
                subtitle_timestamp(cue.start, '.'),
                subtitle_timestamp(cue.start + cue.duration, '.'),
                cue.text
            )
        })
        .collect();
    format!("WEBVTT\n\n{}\n", blocks.join("\n\n"))
}

fn render_text(cues: &[Cue], show_timestamps: bool) -> String {
    let lines: Vec<String> = cues
        .iter()
        .map(|cue| {
            if show_timestamps {
                format!("[{}] {}", text_timestamp(cue.start), cue.text)
            } else {
                cue.text.clone()
            }
        })
        .collect();
    lines.join("\n")
}
