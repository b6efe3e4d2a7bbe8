//! Concatenation of per-video outputs into combined files.
//!
//! Text and subtitle outputs are joined with a visible separator rule per
//! video; JSON outputs become a container document with an `items` array.
//! With `--split N[wlc]` the combined output rolls over into numbered
//! segments whenever appending the next video would push the segment past
//! the cap — measured on the final document, header included, so the cap is
//! honored exactly. A single oversized video still gets a segment of its
//! own; rollover never fires on an empty accumulator.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::filename::write_atomic;
use crate::format::Format;
use crate::header::fixed_point_header;
use crate::stats::{TextStats, text_stats};
use crate::worker::{DownloadResult, DownloadStatus, TranscriptDocument};

/// Longest title fragment shown in a separator rule.
const SEPARATOR_TITLE_CHARS: usize = 50;

/// Which stats dimension a split cap applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitUnit {
    /// Cap on words.
    Words,
    /// Cap on lines.
    Lines,
    /// Cap on characters.
    Chars,
}

impl SplitUnit {
    fn select(self, stats: TextStats) -> u64 {
        match self {
            SplitUnit::Words => stats.words,
            SplitUnit::Lines => stats.lines,
            SplitUnit::Chars => stats.chars,
        }
    }
}

/// A parsed `--split` cap, e.g. `12000c` or `5000w`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitRule {
    /// Maximum value of the chosen dimension per segment.
    pub limit: u64,
    /// Dimension the cap applies to.
    pub unit: SplitUnit,
}

/// Error from parsing a `--split` value.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid split rule {0:?}: expected <number><w|l|c>, e.g. 12000c")]
pub struct ParseSplitError(String);

impl FromStr for SplitRule {
    type Err = ParseSplitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let unit = match s.chars().last() {
            Some('w') => SplitUnit::Words,
            Some('l') => SplitUnit::Lines,
            Some('c') => SplitUnit::Chars,
            _ => return Err(ParseSplitError(s.to_string())),
        };
        let number = &s[..s.len() - 1];
        let limit: u64 = number
            .parse()
            .map_err(|_| ParseSplitError(s.to_string()))?;
        if limit == 0 {
            return Err(ParseSplitError(s.to_string()));
        }
        Ok(SplitRule { limit, unit })
    }
}

/// Errors from the concatenation pass.
#[derive(Debug, Error)]
pub enum ConcatError {
    /// A per-video output could not be read or the combined file written.
    #[error("i/o failure on {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A per-video JSON document failed to parse.
    #[error("malformed document {path}: {source}")]
    Json {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Where and how to write the combined output.
#[derive(Debug, Clone)]
pub struct ConcatOptions {
    /// Output directory (same as the per-video outputs).
    pub folder: PathBuf,
    /// Basename for combined files, without extension.
    pub base: String,
    /// Format of the per-video outputs being combined.
    pub format: Format,
    /// Whether combined files carry stats headers / stats objects.
    pub include_stats: bool,
    /// Optional per-segment size cap.
    pub split: Option<SplitRule>,
}

/// JSON container for combined output: every per-video document verbatim
/// (each with its own independently converged stats), plus container totals.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConcatDocument {
    /// Per-video documents in enumeration order.
    pub items: Vec<TranscriptDocument>,
    /// Totals for the serialized container, when stats are enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<TextStats>,
}

/// Combines the successful results into one or more files, returning the
/// paths written in order.
///
/// Inputs are consumed in sequence (enumeration) order regardless of the
/// order downloads finished in; each combined file is built in memory and
/// written once.
pub fn concatenate(
    results: &[DownloadResult],
    options: &ConcatOptions,
) -> Result<Vec<PathBuf>, ConcatError> {
    let sources: Vec<(&DownloadResult, &Path)> = results
        .iter()
        .filter(|r| r.status == DownloadStatus::Ok)
        .filter_map(|r| r.path.as_deref().map(|p| (r, p)))
        .collect();
    if sources.is_empty() {
        warn!("nothing to concatenate");
        return Ok(Vec::new());
    }

    let bodies = if options.format == Format::Json {
        concat_json(&sources, options)?
    } else {
        concat_text(&sources, options)?
    };

    let mut written = Vec::with_capacity(bodies.len());
    let single = bodies.len() == 1;
    for (index, body) in bodies.into_iter().enumerate() {
        let name = if single {
            format!("{}.{}", options.base, options.format.extension())
        } else {
            format!(
                "{}_{:05}.{}",
                options.base,
                index + 1,
                options.format.extension()
            )
        };
        let path = options.folder.join(name);
        write_atomic(&path, &body).map_err(|source| ConcatError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "wrote combined file");
        written.push(path);
    }
    Ok(written)
}

/// Separator rule placed before each video's text in combined output.
#[must_use]
pub fn separator(video_id: &str, title: &str) -> String {
    let short: String = title.chars().take(SEPARATOR_TITLE_CHARS).collect();
    format!("\n──── {video_id} ── {short} ─────────────────────────\n")
}

fn concat_text(
    sources: &[(&DownloadResult, &Path)],
    options: &ConcatOptions,
) -> Result<Vec<String>, ConcatError> {
    struct Segment {
        body: String,
        manifest: Vec<(String, String)>,
    }

    let prefix = options.format.comment_prefix();
    let mut segments: Vec<Segment> = Vec::new();
    let mut current = Segment {
        body: String::new(),
        manifest: Vec::new(),
    };

    for (result, path) in sources {
        let document = std::fs::read_to_string(path).map_err(|source| ConcatError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let body = strip_leading_comment_blocks(&document, prefix);
        let piece = format!("{}{}\n", separator(&result.item.id, &result.item.title), body);
        let entry = (result.item.id.clone(), result.item.title.clone());

        if let Some(rule) = options.split {
            if !current.body.is_empty() {
                let mut manifest = current.manifest.clone();
                manifest.push(entry.clone());
                let candidate = format!("{}{piece}", current.body);
                let total = segment_totals(&candidate, &manifest, options);
                if rule.unit.select(total) > rule.limit {
                    segments.push(current);
                    current = Segment {
                        body: String::new(),
                        manifest: Vec::new(),
                    };
                }
            }
        }
        current.body.push_str(&piece);
        current.manifest.push(entry);
    }
    if !current.body.is_empty() {
        segments.push(current);
    }

    Ok(segments
        .into_iter()
        .map(|segment| {
            if options.include_stats {
                let (header, _) = fixed_point_header(
                    text_stats(&segment.body),
                    options.format,
                    &segment.manifest,
                );
                format!("{header}{}", segment.body)
            } else {
                segment.body
            }
        })
        .collect())
}

fn segment_totals(body: &str, manifest: &[(String, String)], options: &ConcatOptions) -> TextStats {
    if options.include_stats {
        let (_, total) = fixed_point_header(text_stats(body), options.format, manifest);
        total
    } else {
        text_stats(body)
    }
}

fn concat_json(
    sources: &[(&DownloadResult, &Path)],
    options: &ConcatOptions,
) -> Result<Vec<String>, ConcatError> {
    let mut documents = Vec::with_capacity(sources.len());
    for (_, path) in sources {
        let text = std::fs::read_to_string(path).map_err(|source| ConcatError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: TranscriptDocument =
            serde_json::from_str(&text).map_err(|source| ConcatError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        documents.push(doc);
    }

    let mut segments: Vec<Vec<TranscriptDocument>> = Vec::new();
    let mut current: Vec<TranscriptDocument> = Vec::new();
    for doc in documents {
        if let Some(rule) = options.split {
            if !current.is_empty() {
                let mut candidate = current.clone();
                candidate.push(doc.clone());
                let serialized = serialize_container(candidate, options.include_stats);
                if rule.unit.select(text_stats(&serialized)) > rule.limit {
                    segments.push(std::mem::take(&mut current));
                }
            }
        }
        current.push(doc);
    }
    if !current.is_empty() {
        segments.push(current);
    }

    Ok(segments
        .into_iter()
        .map(|items| serialize_container(items, options.include_stats))
        .collect())
}

/// Serializes the container, converging its `stats` on the exact output
/// bytes. Item-level stats are left as their standalone values.
fn serialize_container(items: Vec<TranscriptDocument>, include_stats: bool) -> String {
    const MAX_ROUNDS: usize = 10;

    let mut doc = ConcatDocument { items, stats: None };
    if !include_stats {
        return pretty(&doc);
    }
    doc.stats = Some(TextStats::default());
    let mut serialized = pretty(&doc);
    for _ in 0..MAX_ROUNDS {
        let measured = text_stats(&serialized);
        if doc.stats == Some(measured) {
            return serialized;
        }
        doc.stats = Some(measured);
        serialized = pretty(&doc);
    }
    warn!("combined stats failed to converge");
    serialized
}

fn pretty(doc: &ConcatDocument) -> String {
    serde_json::to_string_pretty(doc).unwrap_or_default() + "\n"
}

/// Drops the stats header and metadata block a per-video document starts
/// with, leaving the caption body. Blocks are comment-prefixed and end at a
/// blank line.
fn strip_leading_comment_blocks(document: &str, prefix: &str) -> String {
    let mut rest = document;
    for _ in 0..2 {
        if rest.starts_with(prefix) {
            match rest.find("\n\n") {
                Some(pos) => rest = &rest[pos + 2..],
                None => break,
            }
        }
    }
    rest.to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::header;
    use crate::stats::text_stats;
    use crate::transport::Cue;
    use crate::worker::{Item, VideoMeta, render_document};

    fn write_item(
        dir: &Path,
        sequence: usize,
        words: usize,
        format: Format,
        include_stats: bool,
    ) -> DownloadResult {
        let item = Item {
            id: format!("vid{sequence:08}"),
            title: format!("Video number {sequence}"),
        };
        let cues: Vec<Cue> = (0..words)
            .map(|i| Cue {
                start: i as f64,
                duration: 1.0,
                text: format!("w{i}"),
            })
            .collect();
        let meta = VideoMeta::for_item(&item, &["en".to_string()]);
        let document = render_document(format, &cues, &meta, include_stats, false);
        let path = crate::filename::output_path(
            dir,
            Some(sequence),
            &item.id,
            &item.title,
            format.extension(),
        );
        std::fs::write(&path, &document).unwrap();
        DownloadResult {
            sequence,
            item,
            status: DownloadStatus::Ok,
            path: Some(path),
            stats: include_stats.then(|| text_stats(&document)),
            message: None,
        }
    }

    fn options(dir: &Path, format: Format, split: Option<&str>) -> ConcatOptions {
        ConcatOptions {
            folder: dir.to_path_buf(),
            base: "combined".to_string(),
            format,
            include_stats: true,
            split: split.map(|s| s.parse().unwrap()),
        }
    }

    #[test]
    fn test_split_rule_parsing() {
        assert_eq!(
            "12000c".parse::<SplitRule>().unwrap(),
            SplitRule {
                limit: 12000,
                unit: SplitUnit::Chars
            }
        );
        assert_eq!("5000w".parse::<SplitRule>().unwrap().unit, SplitUnit::Words);
        assert_eq!("300l".parse::<SplitRule>().unwrap().unit, SplitUnit::Lines);
        assert!("300".parse::<SplitRule>().is_err());
        assert!("w300".parse::<SplitRule>().is_err());
        assert!("0w".parse::<SplitRule>().is_err());
        assert!("".parse::<SplitRule>().is_err());
    }

    #[test]
    fn test_single_combined_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![
            write_item(dir.path(), 1, 5, Format::Text, true),
            write_item(dir.path(), 2, 5, Format::Text, true),
        ];
        let written = concatenate(&results, &options(dir.path(), Format::Text, None)).unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].ends_with("combined.txt"));

        let text = std::fs::read_to_string(&written[0]).unwrap();
        // One separator rule per video, in enumeration order
        let a = text.find("──── vid00000001 ──").unwrap();
        let b = text.find("──── vid00000002 ──").unwrap();
        assert!(a < b);
        // Per-video headers were stripped; only the combined header remains
        assert_eq!(text.matches("# stats: ").count(), 1);
        assert!(text.contains("# videos:"));
        assert!(text.contains("#   - https://youtu.be/vid00000001 — Video number 1"));
    }

    #[test]
    fn test_combined_header_is_self_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![
            write_item(dir.path(), 1, 8, Format::Text, true),
            write_item(dir.path(), 2, 3, Format::Text, true),
        ];
        let written = concatenate(&results, &options(dir.path(), Format::Text, None)).unwrap();
        let text = std::fs::read_to_string(&written[0]).unwrap();

        let actual = text_stats(&text);
        let stats_line = text.lines().find(|l| l.starts_with("# stats: ")).unwrap();
        let words: u64 = stats_line
            .trim_start_matches("# stats: ")
            .split(' ')
            .next()
            .unwrap()
            .replace(',', "")
            .parse()
            .unwrap();
        assert_eq!(words, actual.words);
    }

    #[test]
    fn test_split_caps_segments_and_keeps_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![
            write_item(dir.path(), 1, 50, Format::Text, true),
            write_item(dir.path(), 2, 50, Format::Text, true),
            write_item(dir.path(), 3, 50, Format::Text, true),
        ];
        let written = concatenate(&results, &options(dir.path(), Format::Text, Some("90w"))).unwrap();
        assert!(written.len() >= 2, "three 50-word videos cannot fit one 90-word cap");
        assert!(written[0].ends_with("combined_00001.txt"));

        // Every video's words appear exactly once across segments, in order
        let mut joined = String::new();
        for path in &written {
            let text = std::fs::read_to_string(path).unwrap();
            let total = text_stats(&text);
            assert!(total.words <= 90, "segment exceeds cap: {} words", total.words);
            joined.push_str(&text);
        }
        for sequence in 1..=3 {
            assert_eq!(joined.matches(&format!("──── vid{sequence:08} ──")).count(), 1);
        }
        let a = joined.find("vid00000001").unwrap();
        let c = joined.rfind("vid00000003").unwrap();
        assert!(a < c);
    }

    #[test]
    fn test_oversized_item_gets_own_segment() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![
            write_item(dir.path(), 1, 5, Format::Text, true),
            write_item(dir.path(), 2, 500, Format::Text, true),
        ];
        let written = concatenate(&results, &options(dir.path(), Format::Text, Some("50w"))).unwrap();
        assert_eq!(written.len(), 2);
        let second = std::fs::read_to_string(&written[1]).unwrap();
        assert!(second.contains("vid00000002"));
    }

    #[test]
    fn test_json_container_with_converged_stats() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![
            write_item(dir.path(), 1, 4, Format::Json, true),
            write_item(dir.path(), 2, 4, Format::Json, true),
        ];
        let written = concatenate(&results, &options(dir.path(), Format::Json, None)).unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].ends_with("combined.json"));

        let text = std::fs::read_to_string(&written[0]).unwrap();
        let parsed: ConcatDocument = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.stats.unwrap(), text_stats(&text));
        // Item stats keep their standalone values
        for (item, result) in parsed.items.iter().zip(&results) {
            assert_eq!(item.stats.unwrap(), result.stats.unwrap());
        }
    }

    #[test]
    fn test_json_without_stats_omits_container_stats() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![write_item(dir.path(), 1, 4, Format::Json, false)];
        let mut opts = options(dir.path(), Format::Json, None);
        opts.include_stats = false;
        let written = concatenate(&results, &opts).unwrap();
        let text = std::fs::read_to_string(&written[0]).unwrap();
        assert!(!text.contains("\"stats\""));
    }

    #[test]
    fn test_failed_results_are_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let ok = write_item(dir.path(), 1, 5, Format::Text, true);
        let failed = DownloadResult {
            status: DownloadStatus::Failed,
            path: None,
            ..ok.clone()
        };
        let written = concatenate(&[ok, failed], &options(dir.path(), Format::Text, None)).unwrap();
        let text = std::fs::read_to_string(&written[0]).unwrap();
        assert_eq!(text.matches("──── ").count(), 1);
    }

    #[test]
    fn test_empty_results_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let written = concatenate(&[], &options(dir.path(), Format::Text, None)).unwrap();
        assert!(written.is_empty());
    }

    #[test]
    fn test_strip_leading_comment_blocks() {
        let doc = header::single_file_header(
            Format::Text,
            "body line\n",
            &VideoMeta {
                video_id: "abc123def45".to_string(),
                title: "T".to_string(),
                url: "https://youtu.be/abc123def45".to_string(),
                language: "en".to_string(),
            },
        );
        assert_eq!(strip_leading_comment_blocks(&doc, "# "), "body line\n");
    }
}
