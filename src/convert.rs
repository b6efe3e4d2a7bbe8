//! Offline conversion of previously downloaded JSON documents.
//!
//! `--convert` re-renders existing JSON outputs (single-video documents or
//! combined containers) into another format without touching the network.
//! Unreadable or cue-less files are skipped with a warning rather than
//! failing the whole pass.
//!
//! Converting a combined container with more than two items to SRT switches
//! to bare mode: no separators and no headers, so the result is a clean
//! subtitle file a player will accept.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::concat::ConcatDocument;
use crate::filename::write_atomic;
use crate::format::Format;
use crate::header::{fixed_point_header, single_file_header};
use crate::stats::text_stats;
use crate::worker::{TranscriptDocument, VideoMeta, serialize_document};

/// Container threshold beyond which SRT conversion goes bare.
const BARE_SRT_MIN_ITEMS: usize = 3;

/// Errors that abort the conversion pass outright. Per-file problems are
/// logged and skipped instead.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The source path is neither a JSON file nor a directory.
    #[error("{0} is not a JSON file or directory")]
    BadSource(PathBuf),

    /// The source directory could not be listed.
    #[error("failed to scan {path}: {source}")]
    Scan {
        /// The directory that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Either shape a downloaded JSON file can have.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredDocument {
    Single(TranscriptDocument),
    Combined(ConcatDocument),
}

/// Converts every JSON document under `source` to `target`, writing results
/// into `out_dir` with the same stem and a new extension.
///
/// Returns the number of files written.
pub fn convert_existing(
    source: &Path,
    target: Format,
    out_dir: &Path,
    include_stats: bool,
    timestamps: bool,
) -> Result<usize, ConvertError> {
    let mut converted = 0;
    for json_path in json_files(source)? {
        let Some(rendered) = convert_one(&json_path, target, include_stats, timestamps) else {
            continue;
        };
        let Some(stem) = json_path.file_stem() else {
            continue;
        };
        let mut name = stem.to_os_string();
        name.push(".");
        name.push(target.extension());
        let dest = out_dir.join(name);
        match write_atomic(&dest, &rendered) {
            Ok(()) => {
                info!(from = %json_path.display(), to = %dest.display(), "converted");
                converted += 1;
            }
            Err(e) => warn!(path = %dest.display(), error = %e, "write failed; skipping"),
        }
    }
    Ok(converted)
}

fn json_files(source: &Path) -> Result<Vec<PathBuf>, ConvertError> {
    if source.is_file() {
        return if source.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
            Ok(vec![source.to_path_buf()])
        } else {
            Err(ConvertError::BadSource(source.to_path_buf()))
        };
    }
    if !source.is_dir() {
        return Err(ConvertError::BadSource(source.to_path_buf()));
    }
    let entries = std::fs::read_dir(source).map_err(|e| ConvertError::Scan {
        path: source.to_path_buf(),
        source: e,
    })?;
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file() && p.extension().is_some_and(|e| e.eq_ignore_ascii_case("json"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Renders one stored document, or `None` when it should be skipped.
fn convert_one(
    path: &Path,
    target: Format,
    include_stats: bool,
    timestamps: bool,
) -> Option<String> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping unreadable file");
            return None;
        }
    };
    let stored: StoredDocument = match serde_json::from_str(&text) {
        Ok(stored) => stored,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping malformed document");
            return None;
        }
    };

    match stored {
        StoredDocument::Single(doc) => {
            if doc.transcript.is_empty() {
                warn!(path = %path.display(), "no cues; skipping");
                return None;
            }
            if target == Format::Json {
                return Some(serialize_document(doc, include_stats));
            }
            Some(render_single(&doc, target, include_stats, timestamps))
        }
        StoredDocument::Combined(container) => {
            if container.items.iter().all(|item| item.transcript.is_empty()) {
                warn!(path = %path.display(), "no cues; skipping");
                return None;
            }
            if target == Format::Json {
                let mut serialized =
                    serde_json::to_string_pretty(&container).unwrap_or_default();
                serialized.push('\n');
                return Some(serialized);
            }
            Some(render_combined(&container, target, include_stats, timestamps))
        }
    }
}

fn render_single(
    doc: &TranscriptDocument,
    target: Format,
    include_stats: bool,
    timestamps: bool,
) -> String {
    let body = target.render_cues(&doc.transcript, timestamps);
    if include_stats {
        single_file_header(target, &body, &meta_of(doc))
    } else {
        body
    }
}

fn render_combined(
    container: &ConcatDocument,
    target: Format,
    include_stats: bool,
    timestamps: bool,
) -> String {
    let bare_srt = target == Format::Srt && container.items.len() >= BARE_SRT_MIN_ITEMS;

    let mut parts = Vec::new();
    let mut manifest = Vec::new();
    for item in &container.items {
        if !bare_srt {
            parts.push(format!("──── {} ── {}\n", item.video_id, item.title));
        }
        let body = target.render_cues(&item.transcript, timestamps);
        if include_stats && !bare_srt {
            parts.push(single_file_header(target, &body, &meta_of(item)));
        } else {
            parts.push(body);
        }
        manifest.push((item.video_id.clone(), item.title.clone()));
    }
    let body = parts.join("\n");

    if include_stats && !bare_srt {
        let (header, _) = fixed_point_header(text_stats(&body), target, &manifest);
        format!("{header}{body}")
    } else {
        body
    }
}

fn meta_of(doc: &TranscriptDocument) -> VideoMeta {
    VideoMeta {
        video_id: doc.video_id.clone(),
        title: doc.title.clone(),
        url: doc.url.clone(),
        language: doc.language.clone(),
    }
}
