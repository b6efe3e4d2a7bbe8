//! Input enumeration: turning a link or an id file into download items.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::worker::Item;

/// Video id embedded in the common URL shapes (`youtu.be/<id>`, `?v=<id>`,
/// `/shorts/<id>`, `/live/<id>`).
#[allow(clippy::unwrap_used)]
static LINK_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:youtu\.be/|[?&]v=|/shorts/|/live/|/embed/)([A-Za-z0-9_-]{11})").unwrap()
});

#[allow(clippy::unwrap_used)]
static BARE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

/// Errors from reading an id file.
#[derive(Debug, Error)]
pub enum InputError {
    /// The id file could not be read.
    #[error("failed to read id file {path}: {source}")]
    File {
        /// The file that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Extracts the 11-character video id from a link or bare id.
#[must_use]
pub fn parse_video_id(link: &str) -> Option<String> {
    let link = link.trim();
    if BARE_ID_RE.is_match(link) {
        return Some(link.to_string());
    }
    LINK_ID_RE
        .captures(link)
        .map(|caps| caps[1].to_string())
}

/// Reads an id file: one video per line as `<id>` or `<id>\t<title>`.
/// Blank lines and `#` comments are skipped; malformed ids are skipped with
/// a warning rather than aborting the run.
pub fn read_id_file(path: &Path) -> Result<Vec<Item>, InputError> {
    let text = std::fs::read_to_string(path).map_err(|source| InputError::File {
        path: path.to_path_buf(),
        source,
    })?;

    let mut items = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (raw_id, title) = match line.split_once('\t') {
            Some((id, title)) => (id.trim(), title.trim()),
            None => (line, ""),
        };
        let Some(id) = parse_video_id(raw_id) else {
            warn!(line = number + 1, content = raw_id, "skipping unrecognized id");
            continue;
        };
        let title = if title.is_empty() { id.clone() } else { title.to_string() };
        items.push(Item { id, title });
    }
    Ok(items)
}
