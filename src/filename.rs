//! Output file naming and atomic writes.
//!
//! Files are named `<seq> [<video-id>] <slug>.<ext>`, where `<seq>` is a
//! five-digit zero-padded ordinal (optional) and `<slug>` is the video title
//! sanitized for the filesystem. The bracketed video id is the stable key:
//! existing-output detection matches on `[<id>]` regardless of sequence
//! number or title drift.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

/// Longest slug we will put in a filename, in characters.
const MAX_SLUG_CHARS: usize = 120;

/// Legacy Windows path limits. Paths over the soft limit get the title
/// shortened; a name that still exceeds the hard limit collapses to the
/// bare video id.
const WIN_PATH_SOFT_LIMIT: usize = 250;
const WIN_PATH_HARD_LIMIT: usize = 260;
/// Title length used when shortening an overlong path.
const SHORT_TITLE_CHARS: usize = 40;

/// Characters that are unsafe in filenames on at least one supported
/// platform, plus raw line breaks.
#[allow(clippy::unwrap_used)]
static BAD_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|\r\n]+"#).unwrap());

/// Sanitizes a title into a filename-safe slug.
///
/// Unsafe characters become `_`, runs of whitespace collapse to single
/// spaces, and overlong titles are truncated at a word boundary with a
/// trailing `…`. An empty result falls back to `"untitled"`.
#[must_use]
pub fn slug(title: &str) -> String {
    let cleaned = BAD_CHARS.replace_all(title, "_");
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return "untitled".to_string();
    }
    if collapsed.chars().count() <= MAX_SLUG_CHARS {
        return collapsed;
    }
    let head: String = collapsed.chars().take(MAX_SLUG_CHARS).collect();
    let cut = head.rfind(' ').unwrap_or(head.len());
    format!("{}…", head[..cut].trim_end())
}

/// Builds the output path for one video.
///
/// `sequence` is the 1-based position in the run (`None` suppresses the
/// numeric prefix entirely). On Windows the result is kept under the
/// legacy `MAX_PATH` limit.
#[must_use]
pub fn output_path(
    folder: &Path,
    sequence: Option<usize>,
    video_id: &str,
    title: &str,
    extension: &str,
) -> PathBuf {
    if cfg!(windows) {
        return clamped_path(
            folder,
            sequence,
            video_id,
            title,
            extension,
            WIN_PATH_SOFT_LIMIT,
            WIN_PATH_HARD_LIMIT,
        );
    }
    folder.join(file_name(sequence, video_id, &slug(title), extension))
}

fn file_name(sequence: Option<usize>, video_id: &str, slug: &str, extension: &str) -> String {
    match sequence {
        Some(n) => format!("{n:05} [{video_id}] {slug}.{extension}"),
        None => format!("[{video_id}] {slug}.{extension}"),
    }
}

/// Builds the output path while honoring filesystem length limits.
///
/// Within `soft` the full slug passes through. Past it the title is cut to
/// [`SHORT_TITLE_CHARS`]; if the path still exceeds `hard` the name
/// collapses to `[<video-id>].<ext>`, which stays unique and keeps the
/// bracketed marker that [`existing_output`] matches on.
fn clamped_path(
    folder: &Path,
    sequence: Option<usize>,
    video_id: &str,
    title: &str,
    extension: &str,
    soft: usize,
    hard: usize,
) -> PathBuf {
    let full = folder.join(file_name(sequence, video_id, &slug(title), extension));
    if full.as_os_str().len() <= soft {
        return full;
    }
    let mut short = slug(title);
    if short.chars().count() > SHORT_TITLE_CHARS {
        let head: String = short.chars().take(SHORT_TITLE_CHARS).collect();
        short = format!("{}…", head.trim_end());
    }
    let candidate = folder.join(file_name(sequence, video_id, &short, extension));
    if candidate.as_os_str().len() <= hard {
        return candidate;
    }
    folder.join(format!("[{video_id}].{extension}"))
}

/// Finds an existing output for `video_id` in `folder`, matching on the
/// bracketed id and extension only. Used for `--overwrite`-less skip logic
/// and by the conversion pass.
#[must_use]
pub fn existing_output(folder: &Path, video_id: &str, extension: &str) -> Option<PathBuf> {
    let marker = format!("[{video_id}]");
    let suffix = format!(".{extension}");
    let entries = fs::read_dir(folder).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.contains(&marker) && name.ends_with(&suffix) {
            return Some(entry.path());
        }
    }
    None
}

/// Writes `contents` to `path` atomically: write a sibling temp file, then
/// rename over the destination. Readers never observe a half-written file.
pub fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = path.with_extension("tmp-write");
    fs::write(&tmp, contents)?;
    match fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_replaces_bad_characters() {
        assert_eq!(slug(r#"a/b\c:d*e?f"g<h>i|j"#), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn test_slug_collapses_whitespace() {
        assert_eq!(slug("  too   many\t\tspaces   here "), "too many spaces here");
        // Raw line breaks are unsafe characters, not whitespace
        assert_eq!(slug("up\ndown"), "up_down");
    }

    #[test]
    fn test_slug_empty_falls_back() {
        assert_eq!(slug(""), "untitled");
        assert_eq!(slug("   "), "untitled");
        assert_eq!(slug("\r\n"), "untitled");
    }

    #[test]
    fn test_slug_truncates_at_word_boundary() {
        let long = "abcdefg ".repeat(40);
        let s = slug(&long);
        assert!(s.chars().count() <= MAX_SLUG_CHARS + 1);
        assert!(s.ends_with("abcdefg…"), "must cut at a space, not mid-word: {s}");
    }

    #[test]
    fn test_slug_short_titles_untouched() {
        assert_eq!(slug("Plain Title 42"), "Plain Title 42");
    }

    #[test]
    fn test_output_path_with_sequence() {
        let p = output_path(Path::new("/out"), Some(7), "abc123def45", "My Video", "srt");
        assert_eq!(p, PathBuf::from("/out/00007 [abc123def45] My Video.srt"));
    }

    #[test]
    fn test_output_path_without_sequence() {
        let p = output_path(Path::new("/out"), None, "abc123def45", "My Video", "json");
        assert_eq!(p, PathBuf::from("/out/[abc123def45] My Video.json"));
    }

    #[test]
    fn test_clamped_path_passes_short_names_through() {
        let p = clamped_path(
            Path::new("/out"),
            Some(7),
            "abc123def45",
            "My Video",
            "srt",
            WIN_PATH_SOFT_LIMIT,
            WIN_PATH_HARD_LIMIT,
        );
        assert_eq!(p, PathBuf::from("/out/00007 [abc123def45] My Video.srt"));
    }

    #[test]
    fn test_clamped_path_shortens_overlong_title() {
        let long_title = "word ".repeat(30);
        let p = clamped_path(
            Path::new("/out"),
            Some(1),
            "abc123def45",
            &long_title,
            "srt",
            80,
            120,
        );
        let name = p.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("word….srt"), "title must be cut short: {name}");
        assert!(name.contains("[abc123def45]"));
        assert!(p.as_os_str().len() <= 120);
    }

    #[test]
    fn test_clamped_path_collapses_to_bare_id() {
        let long_title = "word ".repeat(30);
        let p = clamped_path(
            Path::new("/out"),
            Some(1),
            "abc123def45",
            &long_title,
            "srt",
            10,
            60,
        );
        assert_eq!(p, PathBuf::from("/out/[abc123def45].srt"));
    }

    #[test]
    fn test_existing_output_matches_on_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("00003 [abc123def45] Old Title.txt");
        fs::write(&path, "x").unwrap();

        let found = existing_output(dir.path(), "abc123def45", "txt");
        assert_eq!(found, Some(path));
        assert!(existing_output(dir.path(), "abc123def45", "srt").is_none());
        assert!(existing_output(dir.path(), "zzz999zzz99", "txt").is_none());
    }

    #[test]
    fn test_write_atomic_replaces_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_atomic(&path, "first").unwrap();
        write_atomic(&path, "second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        // No stray temp files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
