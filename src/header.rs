//! Self-describing statistics headers.
//!
//! Headers report the word/line/char totals of the document they sit in —
//! including the header's own contribution. Rendering the numbers changes
//! the numbers, so [`fixed_point_header`] iterates: render with a guess,
//! measure the header, re-derive the totals, repeat until the header text
//! stops changing. The timestamp is frozen before the loop; otherwise a
//! ticking clock could keep the text changing forever.

use tracing::warn;

use crate::format::Format;
use crate::stats::{TextStats, group_thousands, text_stats};
use crate::worker::VideoMeta;

/// Iteration cap for the fixed point. In practice two or three rounds
/// suffice; the cap exists so the loop provably terminates.
const MAX_FIXUP_ROUNDS: usize = 10;

/// Renders the header block: stats line, generated line, optional video
/// manifest, then a blank line. The comment prefix comes from the format.
#[must_use]
pub fn header_text(
    format: Format,
    stats: TextStats,
    manifest: &[(String, String)],
    timestamp: &str,
) -> String {
    let pre = format.comment_prefix();
    let mut lines = vec![
        format!(
            "{pre}stats: {} words · {} lines · {} chars",
            group_thousands(stats.words),
            group_thousands(stats.lines),
            group_thousands(stats.chars)
        ),
        format!("{pre}generated: {timestamp}"),
    ];
    if !manifest.is_empty() {
        lines.push(format!("{pre}videos:"));
        for (video_id, title) in manifest {
            lines.push(format!("{pre}  - https://youtu.be/{video_id} — {title}"));
        }
    }
    lines.push(String::new());
    lines.join("\n") + "\n"
}

/// Computes a header whose embedded totals equal `body` plus the header
/// itself, by bounded iterative refinement.
///
/// Returns the header text and the converged totals. Non-convergence within
/// [`MAX_FIXUP_ROUNDS`] logs a warning and returns the last attempt; it is
/// never an error.
#[must_use]
pub fn fixed_point_header(
    body: TextStats,
    format: Format,
    manifest: &[(String, String)],
) -> (String, TextStats) {
    let frozen_timestamp = now_timestamp();
    let mut guess = body;
    for _ in 0..MAX_FIXUP_ROUNDS {
        let header = header_text(format, guess, manifest, &frozen_timestamp);
        let refined = body + text_stats(&header);
        if refined == guess {
            return (header, guess);
        }
        guess = refined;
    }
    warn!(
        rounds = MAX_FIXUP_ROUNDS,
        "header stats failed to converge; using last attempt"
    );
    (header_text(format, guess, manifest, &frozen_timestamp), guess)
}

/// Builds a complete single-item document: header, auxiliary metadata block
/// (`video-id:` / `url:` / `title:` + blank line), then the body.
///
/// The header's totals cover all three parts.
#[must_use]
pub fn single_file_header(format: Format, body: &str, meta: &VideoMeta) -> String {
    let pre = format.comment_prefix();
    let aux = format!(
        "{pre}video-id: {}\n{pre}url:      {}\n{pre}title:    {}\n\n",
        meta.video_id, meta.url, meta.title
    );
    let (header, _) = fixed_point_header(text_stats(body) + text_stats(&aux), format, &[]);
    format!("{header}{aux}{body}")
}

/// ISO-8601 local timestamp for the `generated:` line.
fn now_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn meta() -> VideoMeta {
        VideoMeta {
            video_id: "abc123def45".to_string(),
            title: "Demo Video".to_string(),
            url: "https://youtu.be/abc123def45".to_string(),
            language: "en".to_string(),
        }
    }

    /// Parses `W words · L lines · C chars` back out of a rendered header.
    fn declared_triple(document: &str) -> TextStats {
        let stats_line = document
            .lines()
            .find(|l| l.contains("stats: "))
            .expect("stats line present");
        let tail = stats_line.split("stats: ").nth(1).unwrap();
        let mut numbers = tail
            .split('·')
            .map(|part| part.trim().split(' ').next().unwrap().replace(',', ""));
        TextStats {
            words: numbers.next().unwrap().parse().unwrap(),
            lines: numbers.next().unwrap().parse().unwrap(),
            chars: numbers.next().unwrap().parse().unwrap(),
        }
    }

    #[test]
    fn test_header_text_shape() {
        let stats = TextStats {
            words: 1234,
            lines: 56,
            chars: 7890,
        };
        let header = header_text(Format::Text, stats, &[], "2025-06-17T12:34:56");
        assert!(header.starts_with("# stats: 1,234 words · 56 lines · 7,890 chars\n"));
        assert!(header.contains("# generated: 2025-06-17T12:34:56\n"));
        assert!(header.ends_with("\n\n"));
        assert!(!header.contains("videos:"));
    }

    #[test]
    fn test_header_text_subtitle_prefix() {
        let header = header_text(Format::Srt, TextStats::default(), &[], "t");
        assert!(header.starts_with("NOTE stats: "));
    }

    #[test]
    fn test_header_text_manifest() {
        let manifest = vec![
            ("vid1vid1vid".to_string(), "First".to_string()),
            ("vid2vid2vid".to_string(), "Second".to_string()),
        ];
        let header = header_text(Format::Text, TextStats::default(), &manifest, "t");
        assert!(header.contains("# videos:\n"));
        assert!(header.contains("#   - https://youtu.be/vid1vid1vid — First\n"));
        assert!(header.contains("#   - https://youtu.be/vid2vid2vid — Second\n"));
    }

    #[test]
    fn test_fixed_point_header_self_consistent() {
        let body = "hello world\nsecond line\n";
        let (header, total) = fixed_point_header(text_stats(body), Format::Text, &[]);
        let actual = text_stats(&header) + text_stats(body);
        assert_eq!(total, actual, "declared totals must include the header");
        assert_eq!(declared_triple(&header), actual);
    }

    #[test]
    fn test_fixed_point_header_terminates_on_large_inputs() {
        // Totals near digit-grouping boundaries are where convergence has to
        // work hardest; none of these may loop forever.
        for words in [0u64, 9, 99, 999, 9999, 99999, 999999, 123456789] {
            let body = TextStats {
                words,
                lines: words / 7,
                chars: words * 6,
            };
            let manifest: Vec<(String, String)> = (0..words % 20)
                .map(|i| (format!("vid{i:08}"), format!("Title {i}")))
                .collect();
            let (header, total) = fixed_point_header(body, Format::Srt, &manifest);
            assert_eq!(declared_triple(&header), total);
            assert_eq!(total, body + text_stats(&header));
        }
    }

    #[test]
    fn test_single_file_header_round_trip_all_formats() {
        let body = "Hello world!\nSecond cue\n";
        for format in [Format::Srt, Format::Webvtt, Format::Text, Format::Pretty] {
            let document = single_file_header(format, body, &meta());
            assert_eq!(
                declared_triple(&document),
                text_stats(&document),
                "declared triple must match the whole document for {format:?}"
            );
            assert!(document.ends_with(body));
            let pre = format.comment_prefix();
            assert!(document.contains(&format!("{pre}video-id: abc123def45")));
            assert!(document.contains(&format!("{pre}url:      https://youtu.be/abc123def45")));
            assert!(document.contains(&format!("{pre}title:    Demo Video")));
        }
    }

    #[test]
    fn test_frozen_timestamp_single_value() {
        let (header, _) = fixed_point_header(
            TextStats {
                words: 50,
                lines: 5,
                chars: 300,
            },
            Format::Text,
            &[],
        );
        let generated: Vec<&str> = header
            .lines()
            .filter(|l| l.starts_with("# generated: "))
            .collect();
        assert_eq!(generated.len(), 1);
    }
}
