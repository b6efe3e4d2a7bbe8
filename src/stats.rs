//! Word / line / character counting for transcript documents.
//!
//! Every stats header and every embedded `stats` JSON object in this crate
//! is derived from [`text_stats`], so the counting rules live in exactly one
//! place:
//!
//! - `chars` is the number of Unicode scalar values (what Python's `len()`
//!   reports for a `str`).
//! - `words` is the number of maximal whitespace-delimited non-empty runs.
//! - `lines` is the number of `\n` characters, matching `wc -l`: a file with
//!   no trailing newline and N embedded newlines reports N, not N + 1.

use std::ops::Add;

use serde::{Deserialize, Serialize};

/// A `(words, lines, chars)` triple for a block of text.
///
/// Recomputed whenever content changes; never cached across mutations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStats {
    /// Maximal whitespace-delimited non-empty runs.
    pub words: u64,
    /// Count of `\n` characters (`wc -l` convention).
    pub lines: u64,
    /// Unicode scalar values.
    pub chars: u64,
}

impl Add for TextStats {
    type Output = TextStats;

    fn add(self, rhs: TextStats) -> TextStats {
        TextStats {
            words: self.words + rhs.words,
            lines: self.lines + rhs.lines,
            chars: self.chars + rhs.chars,
        }
    }
}

/// Computes the stats triple for `text`. Pure, total, no failure modes.
#[must_use]
pub fn text_stats(text: &str) -> TextStats {
    TextStats {
        words: text.split_whitespace().count() as u64,
        lines: text.chars().filter(|&c| c == '\n').count() as u64,
        chars: text.chars().count() as u64,
    }
}

/// Formats `n` with comma grouping (`1234567` → `"1,234,567"`) for the
/// human-readable stats header line.
#[must_use]
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let offset = digits.len() % 3;
    for (i, ch) in digits.chars().enumerate() {
        if i != 0 && (i + 3 - offset) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
