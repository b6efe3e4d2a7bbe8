//! Transcript fetch transport.
//!
//! The download pipeline talks to the remote service exclusively through the
//! [`TranscriptSource`] trait, which returns either an ordered cue list or a
//! closed, typed failure. Classifying failures here — instead of letting
//! callers sniff error messages — is what keeps the worker's retry state
//! machine a plain `match`.

mod youtube;

pub use youtube::{CookieError, YoutubeTranscriptSource, load_cookie_jar};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One timed caption segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// Start offset in seconds.
    pub start: f64,
    /// Display duration in seconds.
    pub duration: f64,
    /// Caption text.
    pub text: String,
}

/// Typed failure classes returned by a transcript fetch.
///
/// The four variants drive four distinct worker behaviors: `NoCaptions` and
/// `VideoUnavailable` are terminal (retrying cannot help), `Blocked` bans the
/// egress identity and retries with the long backoff, `Transient` retries
/// with the short backoff until the attempt budget runs out.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The video exists but has no caption track (disabled or never made).
    #[error("no caption track available for {video_id}")]
    NoCaptions {
        /// The video that has no captions.
        video_id: String,
    },

    /// The video itself is gone (deleted, private, region-locked away).
    #[error("video {video_id} is unavailable")]
    VideoUnavailable {
        /// The unavailable video.
        video_id: String,
    },

    /// Rate limiting or an IP-level block on the current egress identity.
    #[error("request blocked or throttled: {reason}")]
    Blocked {
        /// Server-side evidence of the block (status code, page marker).
        reason: String,
    },

    /// Any other failure that may succeed on retry (network errors,
    /// malformed intermediate responses).
    #[error("transient fetch failure: {reason}")]
    Transient {
        /// Description of the underlying failure.
        reason: String,
    },
}

impl FetchError {
    /// Creates a `Blocked` error.
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self::Blocked {
            reason: reason.into(),
        }
    }

    /// Creates a `Transient` error.
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }
}

/// A source of transcript cues for a single video.
///
/// `proxy` is the egress endpoint chosen for this attempt (`None` for a
/// direct connection); implementations must route the request through it so
/// the worker's ban bookkeeping stays truthful.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Fetches the cue list for `video_id`, preferring `languages` in order.
    async fn fetch(
        &self,
        video_id: &str,
        languages: &[String],
        proxy: Option<&str>,
    ) -> Result<Vec<Cue>, FetchError>;
}
