//! Per-video download worker.
//!
//! [`Downloader::grab`] owns the retry state machine for one video: pick an
//! egress endpoint, fetch, classify, and either finish with a terminal
//! status or back off and try again. Every outcome maps to one of four
//! statuses; the caller never has to inspect error text.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::filename::{output_path, write_atomic};
use crate::format::Format;
use crate::header::single_file_header;
use crate::proxy::ProxyPool;
use crate::stats::{TextStats, text_stats};
use crate::transport::{Cue, FetchError, TranscriptSource};

/// Attempts per video before giving up.
pub const DEFAULT_TRIES: u32 = 6;
/// Base backoff after a block, multiplied by the attempt number.
const BLOCKED_BACKOFF_SECS: u64 = 6;
/// Base backoff after a transient failure, multiplied by the attempt number.
const TRANSIENT_BACKOFF_MS: u64 = 500;
/// Rounds allowed for the embedded-stats fixed point in JSON documents.
const MAX_JSON_FIXUP_ROUNDS: usize = 10;

/// One video to download: id plus display title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Eleven-character video id.
    pub id: String,
    /// Human title, used for filenames and manifests.
    pub title: String,
}

/// Metadata block embedded in every output document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMeta {
    /// Eleven-character video id.
    pub video_id: String,
    /// Human title.
    pub title: String,
    /// Canonical short URL.
    pub url: String,
    /// Language code the captions were requested in.
    pub language: String,
}

impl VideoMeta {
    /// Builds metadata for `item`, requesting the first of `languages`.
    #[must_use]
    pub fn for_item(item: &Item, languages: &[String]) -> Self {
        VideoMeta {
            video_id: item.id.clone(),
            title: item.title.clone(),
            url: format!("https://youtu.be/{}", item.id),
            language: languages
                .first()
                .cloned()
                .unwrap_or_else(|| "en".to_string()),
        }
    }
}

/// The JSON document written for `--format json`.
///
/// Field order is part of the output contract; `stats` sits before the
/// transcript so readers can check the totals without scanning cues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptDocument {
    /// Eleven-character video id.
    pub video_id: String,
    /// Human title.
    pub title: String,
    /// Canonical short URL.
    pub url: String,
    /// Requested caption language.
    pub language: String,
    /// Totals for the serialized document itself, when stats are enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<TextStats>,
    /// Ordered caption cues.
    pub transcript: Vec<Cue>,
}

/// Terminal outcome of one video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    /// Captions fetched and written.
    Ok,
    /// Video exists but has no caption track.
    NoCaptions,
    /// Video unavailable, or the output could not be written.
    Failed,
    /// Egress gave out: the attempt budget ran dry or every usable
    /// endpoint was banned before the fetch succeeded.
    ProxyFailed,
}

impl DownloadStatus {
    /// Stable wire name used in logs and summaries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadStatus::Ok => "ok",
            DownloadStatus::NoCaptions => "none",
            DownloadStatus::Failed => "fail",
            DownloadStatus::ProxyFailed => "proxy_fail",
        }
    }
}

/// Outcome record for one video, collected by the scheduler.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    /// 1-based position in the run's enumeration order.
    pub sequence: usize,
    /// The video this result belongs to.
    pub item: Item,
    /// Terminal status.
    pub status: DownloadStatus,
    /// Path written, for `Ok` results.
    pub path: Option<PathBuf>,
    /// Totals of the written document, for `Ok` results with stats enabled.
    pub stats: Option<TextStats>,
    /// Human-readable failure detail, for non-`Ok` results.
    pub message: Option<String>,
}

/// Knobs shared by every worker in a run.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Output directory.
    pub folder: PathBuf,
    /// Output format.
    pub format: Format,
    /// Caption languages in preference order.
    pub languages: Vec<String>,
    /// Per-line timestamps for text output.
    pub timestamps: bool,
    /// Whether to embed stats headers / stats objects.
    pub include_stats: bool,
    /// Whether filenames carry the five-digit sequence prefix.
    pub sequence_prefix: bool,
    /// Attempts per video.
    pub tries: u32,
    /// Politeness delay after each successful download, in seconds.
    pub delay_secs: f64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        DownloadConfig {
            folder: PathBuf::from("."),
            format: Format::Json,
            languages: vec!["en".to_string()],
            timestamps: false,
            include_stats: true,
            sequence_prefix: true,
            tries: DEFAULT_TRIES,
            delay_secs: 2.0,
        }
    }
}

/// Downloads one video at a time through a [`TranscriptSource`].
pub struct Downloader {
    source: Arc<dyn TranscriptSource>,
    pool: Option<Arc<ProxyPool>>,
    config: DownloadConfig,
}

impl Downloader {
    /// Creates a worker over `source`, optionally routed through `pool`.
    #[must_use]
    pub fn new(
        source: Arc<dyn TranscriptSource>,
        pool: Option<Arc<ProxyPool>>,
        config: DownloadConfig,
    ) -> Self {
        Downloader {
            source,
            pool,
            config,
        }
    }

    /// Runs the full fetch/retry/write cycle for one video.
    ///
    /// With a pool configured, a direct connection is never attempted: pool
    /// exhaustion ends the video with `ProxyFailed` before any fetch.
    #[instrument(skip(self), fields(video_id = %item.id))]
    pub async fn grab(&self, sequence: usize, item: Item) -> DownloadResult {
        for attempt in 1..=self.config.tries {
            let proxy = match &self.pool {
                Some(pool) => match pool.get() {
                    Some(endpoint) => {
                        pool.mark_used(&endpoint);
                        Some(endpoint)
                    }
                    None => {
                        return self.finish(
                            sequence,
                            item,
                            DownloadStatus::ProxyFailed,
                            Some("proxy pool exhausted".to_string()),
                        );
                    }
                },
                None => None,
            };

            match self
                .source
                .fetch(&item.id, &self.config.languages, proxy.as_deref())
                .await
            {
                Ok(cues) => {
                    let result = self.write_output(sequence, &item, &cues);
                    if result.status == DownloadStatus::Ok && self.config.delay_secs > 0.0 {
                        tokio::time::sleep(Duration::from_secs_f64(self.config.delay_secs)).await;
                    }
                    return result;
                }
                Err(e @ FetchError::NoCaptions { .. }) => {
                    return self.finish(
                        sequence,
                        item,
                        DownloadStatus::NoCaptions,
                        Some(e.to_string()),
                    );
                }
                Err(e @ FetchError::VideoUnavailable { .. }) => {
                    return self.finish(
                        sequence,
                        item,
                        DownloadStatus::Failed,
                        Some(e.to_string()),
                    );
                }
                Err(FetchError::Blocked { reason }) => {
                    warn!(attempt, %reason, "blocked; rotating egress");
                    if let (Some(pool), Some(endpoint)) = (&self.pool, &proxy) {
                        pool.ban(endpoint);
                    }
                    if attempt < self.config.tries {
                        tokio::time::sleep(Duration::from_secs(
                            BLOCKED_BACKOFF_SECS * u64::from(attempt),
                        ))
                        .await;
                    }
                }
                Err(FetchError::Transient { reason }) => {
                    debug!(attempt, %reason, "transient failure");
                    if attempt == self.config.tries {
                        if let (Some(pool), Some(endpoint)) = (&self.pool, &proxy) {
                            pool.ban(endpoint);
                        }
                        return self.finish(
                            sequence,
                            item,
                            DownloadStatus::ProxyFailed,
                            Some(reason),
                        );
                    }
                    tokio::time::sleep(Duration::from_millis(
                        TRANSIENT_BACKOFF_MS * u64::from(attempt),
                    ))
                    .await;
                }
            }
        }
        self.finish(
            sequence,
            item,
            DownloadStatus::ProxyFailed,
            Some("attempt budget exhausted".to_string()),
        )
    }

    fn write_output(&self, sequence: usize, item: &Item, cues: &[Cue]) -> DownloadResult {
        let meta = VideoMeta::for_item(item, &self.config.languages);
        let document = render_document(
            self.config.format,
            cues,
            &meta,
            self.config.include_stats,
            self.config.timestamps,
        );
        let path = output_path(
            &self.config.folder,
            self.config.sequence_prefix.then_some(sequence),
            &item.id,
            &item.title,
            self.config.format.extension(),
        );
        match write_atomic(&path, &document) {
            Ok(()) => DownloadResult {
                sequence,
                item: item.clone(),
                status: DownloadStatus::Ok,
                path: Some(path),
                stats: self.config.include_stats.then(|| text_stats(&document)),
                message: None,
            },
            Err(e) => DownloadResult {
                sequence,
                item: item.clone(),
                status: DownloadStatus::Failed,
                path: None,
                stats: None,
                message: Some(format!("write failed: {e}")),
            },
        }
    }

    fn finish(
        &self,
        sequence: usize,
        item: Item,
        status: DownloadStatus,
        message: Option<String>,
    ) -> DownloadResult {
        DownloadResult {
            sequence,
            item,
            status,
            path: None,
            stats: None,
            message,
        }
    }
}

/// Renders the complete document text for one video in `format`.
#[must_use]
pub fn render_document(
    format: Format,
    cues: &[Cue],
    meta: &VideoMeta,
    include_stats: bool,
    timestamps: bool,
) -> String {
    if format == Format::Json {
        let doc = TranscriptDocument {
            video_id: meta.video_id.clone(),
            title: meta.title.clone(),
            url: meta.url.clone(),
            language: meta.language.clone(),
            stats: None,
            transcript: cues.to_vec(),
        };
        return serialize_document(doc, include_stats);
    }
    let body = format.render_cues(cues, timestamps);
    if include_stats {
        single_file_header(format, &body, meta)
    } else {
        body
    }
}

/// Serializes a JSON document, converging the embedded `stats` object on the
/// exact bytes written (pretty-printed, trailing newline included).
#[must_use]
pub fn serialize_document(mut doc: TranscriptDocument, include_stats: bool) -> String {
    if !include_stats {
        doc.stats = None;
        return pretty_json(&doc);
    }
    doc.stats = Some(TextStats::default());
    let mut serialized = pretty_json(&doc);
    for _ in 0..MAX_JSON_FIXUP_ROUNDS {
        let measured = text_stats(&serialized);
        if doc.stats == Some(measured) {
            return serialized;
        }
        doc.stats = Some(measured);
        serialized = pretty_json(&doc);
    }
    warn!(video_id = %doc.video_id, "embedded stats failed to converge");
    serialized
}

fn pretty_json<T: Serialize>(value: &T) -> String {
    // TranscriptDocument serialization cannot fail: no maps with non-string
    // keys, no fallible Serialize impls.
    serde_json::to_string_pretty(value).unwrap_or_default() + "\n"
}
