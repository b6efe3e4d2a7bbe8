//! YouTube transcript fetching over the public watch page.
//!
//! No API key: the watch page embeds a `captionTracks` list in its player
//! response, and each track's `baseUrl` serves the cues as `json3`. A fresh
//! HTTP client is built per attempt so the caller's proxy choice and a
//! rotating browser User-Agent apply to exactly one fetch.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::cookie::Jar;
use reqwest::{Client, ClientBuilder, Proxy};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::{Cue, FetchError, TranscriptSource};

/// Connect timeout for watch-page and track requests.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Total request timeout. Caption payloads are small; anything slower than
/// this is effectively a dead proxy.
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Browser User-Agent pool; one is picked at random per attempt so repeated
/// retries through different proxies do not share an obvious fingerprint.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
     (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
];

/// One entry of the watch page's `captionTracks` array.
#[derive(Debug, Deserialize)]
struct CaptionTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode")]
    language_code: String,
}

/// `json3` track payload: a flat list of timed events.
#[derive(Debug, Deserialize)]
struct TrackPayload {
    #[serde(default)]
    events: Vec<TrackEvent>,
}

#[derive(Debug, Deserialize)]
struct TrackEvent {
    #[serde(rename = "tStartMs")]
    start_ms: Option<f64>,
    #[serde(rename = "dDurationMs")]
    duration_ms: Option<f64>,
    #[serde(default)]
    segs: Vec<TrackSegment>,
}

#[derive(Debug, Deserialize)]
struct TrackSegment {
    #[serde(default)]
    utf8: String,
}

/// Errors loading a browser-exported cookie file.
#[derive(Debug, Error)]
pub enum CookieError {
    /// I/O error reading the cookie file.
    #[error("failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a JSON array of cookie objects.
    #[error("cookie file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// One cookie from a browser-export JSON file.
#[derive(Debug, Deserialize)]
struct CookieEntry {
    name: String,
    value: String,
    #[serde(default)]
    domain: String,
    #[serde(default = "default_cookie_path")]
    path: String,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// Loads a browser-exported JSON cookie file into a reqwest cookie jar.
///
/// Entries without a domain are skipped with a warning; the jar is shared by
/// every client the transcript source builds.
///
/// # Errors
///
/// Returns [`CookieError`] when the file cannot be read or is not a JSON
/// array of cookie objects.
pub fn load_cookie_jar(path: &Path) -> Result<Arc<Jar>, CookieError> {
    let raw = std::fs::read_to_string(path)?;
    let entries: Vec<CookieEntry> = serde_json::from_str(&raw)?;
    let jar = Jar::default();
    let mut loaded = 0usize;
    for entry in &entries {
        let domain = entry.domain.trim_start_matches('.');
        if domain.is_empty() {
            warn!(cookie = %entry.name, "skipping cookie without a domain");
            continue;
        }
        let Ok(origin) = format!("https://{domain}/").parse::<url::Url>() else {
            warn!(cookie = %entry.name, %domain, "skipping cookie with unparsable domain");
            continue;
        };
        jar.add_cookie_str(
            &format!(
                "{}={}; Domain={}; Path={}",
                entry.name, entry.value, domain, entry.path
            ),
            &origin,
        );
        loaded += 1;
    }
    debug!(loaded, total = entries.len(), "cookie jar loaded");
    Ok(Arc::new(jar))
}

/// Fetches transcripts by scraping the public watch page.
#[derive(Debug, Default, Clone)]
pub struct YoutubeTranscriptSource {
    cookie_jar: Option<Arc<Jar>>,
}

impl YoutubeTranscriptSource {
    /// Creates a source with no cookies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source that attaches the given cookie jar to every request.
    #[must_use]
    pub fn with_cookie_jar(cookie_jar: Arc<Jar>) -> Self {
        Self {
            cookie_jar: Some(cookie_jar),
        }
    }

    /// Builds a one-shot client for a single attempt: random User-Agent,
    /// optional proxy, optional shared cookie jar.
    fn build_client(&self, proxy: Option<&str>) -> Result<Client, FetchError> {
        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        let mut builder = ClientBuilder::new()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .gzip(true);

        if let Some(addr) = proxy {
            let proxy = Proxy::all(addr)
                .map_err(|e| FetchError::transient(format!("invalid proxy {addr}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        if let Some(jar) = &self.cookie_jar {
            builder = builder.cookie_provider(Arc::clone(jar));
        }

        builder
            .build()
            .map_err(|e| FetchError::transient(format!("client build failed: {e}")))
    }
}

#[async_trait]
impl TranscriptSource for YoutubeTranscriptSource {
    async fn fetch(
        &self,
        video_id: &str,
        languages: &[String],
        proxy: Option<&str>,
    ) -> Result<Vec<Cue>, FetchError> {
        let client = self.build_client(proxy)?;

        let watch_url = format!("https://www.youtube.com/watch?v={video_id}&hl=en");
        let response = client
            .get(&watch_url)
            .send()
            .await
            .map_err(|e| FetchError::transient(format!("watch page request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(FetchError::blocked("HTTP 429 on watch page"));
        }
        if !status.is_success() {
            return Err(FetchError::transient(format!("watch page HTTP {status}")));
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::transient(format!("watch page body: {e}")))?;

        if html.contains("class=\"g-recaptcha\"") {
            return Err(FetchError::blocked("captcha challenge on watch page"));
        }
        if html.contains(r#""playabilityStatus":{"status":"ERROR""#) {
            return Err(FetchError::VideoUnavailable {
                video_id: video_id.to_string(),
            });
        }

        let Some(raw_tracks) = extract_json_array(&html, "\"captionTracks\":") else {
            return Err(FetchError::NoCaptions {
                video_id: video_id.to_string(),
            });
        };
        let tracks: Vec<CaptionTrack> = serde_json::from_str(raw_tracks)
            .map_err(|e| FetchError::transient(format!("caption track list unparsable: {e}")))?;
        if tracks.is_empty() {
            return Err(FetchError::NoCaptions {
                video_id: video_id.to_string(),
            });
        }

        let track = select_track(&tracks, languages);
        debug!(video_id, language = %track.language_code, "caption track selected");

        let track_url = format!("{}&fmt=json3", track.base_url.replace("\\u0026", "&"));
        let payload = client
            .get(&track_url)
            .send()
            .await
            .map_err(|e| FetchError::transient(format!("track request failed: {e}")))?;
        let status = payload.status();
        if status.as_u16() == 429 {
            return Err(FetchError::blocked("HTTP 429 on caption track"));
        }
        if !status.is_success() {
            return Err(FetchError::transient(format!("caption track HTTP {status}")));
        }
        let payload: TrackPayload = payload
            .json()
            .await
            .map_err(|e| FetchError::transient(format!("caption track unparsable: {e}")))?;

        Ok(cues_from_payload(payload))
    }
}

/// Picks the first track matching the language preference order, falling
/// back to the first track the page offers.
fn select_track<'a>(tracks: &'a [CaptionTrack], languages: &[String]) -> &'a CaptionTrack {
    for lang in languages {
        if let Some(track) = tracks.iter().find(|t| t.language_code == *lang) {
            return track;
        }
    }
    &tracks[0]
}

/// Converts a `json3` payload into the cue list: events without text are
/// dropped, segment texts are concatenated, newlines become spaces.
fn cues_from_payload(payload: TrackPayload) -> Vec<Cue> {
    payload
        .events
        .into_iter()
        .filter_map(|event| {
            let text: String = event.segs.iter().map(|s| s.utf8.as_str()).collect();
            let text = text.replace('\n', " ").trim().to_string();
            if text.is_empty() {
                return None;
            }
            Some(Cue {
                start: event.start_ms.unwrap_or(0.0) / 1000.0,
                duration: event.duration_ms.unwrap_or(0.0) / 1000.0,
                text,
            })
        })
        .collect()
}

/// Extracts the balanced JSON array that follows `key` in `haystack`.
///
/// The watch page is a single enormous line of HTML/JS, so this scans for
/// the matching `]` while honoring string literals and escapes instead of
/// parsing the whole document.
fn extract_json_array<'a>(haystack: &'a str, key: &str) -> Option<&'a str> {
    let key_pos = haystack.find(key)?;
    let after_key = &haystack[key_pos + key.len()..];
    let open = after_key.find('[')?;
    let bytes = after_key.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&after_key[open..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
