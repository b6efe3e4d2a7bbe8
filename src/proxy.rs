//! Proxy pool: rotation, ban bookkeeping, and public-proxy discovery.
//!
//! The pool hands out egress endpoints round-robin and remembers which ones
//! have been banned by workers. Bans are monotonic for the lifetime of a run:
//! once an endpoint misbehaves there is no point feeding it to another
//! worker. All state sits behind one mutex; holders only do map lookups, so
//! a blocking `std::sync::Mutex` is fine even on the async runtime.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use clap::ValueEnum;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Free-proxy list endpoint used for `--public-proxy`.
const PUBLIC_PROXY_API: &str = "https://api.proxyscrape.com/v4/free-proxy-list/get";

/// Fallback plain-text SOCKS5 list, one `ip:port` per line.
const SOCKS_LIST_URL: &str =
    "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/socks5.txt";

const DISCOVERY_TIMEOUT_SECS: u64 = 20;

/// Errors from proxy configuration and discovery.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// A proxy list file could not be read.
    #[error("failed to read proxy file {path}: {source}")]
    File {
        /// The file that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The public-proxy service could not be reached.
    #[error("proxy discovery request failed: {0}")]
    Fetch(#[from] reqwest::Error),

    /// Discovery succeeded but produced no usable endpoints.
    #[error("proxy discovery returned no endpoints")]
    Empty,
}

/// Proxy protocol requested from the public list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProxyScheme {
    /// Plain HTTP proxies.
    Http,
    /// HTTPS (CONNECT-capable) proxies.
    Https,
    /// SOCKS5 proxies.
    Socks,
}

impl ProxyScheme {
    /// URL scheme prefix for endpoints of this kind.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            ProxyScheme::Http => "http://",
            ProxyScheme::Https => "https://",
            ProxyScheme::Socks => "socks5://",
        }
    }

    fn api_protocol(self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
            ProxyScheme::Socks => "socks5",
        }
    }
}

/// Where to collect pool endpoints from. Every configured source
/// contributes: explicit endpoints first, then the file, then public
/// discovery, deduplicated across sources.
#[derive(Debug, Clone, Default)]
pub struct ProxyOptions {
    /// Endpoints given directly on the command line.
    pub explicit: Vec<String>,
    /// File with one endpoint per line (`#` comments allowed).
    pub file: Option<PathBuf>,
    /// Number of public proxies to fetch (0 disables discovery).
    pub public_count: usize,
    /// ISO country filter for public discovery.
    pub public_country: Option<String>,
    /// Protocol requested from the public list.
    pub public_scheme: ProxyScheme,
}

impl Default for ProxyScheme {
    fn default() -> Self {
        ProxyScheme::Http
    }
}

#[derive(Debug, Default)]
struct PoolState {
    pool: Vec<String>,
    banned: HashSet<String>,
    used: HashSet<String>,
    cursor: usize,
}

/// A shared, ban-aware rotation of egress endpoints.
#[derive(Debug)]
pub struct ProxyPool {
    state: Mutex<PoolState>,
}

impl ProxyPool {
    /// Builds a pool from endpoints, deduplicating while preserving first
    /// occurrence order. Endpoints without a scheme get `http://`.
    #[must_use]
    pub fn from_endpoints(endpoints: impl IntoIterator<Item = String>) -> Self {
        let mut seen = HashSet::new();
        let mut pool = Vec::new();
        for endpoint in endpoints {
            let endpoint = normalize_endpoint(&endpoint);
            if endpoint.is_empty() {
                continue;
            }
            if seen.insert(endpoint.clone()) {
                pool.push(endpoint);
            }
        }
        ProxyPool {
            state: Mutex::new(PoolState {
                pool,
                ..PoolState::default()
            }),
        }
    }

    /// Next non-banned endpoint, round-robin. `None` means the pool is
    /// exhausted; callers must not fall back to a direct connection.
    #[must_use]
    pub fn get(&self) -> Option<String> {
        let mut state = self.lock();
        let len = state.pool.len();
        for step in 0..len {
            let idx = (state.cursor + step) % len;
            let candidate = state.pool[idx].clone();
            if !state.banned.contains(&candidate) {
                state.cursor = (idx + 1) % len;
                return Some(candidate);
            }
        }
        None
    }

    /// First non-banned endpoint without advancing the rotation. Used by the
    /// preflight probe, which walks candidates itself.
    #[must_use]
    pub fn single(&self) -> Option<String> {
        let state = self.lock();
        state
            .pool
            .iter()
            .find(|p| !state.banned.contains(*p))
            .cloned()
    }

    /// All endpoints, banned or not, in pool order.
    #[must_use]
    pub fn all(&self) -> Vec<String> {
        self.lock().pool.clone()
    }

    /// Marks `endpoint` as banned. Idempotent; never unbanned within a run.
    pub fn ban(&self, endpoint: &str) {
        let mut state = self.lock();
        if state.banned.insert(endpoint.to_string()) {
            let active = state.pool.len() - state.banned.len();
            warn!(endpoint, remaining = active, "proxy banned");
        }
    }

    /// Records that `endpoint` was handed to a worker for an attempt.
    pub fn mark_used(&self, endpoint: &str) {
        self.lock().used.insert(endpoint.to_string());
    }

    /// Whether `endpoint` has been banned.
    #[must_use]
    pub fn is_banned(&self, endpoint: &str) -> bool {
        self.lock().banned.contains(endpoint)
    }

    /// Total endpoints in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().pool.len()
    }

    /// Whether the pool holds no endpoints at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().pool.is_empty()
    }

    /// Every endpoint handed out during the run, sorted for stable output.
    #[must_use]
    pub fn used_snapshot(&self) -> Vec<String> {
        let mut v: Vec<String> = self.lock().used.iter().cloned().collect();
        v.sort();
        v
    }

    /// Banned endpoints, sorted for stable output.
    #[must_use]
    pub fn banned_snapshot(&self) -> Vec<String> {
        let mut v: Vec<String> = self.lock().banned.iter().cloned().collect();
        v.sort();
        v
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        match self.state.lock() {
            Ok(guard) => guard,
            // Lock holders only touch maps; a panic mid-update cannot leave
            // the state logically torn, so poisoning is safe to ignore.
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn normalize_endpoint(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// Assembles the pool from [`ProxyOptions`], or `None` when no proxy source
/// was requested at all. Endpoints from every configured source are
/// concatenated (explicit first, then the file, then public discovery)
/// and deduplicated keeping the first occurrence.
pub async fn gather_pool(options: &ProxyOptions) -> Result<Option<ProxyPool>, ProxyError> {
    let mut endpoints: Vec<String> = Vec::new();
    let mut configured = false;

    if !options.explicit.is_empty() {
        configured = true;
        endpoints.extend(options.explicit.iter().cloned());
    }
    if let Some(path) = &options.file {
        configured = true;
        let from_file = read_proxy_file(path)?;
        info!(count = from_file.len(), path = %path.display(), "loaded proxy file");
        endpoints.extend(from_file);
    }
    if options.public_count > 0 {
        configured = true;
        let public = fetch_public_proxies(
            options.public_count,
            options.public_country.as_deref(),
            options.public_scheme,
        )
        .await?;
        info!(count = public.len(), "fetched public proxies");
        endpoints.extend(public);
    }

    if !configured {
        return Ok(None);
    }
    let pool = ProxyPool::from_endpoints(endpoints);
    info!(count = pool.len(), "proxy pool assembled");
    Ok(Some(pool))
}

fn read_proxy_file(path: &Path) -> Result<Vec<String>, ProxyError> {
    let text = std::fs::read_to_string(path).map_err(|source| ProxyError::File {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

/// Fetches up to `limit` public proxies. The primary list service is tried
/// first; if it fails or comes back empty, the plain-text SOCKS5 list is
/// used as a fallback.
pub async fn fetch_public_proxies(
    limit: usize,
    country: Option<&str>,
    scheme: ProxyScheme,
) -> Result<Vec<String>, ProxyError> {
    let mut url = format!(
        "{PUBLIC_PROXY_API}?request=display_proxies&protocol={}&proxy_format=ipport&format=text",
        scheme.api_protocol()
    );
    if let Some(cc) = country {
        url.push_str("&country=");
        url.push_str(cc);
    }
    match fetch_proxy_list(&url, limit, scheme).await {
        Ok(endpoints) if !endpoints.is_empty() => Ok(endpoints),
        Ok(_) | Err(ProxyError::Fetch(_)) => {
            debug!("primary proxy list unusable; falling back to socks5 list");
            let endpoints = fetch_proxy_list(SOCKS_LIST_URL, limit, ProxyScheme::Socks).await?;
            if endpoints.is_empty() {
                return Err(ProxyError::Empty);
            }
            Ok(endpoints)
        }
        Err(e) => Err(e),
    }
}

/// Downloads a plain-text `ip:port`-per-line proxy list from `url`, keeping
/// the first `limit` entries prefixed with the scheme.
pub async fn fetch_proxy_list(
    url: &str,
    limit: usize,
    scheme: ProxyScheme,
) -> Result<Vec<String>, ProxyError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(DISCOVERY_TIMEOUT_SECS))
        .build()?;
    let body = client.get(url).send().await?.error_for_status()?.text().await?;
    Ok(body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .take(limit)
        .map(|l| {
            if l.contains("://") {
                l.to_string()
            } else {
                format!("{}{l}", scheme.prefix())
            }
        })
        .collect())
}
