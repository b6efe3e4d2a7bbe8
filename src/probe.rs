//! Preflight egress probe (`--check-ip`).
//!
//! Before a large run it is worth a few cheap requests to find out whether
//! the current IP (or the pool) can reach YouTube at all. Candidates are
//! tried in order until one answers; any that cannot fetch a known-good
//! video within the attempt budget is banned up front so workers never
//! waste retries on it.

use std::time::Duration;

use tracing::{info, warn};

use crate::proxy::ProxyPool;
use crate::transport::{FetchError, TranscriptSource};

/// A stable, captioned video used as the probe target.
pub const PROBE_VIDEO_ID: &str = "jNQXAC9IVRw";

const PROBE_TRIES: u32 = 3;
const BLOCKED_BACKOFF_SECS: u64 = 6;
const TRANSIENT_BACKOFF_SECS: u64 = 1;

/// Label used in logs for the no-proxy candidate.
const DIRECT: &str = "direct";

/// Probes egress candidates in pool order and reports whether one works.
///
/// Returns `true` as soon as a candidate proves alive; the rest are left
/// unprobed. Failing candidates encountered along the way are banned in
/// the pool. Without a pool the single candidate is the direct connection.
/// A fetch that returns captions, or a definitive per-video answer like
/// "no captions", proves the egress path is alive.
pub async fn probe_egress(source: &dyn TranscriptSource, pool: Option<&ProxyPool>) -> bool {
    let candidates: Vec<Option<String>> = match pool {
        Some(pool) => pool
            .all()
            .into_iter()
            .filter(|p| !pool.is_banned(p))
            .map(Some)
            .collect(),
        None => vec![None],
    };

    for candidate in candidates {
        let label = candidate.as_deref().unwrap_or(DIRECT);
        if probe_candidate(source, candidate.as_deref()).await {
            info!(egress = label, "egress check passed");
            return true;
        }
        warn!(egress = label, "egress check failed; banning candidate");
        if let Some(pool) = pool {
            if let Some(endpoint) = &candidate {
                pool.ban(endpoint);
            }
        }
    }
    false
}

async fn probe_candidate(source: &dyn TranscriptSource, proxy: Option<&str>) -> bool {
    let languages = [String::from("en")];
    for attempt in 1..=PROBE_TRIES {
        match source.fetch(PROBE_VIDEO_ID, &languages, proxy).await {
            Ok(_)
            | Err(FetchError::NoCaptions { .. })
            | Err(FetchError::VideoUnavailable { .. }) => return true,
            Err(e) => {
                warn!(attempt, error = %e, "probe attempt failed");
                if attempt < PROBE_TRIES {
                    let base = match e {
                        FetchError::Blocked { .. } => BLOCKED_BACKOFF_SECS,
                        _ => TRANSIENT_BACKOFF_SECS,
                    };
                    tokio::time::sleep(Duration::from_secs(base * u64::from(attempt))).await;
                }
            }
        }
    }
    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::transport::Cue;

    /// Scripted source: pops one pre-canned outcome per call.
    struct Scripted {
        outcomes: Mutex<Vec<Result<Vec<Cue>, FetchError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<Vec<Cue>, FetchError>>) -> Self {
            Scripted {
                outcomes: Mutex::new(outcomes),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TranscriptSource for Scripted {
        async fn fetch(
            &self,
            _video_id: &str,
            _languages: &[String],
            _proxy: Option<&str>,
        ) -> Result<Vec<Cue>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes.lock().unwrap().remove(0)
        }
    }

    fn cues() -> Vec<Cue> {
        vec![Cue {
            start: 0.0,
            duration: 1.0,
            text: "ok".to_string(),
        }]
    }

    #[tokio::test]
    async fn test_direct_probe_succeeds_first_try() {
        let source = Scripted::new(vec![Ok(cues())]);
        assert!(probe_egress(&source, None).await);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_captions_counts_as_alive() {
        // A per-video answer proves the egress path works.
        let source = Scripted::new(vec![Err(FetchError::NoCaptions {
            video_id: PROBE_VIDEO_ID.to_string(),
        })]);
        assert!(probe_egress(&source, None).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_probe_exhausts_attempts() {
        let source = Scripted::new(vec![
            Err(FetchError::blocked("429")),
            Err(FetchError::blocked("429")),
            Err(FetchError::blocked("429")),
        ]);
        assert!(!probe_egress(&source, None).await);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_pool_candidates_get_banned() {
        let pool = ProxyPool::from_endpoints(vec![
            "http://a:1".to_string(),
            "http://b:2".to_string(),
        ]);
        // Candidate a: blocked three times. Candidate b: succeeds.
        let source = Scripted::new(vec![
            Err(FetchError::blocked("429")),
            Err(FetchError::blocked("429")),
            Err(FetchError::blocked("429")),
            Ok(cues()),
        ]);
        assert!(probe_egress(&source, Some(&pool)).await);
        assert!(pool.is_banned("http://a:1"));
        assert!(!pool.is_banned("http://b:2"));
    }

    #[tokio::test]
    async fn test_first_live_candidate_short_circuits() {
        let pool = ProxyPool::from_endpoints(vec![
            "http://a:1".to_string(),
            "http://b:2".to_string(),
        ]);
        let source = Scripted::new(vec![Ok(cues())]);
        assert!(probe_egress(&source, Some(&pool)).await);
        // Candidate a answered, so b is never contacted.
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(pool.banned_snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_candidates_dead_returns_false() {
        let pool = ProxyPool::from_endpoints(vec!["http://a:1".to_string()]);
        let source = Scripted::new(vec![
            Err(FetchError::transient("reset")),
            Err(FetchError::transient("reset")),
            Err(FetchError::transient("reset")),
        ]);
        assert!(!probe_egress(&source, Some(&pool)).await);
        assert!(pool.is_banned("http://a:1"));
    }
}
