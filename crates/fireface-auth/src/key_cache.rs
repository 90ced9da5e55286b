//! Stale-tolerant key-set cache.
//!
//! Holds the most recent [`KeySet`] and decides when it must be refreshed.
//! Refresh is pull-based: callers ask for a fresh set before verifying, and
//! at most one fetch runs at a time.
//!
//! # Behavior
//!
//! - No set cached: fetch, and return the error if that fails
//! - Set older than `min_refresh_interval`: fetch; on failure keep serving
//!   the old set and log a warning
//! - Fetch attempts after the first are at least `refresh_cooldown` apart
//! - A caller that waited behind a running fetch re-checks before fetching

use crate::errors::RefreshError;
use crate::jwks::{KeySet, KeySetSource, VerificationKey};
use crate::observability::metrics::{record_jwks_refresh, set_jwks_keys, RefreshTrigger};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// The current key set and when it was fetched.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key_set: Arc<KeySet>,
    pub fetched_at: Instant,
}

/// Fetch bookkeeping, only touched while holding the refresh lock.
#[derive(Debug, Default)]
struct RefreshState {
    last_attempt: Option<Instant>,
    last_error: Option<RefreshError>,
}

impl RefreshState {
    fn cooling_down(&self, now: Instant, cooldown: Duration) -> bool {
        self.last_attempt
            .is_some_and(|last| now.saturating_duration_since(last) < cooldown)
    }
}

/// Cache of the server's verification keys.
pub struct KeyCache {
    source: Arc<dyn KeySetSource>,
    min_refresh_interval: Duration,
    refresh_cooldown: Duration,
    entry: RwLock<Option<CacheEntry>>,
    refresh: Mutex<RefreshState>,
}

impl KeyCache {
    pub fn new(
        source: Arc<dyn KeySetSource>,
        min_refresh_interval: Duration,
        refresh_cooldown: Duration,
    ) -> Self {
        Self {
            source,
            min_refresh_interval,
            refresh_cooldown,
            entry: RwLock::new(None),
            refresh: Mutex::new(RefreshState::default()),
        }
    }

    /// Endpoint of the underlying source.
    pub fn endpoint(&self) -> &str {
        self.source.endpoint()
    }

    /// Current key set, if any.
    pub async fn snapshot(&self) -> Option<Arc<KeySet>> {
        self.entry.read().await.as_ref().map(|e| Arc::clone(&e.key_set))
    }

    /// When the current key set was fetched.
    pub async fn fetched_at(&self) -> Option<Instant> {
        self.entry.read().await.as_ref().map(|e| e.fetched_at)
    }

    /// Look up a key in the current snapshot.
    pub async fn key_by_id(&self, kid: &str) -> Option<VerificationKey> {
        self.entry
            .read()
            .await
            .as_ref()
            .and_then(|e| e.key_set.get(kid).cloned())
    }

    /// Fetch unconditionally, ignoring age and cooldown.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the cache is left unchanged.
    pub async fn warm_up_at(&self, now: Instant) -> Result<Arc<KeySet>, RefreshError> {
        let mut state = self.refresh.lock().await;
        self.fetch_and_install(&mut state, now, RefreshTrigger::WarmUp)
            .await
    }

    /// [`ensure_fresh_at`](Self::ensure_fresh_at) with the current time.
    ///
    /// # Errors
    ///
    /// See [`ensure_fresh_at`](Self::ensure_fresh_at).
    pub async fn ensure_fresh(&self) -> Result<Arc<KeySet>, RefreshError> {
        self.ensure_fresh_at(Instant::now()).await
    }

    /// Return a key set that is fresh enough to verify with at `now`.
    ///
    /// # Errors
    ///
    /// Only when nothing is cached and the fetch fails (or failed within the
    /// cooldown). A stale set is served rather than an error.
    pub async fn ensure_fresh_at(&self, now: Instant) -> Result<Arc<KeySet>, RefreshError> {
        if let Some(key_set) = self.fresh_snapshot(now).await {
            return Ok(key_set);
        }

        let mut state = self.refresh.lock().await;

        // Another caller may have refreshed while we waited.
        let current = self.entry.read().await.clone();
        match current {
            Some(entry) if !self.is_stale(&entry, now) => Ok(entry.key_set),
            Some(entry) => {
                if state.cooling_down(now, self.refresh_cooldown) {
                    tracing::debug!(
                        target: "fireface.auth.cache",
                        url = %self.source.endpoint(),
                        "Key set stale but refresh cooling down"
                    );
                    return Ok(entry.key_set);
                }

                match self
                    .fetch_and_install(&mut state, now, RefreshTrigger::Stale)
                    .await
                {
                    Ok(key_set) => Ok(key_set),
                    Err(e) => {
                        tracing::warn!(
                            target: "fireface.auth.cache",
                            url = %self.source.endpoint(),
                            key_count = entry.key_set.len(),
                            error = %e,
                            "Key set refresh failed, serving cached keys"
                        );
                        Ok(entry.key_set)
                    }
                }
            }
            None => {
                if state.cooling_down(now, self.refresh_cooldown) {
                    if let Some(e) = state.last_error.clone() {
                        return Err(e);
                    }
                }
                self.fetch_and_install(&mut state, now, RefreshTrigger::Missing)
                    .await
            }
        }
    }

    /// Refresh regardless of age, unless an attempt happened within the
    /// cooldown.
    ///
    /// Returns the key set to retry with: the new one on success, the
    /// current one when throttled.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, or the last error when throttled with nothing
    /// cached.
    pub async fn force_refresh_at(&self, now: Instant) -> Result<Arc<KeySet>, RefreshError> {
        let mut state = self.refresh.lock().await;

        if state.cooling_down(now, self.refresh_cooldown) {
            tracing::debug!(
                target: "fireface.auth.cache",
                url = %self.source.endpoint(),
                "Forced refresh suppressed by cooldown"
            );
            if let Some(key_set) = self.snapshot().await {
                return Ok(key_set);
            }
            if let Some(e) = state.last_error.clone() {
                return Err(e);
            }
        }

        let result = self
            .fetch_and_install(&mut state, now, RefreshTrigger::UnknownKey)
            .await;
        if let Err(e) = &result {
            tracing::warn!(
                target: "fireface.auth.cache",
                url = %self.source.endpoint(),
                error = %e,
                "Forced key set refresh failed"
            );
        }
        result
    }

    async fn fresh_snapshot(&self, now: Instant) -> Option<Arc<KeySet>> {
        self.entry
            .read()
            .await
            .as_ref()
            .filter(|e| !self.is_stale(e, now))
            .map(|e| Arc::clone(&e.key_set))
    }

    fn is_stale(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.fetched_at) >= self.min_refresh_interval
    }

    /// Fetch, then swap the new set in. Caller holds the refresh lock.
    async fn fetch_and_install(
        &self,
        state: &mut RefreshState,
        now: Instant,
        trigger: RefreshTrigger,
    ) -> Result<Arc<KeySet>, RefreshError> {
        state.last_attempt = Some(now);
        let started = Instant::now();

        tracing::debug!(
            target: "fireface.auth.cache",
            url = %self.source.endpoint(),
            trigger = trigger.as_str(),
            "Refreshing key set"
        );

        let key_set = match self.source.fetch().await {
            Ok(key_set) => Arc::new(key_set),
            Err(e) => {
                record_jwks_refresh(false, trigger, started.elapsed());
                state.last_error = Some(e.clone());
                return Err(e);
            }
        };
        record_jwks_refresh(true, trigger, started.elapsed());
        set_jwks_keys(key_set.len());
        state.last_error = None;

        let mut entry = self.entry.write().await;
        let fetched_at = entry
            .as_ref()
            .map_or(now, |previous| previous.fetched_at.max(now));
        *entry = Some(CacheEntry {
            key_set: Arc::clone(&key_set),
            fetched_at,
        });
        drop(entry);

        tracing::info!(
            target: "fireface.auth.cache",
            url = %self.source.endpoint(),
            key_count = key_set.len(),
            trigger = trigger.as_str(),
            "Key set refreshed"
        );

        Ok(key_set)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::InvalidKeyPolicy;
    use crate::errors::FetchError;
    use crate::jwks::parse_key_set;
    use async_trait::async_trait;
    use auth_test_utils::{jwks_body, rsa_jwk, RSA_KEY_1, RSA_KEY_2};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MIN_REFRESH: Duration = Duration::from_secs(300);
    const COOLDOWN: Duration = Duration::from_secs(30);

    fn key_set(kids: &[&str]) -> KeySet {
        let keys: Vec<_> = kids
            .iter()
            .enumerate()
            .map(|(i, kid)| rsa_jwk(if i % 2 == 0 { &RSA_KEY_1 } else { &RSA_KEY_2 }, kid))
            .collect();
        parse_key_set(
            &serde_json::to_vec(&jwks_body(&keys)).unwrap(),
            InvalidKeyPolicy::Reject,
        )
        .unwrap()
    }

    /// Source that replays scripted results and counts calls.
    struct ScriptedSource {
        results: std::sync::Mutex<VecDeque<Result<KeySet, RefreshError>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedSource {
        fn new(results: Vec<Result<KeySet, RefreshError>>) -> Arc<Self> {
            Self::with_delay(results, Duration::ZERO)
        }

        fn with_delay(results: Vec<Result<KeySet, RefreshError>>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                results: std::sync::Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KeySetSource for ScriptedSource {
        async fn fetch(&self) -> Result<KeySet, RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchError::Status(500).into()))
        }

        fn endpoint(&self) -> &str {
            "scripted://jwks"
        }
    }

    fn cache(source: &Arc<ScriptedSource>) -> KeyCache {
        KeyCache::new(source.clone(), MIN_REFRESH, COOLDOWN)
    }

    fn kids(set: &KeySet) -> Vec<String> {
        set.kids().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_empty_cache_fetches_and_surfaces_errors() {
        let source = ScriptedSource::new(vec![Err(FetchError::Timeout.into())]);
        let cache = cache(&source);

        let err = cache.ensure_fresh_at(Instant::now()).await.unwrap_err();
        assert_eq!(err, RefreshError::Fetch(FetchError::Timeout));
        assert!(cache.snapshot().await.is_none());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_fresh_set_is_served_without_fetch() {
        let source = ScriptedSource::new(vec![Ok(key_set(&["k1"]))]);
        let cache = cache(&source);
        let t0 = Instant::now();

        cache.warm_up_at(t0).await.unwrap();
        let set = cache
            .ensure_fresh_at(t0 + MIN_REFRESH - Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(kids(&set), vec!["k1"]);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_set_is_refreshed() {
        let source = ScriptedSource::new(vec![Ok(key_set(&["k1"])), Ok(key_set(&["k2"]))]);
        let cache = cache(&source);
        let t0 = Instant::now();

        cache.warm_up_at(t0).await.unwrap();
        let set = cache.ensure_fresh_at(t0 + MIN_REFRESH).await.unwrap();

        assert_eq!(kids(&set), vec!["k2"]);
        assert_eq!(cache.fetched_at().await, Some(t0 + MIN_REFRESH));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_failure_serves_previous_set() {
        let source = ScriptedSource::new(vec![
            Ok(key_set(&["k1"])),
            Err(FetchError::Status(503).into()),
        ]);
        let cache = cache(&source);
        let t0 = Instant::now();

        cache.warm_up_at(t0).await.unwrap();
        let set = cache.ensure_fresh_at(t0 + MIN_REFRESH).await.unwrap();

        assert_eq!(kids(&set), vec!["k1"]);
        assert_eq!(cache.fetched_at().await, Some(t0));
        assert!(cache.key_by_id("k1").await.is_some());
    }

    #[tokio::test]
    async fn test_cooldown_limits_attempts_after_failure() {
        let source = ScriptedSource::new(vec![
            Ok(key_set(&["k1"])),
            Err(FetchError::Status(503).into()),
            Ok(key_set(&["k2"])),
        ]);
        let cache = cache(&source);
        let t0 = Instant::now();
        let stale = t0 + MIN_REFRESH;

        cache.warm_up_at(t0).await.unwrap();
        cache.ensure_fresh_at(stale).await.unwrap();
        assert_eq!(source.calls(), 2);

        // Within cooldown: no new attempt.
        for offset in [1, 10, 29] {
            let set = cache
                .ensure_fresh_at(stale + Duration::from_secs(offset))
                .await
                .unwrap();
            assert_eq!(kids(&set), vec!["k1"]);
        }
        assert_eq!(source.calls(), 2);

        // After cooldown: retried, and the new set lands.
        let set = cache.ensure_fresh_at(stale + COOLDOWN).await.unwrap();
        assert_eq!(kids(&set), vec!["k2"]);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_cooldown_with_empty_cache_returns_last_error() {
        let source = ScriptedSource::new(vec![Err(FetchError::Status(502).into())]);
        let cache = cache(&source);
        let t0 = Instant::now();

        assert!(cache.ensure_fresh_at(t0).await.is_err());
        let err = cache
            .ensure_fresh_at(t0 + Duration::from_secs(1))
            .await
            .unwrap_err();

        assert_eq!(err, RefreshError::Fetch(FetchError::Status(502)));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_respects_cooldown() {
        let source = ScriptedSource::new(vec![Ok(key_set(&["k1"])), Ok(key_set(&["k1", "k2"]))]);
        let cache = cache(&source);
        let t0 = Instant::now();

        cache.warm_up_at(t0).await.unwrap();

        // Warm-up counts as an attempt.
        let set = cache.force_refresh_at(t0 + Duration::from_secs(1)).await.unwrap();
        assert_eq!(kids(&set), vec!["k1"]);
        assert_eq!(source.calls(), 1);

        let set = cache.force_refresh_at(t0 + COOLDOWN).await.unwrap();
        assert_eq!(kids(&set), vec!["k1", "k2"]);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_force_refresh_failure_keeps_set() {
        let source = ScriptedSource::new(vec![Ok(key_set(&["k1"])), Err(FetchError::Timeout.into())]);
        let cache = cache(&source);
        let t0 = Instant::now();

        cache.warm_up_at(t0).await.unwrap();
        assert!(cache.force_refresh_at(t0 + COOLDOWN).await.is_err());
        assert_eq!(kids(&cache.snapshot().await.unwrap()), vec!["k1"]);
    }

    #[tokio::test]
    async fn test_fetched_at_never_moves_backwards() {
        let source = ScriptedSource::new(vec![Ok(key_set(&["k1"])), Ok(key_set(&["k2"]))]);
        let cache = KeyCache::new(source.clone(), MIN_REFRESH, Duration::ZERO);
        let t0 = Instant::now() + Duration::from_secs(3600);

        cache.warm_up_at(t0).await.unwrap();
        cache.warm_up_at(t0 - Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.fetched_at().await, Some(t0));
        assert!(cache.key_by_id("k2").await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let source =
            ScriptedSource::with_delay(vec![Ok(key_set(&["k1"]))], Duration::from_millis(50));
        let cache = Arc::new(cache(&source));
        let now = Instant::now();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.ensure_fresh_at(now).await })
            })
            .collect();

        for handle in handles {
            let set = handle.await.unwrap().unwrap();
            assert_eq!(kids(&set), vec!["k1"]);
        }
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_stale_callers_share_one_refresh() {
        let source = ScriptedSource::with_delay(
            vec![Ok(key_set(&["k1"])), Ok(key_set(&["k2"])), Ok(key_set(&["k3"]))],
            Duration::from_millis(50),
        );
        let cache = Arc::new(cache(&source));
        let t0 = Instant::now();
        cache.warm_up_at(t0).await.unwrap();
        let stale = t0 + MIN_REFRESH;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.ensure_fresh_at(stale).await })
            })
            .collect();

        for handle in handles {
            let set = handle.await.unwrap().unwrap();
            assert_eq!(kids(&set), vec!["k2"]);
        }
        assert_eq!(source.calls(), 2);
        assert_eq!(cache.fetched_at().await, Some(stale));
    }

    #[tokio::test]
    async fn test_readers_see_old_or_new_set_only() {
        let source = ScriptedSource::with_delay(
            vec![Ok(key_set(&["k1"])), Ok(key_set(&["k2", "k3"]))],
            Duration::from_millis(20),
        );
        let cache = Arc::new(cache(&source));
        let t0 = Instant::now();
        cache.warm_up_at(t0).await.unwrap();

        let refresher = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.ensure_fresh_at(t0 + MIN_REFRESH).await })
        };

        for _ in 0..10 {
            let set = cache.snapshot().await.unwrap();
            let seen = kids(&set);
            assert!(seen == vec!["k1"] || seen == vec!["k2", "k3"], "{seen:?}");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        refresher.await.unwrap().unwrap();
    }
}
