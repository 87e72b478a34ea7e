//! Server-side token revocation.
//!
//! [`RevocationStore`] is the capability the verifier depends on. Two backends
//! are provided: [`InMemoryRevocationStore`] for single-process deployments and
//! tests, and [`RedisRevocationStore`] which relies on native key expiry.
//!
//! Every call made on behalf of a request goes through [`RevocationGuard`],
//! the one place where timeouts, the single retry, and the
//! [`FailurePolicy`] for an unreachable store are applied.

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::{OnceCell, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("revocation backend error: {0}")]
    Backend(String),
    #[error("revocation store call timed out after {0:?}")]
    Timeout(Duration),
}

impl From<redis::RedisError> for StoreError {
    fn from(value: redis::RedisError) -> Self {
        Self::Backend(value.to_string())
    }
}

/// Records revoked token identifiers until the tokens would have expired anyway.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Mark `token_id` revoked for at least `ttl`.
    async fn revoke(&self, token_id: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn is_revoked(&self, token_id: &str) -> Result<bool, StoreError>;
}

// ---------------- In-Memory Implementation ----------------

/// `tokio::time::interval` panics on a zero period.
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy)]
pub struct RevocationEntry {
    pub revoked_at: DateTime<Utc>,
    expires_at: Instant,
}

impl RevocationEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRevocationStore {
    entries: Arc<RwLock<HashMap<String, RevocationEntry>>>,
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entry(&self, token_id: &str) -> Option<RevocationEntry> {
        let guard = self.entries.read().await;
        guard
            .get(token_id)
            .copied()
            .filter(|entry| entry.is_live(Instant::now()))
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every entry whose token has expired. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.entries.write().await;
        let before = guard.len();
        guard.retain(|_, entry| entry.is_live(now));
        before - guard.len()
    }

    /// Periodically purge expired entries so the map stays bounded.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(MIN_SWEEP_PERIOD));
            loop {
                ticker.tick().await;
                let purged = store.purge_expired().await;
                if purged > 0 {
                    debug!(purged, "purged expired revocation entries");
                }
            }
        })
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn revoke(&self, token_id: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let candidate = RevocationEntry {
            revoked_at: Utc::now(),
            expires_at: now + ttl,
        };
        let mut guard = self.entries.write().await;
        guard
            .entry(token_id.to_string())
            .and_modify(|existing| {
                // A repeated revoke may extend an entry but never shorten it.
                if !existing.is_live(now) {
                    *existing = candidate;
                } else if candidate.expires_at > existing.expires_at {
                    existing.expires_at = candidate.expires_at;
                }
            })
            .or_insert(candidate);
        Ok(())
    }

    async fn is_revoked(&self, token_id: &str) -> Result<bool, StoreError> {
        Ok(self.entry(token_id).await.is_some())
    }
}

// ---------------- Redis Implementation ----------------

pub const DEFAULT_REDIS_PREFIX: &str = "blacklist_token";

#[derive(Clone)]
pub struct RedisRevocationStore {
    client: redis::Client,
    manager: Arc<OnceCell<ConnectionManager>>,
    prefix: String,
}

impl RedisRevocationStore {
    /// Parses the URL eagerly; the connection itself is opened on first use so
    /// an unreachable server surfaces as a per-request failure, not a boot failure.
    pub fn new(redis_url: &str, prefix: impl Into<String>) -> AuthResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| AuthError::Configuration(format!("invalid redis url: {err}")))?;
        Ok(Self {
            client,
            manager: Arc::new(OnceCell::new()),
            prefix: prefix.into(),
        })
    }

    fn key(&self, token_id: &str) -> String {
        format!("{}:{}", self.prefix, token_id)
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let manager = self
            .manager
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn revoke(&self, token_id: &str, ttl: Duration) -> Result<(), StoreError> {
        // EX takes whole seconds; round up so the entry lives at least `ttl`.
        let seconds = (ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)).max(1);
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("SET")
            .arg(self.key(token_id))
            .arg(Utc::now().timestamp())
            .arg("EX")
            .arg(seconds)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn is_revoked(&self, token_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let exists: bool = conn.exists(self.key(token_id)).await?;
        Ok(exists)
    }
}

// ---------------- Failure policy ----------------

/// What validation does when revocation state cannot be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Deny the request with [`AuthError::CacheUnavailable`].
    #[default]
    FailClosed,
    /// Treat the token as not revoked and let the request through.
    FailOpen,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "closed" | "fail-closed" | "fail_closed" => Ok(FailurePolicy::FailClosed),
            "open" | "fail-open" | "fail_open" => Ok(FailurePolicy::FailOpen),
            other => Err(format!(
                "Unsupported revocation failure policy '{other}'. Use closed or open."
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RevocationPolicy {
    /// Upper bound on a single store call.
    pub timeout: Duration,
    /// Pause before the one retry of a failed call.
    pub retry_backoff: Duration,
    pub on_unavailable: FailurePolicy,
}

impl Default for RevocationPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(250),
            retry_backoff: Duration::from_millis(50),
            on_unavailable: FailurePolicy::FailClosed,
        }
    }
}

#[derive(Clone)]
pub struct RevocationGuard {
    store: Arc<dyn RevocationStore>,
    policy: RevocationPolicy,
}

impl RevocationGuard {
    pub fn new(store: Arc<dyn RevocationStore>, policy: RevocationPolicy) -> Self {
        Self { store, policy }
    }

    async fn attempt<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let limit = self.policy.timeout;
        let first = match timeout(limit, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_) => StoreError::Timeout(limit),
        };

        warn!(operation, error = %first, "revocation store call failed, retrying once");
        sleep(self.policy.retry_backoff).await;

        match timeout(limit, call()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(limit)),
        }
    }

    /// Revocation lookup with the configured failure policy applied.
    pub async fn is_revoked(&self, token_id: &str) -> AuthResult<bool> {
        match self
            .attempt("is_revoked", || self.store.is_revoked(token_id))
            .await
        {
            Ok(revoked) => Ok(revoked),
            Err(err) => match self.policy.on_unavailable {
                FailurePolicy::FailClosed => Err(AuthError::CacheUnavailable(err.to_string())),
                FailurePolicy::FailOpen => {
                    warn!(token_id, error = %err, "revocation state unknown, failing open");
                    Ok(false)
                }
            },
        }
    }

    /// Record a revocation. Always fails closed: a revocation that was not
    /// stored must not be reported as done.
    pub async fn revoke(&self, token_id: &str, ttl: Duration) -> AuthResult<()> {
        self.attempt("revoke", || self.store.revoke(token_id, ttl))
            .await
            .map_err(|err| AuthError::CacheUnavailable(err.to_string()))?;
        debug!(token_id, ttl_secs = ttl.as_secs(), "token revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyStore {
        calls: AtomicUsize,
        failures_before_success: usize,
    }

    #[async_trait]
    impl RevocationStore for FlakyStore {
        async fn revoke(&self, _token_id: &str, _ttl: Duration) -> Result<(), StoreError> {
            self.next()
        }

        async fn is_revoked(&self, _token_id: &str) -> Result<bool, StoreError> {
            self.next().map(|_| true)
        }
    }

    impl FlakyStore {
        fn new(failures_before_success: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures_before_success,
            })
        }

        fn next(&self) -> Result<(), StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(StoreError::Backend("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    struct StalledStore;

    #[async_trait]
    impl RevocationStore for StalledStore {
        async fn revoke(&self, _token_id: &str, _ttl: Duration) -> Result<(), StoreError> {
            sleep(Duration::from_secs(30)).await;
            Ok(())
        }

        async fn is_revoked(&self, _token_id: &str) -> Result<bool, StoreError> {
            sleep(Duration::from_secs(30)).await;
            Ok(false)
        }
    }

    fn fast_policy(on_unavailable: FailurePolicy) -> RevocationPolicy {
        RevocationPolicy {
            timeout: Duration::from_millis(20),
            retry_backoff: Duration::from_millis(1),
            on_unavailable,
        }
    }

    #[tokio::test]
    async fn revoked_entry_is_visible_until_ttl_elapses() {
        let store = InMemoryRevocationStore::new();
        store.revoke("jti-1", Duration::from_millis(40)).await.unwrap();
        assert!(store.is_revoked("jti-1").await.unwrap());
        assert!(!store.is_revoked("jti-2").await.unwrap());

        sleep(Duration::from_millis(60)).await;
        assert!(!store.is_revoked("jti-1").await.unwrap());
        assert_eq!(store.purge_expired().await, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn repeated_revoke_never_shortens_entry() {
        let store = InMemoryRevocationStore::new();
        store.revoke("jti", Duration::from_secs(60)).await.unwrap();
        store.revoke("jti", Duration::from_millis(1)).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        assert!(store.is_revoked("jti").await.unwrap());
    }

    #[tokio::test]
    async fn sweeper_with_zero_period_keeps_purging() {
        let store = InMemoryRevocationStore::new();
        store.revoke("jti", Duration::from_millis(5)).await.unwrap();
        let sweeper = store.spawn_sweeper(Duration::ZERO);

        sleep(Duration::from_millis(50)).await;
        assert!(!sweeper.is_finished());
        assert!(store.is_empty().await);
        sweeper.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_revoke_and_lookup_do_not_lose_updates() {
        let store = InMemoryRevocationStore::new();
        let mut handles = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    store.revoke("shared", Duration::from_secs(60)).await.unwrap();
                    assert!(store.is_revoked("shared").await.unwrap());
                } else {
                    let _ = store.is_revoked("shared").await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(store.is_revoked("shared").await.unwrap());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn single_transient_failure_is_retried() {
        let store = FlakyStore::new(1);
        let guard = RevocationGuard::new(store.clone(), fast_policy(FailurePolicy::FailClosed));
        assert!(guard.is_revoked("jti").await.unwrap());
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_failure_fails_closed() {
        let store = FlakyStore::new(usize::MAX);
        let guard = RevocationGuard::new(store.clone(), fast_policy(FailurePolicy::FailClosed));
        let err = guard.is_revoked("jti").await.expect_err("must deny");
        assert!(matches!(err, AuthError::CacheUnavailable(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_failure_fails_open_when_configured() {
        let guard = RevocationGuard::new(FlakyStore::new(usize::MAX), fast_policy(FailurePolicy::FailOpen));
        assert!(!guard.is_revoked("jti").await.unwrap());
    }

    #[tokio::test]
    async fn stalled_store_times_out_to_policy() {
        let guard = RevocationGuard::new(Arc::new(StalledStore), fast_policy(FailurePolicy::FailClosed));
        let err = guard.is_revoked("jti").await.expect_err("timeout denies");
        assert!(matches!(err, AuthError::CacheUnavailable(_)));

        let open = RevocationGuard::new(Arc::new(StalledStore), fast_policy(FailurePolicy::FailOpen));
        let err = open
            .revoke("jti", Duration::from_secs(1))
            .await
            .expect_err("revoke never fails open");
        assert!(matches!(err, AuthError::CacheUnavailable(_)));
    }

    #[test]
    fn failure_policy_parses() {
        assert_eq!("closed".parse::<FailurePolicy>().unwrap(), FailurePolicy::FailClosed);
        assert_eq!("Fail-Open".parse::<FailurePolicy>().unwrap(), FailurePolicy::FailOpen);
        assert!("sometimes".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn redis_store_rejects_invalid_url() {
        let err = RedisRevocationStore::new("not a url", DEFAULT_REDIS_PREFIX)
            .err()
            .expect("invalid url");
        assert!(matches!(err, AuthError::Configuration(_)));
    }
}
