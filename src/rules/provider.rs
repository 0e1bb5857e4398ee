use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OnceCell, RwLock};

use super::source::RemoteRuleSource;
use super::types::{ResolvedRuleSet, RuleSet, RuleSetError, RuleSource};

/// Bundled fiscal-year documents, compiled in. Tried when the remote source
/// is unavailable; the generic document is the last resort.
const BUNDLED_FISCAL: &[(&str, &str)] = &[("2025-26", include_str!("../../rules/fy2025-26.json"))];
const BUNDLED_GENERIC: &str = include_str!("../../rules/default.json");

const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub ttl: Duration,
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            snapshot_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKeyStatus {
    pub age_ms: i64,
    pub ttl_ms: i64,
    pub expired: bool,
}

#[derive(Clone)]
struct CacheEntry {
    resolved: Arc<ResolvedRuleSet>,
    inserted_at: DateTime<Utc>,
}

type ResolveResult = Result<Arc<ResolvedRuleSet>, RuleSetError>;
type InflightCell = Arc<OnceCell<ResolveResult>>;

/// Resolves fiscal years to rulesets through a TTL cache with a
/// remote -> bundled-fiscal -> bundled-generic fallback chain. Concurrent
/// misses for one fiscal year share a single resolution (per-key cell, not a
/// global lock), and every caller in that flight sees the same outcome.
pub struct RuleSetProvider<S> {
    remote: Option<S>,
    config: ProviderConfig,
    cache: RwLock<HashMap<String, CacheEntry>>,
    inflight: Mutex<HashMap<String, InflightCell>>,
}

impl<S: RemoteRuleSource> RuleSetProvider<S> {
    pub fn new(remote: Option<S>, config: ProviderConfig) -> Self {
        Self {
            remote,
            config,
            cache: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, fiscal_year: &str) -> ResolveResult {
        if let Some(hit) = self.fresh_cache_hit(fiscal_year).await {
            return Ok(hit);
        }

        let cell = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(fiscal_year.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_init(|| async {
                // A caller that lost the race to a completed flight finds
                // the cache already populated.
                if let Some(hit) = self.fresh_cache_hit(fiscal_year).await {
                    return Ok(hit);
                }
                match self.resolve_uncached(fiscal_year).await {
                    Ok(resolved) => {
                        let resolved = Arc::new(resolved);
                        self.cache.write().await.insert(
                            fiscal_year.to_string(),
                            CacheEntry {
                                resolved: resolved.clone(),
                                inserted_at: resolved.resolved_at,
                            },
                        );
                        self.persist_snapshot(&resolved);
                        Ok(resolved)
                    }
                    Err(err) => Err(err),
                }
            })
            .await
            .clone();

        let mut inflight = self.inflight.lock().await;
        if let Some(current) = inflight.get(fiscal_year) {
            if Arc::ptr_eq(current, &cell) {
                inflight.remove(fiscal_year);
            }
        }

        result
    }

    /// Forces a fresh resolution: drop the cached entry, then resolve.
    pub async fn refresh(&self, fiscal_year: &str) -> ResolveResult {
        self.invalidate(fiscal_year).await;
        self.resolve(fiscal_year).await
    }

    pub async fn invalidate(&self, fiscal_year: &str) {
        self.cache.write().await.remove(fiscal_year);
    }

    pub async fn invalidate_all(&self) {
        self.cache.write().await.clear();
    }

    pub async fn status(&self) -> BTreeMap<String, CacheKeyStatus> {
        let ttl_ms = self.config.ttl.as_millis() as i64;
        let now = Utc::now();
        self.cache
            .read()
            .await
            .iter()
            .map(|(fiscal_year, entry)| {
                let age_ms = (now - entry.inserted_at).num_milliseconds().max(0);
                (
                    fiscal_year.clone(),
                    CacheKeyStatus {
                        age_ms,
                        ttl_ms,
                        expired: age_ms > ttl_ms,
                    },
                )
            })
            .collect()
    }

    async fn fresh_cache_hit(&self, fiscal_year: &str) -> Option<Arc<ResolvedRuleSet>> {
        let cache = self.cache.read().await;
        let entry = cache.get(fiscal_year)?;
        let age = Utc::now() - entry.inserted_at;
        if age.num_milliseconds() <= self.config.ttl.as_millis() as i64 {
            Some(entry.resolved.clone())
        } else {
            None
        }
    }

    /// The fallback chain. Each candidate is validated in full before it may
    /// be accepted; a candidate that fails validation is discarded whole and
    /// the next source is tried. Fails only when every source is exhausted.
    async fn resolve_uncached(&self, fiscal_year: &str) -> Result<ResolvedRuleSet, RuleSetError> {
        let mut last_reason = "no remote source configured".to_string();

        if let Some(remote) = &self.remote {
            match remote.fetch(fiscal_year).await {
                Ok(document) => match self.accept(document, RuleSource::Remote) {
                    Ok(resolved) => {
                        tracing::info!(fiscal_year, "resolved ruleset from remote source");
                        return Ok(resolved);
                    }
                    Err(err) => {
                        tracing::warn!(fiscal_year, error = %err, "remote ruleset failed validation");
                        last_reason = err.to_string();
                    }
                },
                Err(err) => {
                    tracing::warn!(fiscal_year, error = %err, "remote ruleset fetch unavailable");
                    last_reason = err.to_string();
                }
            }
        }

        if let Some((_, raw)) = BUNDLED_FISCAL.iter().find(|(fy, _)| *fy == fiscal_year) {
            match self.load_bundled(raw, fiscal_year, RuleSource::BundledFiscal) {
                Ok(resolved) => {
                    tracing::info!(fiscal_year, "resolved ruleset from bundled fiscal default");
                    return Ok(resolved);
                }
                Err(err) => {
                    tracing::warn!(fiscal_year, error = %err, "bundled fiscal default rejected");
                    last_reason = err.to_string();
                }
            }
        }

        match self.load_bundled(BUNDLED_GENERIC, fiscal_year, RuleSource::BundledGeneric) {
            Ok(resolved) => {
                tracing::info!(fiscal_year, "resolved ruleset from bundled generic default");
                Ok(resolved)
            }
            Err(err) => {
                tracing::warn!(fiscal_year, error = %err, "bundled generic default rejected");
                Err(RuleSetError::Unavailable {
                    fiscal_year: fiscal_year.to_string(),
                    reason: last_reason,
                })
            }
        }
    }

    fn load_bundled(
        &self,
        raw: &str,
        fiscal_year: &str,
        source: RuleSource,
    ) -> Result<ResolvedRuleSet, RuleSetError> {
        let mut document: RuleSet =
            serde_json::from_str(raw).map_err(|err| RuleSetError::Invalid {
                fiscal_year: fiscal_year.to_string(),
                reason: format!("bundled document does not parse: {err}"),
            })?;
        // The generic document carries no fiscal year of its own; stamp the
        // requested one so provenance and snapshots stay keyed correctly.
        document.fiscal_year = fiscal_year.to_string();
        self.accept(document, source)
    }

    fn accept(
        &self,
        document: RuleSet,
        source: RuleSource,
    ) -> Result<ResolvedRuleSet, RuleSetError> {
        document.validate()?;
        Ok(ResolvedRuleSet {
            source,
            resolved_at: Utc::now(),
            rule_set: document,
        })
    }

    /// Audit snapshot of what was resolved. Best-effort: a snapshot failure
    /// must not fail the calculation path.
    fn persist_snapshot(&self, resolved: &ResolvedRuleSet) {
        let Some(dir) = &self.config.snapshot_dir else {
            return;
        };
        let path = dir.join(format!("{}.json", resolved.rule_set.fiscal_year));
        let write = || -> std::io::Result<()> {
            std::fs::create_dir_all(dir)?;
            let json = serde_json::to_string_pretty(resolved)
                .map_err(|err| std::io::Error::other(err.to_string()))?;
            std::fs::write(&path, json)
        };
        if let Err(err) = write() {
            tracing::warn!(path = %path.display(), error = %err, "failed to persist ruleset snapshot");
        }
    }
}
