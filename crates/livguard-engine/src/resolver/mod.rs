//! Effective-policy resolution.
//!
//! `resolve(id)` walks `parent_policy_id` up to the root and folds the chain
//! root-first through [`merge`]. Results are cached per id and invalidated by
//! the store generation, so any committed write makes every cached entry stale.

pub mod merge;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;

use livguard_core::error::{LivGuardError, Result};
use livguard_core::policy::{ChainLink, EffectivePolicy, Policy};

use crate::obs::EngineMetrics;
use crate::store::PolicyStore;

// attempts to get a walk that no concurrent write interleaved with
const CONSISTENT_WALK_ATTEMPTS: usize = 3;

/// Follow parent links starting at `id`. Returns the chain leaf first.
///
/// Fails with `NotFound` when `id` itself is unknown, `OrphanedParent` when
/// a link dangles, `CycleDetected` when an id repeats and `DepthExceeded` once
/// the chain holds more than `max_depth` policies.
pub fn walk_chain<F>(lookup: F, id: &str, max_depth: usize) -> Result<Vec<Arc<Policy>>>
where
    F: Fn(&str) -> Option<Arc<Policy>>,
{
    let mut chain: Vec<Arc<Policy>> = Vec::new();
    let mut cursor = Some(id.to_string());

    while let Some(cur) = cursor {
        if chain.iter().any(|p| p.id == cur) {
            let mut ids: Vec<String> = chain.iter().map(|p| p.id.clone()).collect();
            ids.push(cur);
            return Err(LivGuardError::CycleDetected { chain: ids });
        }

        let policy = match lookup(&cur) {
            Some(p) => p,
            None => {
                return Err(match chain.last() {
                    None => LivGuardError::NotFound(format!("policy {cur}")),
                    Some(child) => LivGuardError::OrphanedParent {
                        id: child.id.clone(),
                        parent: cur,
                    },
                })
            }
        };

        chain.push(policy);
        if chain.len() > max_depth {
            return Err(LivGuardError::DepthExceeded {
                id: id.to_string(),
                depth: chain.len(),
                max: max_depth,
            });
        }
        cursor = chain.last().and_then(|p| p.parent_policy_id.clone());
    }

    Ok(chain)
}

/// Fold a leaf-first chain into its effective policy.
pub fn merge_chain(chain: &[Arc<Policy>]) -> Result<EffectivePolicy> {
    let mut root_first = chain.iter().rev();
    let root = root_first
        .next()
        .ok_or_else(|| LivGuardError::Internal("empty inheritance chain".into()))?;

    let mut security = root.security.clone();
    let mut admin = root.admin.clone();
    let mut limits = root.limits.clone();
    let mut events = root.events.clone();
    let mut compliance = root.compliance.clone();

    for p in root_first {
        merge::security(&mut security, &p.security);
        merge::admin(&mut admin, &p.admin);
        merge::limits(&mut limits, &p.limits);
        merge::events(&mut events, &p.events);
        merge::compliance(&mut compliance, &p.compliance);
    }

    Ok(EffectivePolicy {
        policy_id: chain[0].id.clone(),
        chain: chain
            .iter()
            .rev()
            .map(|p| ChainLink {
                id: p.id.clone(),
                version: p.version,
            })
            .collect(),
        security,
        admin,
        limits,
        events,
        compliance,
        resolved_at: Utc::now(),
    })
}

struct CachedPolicy {
    generation: u64,
    policy: Arc<EffectivePolicy>,
}

pub struct PolicyResolver {
    store: Arc<PolicyStore>,
    cache: DashMap<String, CachedPolicy>,
    metrics: Arc<EngineMetrics>,
}

impl PolicyResolver {
    pub fn new(store: Arc<PolicyStore>, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            metrics,
        }
    }

    pub fn resolve(&self, id: &str) -> Result<Arc<EffectivePolicy>> {
        let started = Instant::now();
        let generation = self.store.generation();

        if let Some(hit) = self.cache.get(id) {
            if hit.generation == generation {
                self.metrics
                    .resolve_duration
                    .observe(&[("cache", "hit")], started.elapsed());
                return Ok(Arc::clone(&hit.policy));
            }
        }

        let mut attempt = 0;
        let resolved = loop {
            attempt += 1;
            let before = self.store.generation();
            let chain = match walk_chain(|pid| self.store.snapshot(pid), id, self.store.max_depth()) {
                Ok(c) => c,
                Err(e) => {
                    if matches!(e, LivGuardError::NotFound(_)) {
                        self.cache.remove(id);
                    }
                    return Err(e);
                }
            };
            let effective = Arc::new(merge_chain(&chain)?);
            let after = self.store.generation();

            if before == after {
                self.cache.insert(
                    id.to_string(),
                    CachedPolicy {
                        generation: after,
                        policy: Arc::clone(&effective),
                    },
                );
                break effective;
            }
            if attempt >= CONSISTENT_WALK_ATTEMPTS {
                tracing::debug!(policy = %id, "store kept changing during resolve; result not cached");
                break effective;
            }
        };

        self.metrics
            .resolve_duration
            .observe(&[("cache", "miss")], started.elapsed());
        tracing::debug!(
            policy = %id,
            depth = resolved.chain.len(),
            "effective policy resolved"
        );
        Ok(resolved)
    }

    /// Drop every cached entry. Writes already invalidate through the
    /// generation; this only frees memory.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}
