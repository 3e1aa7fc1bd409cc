// crates/permission-gate-core/src/runtime/cache.rs
// ============================================================================
// Module: Evaluation Cache
// Description: Bounded TTL cache of evaluation results with generation checks.
// Purpose: Skip store reads for hot decisions without serving stale grants.
// Dependencies: crate::core, moka
// ============================================================================

//! ## Overview
//! Entries live in a bounded [`moka::sync::Cache`] keyed by the full request
//! shape and stamped with two generations: the actor's own generation and a
//! global generation bumped by any change to an everyone rule. A hit is
//! served only when both still match and the entry is younger than the TTL
//! on the injected clock, so a committed mutation is visible to the next
//! evaluation even if the cache was populated concurrently. Moka enforces
//! capacity and the wall-clock TTL; generation bumps drop affected entries
//! through `invalidate_all` and `invalidate_entries_if`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use moka::sync::Cache;

use crate::core::ActionKind;
use crate::core::EvaluationRequest;
use crate::core::EvaluationResult;
use crate::core::Grantee;
use crate::core::InstrumentKey;
use crate::core::ResourceKind;
use crate::core::Timestamp;
use crate::core::UserId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Default time-to-live for cached decisions (milliseconds).
pub const DEFAULT_CACHE_TTL_MS: i64 = 30_000;
/// Default maximum cached decisions.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

/// Cache tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Time-to-live for an entry (milliseconds).
    pub ttl_ms: i64,
    /// Maximum entries retained.
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_CACHE_TTL_MS,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

/// Cache key covering every field that influences a decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    /// Requesting actor.
    actor: UserId,
    /// Owner narrowing.
    owner: Option<UserId>,
    /// Resource class.
    resource: ResourceKind,
    /// Requested action.
    action: ActionKind,
    /// Instrument.
    instrument: Option<InstrumentKey>,
}

impl CacheKey {
    /// Builds the key for a request.
    fn from_request(request: &EvaluationRequest) -> Self {
        Self {
            actor: request.actor,
            owner: request.owner,
            resource: request.resource,
            action: request.action,
            instrument: request.instrument.clone(),
        }
    }
}

/// Generations observed before an evaluation started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheGeneration {
    /// Actor generation.
    actor: u64,
    /// Everyone-rule generation.
    everyone: u64,
}

/// Stored decision.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Cached result.
    result: EvaluationResult,
    /// Insert time on the injected clock.
    stored_at: Timestamp,
    /// Generations the result was computed under.
    generation: CacheGeneration,
}

/// Generation counters.
#[derive(Debug, Default)]
struct Generations {
    /// Per-actor generations.
    actors: HashMap<UserId, u64>,
    /// Generation bumped by everyone-rule changes.
    everyone: u64,
}

impl Generations {
    /// Returns the current generations for `actor`.
    fn current(&self, actor: UserId) -> CacheGeneration {
        CacheGeneration {
            actor: self.actors.get(&actor).copied().unwrap_or(0),
            everyone: self.everyone,
        }
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Bounded evaluation cache.
#[derive(Debug)]
pub struct EvaluationCache {
    /// Tuning.
    settings: CacheSettings,
    /// Cached decisions.
    entries: Cache<CacheKey, CacheEntry>,
    /// Generation counters.
    generations: Mutex<Generations>,
}

impl EvaluationCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(settings: CacheSettings) -> Self {
        let ttl = Duration::from_millis(u64::try_from(settings.ttl_ms).unwrap_or(0));
        let entries = Cache::builder()
            .max_capacity(u64::try_from(settings.max_entries).unwrap_or(u64::MAX))
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();
        Self {
            settings,
            entries,
            generations: Mutex::new(Generations::default()),
        }
    }

    /// Captures the generations an evaluation for `request` starts under.
    #[must_use]
    pub fn generation(&self, request: &EvaluationRequest) -> Option<CacheGeneration> {
        let generations = self.generations.lock().ok()?;
        Some(generations.current(request.actor))
    }

    /// Returns a fresh cached result for `request`.
    #[must_use]
    pub fn get(&self, request: &EvaluationRequest, now: Timestamp) -> Option<EvaluationResult> {
        let current = self.generation(request)?;
        let key = CacheKey::from_request(request);
        let entry = self.entries.get(&key)?;
        if entry.generation == current && !self.expired(&entry, now) {
            return Some(entry.result);
        }
        self.entries.invalidate(&key);
        None
    }

    /// Stores a result computed under `generation`.
    pub fn insert(
        &self,
        request: &EvaluationRequest,
        result: EvaluationResult,
        now: Timestamp,
        generation: CacheGeneration,
    ) {
        if self.settings.max_entries == 0 || self.generation(request) != Some(generation) {
            return;
        }
        self.entries.insert(CacheKey::from_request(request), CacheEntry {
            result,
            stored_at: now,
            generation,
        });
    }

    /// Invalidates every entry a change to `grantee`'s rules could affect.
    pub fn invalidate(&self, grantee: Grantee) {
        let Ok(mut generations) = self.generations.lock() else {
            return;
        };
        match grantee {
            Grantee::Everyone => {
                generations.everyone = generations.everyone.wrapping_add(1);
                self.entries.invalidate_all();
            }
            Grantee::User(user) => {
                let next = generations.actors.get(&user).copied().unwrap_or(0).wrapping_add(1);
                generations.actors.insert(user, next);
                // Entries left behind on error are already hidden by the bump.
                let _ = self.entries.invalidate_entries_if(move |key, _| key.actor == user);
            }
        }
    }

    /// Returns the number of live cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        let Ok(generations) = self.generations.lock() else {
            return 0;
        };
        self.entries
            .iter()
            .filter(|(key, entry)| entry.generation == generations.current(key.actor))
            .count()
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true when `entry` has outlived the TTL at `now`.
    const fn expired(&self, entry: &CacheEntry, now: Timestamp) -> bool {
        let age = now.as_unix_millis().saturating_sub(entry.stored_at.as_unix_millis());
        age >= self.settings.ttl_ms
    }
}
