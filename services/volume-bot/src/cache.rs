//! Durable per-bot token cache
//!
//! A JSON snapshot of every token the factory has issued, with the last
//! known lifecycle state and display metadata. A fresh snapshot lets the
//! loader skip metadata reads entirely and only re-check states.
//!
//! File layout (`{bot_name}_token_cache.json`):
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "bot_name": "bullish_billy",
//!   "created": "...",
//!   "last_updated": "...",
//!   "tokens": { "0xabc...": { "address": "0xAbC...", "name": "...", "symbol": "...",
//!                             "state": 1, "cached_at": "...", "virtual_supply": "..." } },
//!   "stats": { "total_refreshes": 3, "last_full_refresh": "...", "cache_hits": 10, "cache_misses": 2 }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::types::TokenState;

pub const CACHE_VERSION: &str = "1.0";

/// Keys owned by [`CachedToken`] itself; never accepted as extra fields
const RESERVED_KEYS: [&str; 5] = ["address", "name", "symbol", "state", "cached_at"];

/// One cached token entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedToken {
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub state: Option<TokenState>,
    pub cached_at: DateTime<Utc>,
    /// Open-ended extra fields, union-merged on every write
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CachedToken {
    pub fn is_tradeable(&self) -> bool {
        self.state.map_or(false, TokenState::is_tradeable)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_refreshes: u64,
    pub last_full_refresh: Option<DateTime<Utc>>,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheSnapshot {
    version: String,
    bot_name: String,
    created: DateTime<Utc>,
    last_updated: Option<DateTime<Utc>>,
    tokens: BTreeMap<String, CachedToken>,
    stats: CacheStats,
}

impl CacheSnapshot {
    fn empty(bot_name: &str) -> Self {
        Self {
            version: CACHE_VERSION.to_string(),
            bot_name: bot_name.to_string(),
            created: Utc::now(),
            last_updated: None,
            tokens: BTreeMap::new(),
            stats: CacheStats::default(),
        }
    }
}

/// Point-in-time view of cache health, used for logs and heartbeats
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsView {
    pub cache_file: String,
    pub cached_tokens: usize,
    pub is_fresh: bool,
    pub last_updated: Option<DateTime<Utc>>,
    /// `None` when the cache has never been saved
    pub age_hours: Option<f64>,
    pub total_refreshes: u64,
    pub last_full_refresh: Option<DateTime<Utc>>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// `None` until at least one lookup happened
    pub hit_rate: Option<f64>,
}

pub struct TokenCache {
    path: PathBuf,
    cache_duration: chrono::Duration,
    data: CacheSnapshot,
}

impl TokenCache {
    /// Path of the cache file for a bot inside `cache_dir`
    pub fn file_path(cache_dir: &Path, bot_name: &str) -> PathBuf {
        cache_dir.join(format!("{}_token_cache.json", bot_name))
    }

    /// Load the bot's cache from `cache_dir`.
    ///
    /// A missing or unreadable snapshot yields an empty cache; this never fails.
    pub fn load(cache_dir: &Path, bot_name: &str, cache_duration_hours: f64) -> Self {
        Self::load_from(Self::file_path(cache_dir, bot_name), bot_name, cache_duration_hours)
    }

    pub fn load_from(path: PathBuf, bot_name: &str, cache_duration_hours: f64) -> Self {
        let cache_duration =
            chrono::Duration::milliseconds((cache_duration_hours.max(0.0) * 3_600_000.0) as i64);

        let data = match read_snapshot(&path) {
            Ok(Some(snapshot)) => {
                info!(
                    "Loaded cache with {} tokens from {}",
                    snapshot.tokens.len(),
                    path.display()
                );
                snapshot
            }
            Ok(None) => {
                debug!("No cache file at {}, starting empty", path.display());
                CacheSnapshot::empty(bot_name)
            }
            Err(e) => {
                warn!("Cache file {} unusable, starting empty: {}", path.display(), e);
                CacheSnapshot::empty(bot_name)
            }
        };

        Self {
            path,
            cache_duration,
            data,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bot_name(&self) -> &str {
        &self.data.bot_name
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.data.last_updated
    }

    pub fn stats(&self) -> &CacheStats {
        &self.data.stats
    }

    pub fn len(&self) -> usize {
        self.data.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.tokens.is_empty()
    }

    /// True while the last save is younger than the freshness window
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        match self.data.last_updated {
            Some(updated) => {
                let age = now.signed_duration_since(updated);
                let fresh = age < self.cache_duration;
                if !fresh {
                    debug!(
                        "Cache is {:.1}h old (max {:.1}h)",
                        age.num_seconds() as f64 / 3600.0,
                        self.cache_duration.num_seconds() as f64 / 3600.0
                    );
                }
                fresh
            }
            None => false,
        }
    }

    /// Case-insensitive lookup; counts a hit or a miss
    pub fn get_token(&mut self, address: &str) -> Option<&CachedToken> {
        let key = address.to_lowercase();
        if self.data.tokens.contains_key(&key) {
            self.data.stats.cache_hits += 1;
        } else {
            self.data.stats.cache_misses += 1;
        }
        self.data.tokens.get(&key)
    }

    /// Lookup that leaves the hit/miss counters alone
    pub fn peek(&self, address: &str) -> Option<&CachedToken> {
        self.data.tokens.get(&address.to_lowercase())
    }

    /// Insert or update a token.
    ///
    /// Name and symbol are kept once set. `extra` is merged into the existing
    /// fields; keys absent from `extra` are left untouched.
    pub fn store_token(
        &mut self,
        address: &str,
        name: &str,
        symbol: &str,
        state: TokenState,
        extra: Option<Map<String, Value>>,
    ) {
        let key = address.to_lowercase();
        let now = Utc::now();
        let entry = self.data.tokens.entry(key).or_insert_with(|| CachedToken {
            address: address.to_string(),
            name: String::new(),
            symbol: String::new(),
            state: None,
            cached_at: now,
            extra: Map::new(),
        });

        if entry.name.is_empty() {
            entry.name = name.to_string();
        }
        if entry.symbol.is_empty() {
            entry.symbol = symbol.to_string();
        }
        entry.state = Some(state);
        entry.cached_at = now;
        if let Some(extra) = extra {
            merge_extra(&mut entry.extra, extra);
        }
    }

    /// Merge extra fields into an existing entry without touching its state.
    /// Returns false when the token is not cached.
    pub fn merge_extra(&mut self, address: &str, extra: Map<String, Value>) -> bool {
        match self.data.tokens.get_mut(&address.to_lowercase()) {
            Some(entry) => {
                merge_extra(&mut entry.extra, extra);
                entry.cached_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn get_all_tokens(&self) -> Vec<&CachedToken> {
        self.data.tokens.values().collect()
    }

    pub fn get_tradeable_tokens(&self) -> Vec<&CachedToken> {
        self.data.tokens.values().filter(|t| t.is_tradeable()).collect()
    }

    /// Drop every cached token the factory no longer lists. Returns the
    /// number removed.
    pub fn clear_stale_tokens<S: AsRef<str>>(&mut self, current: &[S]) -> usize {
        let current: HashSet<String> = current.iter().map(|a| a.as_ref().to_lowercase()).collect();
        let before = self.data.tokens.len();
        self.data.tokens.retain(|key, _| current.contains(key));
        let removed = before - self.data.tokens.len();
        if removed > 0 {
            info!("Removed {} stale tokens from cache", removed);
        }
        removed
    }

    pub fn mark_full_refresh(&mut self) {
        self.data.stats.last_full_refresh = Some(Utc::now());
    }

    /// Make the next freshness check fail
    pub fn force_refresh(&mut self) {
        self.data.last_updated = None;
        info!("Cache marked for forced refresh");
    }

    /// Persist the snapshot.
    ///
    /// Writes a sibling temp file and renames it over the previous one, so a
    /// crash mid-write leaves the last good snapshot in place.
    pub fn save(&mut self) -> Result<(), CacheError> {
        self.data.last_updated = Some(Utc::now());
        self.data.stats.total_refreshes += 1;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_vec_pretty(&self.data)?;
        let tmp = self.path.with_extension("json.tmp");
        let cleanup = |e: std::io::Error| {
            let _ = fs::remove_file(&tmp);
            CacheError::Io(e)
        };
        fs::write(&tmp, json).map_err(cleanup)?;
        fs::rename(&tmp, &self.path).map_err(cleanup)?;

        debug!(
            "Cache saved: {} tokens to {}",
            self.data.tokens.len(),
            self.path.display()
        );
        Ok(())
    }

    pub fn get_stats(&self) -> CacheStatsView {
        let now = Utc::now();
        let stats = &self.data.stats;
        let lookups = stats.cache_hits + stats.cache_misses;

        CacheStatsView {
            cache_file: self.path.display().to_string(),
            cached_tokens: self.data.tokens.len(),
            is_fresh: self.is_fresh_at(now),
            last_updated: self.data.last_updated,
            age_hours: self
                .data
                .last_updated
                .map(|t| now.signed_duration_since(t).num_milliseconds() as f64 / 3_600_000.0),
            total_refreshes: stats.total_refreshes,
            last_full_refresh: stats.last_full_refresh,
            cache_hits: stats.cache_hits,
            cache_misses: stats.cache_misses,
            hit_rate: (lookups > 0).then(|| stats.cache_hits as f64 / lookups as f64),
        }
    }

    pub fn print_stats(&self) {
        let s = self.get_stats();
        let age = s
            .age_hours
            .map(|h| format!("{:.1}h", h))
            .unwrap_or_else(|| "never".to_string());
        let hit_rate = s
            .hit_rate
            .map(|r| format!("{:.1}%", r * 100.0))
            .unwrap_or_else(|| "n/a".to_string());

        info!(
            file = %s.cache_file,
            tokens = s.cached_tokens,
            fresh = s.is_fresh,
            hits = s.cache_hits,
            misses = s.cache_misses,
            "Cache stats: age {}, hit rate {}",
            age,
            hit_rate
        );
    }
}

fn merge_extra(into: &mut Map<String, Value>, extra: Map<String, Value>) {
    for (key, value) in extra {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        into.insert(key, value);
    }
}

fn read_snapshot(path: &Path) -> Result<Option<CacheSnapshot>, CacheError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut snapshot: CacheSnapshot = serde_json::from_slice(&bytes)?;

    // Older writers may have keyed entries by checksummed address
    if snapshot.tokens.keys().any(|k| k.chars().any(|c| c.is_ascii_uppercase())) {
        snapshot.tokens = snapshot
            .tokens
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
    }
    Ok(Some(snapshot))
}
