//! Runtime settings: typed lookups with defaults, cached for a fixed TTL.
//!
//! Values come from the [`SettingsRepo`] (seeded from the `[settings]` table of
//! the config file) with the process environment as fallback. Changes arrive as
//! `settings.item.save` events, see [`listener`].

pub mod listener;
pub mod repo;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

pub use listener::register_settings_listener;
pub use repo::{SettingsFilter, SettingsItem, SettingsRepo};

pub const PING_TIMEOUT_SEC: &str = "UPPE_PINGER_PING_TIMEOUT_SEC";
pub const PING_REPEAT: &str = "UPPE_PINGER_PING_REPEAT";
pub const HTTP_TIMEOUT_SEC: &str = "UPPE_PINGER_HTTP_TIMEOUT_SEC";
pub const SCHEDULER_INTERVAL_SEC: &str = "UPPE_SCHEDULER_INTERVAL_SEC";

pub const DEFAULT_PING_TIMEOUT_SEC: u64 = 5;
pub const DEFAULT_PING_REPEAT: u64 = 3;
pub const DEFAULT_HTTP_TIMEOUT_SEC: u64 = 10;
pub const DEFAULT_SCHEDULER_INTERVAL_SEC: u64 = 60;

/// Default cache TTL
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Typed configuration lookups. Every getter returns `default` when the name
/// is unknown or its value does not parse.
pub trait ConfigProvider: Send + Sync {
    fn get_value(&self, name: &str, default: &str) -> String;

    fn get_int(&self, name: &str, default: i64) -> i64 {
        self.get_value(name, &default.to_string()).trim().parse().unwrap_or(default)
    }

    fn get_u64(&self, name: &str, default: u64) -> u64 {
        self.get_value(name, &default.to_string()).trim().parse().unwrap_or(default)
    }

    fn get_bool(&self, name: &str, default: bool) -> bool {
        match self.get_value(name, &default.to_string()).trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        }
    }

    fn get_seconds(&self, name: &str, default: u64) -> Duration {
        Duration::from_secs(self.get_u64(name, default))
    }

    fn get_millis(&self, name: &str, default: u64) -> Duration {
        Duration::from_millis(self.get_u64(name, default))
    }

    fn get_minutes(&self, name: &str, default: u64) -> Duration {
        Duration::from_secs(self.get_u64(name, default).saturating_mul(60))
    }

    fn get_hours(&self, name: &str, default: u64) -> Duration {
        Duration::from_secs(self.get_u64(name, default).saturating_mul(3600))
    }

    fn get_days(&self, name: &str, default: u64) -> Duration {
        Duration::from_secs(self.get_u64(name, default).saturating_mul(86_400))
    }
}

#[derive(Clone)]
struct CacheEntry {
    value: String,
    /// `None` when the TTL reaches past the clock range
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: String, ttl: Duration) -> Self {
        Self { value, expires_at: Instant::now().checked_add(ttl) }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| Instant::now() >= expires_at)
    }
}

/// Settings service, a TTL cache in front of the repo.
///
/// A miss caches the caller's default as well, so a value added to the repo
/// directly is only seen after the TTL or an invalidation.
pub struct Settings {
    repo: Arc<SettingsRepo>,
    cache: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl Settings {
    pub fn new(repo: Arc<SettingsRepo>, ttl: Duration) -> Self {
        Self { repo, cache: DashMap::new(), ttl }
    }

    pub fn repo(&self) -> &Arc<SettingsRepo> {
        &self.repo
    }

    /// Store `item` and evict its cached value
    pub fn update(&self, item: SettingsItem) {
        let name = item.name.clone();
        self.repo.save(item);
        self.invalidate(&name);
    }

    pub fn get_list(&self, filter: &SettingsFilter) -> Vec<SettingsItem> {
        self.repo.get_list(filter)
    }

    pub fn invalidate(&self, name: &str) {
        if self.cache.remove(name).is_some() {
            debug!(setting = name, "settings cache entry evicted");
        }
    }

    pub fn invalidate_all(&self) {
        self.cache.clear();
    }
}

impl ConfigProvider for Settings {
    fn get_value(&self, name: &str, default: &str) -> String {
        if let Some(entry) = self.cache.get(name) {
            if !entry.is_expired() {
                return entry.value.clone();
            }
        }

        let value = self.repo.get(name).unwrap_or_else(|| default.to_string());
        self.cache.insert(name.to_string(), CacheEntry::new(value.clone(), self.ttl));
        value
    }
}
