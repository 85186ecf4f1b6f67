use std::collections::BTreeMap;
use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::{ProbeGroup, ProbeItem};
use crate::monitoring::worker::default_worker_count;
use crate::validation::validate_config;

const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SETTINGS_TTL_SECS: u64 = 300;

/// Agent configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSection,

    /// Seed values of the settings store, looked up by name at runtime
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, toml::Value>,

    #[serde(default)]
    pub groups: Vec<ProbeGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSection {
    /// Probe workers; defaults to the available parallelism
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Capacity of each group's queue lane
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How long shutdown waits for queued probes before aborting them
    #[serde(default = "default_drain_timeout_seconds")]
    pub drain_timeout_seconds: u64,

    #[serde(default = "default_settings_ttl_seconds")]
    pub settings_ttl_seconds: u64,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_drain_timeout_seconds() -> u64 {
    DEFAULT_DRAIN_TIMEOUT_SECS
}

fn default_settings_ttl_seconds() -> u64 {
    DEFAULT_SETTINGS_TTL_SECS
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            workers: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            drain_timeout_seconds: DEFAULT_DRAIN_TIMEOUT_SECS,
            settings_ttl_seconds: DEFAULT_SETTINGS_TTL_SECS,
        }
    }
}

impl AgentSection {
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(default_worker_count)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_seconds)
    }

    pub fn settings_ttl(&self) -> Duration {
        Duration::from_secs(self.settings_ttl_seconds)
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/uppe/agent.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::PathUnavailable);
    };

    Ok(path.join("uppe/agent.toml"))
}

impl Default for AgentConfig {
    fn default() -> Self {
        let local = ProbeGroup::new("local", Duration::from_secs(60))
            .with_item(ProbeItem::ping("loopback", "127.0.0.1", 3));

        let web = ProbeGroup::new("web", Duration::from_secs(30))
            .with_item(ProbeItem::check_status("example", "https://example.com/"));

        Self { agent: AgentSection::default(), settings: BTreeMap::new(), groups: vec![local, web] }
    }
}

impl fmt::Display for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_title_2 = write_title_indented(2);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);
        let write_3 = write_indented(3);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Agent")?;
        write_1(f, "Workers", &self.agent.worker_count())?;
        write_1(f, "Queue Capacity (per group)", &self.agent.queue_capacity)?;
        write_1(f, "Drain Timeout (s)", &self.agent.drain_timeout_seconds)?;
        write_1(f, "Settings TTL (s)", &self.agent.settings_ttl_seconds)?;

        if !self.settings.is_empty() {
            write_title_1(f, "Settings")?;
            for (name, value) in &self.settings {
                write_1(f, name, value)?;
            }
        }

        write_title_1(f, "Groups")?;
        for group in &self.groups {
            write_title_2(f, &group.name)?;
            match group.interval_seconds {
                Some(interval) => write_2(f, "Interval (s)", &interval)?,
                None => write_2(f, "Interval (s)", &"from settings")?,
            }
            for item in &group.items {
                write_3(f, &item.name, &format_args!("{} {}", item.target.kind(), item.target.describe()))?;
            }
        }

        Ok(())
    }
}

impl AgentConfig {
    /// Resolve the config path: the given one as `.toml`, or the default location
    pub fn resolve_path(
        optional_path: Option<impl AsRef<path::Path>>,
    ) -> Result<path::PathBuf, ConfigError> {
        match optional_path {
            Some(path) => Ok(normalize_toml_path(path.as_ref())),
            None => default_config_path(),
        }
    }

    /// Generate AgentConfig structure from file
    ///
    /// Creates a default config in ~/.config/uppe/agent.toml
    ///  or the specified path if one does not exist
    ///
    /// ```no_run
    /// let cfg = uppe_agent::config::AgentConfig::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), uppe_agent::error::ConfigError>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path = Self::resolve_path(optional_path)?;

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::Read { path: config_path.clone(), source })?;
            Self::parse(&raw_string)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Parse and validate a TOML document
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::Write { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })
    }

    /// `[settings]` entries as plain strings
    pub fn settings_values(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.settings.iter().map(|(name, value)| {
            let value = match value {
                toml::Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (name.clone(), value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProbeTarget, StatusRange};

    const FULL: &str = r#"
        [agent]
        workers = 4
        queue_capacity = 500
        drain_timeout_seconds = 3

        [settings]
        UPPE_PINGER_PING_REPEAT = 5
        UPPE_PINGER_HTTP_TIMEOUT_SEC = "8"

        [[groups]]
        name = "core"
        interval_seconds = 15

        [[groups.items]]
        name = "gateway"
        timeout_ms = 1500
        target = { kind = "icmp", address = "10.0.0.1", repeat = 3 }

        [[groups.items]]
        name = "api"
        save_body = true
        target = { kind = "http", url = "https://api.example.com/health", method = "post", body = "{}", headers = { Authorization = "Bearer t" }, proxy = { host = "proxy.lan", port = 3128, user = "u", password = "p" } }
        criteria = { status = 200, status_range = { min = 200, max = 204 }, body_contains = "ok", extract = { json_path = "$.status", equals = "up" } }

        [[groups]]
        name = "fallback"
        items = []
    "#;

    #[test]
    fn test_parse_full_document() {
        let config = AgentConfig::parse(FULL).unwrap();

        assert_eq!(config.agent.workers, Some(4));
        assert_eq!(config.agent.queue_capacity, 500);
        assert_eq!(config.agent.drain_timeout(), Duration::from_secs(3));
        assert_eq!(config.agent.settings_ttl_seconds, DEFAULT_SETTINGS_TTL_SECS);

        let settings: BTreeMap<_, _> = config.settings_values().collect();
        assert_eq!(settings["UPPE_PINGER_PING_REPEAT"], "5");
        assert_eq!(settings["UPPE_PINGER_HTTP_TIMEOUT_SEC"], "8");

        let core = &config.groups[0];
        assert_eq!(core.interval_seconds, Some(15));
        assert_eq!(core.items[0].timeout(), Some(Duration::from_millis(1500)));
        assert!(matches!(&core.items[0].target, ProbeTarget::Icmp(t) if t.repeat == Some(3)));

        let api = &core.items[1];
        let ProbeTarget::Http(target) = &api.target else {
            panic!("expected an http target");
        };
        assert_eq!(target.method(), "POST");
        assert_eq!(target.headers["Authorization"], "Bearer t");
        assert_eq!(target.proxy.as_ref().unwrap().url(), "http://proxy.lan:3128");
        assert!(api.save_body);
        assert_eq!(api.criteria.status, Some(200));
        assert_eq!(api.criteria.status_range, Some(StatusRange { min: 200, max: 204 }));
        assert_eq!(
            api.criteria.extract.as_ref().unwrap().equals,
            Some(serde_json::Value::String("up".to_string()))
        );

        assert_eq!(config.groups[1].interval_seconds, None);
        assert!(config.groups[1].items.is_empty());
    }

    #[test]
    fn test_parse_rejects_unknown_kind_and_invalid_values() {
        let unknown_kind = r#"
            [[groups]]
            name = "g"
            [[groups.items]]
            name = "x"
            target = { kind = "tcp", address = "10.0.0.1:22" }
        "#;
        assert!(matches!(AgentConfig::parse(unknown_kind), Err(ConfigError::Parse(_))));

        let bad_repeat = r#"
            [[groups]]
            name = "g"
            [[groups.items]]
            name = "x"
            target = { kind = "icmp", address = "10.0.0.1", repeat = 0 }
        "#;
        assert!(matches!(AgentConfig::parse(bad_repeat), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_from_config_creates_default_with_toml_extension() {
        let dir = tempfile::tempdir().unwrap();
        let requested = dir.path().join("nested/agent.conf");

        let config = AgentConfig::from_config(Some(&requested)).unwrap();
        assert_eq!(config, AgentConfig::default());

        let written = dir.path().join("nested/agent.toml");
        assert!(written.exists());
        assert!(!requested.exists());

        // Reading it back gives the same config
        let reloaded = AgentConfig::from_config(Some(&written)).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_from_config_reports_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[[groups]]\nname = \"\"\n").unwrap();

        let error = AgentConfig::from_config(Some(&path)).unwrap_err();
        assert!(matches!(error, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_display_lists_groups() {
        let rendered = AgentConfig::default().to_string();

        assert!(rendered.starts_with("Current Internal Configuration State:"));
        assert!(rendered.contains("local"));
        assert!(rendered.contains("icmp 127.0.0.1"));
        assert!(rendered.contains("http https://example.com/"));
    }
}
