use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A schedule and the items probed on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeGroup {
    pub name: String,

    /// Scheduling period; falls back to the `UPPE_SCHEDULER_INTERVAL_SEC` setting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,

    #[serde(default)]
    pub items: Vec<ProbeItem>,
}

impl ProbeGroup {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self { name: name.into(), interval_seconds: Some(interval.as_secs()), items: Vec::new() }
    }

    pub fn with_item(mut self, item: ProbeItem) -> Self {
        self.items.push(item);
        self
    }
}

/// One target, its execution parameters and its success criteria
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeItem {
    pub name: String,

    /// Hard deadline for one execution; falls back to the per-kind timeout setting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Keep the response body in the result even without a body criterion
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub save_body: bool,

    pub target: ProbeTarget,

    #[serde(default, skip_serializing_if = "SuccessCriteria::is_empty")]
    pub criteria: SuccessCriteria,
}

impl ProbeItem {
    /// ICMP reachability item
    pub fn ping(name: impl Into<String>, address: impl Into<String>, repeat: u32) -> Self {
        Self {
            name: name.into(),
            timeout_ms: None,
            save_body: false,
            target: ProbeTarget::Icmp(IcmpTarget { address: address.into(), repeat: Some(repeat) }),
            criteria: SuccessCriteria::default(),
        }
    }

    /// HTTP item expecting any 2xx status
    pub fn check_status(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout_ms: None,
            save_body: false,
            target: ProbeTarget::Http(HttpTarget::get(url)),
            criteria: SuccessCriteria {
                status_range: Some(StatusRange { min: 200, max: 299 }),
                ..SuccessCriteria::default()
            },
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_criteria(mut self, criteria: SuccessCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_saved_body(mut self) -> Self {
        self.save_body = true;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Whether the prober has to read the response body
    pub fn needs_body(&self) -> bool {
        self.save_body || self.criteria.needs_body()
    }
}

/// Probe strategy, chosen explicitly per item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProbeTarget {
    Icmp(IcmpTarget),
    Http(HttpTarget),
}

impl ProbeTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeTarget::Icmp(_) => "icmp",
            ProbeTarget::Http(_) => "http",
        }
    }

    /// Address or URL, for logs and results
    pub fn describe(&self) -> &str {
        match self {
            ProbeTarget::Icmp(target) => &target.address,
            ProbeTarget::Http(target) => &target.url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcmpTarget {
    /// IP address or hostname
    pub address: String,

    /// Echo requests per execution; falls back to `UPPE_PINGER_PING_REPEAT`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpTarget {
    pub url: String,

    /// Defaults to GET
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
}

impl HttpTarget {
    pub fn get(url: impl Into<String>) -> Self {
        Self { url: url.into(), method: None, body: None, headers: BTreeMap::new(), proxy: None }
    }

    pub fn method(&self) -> String {
        self.method.as_deref().unwrap_or("GET").trim().to_uppercase()
    }
}

/// HTTP proxy, optionally with basic authentication
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Hostname, or a full `scheme://host` URL
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ProxyConfig {
    pub fn url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.contains("://") {
            format!("{host}:{}", self.port)
        } else {
            format!("http://{host}:{}", self.port)
        }
    }
}

/// Success rules, checked in a fixed precedence:
/// status, status_range, status_list, body_equals, body_contains, body_regex, extract
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuccessCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_list: Vec<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_equals: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_contains: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_regex: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_range: Option<StatusRange>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractRule>,
}

impl SuccessCriteria {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.status_range.is_none()
            && self.status_list.is_empty()
            && !self.needs_body()
    }

    pub fn needs_body(&self) -> bool {
        self.body_equals.is_some()
            || self.body_contains.is_some()
            || self.body_regex.is_some()
            || self.extract.is_some()
    }
}

/// Inclusive status code range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRange {
    pub min: u16,
    pub max: u16,
}

impl StatusRange {
    pub fn contains(&self, code: u16) -> bool {
        (self.min..=self.max).contains(&code)
    }
}

/// Path lookup in a JSON response body, e.g. `$.data.checks[0].state`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractRule {
    pub json_path: String,

    /// Expected value; without it any non-null value at the path matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<serde_json::Value>,
}
