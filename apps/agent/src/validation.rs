use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;

use url::Url;

use crate::config::{AgentConfig, AgentSection};
use crate::error::ConfigError;
use crate::models::{HttpTarget, IcmpTarget, ProbeGroup, ProbeItem, ProbeTarget, ProxyConfig, SuccessCriteria};

const MAX_NAME_LEN: usize = 100;
const MAX_INTERVAL_SECS: u64 = 86_400;
pub(crate) const MIN_TIMEOUT_MS: u64 = 100;
pub(crate) const MAX_TIMEOUT_MS: u64 = 300_000;
const MAX_HEADERS: usize = 20;
const MAX_HEADER_SIZE: usize = 8192;
const MAX_BODY_SIZE: usize = 1024 * 1024;
const MAX_REPEAT: u32 = 100;
const HTTP_METHODS: [&str; 7] = ["GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH"];

/// Validation results with specific error messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self { is_valid: true, error: None }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { is_valid: false, error: Some(msg.into()) }
    }

    /// Turn a failed validation into a config error for `scope`
    pub fn to_result(&self, scope: impl Into<String>) -> Result<(), ConfigError> {
        if self.is_valid {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                scope: scope.into(),
                reason: self.error.clone().unwrap_or_else(|| "validation failed".to_string()),
            })
        }
    }
}

/// Validate HTTP/HTTPS URL endpoint
pub fn validate_http_endpoint(target: &str) -> ValidationResult {
    if target.trim().is_empty() {
        return ValidationResult::err("Target cannot be empty");
    }

    match Url::parse(target) {
        Ok(url) => {
            let scheme = url.scheme();
            if scheme != "http" && scheme != "https" {
                return ValidationResult::err(format!(
                    "Invalid scheme '{scheme}'. Must be http or https"
                ));
            }

            if url.host_str().is_none() {
                return ValidationResult::err("URL must have a valid host");
            }

            ValidationResult::ok()
        }
        Err(e) => {
            if !target.contains("://") {
                ValidationResult::err("URL must include scheme (http:// or https://)")
            } else {
                ValidationResult::err(format!("Invalid URL: {e}"))
            }
        }
    }
}

/// Validate ICMP endpoint (IP address or hostname)
pub fn validate_icmp_endpoint(target: &str) -> ValidationResult {
    if target.trim().is_empty() {
        return ValidationResult::err("Target cannot be empty");
    }

    if target.parse::<IpAddr>().is_ok() {
        return ValidationResult::ok();
    }

    if target.contains(' ') {
        return ValidationResult::err("Target cannot contain spaces");
    }

    if target.starts_with('-') || target.ends_with('-') {
        return ValidationResult::err("Hostname cannot start or end with hyphen");
    }

    if target.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '-') {
        ValidationResult::ok()
    } else {
        ValidationResult::err("Invalid hostname. Use IP address or valid hostname")
    }
}

/// Validate group or item name
pub fn validate_name(name: &str) -> ValidationResult {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return ValidationResult::err("Name cannot be empty");
    }

    if trimmed.len() > MAX_NAME_LEN {
        return ValidationResult::err("Name too long (max 100 characters)");
    }

    ValidationResult::ok()
}

/// Validate group interval
pub fn validate_interval(interval: u64) -> ValidationResult {
    if interval == 0 {
        return ValidationResult::err("Interval must be at least 1 second");
    }

    if interval > MAX_INTERVAL_SECS {
        return ValidationResult::err("Interval too long (max 24 hours)");
    }

    ValidationResult::ok()
}

/// Validate probe timeout
pub fn validate_timeout_ms(timeout_ms: u64) -> ValidationResult {
    if timeout_ms < MIN_TIMEOUT_MS {
        return ValidationResult::err("Timeout must be at least 100ms");
    }

    if timeout_ms > MAX_TIMEOUT_MS {
        return ValidationResult::err("Timeout too long (max 300 seconds)");
    }

    ValidationResult::ok()
}

pub fn validate_method(method: &str) -> ValidationResult {
    if HTTP_METHODS.contains(&method) {
        ValidationResult::ok()
    } else {
        ValidationResult::err(format!("Invalid HTTP method: {method}"))
    }
}

pub fn validate_headers(headers: &BTreeMap<String, String>) -> ValidationResult {
    if headers.len() > MAX_HEADERS {
        return ValidationResult::err(format!("Too many headers (max {MAX_HEADERS})"));
    }

    for (key, value) in headers {
        if key.trim().is_empty() {
            return ValidationResult::err("Header name cannot be empty");
        }
        if key.len() + value.len() > MAX_HEADER_SIZE {
            return ValidationResult::err(format!("Header too large: {key}"));
        }
    }

    ValidationResult::ok()
}

pub fn validate_body(body: &str) -> ValidationResult {
    if body.len() > MAX_BODY_SIZE {
        return ValidationResult::err("Body too large (max 1MB)");
    }

    ValidationResult::ok()
}

/// Validate ICMP echo count
pub fn validate_repeat(repeat: u32) -> ValidationResult {
    if repeat == 0 || repeat > MAX_REPEAT {
        return ValidationResult::err("Repeat must be between 1 and 100");
    }

    ValidationResult::ok()
}

pub fn validate_proxy(proxy: &ProxyConfig) -> ValidationResult {
    if proxy.host.trim().is_empty() {
        return ValidationResult::err("Proxy host cannot be empty");
    }

    if proxy.port == 0 {
        return ValidationResult::err("Proxy port must be between 1 and 65535");
    }

    ValidationResult::ok()
}

pub fn validate_criteria(criteria: &SuccessCriteria) -> ValidationResult {
    if let Some(range) = criteria.status_range {
        if range.min > range.max {
            return ValidationResult::err(format!(
                "Status range min {} is greater than max {}",
                range.min, range.max
            ));
        }
    }

    if let Some(extract) = &criteria.extract {
        if extract.json_path.trim().is_empty() {
            return ValidationResult::err("Extraction path cannot be empty");
        }
    }

    ValidationResult::ok()
}

fn first_failure(checks: impl IntoIterator<Item = ValidationResult>) -> ValidationResult {
    checks.into_iter().find(|check| !check.is_valid).unwrap_or_else(ValidationResult::ok)
}

fn validate_http_target(target: &HttpTarget) -> ValidationResult {
    first_failure([
        validate_http_endpoint(&target.url),
        validate_method(&target.method()),
        validate_headers(&target.headers),
        target.body.as_deref().map(validate_body).unwrap_or_else(ValidationResult::ok),
        target.proxy.as_ref().map(validate_proxy).unwrap_or_else(ValidationResult::ok),
    ])
}

fn validate_icmp_target(target: &IcmpTarget) -> ValidationResult {
    first_failure([
        validate_icmp_endpoint(&target.address),
        target.repeat.map(validate_repeat).unwrap_or_else(ValidationResult::ok),
    ])
}

/// Validate one probe item
pub fn validate_item(item: &ProbeItem) -> ValidationResult {
    let target = match &item.target {
        ProbeTarget::Http(target) => validate_http_target(target),
        ProbeTarget::Icmp(target) => validate_icmp_target(target),
    };

    first_failure([
        validate_name(&item.name),
        item.timeout_ms.map(validate_timeout_ms).unwrap_or_else(ValidationResult::ok),
        target,
        validate_criteria(&item.criteria),
    ])
}

fn validate_agent_section(agent: &AgentSection) -> ValidationResult {
    if agent.workers == Some(0) {
        return ValidationResult::err("Workers must be at least 1");
    }

    if agent.queue_capacity == 0 {
        return ValidationResult::err("Queue capacity must be at least 1");
    }

    ValidationResult::ok()
}

fn validate_group(group: &ProbeGroup) -> Result<(), ConfigError> {
    let scope = format!("group '{}'", group.name);
    validate_name(&group.name).to_result(&scope)?;

    if let Some(interval) = group.interval_seconds {
        validate_interval(interval).to_result(&scope)?;
    }

    let mut names = HashSet::new();
    for item in &group.items {
        let item_scope = format!("item '{}' in group '{}'", item.name, group.name);
        validate_item(item).to_result(&item_scope)?;

        if !names.insert(item.name.trim()) {
            return ValidationResult::err("Duplicate item name").to_result(item_scope);
        }
    }

    Ok(())
}

/// Validate a whole agent configuration, stopping at the first problem
pub fn validate_config(config: &AgentConfig) -> Result<(), ConfigError> {
    validate_agent_section(&config.agent).to_result("[agent]")?;

    let mut names = HashSet::new();
    for group in &config.groups {
        validate_group(group)?;

        if !names.insert(group.name.trim()) {
            return ValidationResult::err("Duplicate group name")
                .to_result(format!("group '{}'", group.name));
        }
    }

    Ok(())
}
