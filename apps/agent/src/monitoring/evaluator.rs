//! Applies success criteria to a raw probe outcome.
//!
//! Rules are checked in a fixed precedence, whatever order they were declared
//! in: exact status, status range, status list, body equals, body contains,
//! body regex, JSON extraction. The first configured rule that matches decides
//! the result. A rule that cannot be applied (bad regex, bad path, body that is
//! not JSON) simply does not match.

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::types::{MatchedRule, Observation, ProbeOutcome, ProbeResult, QueuedProbe};
use crate::error::EvaluationError;
use crate::models::{ExtractRule, ProbeTarget, SuccessCriteria};

/// Turn an outcome into an immutable result. Never mutates the item.
pub fn evaluate(probe: &QueuedProbe, outcome: &ProbeOutcome) -> ProbeResult {
    let result = ProbeResult::new(probe, outcome);
    let is_icmp = matches!(probe.target(), ProbeTarget::Icmp(_));

    match &outcome.observation {
        Err(error) if is_icmp => result.with_reachable(false).failed(error.to_string()),
        Err(error) => result.failed(error.to_string()),
        Ok(Observation::Echo { .. }) => result.with_reachable(true).succeeded(MatchedRule::Reachable),
        Ok(Observation::Http { status_code, body }) => {
            let criteria = &probe.item.criteria;
            let kept_body = if probe.item.needs_body() { body.clone() } else { None };
            let result = result.with_status_code(*status_code).with_body(kept_body);

            match match_criteria(criteria, *status_code, body.as_deref()) {
                Some(rule) => result.succeeded(rule),
                None => result.failed(format!(
                    "status code {status_code} did not satisfy success criteria"
                )),
            }
        }
    }
}

/// First matching rule in precedence order, `None` when nothing matches.
///
/// An empty criteria set accepts any response that arrived without error.
pub fn match_criteria(
    criteria: &SuccessCriteria,
    status_code: u16,
    body: Option<&str>,
) -> Option<MatchedRule> {
    if criteria.is_empty() {
        return Some(MatchedRule::CleanResponse);
    }

    if criteria.status == Some(status_code) {
        return Some(MatchedRule::ExactStatus);
    }
    if criteria.status_range.is_some_and(|range| range.contains(status_code)) {
        return Some(MatchedRule::StatusRange);
    }
    if criteria.status_list.contains(&status_code) {
        return Some(MatchedRule::StatusList);
    }

    let body = body?;

    if criteria.body_equals.as_deref() == Some(body) {
        return Some(MatchedRule::BodyEquals);
    }
    if criteria.body_contains.as_deref().is_some_and(|needle| body.contains(needle)) {
        return Some(MatchedRule::BodyContains);
    }
    if let Some(pattern) = &criteria.body_regex {
        match regex_matches(pattern, body) {
            Ok(true) => return Some(MatchedRule::BodyRegex),
            Ok(false) => {}
            Err(error) => debug!(%error, "body regex rule skipped"),
        }
    }
    if let Some(rule) = &criteria.extract {
        match extract_matches(rule, body) {
            Ok(true) => return Some(MatchedRule::Extract),
            Ok(false) => {}
            Err(error) => debug!(%error, "extraction rule skipped"),
        }
    }

    None
}

fn regex_matches(pattern: &str, body: &str) -> Result<bool, EvaluationError> {
    let regex = Regex::new(pattern).map_err(|e| EvaluationError::InvalidPattern(e.to_string()))?;
    Ok(regex.is_match(body))
}

fn extract_matches(rule: &ExtractRule, body: &str) -> Result<bool, EvaluationError> {
    let extracted = extract(&rule.json_path, body)?;
    Ok(match (&rule.equals, extracted) {
        (Some(expected), Some(found)) => *expected == found,
        (None, Some(found)) => !found.is_null(),
        (_, None) => false,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Look up `path` in the JSON `body`. `Ok(None)` when the path does not exist.
pub fn extract(path: &str, body: &str) -> Result<Option<Value>, EvaluationError> {
    let segments = parse_path(path)?;
    let document: Value =
        serde_json::from_str(body).map_err(|e| EvaluationError::NotJson(e.to_string()))?;

    let mut current = &document;
    for segment in &segments {
        let next = match segment {
            Segment::Key(key) => current.get(key.as_str()),
            Segment::Index(index) => current.get(*index),
        };
        match next {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }
    Ok(Some(current.clone()))
}

/// Accepts `$.a.b[0].c`, `a.b[0]`, `$` and `$[1]`
fn parse_path(path: &str) -> Result<Vec<Segment>, EvaluationError> {
    let invalid = || EvaluationError::InvalidPath(path.to_string());

    let trimmed = path.trim();
    let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed);
    let trimmed = trimmed.strip_prefix('.').unwrap_or(trimmed);

    let mut segments = Vec::new();
    if trimmed.is_empty() {
        return Ok(segments);
    }

    for part in trimmed.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(open) => part.split_at(open),
            None => (part, ""),
        };
        if key.is_empty() && rest.is_empty() {
            return Err(invalid());
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key.to_string()));
        }
        while !rest.is_empty() {
            let close = rest.find(']').ok_or_else(invalid)?;
            let index = rest[1..close].trim().parse::<usize>().map_err(|_| invalid())?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(invalid());
            }
        }
    }

    Ok(segments)
}
