use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One named setting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsItem {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl SettingsItem {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into(), ..Self::default() }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }
}

/// Selects settings by exact name and/or group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsFilter {
    pub name: Option<String>,
    pub group: Option<String>,
}

impl SettingsFilter {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), group: None }
    }

    pub fn by_group(group: impl Into<String>) -> Self {
        Self { name: None, group: Some(group.into()) }
    }

    fn matches(&self, item: &SettingsItem) -> bool {
        self.name.as_ref().is_none_or(|name| *name == item.name)
            && self.group.as_ref().is_none_or(|group| *group == item.group)
    }
}

/// In-memory settings store. Names it does not hold are looked up in the
/// process environment.
#[derive(Debug, Default)]
pub struct SettingsRepo {
    items: RwLock<BTreeMap<String, SettingsItem>>,
}

impl SettingsRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from plain `name = value` pairs
    pub fn from_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let items = values
            .into_iter()
            .map(|(name, value)| {
                let item = SettingsItem::new(name, value);
                (item.name.clone(), item)
            })
            .collect();
        Self { items: RwLock::new(items) }
    }

    /// Current value of `name`, from the store or else the environment
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(item) = self.items.read().get(name) {
            return Some(item.value.clone());
        }
        std::env::var(name).ok()
    }

    /// Stored items matching `filter`, ordered by name
    pub fn get_list(&self, filter: &SettingsFilter) -> Vec<SettingsItem> {
        self.items.read().values().filter(|item| filter.matches(item)).cloned().collect()
    }

    /// Insert or replace the item with the same name
    pub fn save(&self, item: SettingsItem) -> Option<SettingsItem> {
        self.items.write().insert(item.name.clone(), item)
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_upserts() {
        let repo = SettingsRepo::new();
        assert!(repo.save(SettingsItem::new("UPPE_PINGER_PING_REPEAT", "3")).is_none());

        let previous = repo.save(SettingsItem::new("UPPE_PINGER_PING_REPEAT", "5"));
        assert_eq!(previous.map(|item| item.value), Some("3".to_string()));
        assert_eq!(repo.get("UPPE_PINGER_PING_REPEAT").as_deref(), Some("5"));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_get_list_filters() {
        let repo = SettingsRepo::new();
        repo.save(SettingsItem::new("a", "1").with_group("pinger"));
        repo.save(SettingsItem::new("b", "2").with_group("pinger"));
        repo.save(SettingsItem::new("c", "3").with_group("scheduler"));

        let pinger = repo.get_list(&SettingsFilter::by_group("pinger"));
        assert_eq!(pinger.iter().map(|item| item.name.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

        let single = repo.get_list(&SettingsFilter::by_name("c"));
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].value, "3");

        assert_eq!(repo.get_list(&SettingsFilter::default()).len(), 3);
        assert!(repo.get_list(&SettingsFilter::by_name("missing")).is_empty());
    }

    #[test]
    fn test_falls_back_to_environment() {
        let repo = SettingsRepo::from_values([("UPPE_TEST_ONLY_KEY", "stored")]);
        assert_eq!(repo.get("UPPE_TEST_ONLY_KEY").as_deref(), Some("stored"));

        // PATH is set in every test environment and never stored
        assert_eq!(repo.get("PATH"), std::env::var("PATH").ok());
        assert!(repo.get("UPPE_TEST_SURELY_UNSET_KEY_42").is_none());
    }
}
