use std::fmt;

use crate::monitoring::ProbeResult;
use crate::settings::SettingsItem;

/// Every event the agent dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    SettingsItemSave,
    SettingsCacheInvalidate,
    ProbeCompleted,
}

impl EventName {
    pub const SETTINGS: [EventName; 2] =
        [EventName::SettingsItemSave, EventName::SettingsCacheInvalidate];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::SettingsItemSave => "settings.item.save",
            EventName::SettingsCacheInvalidate => "settings.cache.invalidate",
            EventName::ProbeCompleted => "probe.completed",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payloads
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SettingsSaved(SettingsItem),
    ProbeCompleted(ProbeResult),
}

pub type AgentDispatcher = mediator::Dispatcher<EventName, Event>;
