use std::sync::Arc;

use mediator::{Delivery, DispatchError, Inbox};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Settings;
use crate::events::{AgentDispatcher, Event, EventName};

const EVENTS_BUFFER: usize = 10_000;

/// Bind the settings service to its events and start consuming them.
///
/// A save upserts the repo; the chained invalidate event then evicts the
/// cached value, so the next lookup reads the saved one.
pub fn register_settings_listener(
    dispatcher: &AgentDispatcher,
    settings: Arc<Settings>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, DispatchError> {
    let (inbox, mut events) = Inbox::<EventName, Event>::new(EVENTS_BUFFER);
    dispatcher.register(inbox, &EventName::SETTINGS)?;
    dispatcher.set_after_event(EventName::SettingsItemSave, EventName::SettingsCacheInvalidate)?;

    Ok(tokio::spawn(async move {
        loop {
            // Saves already delivered are still applied after cancellation
            let delivery = tokio::select! {
                biased;
                delivery = events.recv() => delivery,
                _ = cancel.cancelled() => events.try_recv().ok(),
            };
            let Some(delivery) = delivery else { break };
            handle(&settings, delivery);
        }
        debug!("settings listener stopped");
    }))
}

fn handle(settings: &Settings, delivery: Delivery<EventName, Event>) {
    match delivery.payload {
        Event::SettingsSaved(item) => match delivery.name {
            EventName::SettingsItemSave => {
                info!(setting = %item.name, "setting saved");
                settings.repo().save(item);
            }
            EventName::SettingsCacheInvalidate => settings.invalidate(&item.name),
            EventName::ProbeCompleted => {
                warn!(event = %delivery.name, "settings payload on a probe event, ignoring")
            }
        },
        Event::ProbeCompleted(result) => {
            warn!(event = %delivery.name, item = result.item(), "probe result on a settings event, ignoring")
        }
    }
}
