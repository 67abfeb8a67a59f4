use crate::home_assistant::{HAAttributes, HAStateUpdate, HomeAssistantAPI};
use crate::publish_adapter::{ConfiguredSinks, OutputSlot, Sink, SinkValue};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::{error::TrySendError, Receiver, Sender};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Publications queued between the poll tick and the HTTP writer
pub const PUBLISH_QUEUE_CAPACITY: usize = 64;

/// A slot value on its way to Home Assistant
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    pub slot: OutputSlot,
    pub value: SinkValue,
}

/// Binds a channel-backed sink for every slot with an entity id.
///
/// The sinks never block: when the queue is full the value is dropped, and the next
/// tick publishes a fresh one anyway.
pub fn channel_sinks(entities: &[(OutputSlot, String)], updates: Sender<Publication>) -> ConfiguredSinks {
    let mut sinks = ConfiguredSinks::new();
    for (slot, _) in entities {
        let slot = *slot;
        let updates = updates.clone();
        let sink = if slot.is_text() {
            Sink::text(move |value| {
                queue(&updates, Publication {
                    slot,
                    value: SinkValue::Text(value.to_string()),
                })
            })
        } else {
            Sink::numeric(move |value| {
                queue(&updates, Publication {
                    slot,
                    value: SinkValue::Number(value),
                })
            })
        };
        sinks.bind(slot, sink);
    }
    sinks
}

fn queue(updates: &Sender<Publication>, publication: Publication) {
    match updates.try_send(publication) {
        Ok(()) => {}
        Err(TrySendError::Full(publication)) => {
            debug!("Publish queue full, dropping {}", publication.slot)
        }
        Err(TrySendError::Closed(_)) => warn!("Home Assistant publisher has shut down"),
    }
}

/// Isolated task writing slot values to Home Assistant entities
pub struct HomeAssistantPublisher {
    entities: HashMap<OutputSlot, String>,
    updates: Receiver<Publication>,
    ha_client: HomeAssistantAPI,
    last_published: HashMap<OutputSlot, SinkValue>,
}

impl HomeAssistantPublisher {
    pub fn new(
        entities: &[(OutputSlot, String)],
        updates: Receiver<Publication>,
        ha_client: HomeAssistantAPI,
    ) -> Self {
        info!("Home Assistant Publisher Config:");
        for (slot, entity) in entities {
            info!("  {slot} -> {entity}");
        }
        Self {
            entities: entities.iter().cloned().collect(),
            updates,
            ha_client,
            last_published: HashMap::new(),
        }
    }

    /// Spawns the publisher in its own task
    pub fn spawn(mut self) {
        tokio::spawn(async move {
            self.run().await;
        });
    }

    /// Main loop: writes each publication whose value changed since the last write
    pub async fn run(&mut self) {
        if !self.ha_client.is_configured() {
            info!("No Home Assistant connection configured, publications will be discarded");
        }

        while let Some(publication) = self.updates.recv().await {
            if !self.ha_client.is_configured() {
                continue;
            }
            if self.last_published.get(&publication.slot) == Some(&publication.value) {
                continue;
            }
            match self.write_with_retry(&publication).await {
                Ok(()) => {
                    self.last_published
                        .insert(publication.slot, publication.value);
                }
                Err(e) => warn!("Home Assistant write error: {}", e),
            }
        }

        info!("Home Assistant publisher exiting");
    }

    /// Writes one publication with automatic retry
    async fn write_with_retry(&self, publication: &Publication) -> Result<(), String> {
        const MAX_RETRIES: u32 = 3;

        let Some(entity_id) = self.entities.get(&publication.slot) else {
            return Err(format!("No entity bound to {}", publication.slot));
        };
        let update = state_update(publication);

        for attempt in 1..=MAX_RETRIES {
            match self.ha_client.write_state(entity_id, &update).await {
                Ok(_) => {
                    debug!("HA {} = {}", entity_id, update.state);
                    return Ok(());
                }
                Err(e) if attempt < MAX_RETRIES => {
                    debug!("HA write attempt {} failed: {}. Retrying...", attempt, e);
                    sleep(Duration::from_millis(200 * attempt as u64)).await;
                }
                Err(e) => {
                    return Err(format!(
                        "All {} attempts to write {} failed. Last error: {}",
                        MAX_RETRIES, entity_id, e
                    ));
                }
            }
        }

        unreachable!()
    }
}

fn state_update(publication: &Publication) -> HAStateUpdate {
    let state = match &publication.value {
        SinkValue::Number(value) => value.to_string(),
        SinkValue::Text(text) => text.clone(),
    };
    HAStateUpdate {
        state,
        attributes: HAAttributes {
            unit_of_measurement: unit_of(publication.slot).map(str::to_string),
            friendly_name: Some(friendly_name(publication.slot).to_string()),
        },
    }
}

fn unit_of(slot: OutputSlot) -> Option<&'static str> {
    match slot {
        OutputSlot::HeatingPower | OutputSlot::HeatingImport => Some("W"),
        OutputSlot::HeatingBoostTime => Some("min"),
        OutputSlot::HeatingToday
        | OutputSlot::HeatingYesterday
        | OutputSlot::HeatingLast7
        | OutputSlot::HeatingLast28
        | OutputSlot::HeatingLifetime => Some("Wh"),
        OutputSlot::RssiIBoost | OutputSlot::RssiBuddy | OutputSlot::RssiSender => Some("dBm"),
        OutputSlot::PacketCount
        | OutputSlot::LastPacket
        | OutputSlot::HeatingMode
        | OutputSlot::HeatingWarn => None,
    }
}

fn friendly_name(slot: OutputSlot) -> &'static str {
    match slot {
        OutputSlot::PacketCount => "iBoost packets received",
        OutputSlot::LastPacket => "iBoost last packet",
        OutputSlot::HeatingMode => "iBoost heating mode",
        OutputSlot::HeatingWarn => "iBoost warnings",
        OutputSlot::HeatingPower => "iBoost heating power",
        OutputSlot::HeatingImport => "iBoost import power",
        OutputSlot::HeatingBoostTime => "iBoost boost time remaining",
        OutputSlot::HeatingToday => "iBoost heating today",
        OutputSlot::HeatingYesterday => "iBoost heating yesterday",
        OutputSlot::HeatingLast7 => "iBoost heating last 7 days",
        OutputSlot::HeatingLast28 => "iBoost heating last 28 days",
        OutputSlot::HeatingLifetime => "iBoost heating total",
        OutputSlot::RssiIBoost => "iBoost RSSI",
        OutputSlot::RssiBuddy => "iBoost Buddy RSSI",
        OutputSlot::RssiSender => "iBoost Sender RSSI",
    }
}
