use crate::publish_adapter::{OutputSlot, TotalsSource};
use anyhow::Context;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

const DEFAULT_RADIO_BIND: &str = "0.0.0.0:5555";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Runtime configuration, read from environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct BuddyConfig {
    pub radio_bind: SocketAddr,
    pub poll_interval: Duration,
    pub use_system_clock: bool,
    pub totals_source: TotalsSource,
    /// Home Assistant entity per bound output slot
    pub slot_entities: Vec<(OutputSlot, String)>,
    pub display_top_title: String,
}

impl BuddyConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let radio_bind = lookup("RADIO_BIND")
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_RADIO_BIND.to_string());
        let radio_bind = radio_bind
            .parse()
            .with_context(|| format!("Invalid RADIO_BIND address '{radio_bind}'"))?;

        let poll_interval_secs = match lookup("POLL_INTERVAL_SECS").filter(|v| !v.is_empty()) {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid POLL_INTERVAL_SECS '{value}'"))?,
            None => DEFAULT_POLL_INTERVAL_SECS,
        };
        if poll_interval_secs == 0 {
            anyhow::bail!("POLL_INTERVAL_SECS must be at least 1");
        }

        let use_system_clock = parse_bool_or(lookup("USE_SYSTEM_CLOCK"), true);

        let totals_source = match lookup("TOTALS_SOURCE").filter(|v| !v.is_empty()) {
            Some(value) => value.parse()?,
            None => TotalsSource::default(),
        };

        let slot_entities = OutputSlot::ALL
            .into_iter()
            .filter_map(|slot| {
                lookup(&slot_env_var(slot))
                    .map(|entity| entity.trim().to_string())
                    .filter(|entity| !entity.is_empty())
                    .map(|entity| (slot, entity))
            })
            .collect();

        Ok(Self {
            radio_bind,
            poll_interval: Duration::from_secs(poll_interval_secs),
            use_system_clock,
            totals_source,
            slot_entities,
            display_top_title: lookup("DISPLAY_TOP_TITLE").unwrap_or_default(),
        })
    }

    pub fn log_summary(&self) {
        info!("iBoost Buddy Config:");
        info!("  Radio bridge: {}", self.radio_bind);
        info!("  Poll interval: {:?}", self.poll_interval);
        info!("  System clock: {}", self.use_system_clock);
        info!("  Totals source: {:?}", self.totals_source);
        if self.slot_entities.is_empty() {
            info!("  Bound outputs: none");
        }
        for (slot, entity) in &self.slot_entities {
            info!("  {slot} -> {entity}");
        }
    }
}

/// Environment variable naming the entity of a slot, e.g. `IBOOST_HEATING_TODAY`
pub fn slot_env_var(slot: OutputSlot) -> String {
    format!("IBOOST_{}", slot.key().to_ascii_uppercase())
}

/// Parses a boolean from an optional string, falling back to `default` when unset or invalid
fn parse_bool_or(val: Option<String>, default: bool) -> bool {
    val.and_then(|v| v.trim().to_ascii_lowercase().parse().ok())
        .unwrap_or(default)
}
