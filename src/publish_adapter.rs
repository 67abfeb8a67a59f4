use crate::heating_aggregator::AggregateView;
use std::fmt;
use std::str::FromStr;
use tracing::{trace, warn};

/// Local wall-clock time, without an offset
const LAST_PACKET_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const MODE_PLACEHOLDER: &str = "Initializing...";
const NO_WARNINGS: &str = "No Warnings";

/// Named outputs a host can bind a sink to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputSlot {
    PacketCount,
    LastPacket,
    HeatingMode,
    HeatingWarn,
    HeatingPower,
    HeatingImport,
    HeatingBoostTime,
    HeatingToday,
    HeatingYesterday,
    HeatingLast7,
    HeatingLast28,
    HeatingLifetime,
    RssiIBoost,
    RssiBuddy,
    RssiSender,
}

impl OutputSlot {
    pub const ALL: [OutputSlot; 15] = [
        OutputSlot::PacketCount,
        OutputSlot::LastPacket,
        OutputSlot::HeatingMode,
        OutputSlot::HeatingWarn,
        OutputSlot::HeatingPower,
        OutputSlot::HeatingImport,
        OutputSlot::HeatingBoostTime,
        OutputSlot::HeatingToday,
        OutputSlot::HeatingYesterday,
        OutputSlot::HeatingLast7,
        OutputSlot::HeatingLast28,
        OutputSlot::HeatingLifetime,
        OutputSlot::RssiIBoost,
        OutputSlot::RssiBuddy,
        OutputSlot::RssiSender,
    ];

    /// Configuration key of the slot
    pub fn key(self) -> &'static str {
        match self {
            Self::PacketCount => "packet_count",
            Self::LastPacket => "last_packet",
            Self::HeatingMode => "heating_mode",
            Self::HeatingWarn => "heating_warn",
            Self::HeatingPower => "heating_power",
            Self::HeatingImport => "heating_import",
            Self::HeatingBoostTime => "heating_boost_time",
            Self::HeatingToday => "heating_today",
            Self::HeatingYesterday => "heating_yesterday",
            Self::HeatingLast7 => "heating_last_7",
            Self::HeatingLast28 => "heating_last_28",
            Self::HeatingLifetime => "heating_last_gt",
            Self::RssiIBoost => "rssi_iboost",
            Self::RssiBuddy => "rssi_buddy",
            Self::RssiSender => "rssi_sender",
        }
    }

    /// Text slots take a text sink, all others a numeric one
    pub fn is_text(self) -> bool {
        matches!(self, Self::LastPacket | Self::HeatingMode | Self::HeatingWarn)
    }
}

impl fmt::Display for OutputSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkValue {
    Number(f64),
    Text(String),
}

type NumericWriter = Box<dyn FnMut(f64) + Send>;
type TextWriter = Box<dyn FnMut(&str) + Send>;

/// Where a slot's values go. Numeric sinks parse text, text sinks format numbers.
pub enum Sink {
    Numeric(NumericWriter),
    Text(TextWriter),
}

impl Sink {
    pub fn numeric(writer: impl FnMut(f64) + Send + 'static) -> Self {
        Self::Numeric(Box::new(writer))
    }

    pub fn text(writer: impl FnMut(&str) + Send + 'static) -> Self {
        Self::Text(Box::new(writer))
    }

    pub fn write(&mut self, value: &SinkValue) {
        match (self, value) {
            (Self::Numeric(writer), SinkValue::Number(number)) => writer(*number),
            (Self::Text(writer), SinkValue::Text(text)) => writer(text),
            (Self::Text(writer), SinkValue::Number(number)) => writer(&number.to_string()),
            (Self::Numeric(writer), SinkValue::Text(text)) => match text.parse() {
                Ok(number) => writer(number),
                Err(_) => warn!("Numeric sink cannot take text value '{text}'"),
            },
        }
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(_) => f.write_str("Sink::Numeric"),
            Self::Text(_) => f.write_str("Sink::Text"),
        }
    }
}

/// One optional sink per output slot, filled in once at construction
#[derive(Debug, Default)]
pub struct ConfiguredSinks {
    pub packet_count: Option<Sink>,
    pub last_packet: Option<Sink>,
    pub heating_mode: Option<Sink>,
    pub heating_warn: Option<Sink>,
    pub heating_power: Option<Sink>,
    pub heating_import: Option<Sink>,
    pub heating_boost_time: Option<Sink>,
    pub heating_today: Option<Sink>,
    pub heating_yesterday: Option<Sink>,
    pub heating_last_7: Option<Sink>,
    pub heating_last_28: Option<Sink>,
    pub heating_lifetime: Option<Sink>,
    pub rssi_iboost: Option<Sink>,
    pub rssi_buddy: Option<Sink>,
    pub rssi_sender: Option<Sink>,
}

impl ConfiguredSinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, slot: OutputSlot, sink: Sink) -> &mut Self {
        *self.slot_mut(slot) = Some(sink);
        self
    }

    pub fn is_bound(&self, slot: OutputSlot) -> bool {
        self.slot(slot).is_some()
    }

    pub fn bound_count(&self) -> usize {
        OutputSlot::ALL
            .into_iter()
            .filter(|slot| self.is_bound(*slot))
            .count()
    }

    fn slot(&self, slot: OutputSlot) -> &Option<Sink> {
        match slot {
            OutputSlot::PacketCount => &self.packet_count,
            OutputSlot::LastPacket => &self.last_packet,
            OutputSlot::HeatingMode => &self.heating_mode,
            OutputSlot::HeatingWarn => &self.heating_warn,
            OutputSlot::HeatingPower => &self.heating_power,
            OutputSlot::HeatingImport => &self.heating_import,
            OutputSlot::HeatingBoostTime => &self.heating_boost_time,
            OutputSlot::HeatingToday => &self.heating_today,
            OutputSlot::HeatingYesterday => &self.heating_yesterday,
            OutputSlot::HeatingLast7 => &self.heating_last_7,
            OutputSlot::HeatingLast28 => &self.heating_last_28,
            OutputSlot::HeatingLifetime => &self.heating_lifetime,
            OutputSlot::RssiIBoost => &self.rssi_iboost,
            OutputSlot::RssiBuddy => &self.rssi_buddy,
            OutputSlot::RssiSender => &self.rssi_sender,
        }
    }

    fn slot_mut(&mut self, slot: OutputSlot) -> &mut Option<Sink> {
        match slot {
            OutputSlot::PacketCount => &mut self.packet_count,
            OutputSlot::LastPacket => &mut self.last_packet,
            OutputSlot::HeatingMode => &mut self.heating_mode,
            OutputSlot::HeatingWarn => &mut self.heating_warn,
            OutputSlot::HeatingPower => &mut self.heating_power,
            OutputSlot::HeatingImport => &mut self.heating_import,
            OutputSlot::HeatingBoostTime => &mut self.heating_boost_time,
            OutputSlot::HeatingToday => &mut self.heating_today,
            OutputSlot::HeatingYesterday => &mut self.heating_yesterday,
            OutputSlot::HeatingLast7 => &mut self.heating_last_7,
            OutputSlot::HeatingLast28 => &mut self.heating_last_28,
            OutputSlot::HeatingLifetime => &mut self.heating_lifetime,
            OutputSlot::RssiIBoost => &mut self.rssi_iboost,
            OutputSlot::RssiBuddy => &mut self.rssi_buddy,
            OutputSlot::RssiSender => &mut self.rssi_sender,
        }
    }
}

/// Which numbers feed the today/yesterday/7/28 day/lifetime slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TotalsSource {
    /// Rollups built here from the import counter
    #[default]
    Local,
    /// Statistics the iBoost unit reports in answer to data requests
    Unit,
}

impl FromStr for TotalsSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "unit" => Ok(Self::Unit),
            other => anyhow::bail!("Unknown totals source '{other}', expected 'local' or 'unit'"),
        }
    }
}

/// Pushes aggregate values to whichever slots have a sink bound
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishAdapter {
    totals: TotalsSource,
}

impl PublishAdapter {
    pub fn new(totals: TotalsSource) -> Self {
        Self { totals }
    }

    /// Current value of a slot, or `None` when nothing is known yet
    pub fn slot_value(&self, slot: OutputSlot, view: &AggregateView) -> Option<SinkValue> {
        let local = self.totals == TotalsSource::Local;
        let number = |value: f64| Some(SinkValue::Number(value));
        let total = |local_value: f64, reported: Option<f64>| {
            if local {
                Some(SinkValue::Number(local_value))
            } else {
                reported.map(SinkValue::Number)
            }
        };

        match slot {
            OutputSlot::PacketCount => number(f64::from(view.packet_count)),
            OutputSlot::LastPacket => view
                .last_packet
                .map(|at| SinkValue::Text(at.format(LAST_PACKET_FORMAT).to_string())),
            OutputSlot::HeatingMode => view
                .mode
                .map(|mode| SinkValue::Text(mode.label().to_string())),
            // The start-up placeholder stays until the first packet
            OutputSlot::HeatingWarn => {
                (view.packet_count > 0).then(|| SinkValue::Text(view.warning.clone()))
            }
            OutputSlot::HeatingPower => number(view.power_watts),
            OutputSlot::HeatingImport => number(view.imported),
            OutputSlot::HeatingBoostTime => number(view.boost_minutes),
            OutputSlot::HeatingToday => total(view.today, view.reported.today),
            OutputSlot::HeatingYesterday => total(view.yesterday, view.reported.yesterday),
            OutputSlot::HeatingLast7 => total(view.last_7, view.reported.last_7),
            OutputSlot::HeatingLast28 => total(view.last_28, view.reported.last_28),
            OutputSlot::HeatingLifetime => total(view.lifetime, view.reported.total),
            OutputSlot::RssiIBoost => view.rssi_iboost.map(|rssi| SinkValue::Number(f64::from(rssi))),
            OutputSlot::RssiBuddy => view.rssi_buddy.map(|rssi| SinkValue::Number(f64::from(rssi))),
            OutputSlot::RssiSender => view.rssi_sender.map(|rssi| SinkValue::Number(f64::from(rssi))),
        }
    }

    /// Writes every bound slot that has a value. Returns the number of writes.
    pub fn publish(&self, view: &AggregateView, sinks: &mut ConfiguredSinks) -> usize {
        let mut written = 0;
        for slot in OutputSlot::ALL {
            let Some(sink) = sinks.slot_mut(slot).as_mut() else {
                continue;
            };
            if let Some(value) = self.slot_value(slot, view) {
                trace!("Publishing {slot} = {value:?}");
                sink.write(&value);
                written += 1;
            }
        }
        written
    }

    /// Start-up placeholders shown until the first packet arrives
    pub fn publish_initial(&self, sinks: &mut ConfiguredSinks) {
        for slot in OutputSlot::ALL {
            let value = match slot {
                OutputSlot::HeatingMode => SinkValue::Text(MODE_PLACEHOLDER.to_string()),
                OutputSlot::HeatingWarn => SinkValue::Text(NO_WARNINGS.to_string()),
                OutputSlot::HeatingPower
                | OutputSlot::HeatingImport
                | OutputSlot::HeatingBoostTime
                | OutputSlot::HeatingToday
                | OutputSlot::HeatingYesterday
                | OutputSlot::HeatingLast7
                | OutputSlot::HeatingLast28
                | OutputSlot::HeatingLifetime => SinkValue::Number(0.0),
                OutputSlot::PacketCount
                | OutputSlot::LastPacket
                | OutputSlot::RssiIBoost
                | OutputSlot::RssiBuddy
                | OutputSlot::RssiSender => continue,
            };
            if let Some(sink) = sinks.slot_mut(slot).as_mut() {
                sink.write(&value);
            }
        }
    }
}
