use crate::control_packet::{self, ControlAction, RequestCycle};
use crate::heating_aggregator::{AggregateView, HeatingAggregator, RolloverMode};
use crate::packet_decoder::{self, DecodeError};
use crate::publish_adapter::{ConfiguredSinks, PublishAdapter};
use crate::radio_link::{RadioLink, RawFrame};
use crate::system_address::{AddressTracker, SystemAddress};
use crate::time_source::TimeSource;
use chrono::NaiveDateTime;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Operator commands accepted between poll ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    BoostStart(u8),
    BoostCancel,
}

impl FromStr for ControlCommand {
    type Err = anyhow::Error;

    /// Parses `boost <minutes>` or `cancel`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some("boost"), Some(minutes), None) => {
                let minutes = minutes
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Invalid boost minutes '{minutes}'"))?;
                Ok(Self::BoostStart(minutes))
            }
            (Some("cancel"), None, None) => Ok(Self::BoostCancel),
            _ => anyhow::bail!("Unknown command '{}', expected 'boost <minutes>' or 'cancel'", s.trim()),
        }
    }
}

/// What happened to a single frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Ingested,
    /// Decoded, but sent by another iBoost installation
    Foreign,
    Dropped(DecodeError),
}

/// Summary of one poll tick
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub ingested: usize,
    pub foreign: usize,
    pub dropped: usize,
    pub rolled_over: bool,
    pub published: usize,
    pub request_sent: bool,
}

/// One iBoost Buddy: a radio, its decoder/aggregator pair, and the bound outputs.
///
/// Owned by a single task; everything runs from [`BuddyComponent::tick`] or the
/// boost commands, never concurrently.
pub struct BuddyComponent {
    radio: Option<Box<dyn RadioLink>>,
    clock: Option<Box<dyn TimeSource>>,
    aggregator: HeatingAggregator,
    addresses: AddressTracker,
    requests: RequestCycle,
    adapter: PublishAdapter,
    sinks: ConfiguredSinks,
}

impl BuddyComponent {
    /// Rollover is enabled for the component's lifetime exactly when a clock is given
    pub fn new(
        radio: Option<Box<dyn RadioLink>>,
        clock: Option<Box<dyn TimeSource>>,
        adapter: PublishAdapter,
        sinks: ConfiguredSinks,
    ) -> Self {
        let rollover = if clock.is_some() {
            RolloverMode::TimeSourceBound
        } else {
            RolloverMode::NoTimeSource
        };
        Self {
            radio,
            clock,
            aggregator: HeatingAggregator::new(rollover),
            addresses: AddressTracker::new(),
            requests: RequestCycle::new(),
            adapter,
            sinks,
        }
    }

    pub fn setup(&mut self) {
        self.adapter.publish_initial(&mut self.sinks);

        info!("iBoost Buddy setup starting");
        if self.radio.is_none() {
            debug!("No radio linked");
        } else {
            debug!("Radio linked; radio configuration handled by the radio bridge");
        }
        if self.clock.is_none() {
            info!("No time source bound, daily totals are disabled");
        }
        info!("{} output(s) bound", self.sinks.bound_count());
    }

    /// Drains and ingests buffered frames, rolls the day over if due, publishes, and
    /// asks the iBoost for the next energy statistic.
    pub fn tick(&mut self) -> TickReport {
        let now = self.now();
        let mut report = TickReport::default();

        let frames = match self.radio.as_mut() {
            Some(radio) => radio.drain(),
            None => Vec::new(),
        };
        for frame in &frames {
            match self.process_frame(frame, now) {
                FrameOutcome::Ingested => report.ingested += 1,
                FrameOutcome::Foreign => report.foreign += 1,
                FrameOutcome::Dropped(_) => report.dropped += 1,
            }
        }

        report.rolled_over = self.aggregator.check_rollover(now);
        report.published = self
            .adapter
            .publish(&self.aggregator.snapshot(), &mut self.sinks);

        match self.send_control(ControlAction::RequestData) {
            Ok(()) => report.request_sent = true,
            Err(e) => debug!("TX: Cannot send data request - {e}"),
        }

        trace!("Tick: {report:?}");
        report
    }

    /// Decodes one frame and, if it belongs to our installation, ingests it
    pub fn process_frame(&mut self, frame: &RawFrame, now: Option<NaiveDateTime>) -> FrameOutcome {
        trace!("RX: {} bytes RSSI={:.1}: {:02X?}", frame.bytes.len(), frame.rssi, frame.bytes);
        let packet = match packet_decoder::decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("RX: Dropping frame: {e}");
                return FrameOutcome::Dropped(e);
            }
        };
        if !self.addresses.observe(&packet) {
            return FrameOutcome::Foreign;
        }
        debug!("RX: {:?} packet from {}", packet.packet_type(), packet.address());
        self.aggregator.ingest_packet(&packet, now);
        FrameOutcome::Ingested
    }

    pub fn boost_start(&mut self, minutes: u8) -> anyhow::Result<()> {
        self.send_control(ControlAction::BoostStart(minutes))
    }

    pub fn boost_cancel(&mut self) -> anyhow::Result<()> {
        self.send_control(ControlAction::BoostCancel)
    }

    pub fn handle_command(&mut self, command: ControlCommand) -> anyhow::Result<()> {
        match command {
            ControlCommand::BoostStart(minutes) => self.boost_start(minutes),
            ControlCommand::BoostCancel => self.boost_cancel(),
        }
    }

    fn send_control(&mut self, action: ControlAction) -> anyhow::Result<()> {
        let Some(address) = self.addresses.address() else {
            anyhow::bail!("waiting for system address discovery");
        };
        let Some(radio) = self.radio.as_mut() else {
            anyhow::bail!("radio not configured; cannot transmit packet");
        };

        let request = self.requests.next_request();
        let packet = control_packet::encode(address, action, request);
        radio.transmit(&packet)?;
        debug!(
            "TX: Sent control packet [{}][{}]",
            action.description(),
            request.label()
        );
        Ok(())
    }

    pub fn snapshot(&self) -> AggregateView {
        self.aggregator.snapshot()
    }

    pub fn system_address(&self) -> Option<SystemAddress> {
        self.addresses.address()
    }

    pub fn rollover_mode(&self) -> RolloverMode {
        self.aggregator.rollover_mode()
    }

    fn now(&self) -> Option<NaiveDateTime> {
        self.clock.as_ref().and_then(|clock| clock.now())
    }

    /// Runs the poll loop forever, applying commands as they arrive
    pub async fn run(mut self, poll_interval: Duration, mut commands: Receiver<ControlCommand>) {
        info!("Polling every {poll_interval:?}");
        let mut poll = interval(poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.tick();
                }
                Some(command) = commands.recv() => {
                    if let Err(e) = self.handle_command(command) {
                        warn!("Command {command:?} failed: {e}");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish_adapter::{OutputSlot, Sink};
    use crate::radio_link::{BufferedRadio, RadioHandle};
    use crate::time_source::ManualClock;
    use chrono::NaiveDate;
    use std::sync::{Arc, Mutex};

    fn iboost_frame(address: [u8; 2], import_raw: i32) -> RawFrame {
        let mut bytes = vec![0u8; 29];
        bytes[0] = address[0];
        bytes[1] = address[1];
        bytes[2] = 0x22;
        bytes[18..22].copy_from_slice(&import_raw.to_le_bytes());
        RawFrame::new(bytes, -70.0)
    }

    fn noon(day: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
    }

    fn component(clock: Option<ManualClock>, sinks: ConfiguredSinks) -> (BuddyComponent, RadioHandle) {
        let (radio, handle) = BufferedRadio::new();
        let clock = clock.map(|clock| Box::new(clock) as Box<dyn TimeSource>);
        (
            BuddyComponent::new(Some(Box::new(radio)), clock, PublishAdapter::default(), sinks),
            handle,
        )
    }

    #[test]
    fn test_control_command_from_str() {
        assert_eq!(
            "boost 30".parse::<ControlCommand>().unwrap(),
            ControlCommand::BoostStart(30)
        );
        assert_eq!(
            " cancel ".parse::<ControlCommand>().unwrap(),
            ControlCommand::BoostCancel
        );
        assert!("boost".parse::<ControlCommand>().is_err());
        assert!("boost 300".parse::<ControlCommand>().is_err());
        assert!("heat".parse::<ControlCommand>().is_err());
    }

    #[tokio::test]
    async fn test_tick_ingests_and_requests_data() {
        let clock = ManualClock::new(noon(1));
        let (mut component, mut handle) = component(Some(clock), ConfiguredSinks::new());

        handle.frames.send(iboost_frame([0x12, 0x34], 36_000)).await.unwrap();
        handle.frames.send(iboost_frame([0x12, 0x34], 37_080)).await.unwrap();

        let report = component.tick();
        assert_eq!(report.ingested, 2);
        assert!(report.request_sent);
        assert_eq!(component.snapshot().today, 3.0);
        assert_eq!(component.system_address(), Some(SystemAddress::new(0x12, 0x34)));

        let request = handle.outbound.recv().await.unwrap();
        assert_eq!(&request[..4], &[0x12, 0x34, 0x21, 0x08]);
        assert_eq!(request[12], 0xCA);
    }

    #[tokio::test]
    async fn test_malformed_frame_changes_nothing() {
        let (mut component, handle) = component(Some(ManualClock::new(noon(1))), ConfiguredSinks::new());
        component.tick();
        let before = component.snapshot();

        handle
            .frames
            .send(RawFrame::new(vec![0x12, 0x34, 0x22, 0x00], -70.0))
            .await
            .unwrap();
        handle
            .frames
            .send(iboost_frame([0x12, 0x34], 1).with_crc_error())
            .await
            .unwrap();

        let report = component.tick();
        assert_eq!(report.dropped, 2);
        assert_eq!(report.ingested, 0);
        assert_eq!(component.snapshot(), before);
        assert_eq!(component.system_address(), None);
    }

    #[tokio::test]
    async fn test_foreign_system_is_ignored() {
        let (mut component, handle) = component(None, ConfiguredSinks::new());
        handle.frames.send(iboost_frame([0x12, 0x34], 360)).await.unwrap();
        handle.frames.send(iboost_frame([0x99, 0x99], 720)).await.unwrap();

        let report = component.tick();
        assert_eq!(report.ingested, 1);
        assert_eq!(report.foreign, 1);
        assert_eq!(component.snapshot().packet_count, 1);
        assert_eq!(component.snapshot().imported, 1.0);
    }

    #[tokio::test]
    async fn test_rollover_once_per_day_across_ticks() {
        let clock = ManualClock::new(noon(1));
        let (mut component, handle) = component(Some(clock.clone()), ConfiguredSinks::new());
        handle.frames.send(iboost_frame([1, 2], 0)).await.unwrap();
        handle.frames.send(iboost_frame([1, 2], 3_600)).await.unwrap();
        component.tick();

        clock.set(noon(2));
        assert!(component.tick().rolled_over);
        for _ in 0..5 {
            assert!(!component.tick().rolled_over);
        }
        let view = component.snapshot();
        assert_eq!(view.yesterday, 10.0);
        assert_eq!(view.today, 0.0);
    }

    #[test]
    fn test_without_time_source() {
        let (component, _handle) = component(None, ConfiguredSinks::new());
        assert_eq!(component.rollover_mode(), RolloverMode::NoTimeSource);
    }

    #[tokio::test]
    async fn test_boost_commands() {
        let (mut component, mut handle) = component(None, ConfiguredSinks::new());

        // No address known yet
        assert!(component.boost_start(30).is_err());

        handle.frames.send(iboost_frame([0x12, 0x34], 0)).await.unwrap();
        component.tick();
        let _request = handle.outbound.recv().await.unwrap();

        component
            .handle_command(ControlCommand::BoostStart(30))
            .unwrap();
        let boost = handle.outbound.recv().await.unwrap();
        assert_eq!(boost[3], 0x18);
        assert_eq!(boost[17], 30);
        // The request cycle moves on with every control packet
        assert_eq!(boost[12], 0xCB);

        component.boost_cancel().unwrap();
        let cancel = handle.outbound.recv().await.unwrap();
        assert_eq!(cancel[17], 0);
    }

    #[test]
    fn test_no_radio() {
        let mut component =
            BuddyComponent::new(None, None, PublishAdapter::default(), ConfiguredSinks::new());
        component.setup();
        let report = component.tick();
        assert_eq!(report, TickReport::default());
    }

    #[tokio::test]
    async fn test_setup_and_tick_publish_to_bound_sinks() {
        let modes = Arc::new(Mutex::new(Vec::new()));
        let log = modes.clone();
        let mut sinks = ConfiguredSinks::new();
        sinks.bind(
            OutputSlot::HeatingMode,
            Sink::text(move |value| log.lock().unwrap().push(value.to_string())),
        );

        let (mut component, handle) = component(None, sinks);
        component.setup();
        component.tick();
        handle.frames.send(iboost_frame([1, 2], 0)).await.unwrap();
        component.tick();

        assert_eq!(
            *modes.lock().unwrap(),
            vec![
                "Initializing...".to_string(),
                "ON: Heating from Solar".to_string()
            ]
        );
    }
}
