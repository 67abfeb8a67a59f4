use crate::packet_decoder::{
    BuddyPacket, DecodedPacket, HeatingMode, HeatingRecord, ReportKind, SenderPacket,
};
use crate::rolling_total::RollingTotal;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info};

/// Whether calendar-day rollups are maintained. Fixed when the aggregator is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverMode {
    /// No wall clock: only lifetime, packet count and instant fields move
    NoTimeSource,
    TimeSourceBound,
}

/// Energy statistics as reported by the iBoost unit itself
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReportedTotals {
    pub today: Option<f64>,
    pub yesterday: Option<f64>,
    pub last_7: Option<f64>,
    pub last_28: Option<f64>,
    pub total: Option<f64>,
}

impl ReportedTotals {
    fn update(&mut self, kind: ReportKind, watt_hours: i32) {
        let value = f64::from(watt_hours);
        match kind {
            ReportKind::Today => self.today = Some(value),
            ReportKind::Yesterday => self.yesterday = Some(value),
            // The unit answers zero for these while it is still gathering history
            ReportKind::Last7Days if watt_hours > 0 => self.last_7 = Some(value),
            ReportKind::Last28Days if watt_hours > 0 => self.last_28 = Some(value),
            ReportKind::Total if watt_hours > 0 => self.total = Some(value),
            _ => {}
        }
    }
}

/// Point-in-time copy of everything the aggregator knows
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateView {
    pub packet_count: u32,
    pub last_packet: Option<NaiveDateTime>,
    pub mode: Option<HeatingMode>,
    /// Active warnings joined with " | ", empty when there are none
    pub warning: String,
    pub power_watts: f64,
    pub imported: f64,
    pub boost_minutes: f64,
    pub today: f64,
    pub yesterday: f64,
    pub last_7: f64,
    pub last_28: f64,
    pub lifetime: f64,
    pub rssi_iboost: Option<f32>,
    pub rssi_buddy: Option<f32>,
    pub rssi_sender: Option<f32>,
    pub reported: ReportedTotals,
}

/// Running state built from decoded packets.
///
/// Imported energy is accumulated as deltas between consecutive readings into the
/// bucket of the current calendar day. When the clock crosses midnight the day is
/// closed: it becomes yesterday, enters the 7 and 28 day windows and the lifetime total.
#[derive(Debug)]
pub struct HeatingAggregator {
    rollover: RolloverMode,
    packet_count: u32,
    last_packet: Option<NaiveDateTime>,

    mode: Option<HeatingMode>,
    overheated: bool,
    sender_battery_low: bool,
    power_watts: f64,
    imported: f64,
    boost_minutes: f64,

    rssi_iboost: Option<f32>,
    rssi_buddy: Option<f32>,
    rssi_sender: Option<f32>,

    last_import: Option<f64>,
    current_day: Option<NaiveDate>,
    today: f64,
    yesterday: f64,
    last_7: RollingTotal<7>,
    last_28: RollingTotal<28>,
    /// Lifetime energy excluding the open day
    lifetime_closed: f64,

    reported: ReportedTotals,
}

impl HeatingAggregator {
    pub fn new(rollover: RolloverMode) -> Self {
        Self {
            rollover,
            packet_count: 0,
            last_packet: None,
            mode: None,
            overheated: false,
            sender_battery_low: false,
            power_watts: 0.0,
            imported: 0.0,
            boost_minutes: 0.0,
            rssi_iboost: None,
            rssi_buddy: None,
            rssi_sender: None,
            last_import: None,
            current_day: None,
            today: 0.0,
            yesterday: 0.0,
            last_7: RollingTotal::new(),
            last_28: RollingTotal::new(),
            lifetime_closed: 0.0,
            reported: ReportedTotals::default(),
        }
    }

    pub fn rollover_mode(&self) -> RolloverMode {
        self.rollover
    }

    /// Folds any decoded packet into the state
    pub fn ingest_packet(&mut self, packet: &DecodedPacket, now: Option<NaiveDateTime>) {
        match packet {
            DecodedPacket::IBoost(record) => self.ingest(record, now),
            DecodedPacket::Buddy(packet) => self.ingest_buddy(packet, now),
            DecodedPacket::Sender(packet) => self.ingest_sender(packet, now),
        }
    }

    /// Folds an iBoost status record into the state
    pub fn ingest(&mut self, record: &HeatingRecord, now: Option<NaiveDateTime>) {
        self.check_rollover(now);

        let imported = record.imported_energy();
        let delta = match self.last_import {
            Some(previous) => (imported - previous).max(0.0),
            None => 0.0,
        };
        self.last_import = Some(imported);
        match self.rollover {
            RolloverMode::TimeSourceBound => self.today += delta,
            RolloverMode::NoTimeSource => self.lifetime_closed += delta,
        }

        self.mode = Some(record.mode);
        self.overheated = record.overheated;
        self.power_watts = f64::from(record.power_watts);
        self.imported = imported;
        self.boost_minutes = f64::from(record.boost_minutes);
        self.rssi_iboost = Some(record.rssi);

        if let Some(report) = record.report {
            debug!("Received {}: {} Wh", report.kind.label(), report.watt_hours);
            self.reported.update(report.kind, report.watt_hours);
        }

        debug!(
            "Heat: {} power {} W import {:.1} boost {} min",
            record.mode, record.power_watts, imported, record.boost_minutes
        );
        self.count_packet(now);
    }

    fn ingest_buddy(&mut self, packet: &BuddyPacket, now: Option<NaiveDateTime>) {
        self.check_rollover(now);
        self.rssi_buddy = Some(packet.rssi);
        self.count_packet(now);
    }

    fn ingest_sender(&mut self, packet: &SenderPacket, now: Option<NaiveDateTime>) {
        self.check_rollover(now);
        self.rssi_sender = Some(packet.rssi);
        self.sender_battery_low = packet.battery_low;
        self.count_packet(now);
    }

    fn count_packet(&mut self, now: Option<NaiveDateTime>) {
        self.packet_count = self.packet_count.wrapping_add(1);
        if self.rollover == RolloverMode::TimeSourceBound && now.is_some() {
            self.last_packet = now;
        }
    }

    /// Closes the open day if `now` falls on a later calendar day.
    ///
    /// Returns whether a rollover happened. Calling it again on the same day is a no-op,
    /// and a clock that moves backwards never rolls over.
    pub fn check_rollover(&mut self, now: Option<NaiveDateTime>) -> bool {
        if self.rollover == RolloverMode::NoTimeSource {
            return false;
        }
        let Some(date) = now.map(|now| now.date()) else {
            return false;
        };
        let Some(current_day) = self.current_day else {
            self.current_day = Some(date);
            return false;
        };
        if date <= current_day {
            return false;
        }

        let elapsed_days = (date - current_day).num_days();
        let closed = self.today;
        self.close_day(closed);
        // Days with no packets at all still occupy a slot in the windows
        let empty_days = (elapsed_days - 1).min(28);
        for _ in 0..empty_days {
            self.close_day(0.0);
        }
        self.yesterday = if elapsed_days == 1 { closed } else { 0.0 };

        self.today = 0.0;
        self.last_import = None;
        self.current_day = Some(date);
        info!("Day rollover to {date}: closed {closed:.1} ({elapsed_days} day(s) elapsed)");
        true
    }

    fn close_day(&mut self, energy: f64) {
        self.last_7.push(energy);
        self.last_28.push(energy);
        self.lifetime_closed += energy;
    }

    pub fn snapshot(&self) -> AggregateView {
        AggregateView {
            packet_count: self.packet_count,
            last_packet: self.last_packet,
            mode: self.mode,
            warning: self.warning_text(),
            power_watts: self.power_watts,
            imported: self.imported,
            boost_minutes: self.boost_minutes,
            today: self.today,
            yesterday: self.yesterday,
            last_7: self.last_7.total() + self.today,
            last_28: self.last_28.total() + self.today,
            lifetime: self.lifetime_closed + self.today,
            rssi_iboost: self.rssi_iboost,
            rssi_buddy: self.rssi_buddy,
            rssi_sender: self.rssi_sender,
            reported: self.reported,
        }
    }

    /// Completed days held by the 7 and 28 day windows
    pub fn window_days(&self) -> (usize, usize) {
        (self.last_7.len(), self.last_28.len())
    }

    fn warning_text(&self) -> String {
        let mut warnings = Vec::new();
        if self.overheated {
            warnings.push("iBoost Overheating");
        }
        if self.sender_battery_low {
            warnings.push("Sender Battery Low");
        }
        warnings.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet_decoder::{EnergyReport, IMPORT_SCALE};
    use crate::system_address::SystemAddress;
    use std::time::Instant;

    fn at(day: u32, hour: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
    }

    fn record(imported: f64) -> HeatingRecord {
        HeatingRecord {
            address: SystemAddress::new(0x12, 0x34),
            mode: HeatingMode::Solar,
            overheated: false,
            cylinder_hot: false,
            water_heating: true,
            power_watts: 900,
            import_raw: (imported * IMPORT_SCALE) as i32,
            boost_minutes: 0,
            report: None,
            rssi: -72.0,
            received_at: Instant::now(),
        }
    }

    #[test]
    fn test_today_accumulates_deltas() {
        let mut aggregator = HeatingAggregator::new(RolloverMode::TimeSourceBound);
        for (hour, reading) in [(8, 100.0), (9, 103.0), (10, 103.0), (11, 107.0)] {
            aggregator.ingest(&record(reading), at(1, hour));
        }
        let view = aggregator.snapshot();
        assert_eq!(view.today, 7.0);
        assert_eq!(view.imported, 107.0);
        assert_eq!(view.packet_count, 4);
        assert_eq!(view.last_packet, at(1, 11));

        assert!(aggregator.check_rollover(at(2, 0)));
        let view = aggregator.snapshot();
        assert_eq!(view.yesterday, 7.0);
        assert_eq!(view.today, 0.0);
        assert_eq!(view.lifetime, 7.0);
        assert_eq!(view.last_7, 7.0);
    }

    #[test]
    fn test_negative_delta_is_ignored() {
        let mut aggregator = HeatingAggregator::new(RolloverMode::TimeSourceBound);
        aggregator.ingest(&record(100.0), at(1, 8));
        aggregator.ingest(&record(50.0), at(1, 9));
        aggregator.ingest(&record(52.0), at(1, 10));
        assert_eq!(aggregator.snapshot().today, 2.0);
    }

    #[test]
    fn test_first_record_of_new_day_has_no_delta() {
        let mut aggregator = HeatingAggregator::new(RolloverMode::TimeSourceBound);
        aggregator.ingest(&record(100.0), at(1, 23));
        aggregator.ingest(&record(110.0), at(2, 1));
        let view = aggregator.snapshot();
        assert_eq!(view.today, 0.0);
        assert_eq!(view.yesterday, 0.0);

        aggregator.ingest(&record(112.0), at(2, 2));
        assert_eq!(aggregator.snapshot().today, 2.0);
    }

    #[test]
    fn test_rollover_is_idempotent_within_a_day() {
        let mut aggregator = HeatingAggregator::new(RolloverMode::TimeSourceBound);
        aggregator.ingest(&record(100.0), at(1, 8));
        aggregator.ingest(&record(105.0), at(1, 9));

        assert!(aggregator.check_rollover(at(2, 0)));
        assert!(!aggregator.check_rollover(at(2, 0)));
        assert!(!aggregator.check_rollover(at(2, 23)));
        assert_eq!(aggregator.window_days(), (1, 1));
        assert_eq!(aggregator.snapshot().yesterday, 5.0);
    }

    #[test]
    fn test_clock_going_backwards_does_not_roll_over() {
        let mut aggregator = HeatingAggregator::new(RolloverMode::TimeSourceBound);
        aggregator.check_rollover(at(5, 12));
        assert!(!aggregator.check_rollover(at(4, 12)));
        assert_eq!(aggregator.window_days(), (0, 0));
    }

    #[test]
    fn test_windows_hold_trailing_days() {
        let mut aggregator = HeatingAggregator::new(RolloverMode::TimeSourceBound);
        let mut reading = 0.0;
        for day in 1..=10 {
            // First record of each day sets the baseline, second adds `day`
            aggregator.ingest(&record(reading), at(day, 8));
            reading += day as f64;
            aggregator.ingest(&record(reading), at(day, 9));
            let completed = (day - 1) as usize;
            assert_eq!(aggregator.window_days(), (completed.min(7), completed.min(28)));
        }

        let view = aggregator.snapshot();
        assert_eq!(view.today, 10.0);
        assert_eq!(view.yesterday, 9.0);
        // Completed days 3..=9 plus today
        assert_eq!(view.last_7, (3..=9).sum::<u32>() as f64 + 10.0);
        assert_eq!(view.last_28, (1..=10).sum::<u32>() as f64);
        assert_eq!(view.lifetime, (1..=10).sum::<u32>() as f64);
    }

    #[test]
    fn test_skipped_days_count_as_empty() {
        let mut aggregator = HeatingAggregator::new(RolloverMode::TimeSourceBound);
        aggregator.ingest(&record(100.0), at(1, 8));
        aggregator.ingest(&record(104.0), at(1, 9));

        assert!(aggregator.check_rollover(at(4, 8)));
        let view = aggregator.snapshot();
        assert_eq!(aggregator.window_days(), (3, 3));
        assert_eq!(view.yesterday, 0.0);
        assert_eq!(view.last_7, 4.0);
        assert_eq!(view.lifetime, 4.0);
    }

    #[test]
    fn test_long_gap_empties_the_windows() {
        for (gap, expected_last_28) in [(28, 4.0), (29, 0.0), (40, 0.0)] {
            let mut aggregator = HeatingAggregator::new(RolloverMode::TimeSourceBound);
            aggregator.ingest(&record(100.0), at(1, 8));
            aggregator.ingest(&record(104.0), at(1, 9));

            let later = at(1, 9).map(|now| now + chrono::Duration::days(gap));
            assert!(aggregator.check_rollover(later));
            let view = aggregator.snapshot();
            assert_eq!(aggregator.window_days(), (7, 28), "gap of {gap} days");
            assert_eq!(view.last_7, 0.0, "gap of {gap} days");
            assert_eq!(view.last_28, expected_last_28, "gap of {gap} days");
            assert_eq!(view.lifetime, 4.0, "gap of {gap} days");
        }
    }

    #[test]
    fn test_without_time_source() {
        let mut aggregator = HeatingAggregator::new(RolloverMode::NoTimeSource);
        for (i, reading) in [10.0, 12.0, 15.0, 15.0, 20.0].into_iter().enumerate() {
            aggregator.ingest(&record(reading), at(1 + i as u32, 8));
        }
        assert!(!aggregator.check_rollover(at(20, 0)));

        let view = aggregator.snapshot();
        assert_eq!(view.packet_count, 5);
        assert_eq!(view.lifetime, 10.0);
        assert_eq!(view.mode, Some(HeatingMode::Solar));
        assert_eq!(view.power_watts, 900.0);
        assert_eq!(view.today, 0.0);
        assert_eq!(view.yesterday, 0.0);
        assert_eq!(view.last_7, 0.0);
        assert_eq!(view.last_28, 0.0);
        assert_eq!(view.last_packet, None);
    }

    #[test]
    fn test_invalid_clock_skips_rollover() {
        let mut aggregator = HeatingAggregator::new(RolloverMode::TimeSourceBound);
        aggregator.ingest(&record(1.0), None);
        aggregator.ingest(&record(3.0), None);
        let view = aggregator.snapshot();
        assert_eq!(view.today, 2.0);
        assert_eq!(view.last_packet, None);
        assert_eq!(view.packet_count, 2);
    }

    #[test]
    fn test_rssi_channels_and_warnings() {
        let mut aggregator = HeatingAggregator::new(RolloverMode::NoTimeSource);
        let mut overheating = record(1.0);
        overheating.overheated = true;
        aggregator.ingest_packet(&DecodedPacket::IBoost(overheating), None);
        aggregator.ingest_packet(
            &DecodedPacket::Buddy(BuddyPacket {
                address: SystemAddress::new(0x12, 0x34),
                rssi: -60.0,
                received_at: Instant::now(),
            }),
            None,
        );
        aggregator.ingest_packet(
            &DecodedPacket::Sender(SenderPacket {
                address: SystemAddress::new(0x12, 0x34),
                battery_low: true,
                rssi: -95.5,
                received_at: Instant::now(),
            }),
            None,
        );

        let view = aggregator.snapshot();
        assert_eq!(view.rssi_iboost, Some(-72.0));
        assert_eq!(view.rssi_buddy, Some(-60.0));
        assert_eq!(view.rssi_sender, Some(-95.5));
        assert_eq!(view.warning, "iBoost Overheating | Sender Battery Low");
        assert_eq!(view.packet_count, 3);
    }

    #[test]
    fn test_reported_totals() {
        let mut aggregator = HeatingAggregator::new(RolloverMode::NoTimeSource);
        let mut with_report = record(1.0);

        with_report.report = Some(EnergyReport {
            kind: ReportKind::Today,
            watt_hours: 1200,
        });
        aggregator.ingest(&with_report, None);

        // Zero for the long windows means "not known yet"
        with_report.report = Some(EnergyReport {
            kind: ReportKind::Last7Days,
            watt_hours: 0,
        });
        aggregator.ingest(&with_report, None);

        with_report.report = Some(EnergyReport {
            kind: ReportKind::Total,
            watt_hours: 98_000,
        });
        aggregator.ingest(&with_report, None);

        let reported = aggregator.snapshot().reported;
        assert_eq!(reported.today, Some(1200.0));
        assert_eq!(reported.last_7, None);
        assert_eq!(reported.total, Some(98_000.0));
    }
}
