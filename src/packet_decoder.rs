use crate::radio_link::RawFrame;
use crate::system_address::SystemAddress;
use std::fmt;
use std::time::Instant;
use thiserror::Error;

/// Shortest frame the iBoost radio ever sends
pub const MIN_FRAME_LEN: usize = 10;
/// Longest frame the radio FIFO hands over
pub const MAX_FRAME_LEN: usize = 62;

/// The raw import counter counts in units of 1/360
pub const IMPORT_SCALE: f64 = 360.0;

const OFFSET_PACKET_TYPE: usize = 2;
const OFFSET_BOOST_MINUTES: usize = 5;
const OFFSET_WATER_HEATING: usize = 6;
const OFFSET_CYLINDER_HOT: usize = 7;
const OFFSET_OVERHEATED: usize = 13;
const OFFSET_POWER: usize = 16;
const OFFSET_IMPORT: usize = 18;
const OFFSET_REPORT_CODE: usize = 24;
const OFFSET_REPORT_VALUE: usize = 25;
const OFFSET_SENDER_BATTERY: usize = 12;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed frame length: {len} bytes (expected {min}..={max})")]
    MalformedLength { len: usize, min: usize, max: usize },

    #[error("Frame failed the radio CRC check")]
    BadChecksum,

    #[error("Unknown packet type: 0x{0:02X}")]
    UnknownMode(u8),
}

/// Device that sent a packet, taken from byte 2 of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Clamp sender on the meter tails
    Sender,
    /// A Buddy display (or us) talking to the iBoost
    Buddy,
    /// The iBoost heater unit itself
    IBoost,
}

impl PacketType {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Sender),
            0x21 => Some(Self::Buddy),
            0x22 => Some(Self::IBoost),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Sender => 0x01,
            Self::Buddy => 0x21,
            Self::IBoost => 0x22,
        }
    }

    /// Minimum frame length for this packet type to be decodable
    pub fn min_len(self) -> usize {
        match self {
            Self::Sender => 44,
            Self::Buddy => 28,
            // The reported energy value runs up to byte 28
            Self::IBoost => 29,
        }
    }
}

/// What the heater is currently doing, in priority order of the unit's status flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatingMode {
    WaterTankHot,
    Overheat,
    ManualBoost,
    Solar,
    Off,
}

impl HeatingMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::WaterTankHot => "OFF: Water Tank Hot",
            Self::Overheat => "Failed: Overheat",
            Self::ManualBoost => "ON: Heating from Manual Boost",
            Self::Solar => "ON: Heating from Solar",
            Self::Off => "OFF: Water Heating Off",
        }
    }

    fn from_flags(cylinder_hot: bool, overheated: bool, boost_minutes: u8, water_heating: bool) -> Self {
        if cylinder_hot {
            Self::WaterTankHot
        } else if overheated {
            Self::Overheat
        } else if boost_minutes > 0 {
            Self::ManualBoost
        } else if water_heating {
            Self::Solar
        } else {
            Self::Off
        }
    }
}

impl fmt::Display for HeatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Energy statistic the iBoost answers with, selected by the last data request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Today,
    Yesterday,
    Last7Days,
    Last28Days,
    Total,
}

impl ReportKind {
    /// Order in which data requests cycle through the statistics
    pub const CYCLE: [ReportKind; 5] = [
        ReportKind::Today,
        ReportKind::Yesterday,
        ReportKind::Last7Days,
        ReportKind::Last28Days,
        ReportKind::Total,
    ];

    pub fn code(self) -> u8 {
        match self {
            Self::Today => 0xCA,
            Self::Yesterday => 0xCB,
            Self::Last7Days => 0xCC,
            Self::Last28Days => 0xCD,
            Self::Total => 0xCE,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::CYCLE.into_iter().find(|kind| kind.code() == code)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Today => "Saved Today",
            Self::Yesterday => "Saved Yesterday",
            Self::Last7Days => "Saved Last 7 Days",
            Self::Last28Days => "Saved Last 28 Days",
            Self::Total => "Saved Total",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnergyReport {
    pub kind: ReportKind,
    pub watt_hours: i32,
}

/// Decoded status packet from the iBoost unit
#[derive(Debug, Clone, PartialEq)]
pub struct HeatingRecord {
    pub address: SystemAddress,
    pub mode: HeatingMode,
    pub overheated: bool,
    pub cylinder_hot: bool,
    pub water_heating: bool,
    /// Power currently sent to the immersion heater
    pub power_watts: i16,
    /// Raw import counter, see [`HeatingRecord::imported_energy`]
    pub import_raw: i32,
    pub boost_minutes: u8,
    /// Answer to the most recent data request, if the unit included a known one
    pub report: Option<EnergyReport>,
    pub rssi: f32,
    pub received_at: Instant,
}

impl HeatingRecord {
    /// Import counter in published units
    pub fn imported_energy(&self) -> f64 {
        f64::from(self.import_raw) / IMPORT_SCALE
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuddyPacket {
    pub address: SystemAddress,
    pub rssi: f32,
    pub received_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SenderPacket {
    pub address: SystemAddress,
    pub battery_low: bool,
    pub rssi: f32,
    pub received_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPacket {
    IBoost(HeatingRecord),
    Buddy(BuddyPacket),
    Sender(SenderPacket),
}

impl DecodedPacket {
    pub fn address(&self) -> SystemAddress {
        match self {
            Self::IBoost(record) => record.address,
            Self::Buddy(packet) => packet.address,
            Self::Sender(packet) => packet.address,
        }
    }

    pub fn rssi(&self) -> f32 {
        match self {
            Self::IBoost(record) => record.rssi,
            Self::Buddy(packet) => packet.rssi,
            Self::Sender(packet) => packet.rssi,
        }
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::IBoost(_) => PacketType::IBoost,
            Self::Buddy(_) => PacketType::Buddy,
            Self::Sender(_) => PacketType::Sender,
        }
    }
}

/// Decodes one radio frame. Pure: the frame is only read.
pub fn decode(frame: &RawFrame) -> Result<DecodedPacket, DecodeError> {
    if !frame.crc_ok {
        return Err(DecodeError::BadChecksum);
    }

    let bytes = frame.bytes.as_slice();
    if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&bytes.len()) {
        return Err(DecodeError::MalformedLength {
            len: bytes.len(),
            min: MIN_FRAME_LEN,
            max: MAX_FRAME_LEN,
        });
    }

    let type_byte = bytes[OFFSET_PACKET_TYPE];
    let packet_type = PacketType::from_byte(type_byte).ok_or(DecodeError::UnknownMode(type_byte))?;
    if bytes.len() < packet_type.min_len() {
        return Err(DecodeError::MalformedLength {
            len: bytes.len(),
            min: packet_type.min_len(),
            max: MAX_FRAME_LEN,
        });
    }

    let address = SystemAddress::new(bytes[0], bytes[1]);
    let packet = match packet_type {
        PacketType::IBoost => DecodedPacket::IBoost(decode_heating_record(address, frame)),
        PacketType::Buddy => DecodedPacket::Buddy(BuddyPacket {
            address,
            rssi: frame.rssi,
            received_at: frame.received_at,
        }),
        PacketType::Sender => DecodedPacket::Sender(SenderPacket {
            address,
            battery_low: bytes[OFFSET_SENDER_BATTERY] == 0x01,
            rssi: frame.rssi,
            received_at: frame.received_at,
        }),
    };
    Ok(packet)
}

// Length has been checked against PacketType::IBoost.min_len() by the caller
fn decode_heating_record(address: SystemAddress, frame: &RawFrame) -> HeatingRecord {
    let bytes = frame.bytes.as_slice();
    let boost_minutes = bytes[OFFSET_BOOST_MINUTES];
    let water_heating = bytes[OFFSET_WATER_HEATING] == 0;
    let cylinder_hot = bytes[OFFSET_CYLINDER_HOT] != 0;
    let overheated = bytes[OFFSET_OVERHEATED] != 0;

    let report = ReportKind::from_code(bytes[OFFSET_REPORT_CODE]).map(|kind| EnergyReport {
        kind,
        watt_hours: read_i32_le(bytes, OFFSET_REPORT_VALUE),
    });

    HeatingRecord {
        address,
        mode: HeatingMode::from_flags(cylinder_hot, overheated, boost_minutes, water_heating),
        overheated,
        cylinder_hot,
        water_heating,
        power_watts: read_i16_le(bytes, OFFSET_POWER),
        import_raw: read_i32_le(bytes, OFFSET_IMPORT),
        boost_minutes,
        report,
        rssi: frame.rssi,
        received_at: frame.received_at,
    }
}

fn read_i16_le(bytes: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_i32_le(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
