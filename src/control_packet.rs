use crate::packet_decoder::{PacketType, ReportKind};
use crate::system_address::SystemAddress;

pub const CONTROL_PACKET_LEN: usize = 29;

const COMMAND_REQUEST_DATA: u8 = 0x08;
const COMMAND_SET_BOOST: u8 = 0x18;

/// What a control packet asks the iBoost to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    RequestData,
    BoostStart(u8),
    BoostCancel,
}

impl ControlAction {
    pub fn description(self) -> &'static str {
        match self {
            Self::RequestData => "Request Data",
            Self::BoostStart(_) => "Start Boost",
            Self::BoostCancel => "Cancel Boost",
        }
    }
}

/// Steps through the energy statistics, one per control packet
#[derive(Debug, Default)]
pub struct RequestCycle {
    index: usize,
}

impl RequestCycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next statistic to request, wrapping around at the end
    pub fn next_request(&mut self) -> ReportKind {
        let kind = ReportKind::CYCLE[self.index];
        self.index = (self.index + 1) % ReportKind::CYCLE.len();
        kind
    }
}

/// Builds a control packet as a Buddy display would send it.
///
/// Every control packet carries a data request, including boost commands.
pub fn encode(
    address: SystemAddress,
    action: ControlAction,
    request: ReportKind,
) -> [u8; CONTROL_PACKET_LEN] {
    let [high, low] = address.bytes();
    let mut packet = [0u8; CONTROL_PACKET_LEN];
    packet[0] = high;
    packet[1] = low;
    packet[2] = PacketType::Buddy.to_byte();
    packet[3] = match action {
        ControlAction::RequestData => COMMAND_REQUEST_DATA,
        ControlAction::BoostStart(_) | ControlAction::BoostCancel => COMMAND_SET_BOOST,
    };

    // Fixed protocol bytes
    packet[4] = 0x92;
    packet[5] = 0x07;
    packet[8] = 0x24;
    packet[10] = 0xA0;
    packet[11] = 0xA0;
    packet[12] = request.code();
    packet[14] = 0xA0;
    packet[15] = 0xA0;
    packet[16] = 0xC8;

    packet[17] = match action {
        ControlAction::BoostStart(minutes) => minutes,
        ControlAction::RequestData | ControlAction::BoostCancel => 0,
    };
    packet
}
