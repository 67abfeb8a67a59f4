use crate::packet_decoder::{DecodedPacket, PacketType};
use std::fmt;
use tracing::{info, warn};

/// Two-byte address shared by every device of one iBoost installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemAddress([u8; 2]);

impl SystemAddress {
    pub fn new(high: u8, low: u8) -> Self {
        Self([high, low])
    }

    pub fn bytes(self) -> [u8; 2] {
        self.0
    }
}

impl fmt::Display for SystemAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.0[0], self.0[1])
    }
}

/// Learns which installation we belong to from the packets we overhear.
///
/// Buddy and sender packets may move the address to a stronger signal; iBoost packets
/// only fix it when nothing is known yet, and are rejected when they come from another
/// installation.
#[derive(Debug, Default)]
pub struct AddressTracker {
    captured: Option<(SystemAddress, f32)>,
}

impl AddressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(&self) -> Option<SystemAddress> {
        self.captured.map(|(address, _)| address)
    }

    /// Updates the tracked address and returns whether the packet belongs to our system
    pub fn observe(&mut self, packet: &DecodedPacket) -> bool {
        let address = packet.address();
        let rssi = packet.rssi();
        let packet_type = packet.packet_type();

        match (packet_type, self.captured) {
            (PacketType::IBoost, Some((known, _))) if known != address => {
                warn!("Received packet from different iBoost system {address} (ours is {known}) - ignoring");
                false
            }
            (PacketType::IBoost, Some(_)) => true,
            (_, None) => {
                self.capture(address, rssi, packet_type);
                true
            }
            (_, Some((_, captured_rssi))) => {
                if rssi > captured_rssi {
                    self.capture(address, rssi, packet_type);
                }
                true
            }
        }
    }

    fn capture(&mut self, address: SystemAddress, rssi: f32, source: PacketType) {
        self.captured = Some((address, rssi));
        info!("System address captured from {source:?}: {address} (RSSI={rssi:.1})");
    }
}
