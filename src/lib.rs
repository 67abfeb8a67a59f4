//! iBoost Buddy Library
//!
//! Listens to the 868 MHz traffic of a Marlec iBoost solar immersion controller, decodes
//! its status packets and keeps daily heating totals, then publishes them to configurable
//! outputs such as Home Assistant entities.

pub mod buddy_component;
pub mod config;
pub mod control_packet;
pub mod heating_aggregator;
pub mod home_assistant;
pub mod home_assistant_publisher;
pub mod packet_decoder;
pub mod paper_display;
pub mod publish_adapter;
pub mod radio_link;
pub mod rolling_total;
pub mod system_address;
pub mod time_source;

// Re-export commonly used types for easier access
pub use buddy_component::{BuddyComponent, ControlCommand, TickReport};
pub use config::BuddyConfig;
pub use heating_aggregator::{AggregateView, HeatingAggregator, RolloverMode};
pub use home_assistant_publisher::HomeAssistantPublisher;
pub use packet_decoder::{decode, DecodeError, DecodedPacket, HeatingMode, HeatingRecord};
pub use publish_adapter::{ConfiguredSinks, OutputSlot, PublishAdapter, Sink, SinkValue};
pub use radio_link::{BufferedRadio, RadioLink, RawFrame, UdpRadioBridge};
