//! Game UDP telemetry for BoxBox
//!
//! Header parsing, per-format field layouts, packet decoding into the shared
//! [`TelemetryStore`](boxbox_core::store::TelemetryStore), the UDP ingestion
//! loop, and an encoder plus synthetic race feed that speak the same wire
//! format.

pub mod decoder;
pub mod demo;
pub mod encode;
pub mod header;
pub mod layout;
pub mod listener;
pub mod packets;
pub mod reader;

pub use decoder::{DecodeOutcome, PacketDecoder, SessionSignal};
pub use demo::DemoRace;
pub use encode::StreamHeader;
pub use header::{DecodeError, PacketHeader, PacketId};
pub use listener::DEFAULT_UDP_PORT;
