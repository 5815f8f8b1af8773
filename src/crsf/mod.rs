//! # CRSF Protocol Module
//!
//! Frame-level handling for the Crossfire/ExpressLRS serial protocol:
//! checksum, constants, the streaming decoder, and the encoder for
//! outbound telemetry.

pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod protocol;

pub use decoder::{CrsfDecoder, DecodeEvent};
pub use protocol::RawChannels;
