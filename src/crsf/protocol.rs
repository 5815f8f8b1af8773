//! # CRSF Protocol Constants and Types
//!
//! Receiver-side protocol definitions: frame addressing, type bytes,
//! length bounds, and the raw channel value domain.

/// Flight-controller device address byte (start of every frame we accept)
pub const CRSF_ADDRESS: u8 = 0xC8;

/// RC Channels packed frame type
pub const CRSF_FRAMETYPE_RC_CHANNELS: u8 = 0x16;

/// Battery Sensor frame type (used for outbound telemetry)
pub const CRSF_FRAMETYPE_BATTERY_SENSOR: u8 = 0x08;

/// Maximum CRSF frame size on the wire (address + length + declared bytes)
pub const CRSF_FRAME_SIZE_MAX: usize = 64;

/// Maximum value of the length byte (type + payload + crc)
///
/// A frame is address(1) + length(1) + [length bytes], so the length byte
/// can declare at most 62 remaining bytes.
pub const CRSF_LENGTH_MAX: u8 = 62;

/// RC channels payload size (16 channels x 11 bits = 176 bits = 22 bytes)
pub const CRSF_RC_CHANNELS_PAYLOAD_SIZE: usize = 22;

/// Length byte of an RC channels frame (type + 22-byte payload + crc)
pub const CRSF_RC_CHANNELS_FRAME_LENGTH: u8 = 24;

/// Battery sensor payload size
pub const CRSF_BATTERY_SENSOR_PAYLOAD_SIZE: usize = 8;

/// Length byte of a battery sensor frame (type + 8-byte payload + crc)
pub const CRSF_BATTERY_FRAME_LENGTH: u8 = 10;

/// Number of RC channels
pub const CRSF_NUM_CHANNELS: usize = 16;

/// Raw channel value domain as emitted by the receiver (11-bit field,
/// but the usable span is 172..=1811 with center 992)
pub const CRSF_CHANNEL_VALUE_MIN: u16 = 172;
pub const CRSF_CHANNEL_VALUE_MID: u16 = 992;
pub const CRSF_CHANNEL_VALUE_MAX: u16 = 1811;

/// Raw 11-bit channel values for one RC channels frame
pub type RawChannels = [u16; CRSF_NUM_CHANNELS];
