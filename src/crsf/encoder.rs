//! # CRSF Frame Encoder
//!
//! Builds outbound CRSF frames: RC channels (used by tests and the
//! replay tooling) and the battery sensor frame we repurpose as a
//! telemetry back-channel to the transmitter.

use super::crc::crc8_dvb_s2;
use super::protocol::*;

/// Pack 16 channel values (11 bits each) into a 22-byte payload
///
/// Channels are packed as a continuous bitstream, LSB first. Values
/// above 0x7FF are truncated to 11 bits.
pub fn pack_channels(channels: &RawChannels) -> [u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE] {
    let mut payload = [0u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE];
    let mut bit_index = 0;

    for &channel in channels.iter() {
        let value = channel & 0x07FF;

        for bit in 0..11 {
            if (value >> bit) & 1 == 1 {
                payload[bit_index / 8] |= 1 << (bit_index % 8);
            }
            bit_index += 1;
        }
    }

    payload
}

/// Encode RC channels into a complete CRSF frame
///
/// # Arguments
///
/// * `channels` - Array of 16 channel values (11-bit: 0-2047)
///
/// # Returns
///
/// * `Vec<u8>` - Complete frame (26 bytes: address + length + type + 22-byte payload + crc)
pub fn encode_rc_channels_frame(channels: &RawChannels) -> Vec<u8> {
    let payload = pack_channels(channels);

    // CRC covers Type + Payload only
    let mut crc_data = Vec::with_capacity(1 + payload.len());
    crc_data.push(CRSF_FRAMETYPE_RC_CHANNELS);
    crc_data.extend_from_slice(&payload);
    let crc = crc8_dvb_s2(&crc_data);

    let mut frame = Vec::with_capacity(2 + crc_data.len() + 1);
    frame.push(CRSF_ADDRESS);
    frame.push(CRSF_RC_CHANNELS_FRAME_LENGTH);
    frame.extend_from_slice(&crc_data);
    frame.push(crc);

    frame
}

/// Encode a battery sensor frame carrying diagnostic state
///
/// The battery frame is the one telemetry type every ELRS transmitter
/// displays, so we abuse its fields as a status channel:
///
/// * voltage (u16 BE, decivolts) - nominal pack voltage
/// * current (u16 BE, deciamps) - always zero, no shunt on board
/// * capacity (u24 BE, mAh) - low 16 bits carry the active error code
/// * remaining (u8, percent) - free memory percentage
///
/// # Arguments
///
/// * `voltage_dv` - Pack voltage in decivolts
/// * `error_code` - Active sticky error code (0 when healthy)
/// * `free_mem_percent` - Free memory, clamped to 100
pub fn encode_battery_telemetry(voltage_dv: u16, error_code: u16, free_mem_percent: u8) -> Vec<u8> {
    let mut crc_data = Vec::with_capacity(1 + CRSF_BATTERY_SENSOR_PAYLOAD_SIZE);
    crc_data.push(CRSF_FRAMETYPE_BATTERY_SENSOR);
    crc_data.extend_from_slice(&voltage_dv.to_be_bytes());
    crc_data.extend_from_slice(&0u16.to_be_bytes());
    crc_data.push(0x00);
    crc_data.extend_from_slice(&error_code.to_be_bytes());
    crc_data.push(free_mem_percent.min(100));
    let crc = crc8_dvb_s2(&crc_data);

    let mut frame = Vec::with_capacity(2 + crc_data.len() + 1);
    frame.push(CRSF_ADDRESS);
    frame.push(CRSF_BATTERY_FRAME_LENGTH);
    frame.extend_from_slice(&crc_data);
    frame.push(crc);

    frame
}
