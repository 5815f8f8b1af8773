//! # CRSF Streaming Decoder
//!
//! Byte-at-a-time frame assembly with resynchronization. The decoder never
//! waits for input: each byte advances a five-state machine
//! (`SeekAddress -> ReadLength -> ReadType -> ReadPayload -> ReadChecksum`)
//! and a completed checksum check always returns the machine to
//! `SeekAddress`, whether the frame passed or not.
//!
//! The address byte is the only resynchronization point; an out-of-range
//! length byte drops the partial frame immediately so corrupted lengths
//! can never run the buffer past its bounds.

use super::crc::crc8_dvb_s2;
use super::protocol::*;

/// Result of pushing one byte into the decoder
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodeEvent {
    /// A CRC-valid RC channels frame: 16 raw 11-bit values
    RcChannels(RawChannels),

    /// A CRC-valid frame of some other type; assembled then ignored,
    /// but it still proves the link is alive
    OtherFrame(u8),

    /// Trailing checksum did not match; the frame was discarded
    ChecksumMismatch,
}

/// Frame-assembly state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    SeekAddress,
    ReadLength,
    ReadType,
    ReadPayload,
    ReadChecksum,
}

/// Streaming CRSF frame decoder
///
/// Feed bytes with [`CrsfDecoder::push_byte`]; most pushes return `None`,
/// and a `Some(event)` is emitted exactly when a checksum check completes.
#[derive(Debug)]
pub struct CrsfDecoder {
    state: SyncState,
    frame: [u8; CRSF_FRAME_SIZE_MAX],
    /// Declared remaining-frame length (type + payload + crc)
    frame_length: u8,
    /// Bytes stored in `frame` for the current frame
    received: usize,
}

impl Default for CrsfDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CrsfDecoder {
    /// Create a decoder waiting for the address byte
    pub fn new() -> Self {
        Self {
            state: SyncState::SeekAddress,
            frame: [0u8; CRSF_FRAME_SIZE_MAX],
            frame_length: 0,
            received: 0,
        }
    }

    /// Push one byte from the serial stream
    ///
    /// Returns an event when the byte completes a frame's checksum check,
    /// `None` otherwise. Never blocks, never reads ahead.
    pub fn push_byte(&mut self, byte: u8) -> Option<DecodeEvent> {
        match self.state {
            SyncState::SeekAddress => {
                self.handle_address_byte(byte);
                None
            }
            SyncState::ReadLength => {
                self.handle_length_byte(byte);
                None
            }
            SyncState::ReadType => {
                self.handle_type_byte(byte);
                None
            }
            SyncState::ReadPayload => {
                self.handle_payload_byte(byte);
                None
            }
            SyncState::ReadChecksum => Some(self.handle_checksum_byte(byte)),
        }
    }

    /// Discard bytes until the device address appears
    fn handle_address_byte(&mut self, byte: u8) {
        if byte == CRSF_ADDRESS {
            self.frame[0] = byte;
            self.received = 1;
            self.state = SyncState::ReadLength;
        }
        // anything else is noise between frames
    }

    /// Validate the declared length; out-of-range drops the frame
    fn handle_length_byte(&mut self, byte: u8) {
        if byte == 0 || byte > CRSF_LENGTH_MAX {
            self.reset();
            return;
        }

        self.frame_length = byte;
        self.frame[1] = byte;
        self.received = 2;
        self.state = SyncState::ReadType;
    }

    fn handle_type_byte(&mut self, byte: u8) {
        self.frame[2] = byte;
        self.received = 3;

        // length counts type + payload + crc; > 2 means payload follows
        self.state = if self.frame_length > 2 {
            SyncState::ReadPayload
        } else {
            SyncState::ReadChecksum
        };
    }

    fn handle_payload_byte(&mut self, byte: u8) {
        self.frame[self.received] = byte;
        self.received += 1;

        if self.received >= 2 + self.frame_length as usize - 1 {
            self.state = SyncState::ReadChecksum;
        }
    }

    /// Compare the trailing checksum and emit the frame outcome
    fn handle_checksum_byte(&mut self, byte: u8) -> DecodeEvent {
        // CRC covers type + payload, excluding address and length
        let crc_region = &self.frame[2..2 + self.frame_length as usize - 1];
        let calculated = crc8_dvb_s2(crc_region);

        let event = if calculated == byte {
            let frame_type = self.frame[2];

            if frame_type == CRSF_FRAMETYPE_RC_CHANNELS
                && self.frame_length == CRSF_RC_CHANNELS_FRAME_LENGTH
            {
                let payload: &[u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE] = self.frame
                    [3..3 + CRSF_RC_CHANNELS_PAYLOAD_SIZE]
                    .try_into()
                    .unwrap();
                DecodeEvent::RcChannels(unpack_channels(payload))
            } else {
                // valid frame we do not consume (telemetry echoes, unknown
                // types, or an RC frame with a malformed payload length)
                DecodeEvent::OtherFrame(frame_type)
            }
        } else {
            DecodeEvent::ChecksumMismatch
        };

        // no retry within a frame: always resynchronize
        self.reset();
        event
    }

    fn reset(&mut self) {
        self.state = SyncState::SeekAddress;
        self.frame_length = 0;
        self.received = 0;
    }
}

/// Unpack 16 channels from the 22-byte RC channels payload
///
/// Channels are 11-bit values packed LSB-first into a continuous
/// bitstream; each channel straddles a fixed, overlapping set of payload
/// bytes. The offsets below are load-bearing and match the receiver's
/// packing exactly.
pub fn unpack_channels(p: &[u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE]) -> RawChannels {
    let b = |i: usize| p[i] as u16;

    [
        (b(0) | b(1) << 8) & 0x07FF,
        (b(1) >> 3 | b(2) << 5) & 0x07FF,
        (b(2) >> 6 | b(3) << 2 | b(4) << 10) & 0x07FF,
        (b(4) >> 1 | b(5) << 7) & 0x07FF,
        (b(5) >> 4 | b(6) << 4) & 0x07FF,
        (b(6) >> 7 | b(7) << 1 | b(8) << 9) & 0x07FF,
        (b(8) >> 2 | b(9) << 6) & 0x07FF,
        (b(9) >> 5 | b(10) << 3) & 0x07FF,
        (b(11) | b(12) << 8) & 0x07FF,
        (b(12) >> 3 | b(13) << 5) & 0x07FF,
        (b(13) >> 6 | b(14) << 2 | b(15) << 10) & 0x07FF,
        (b(15) >> 1 | b(16) << 7) & 0x07FF,
        (b(16) >> 4 | b(17) << 4) & 0x07FF,
        (b(17) >> 7 | b(18) << 1 | b(19) << 9) & 0x07FF,
        (b(19) >> 2 | b(20) << 6) & 0x07FF,
        (b(20) >> 5 | b(21) << 3) & 0x07FF,
    ]
}
