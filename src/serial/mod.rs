//! # Serial Communication Module
//!
//! Handles serial communication with the CRSF receiver.
//!
//! This module handles:
//! - Opening serial port at 420,000 baud
//! - Pumping received bytes into the control loop's byte source
//! - Transmitting CRSF telemetry frames back to the receiver
//! - Device auto-detection across common USB paths
//!
//! The control loop itself is synchronous; [`CrsfSerial::split`] bridges
//! the async port into a non-blocking [`ByteSource`] via an unbounded
//! channel drained with `try_recv`.

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::error::{BotctlError, Result};
use crate::runtime::ByteSource;

/// CRSF baud rate (420,000 baud)
pub const CRSF_BAUD_RATE: u32 = 420_000;

/// Default receiver device paths to try (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0", // USB CDC devices (most common for CRSF receivers)
    "/dev/ttyUSB0", // USB-to-serial adapters
];

/// CRSF Serial Port Handler
///
/// Manages the connection to the receiver via USB serial.
pub struct CrsfSerial {
    /// Serial port handle
    port: tokio_serial::SerialStream,
    /// Device path (e.g., /dev/ttyACM0)
    device_path: String,
}

impl std::fmt::Debug for CrsfSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrsfSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl CrsfSerial {
    /// Open connection to the receiver
    ///
    /// Auto-detects the device by trying common paths.
    ///
    /// # Returns
    ///
    /// * `Result<CrsfSerial>` - Connected serial port or error
    ///
    /// # Errors
    ///
    /// Returns error if no receiver found or connection fails
    pub fn open(baud_rate: u32) -> Result<Self> {
        Self::open_with_paths(DEFAULT_DEVICE_PATHS, baud_rate)
    }

    /// Open connection to the receiver with custom device paths
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyACM0"])
    /// * `baud_rate` - Serial baud rate, normally [`CRSF_BAUD_RATE`]
    ///
    /// # Returns
    ///
    /// * `Result<CrsfSerial>` - Connected serial port or error
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Successfully opened CRSF receiver at {}", path);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(BotctlError::SerialPortNotFound(
            paths.join(", ")
        ))
    }

    /// Open a specific serial port with CRSF settings (8N1, no flow control)
    ///
    /// # Arguments
    ///
    /// * `path` - Device path (e.g., "/dev/ttyACM0")
    ///
    /// # Returns
    ///
    /// * `Result<SerialStream>` - Opened serial port
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| BotctlError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Split the port into a telemetry writer and a byte source.
    ///
    /// Spawns a reader task that pumps received chunks into an unbounded
    /// channel; the returned [`ChannelByteSource`] drains that channel
    /// without ever blocking the control loop. Must be called from within
    /// a tokio runtime.
    pub fn split(self) -> (CrsfWriter, ChannelByteSource) {
        use tokio::io::AsyncReadExt;

        let (read_half, write_half) = tokio::io::split(self.port);
        let (tx, rx) = mpsc::unbounded_channel();
        let device_path = self.device_path;

        tokio::spawn(async move {
            let mut read_half = read_half;
            let mut buf = [0u8; 256];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) => {
                        warn!("Serial port closed (EOF from receiver)");
                        break;
                    }
                    Ok(n) => {
                        if tx.send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                            // Control loop dropped its end, stop pumping
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Serial read failed: {}", e);
                        break;
                    }
                }
            }
        });

        (
            CrsfWriter {
                writer: write_half,
                device_path,
            },
            ChannelByteSource {
                rx,
                pending: BytesMut::new(),
            },
        )
    }
}

/// Write half of the serial port, used for outbound telemetry frames.
pub struct CrsfWriter {
    writer: tokio::io::WriteHalf<tokio_serial::SerialStream>,
    device_path: String,
}

impl std::fmt::Debug for CrsfWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrsfWriter")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl CrsfWriter {
    /// Send a complete CRSF frame to the receiver
    ///
    /// # Arguments
    ///
    /// * `frame` - Complete CRSF frame (including address, length, type, payload, CRC)
    ///
    /// # Returns
    ///
    /// * `Result<()>` - Success or error
    pub async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        self.writer.write_all(frame).await
            .map_err(|e| BotctlError::Serial(format!("Failed to write frame: {}", e)))?;

        self.writer.flush().await
            .map_err(|e| BotctlError::Serial(format!("Failed to flush serial port: {}", e)))?;

        debug!("Sent CRSF frame ({} bytes)", frame.len());
        Ok(())
    }
}

/// Non-blocking byte source fed by the serial reader task.
#[derive(Debug)]
pub struct ChannelByteSource {
    rx: mpsc::UnboundedReceiver<Bytes>,
    pending: BytesMut,
}

impl ByteSource for ChannelByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;

        loop {
            // Drain what is already buffered first
            if !self.pending.is_empty() {
                let n = self.pending.len().min(buf.len() - written);
                buf[written..written + n].copy_from_slice(&self.pending[..n]);
                self.pending.advance(n);
                written += n;
            }

            if written == buf.len() {
                return Ok(written);
            }

            match self.rx.try_recv() {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(mpsc::error::TryRecvError::Empty) => return Ok(written),
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if written > 0 {
                        return Ok(written);
                    }
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "serial reader task stopped",
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_source() -> (mpsc::UnboundedSender<Bytes>, ChannelByteSource) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            ChannelByteSource {
                rx,
                pending: BytesMut::new(),
            },
        )
    }

    #[test]
    fn test_constants() {
        assert_eq!(CRSF_BAUD_RATE, 420_000);
        assert_eq!(DEFAULT_DEVICE_PATHS.len(), 2);
        assert_eq!(DEFAULT_DEVICE_PATHS[0], "/dev/ttyACM0");
        assert_eq!(DEFAULT_DEVICE_PATHS[1], "/dev/ttyUSB0");
    }

    #[test]
    fn test_open_with_invalid_paths_returns_error() {
        let invalid_paths = &["/dev/nonexistent0", "/dev/nonexistent1"];
        let result = CrsfSerial::open_with_paths(invalid_paths, CRSF_BAUD_RATE);

        assert!(result.is_err());
        match result.unwrap_err() {
            BotctlError::SerialPortNotFound(msg) => {
                assert!(msg.contains("/dev/nonexistent0"));
                assert!(msg.contains("/dev/nonexistent1"));
            }
            other => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_with_empty_paths_returns_error() {
        let empty_paths: &[&str] = &[];
        let result = CrsfSerial::open_with_paths(empty_paths, CRSF_BAUD_RATE);

        assert!(result.is_err());
        match result.unwrap_err() {
            BotctlError::SerialPortNotFound(_) => {}
            other => panic!("Expected SerialPortNotFound, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_port_with_invalid_path_returns_error() {
        let result = CrsfSerial::open_port("/dev/nonexistent_serial_device_12345", CRSF_BAUD_RATE);

        assert!(result.is_err());
        match result.unwrap_err() {
            BotctlError::Serial(msg) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    #[test]
    fn test_byte_source_empty_returns_zero() {
        let (_tx, mut source) = channel_source();
        let mut buf = [0u8; 16];
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_byte_source_delivers_chunks_in_order() {
        let (tx, mut source) = channel_source();
        tx.send(Bytes::from_static(&[1, 2, 3])).unwrap();
        tx.send(Bytes::from_static(&[4, 5])).unwrap();

        let mut buf = [0u8; 16];
        let n = source.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3, 4, 5]);

        // Channel drained, next read is empty
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_byte_source_splits_across_small_reads() {
        let (tx, mut source) = channel_source();
        tx.send(Bytes::from_static(&[10, 20, 30, 40, 50])).unwrap();

        let mut buf = [0u8; 2];
        assert_eq!(source.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [10, 20]);
        assert_eq!(source.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [30, 40]);
        assert_eq!(source.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 50);
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_byte_source_disconnect_after_drain_is_error() {
        let (tx, mut source) = channel_source();
        tx.send(Bytes::from_static(&[7])).unwrap();
        drop(tx);

        let mut buf = [0u8; 16];
        // Buffered data is still delivered
        assert_eq!(source.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 7);

        // After the channel is gone an empty read reports the broken pipe
        let err = source.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    // Integration test - only runs if receiver hardware is connected
    // Skipped in CI/CD environments
    #[test]
    #[ignore] // Run with: cargo test -- --ignored
    fn test_open_with_real_hardware() {
        let result = CrsfSerial::open(CRSF_BAUD_RATE);

        if result.is_ok() {
            let serial = result.unwrap();
            println!("Successfully opened CRSF receiver at: {}", serial.device_path());

            let path = serial.device_path();
            assert!(
                path == "/dev/ttyACM0" || path == "/dev/ttyUSB0",
                "Unexpected device path: {}",
                path
            );
        } else {
            println!("No receiver hardware detected (this is OK for CI/CD)");
        }
    }

    // Integration test - only runs if receiver hardware is connected
    #[tokio::test]
    #[ignore] // Run with: cargo test -- --ignored
    async fn test_send_frame_with_real_hardware() {
        let result = CrsfSerial::open(CRSF_BAUD_RATE);

        if let Ok(serial) = result {
            let (mut writer, _source) = serial.split();
            let frame = crate::crsf::encoder::encode_battery_telemetry(120, 0, 50);

            let send_result = writer.send_frame(&frame).await;
            assert!(send_result.is_ok(), "Failed to send frame: {:?}", send_result);

            println!("Successfully sent telemetry frame to receiver");
        } else {
            println!("No receiver hardware detected (skipping send test)");
        }
    }
}
