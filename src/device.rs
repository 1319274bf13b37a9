use std::io::Write;
use std::time::Duration;

use serialport::SerialPort;
use thiserror::Error;

use crate::config::DeviceConfig;
use crate::transport::FrameSink;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        source: serialport::Error,
    },

    #[error("failed to configure serial port {port}: {source}")]
    Configure {
        port: String,
        source: serialport::Error,
    },
}

/// The matrix controller on the other end of a serial line.
pub struct SerialDevice {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialDevice {
    pub fn open(config: &DeviceConfig) -> Result<Self, DeviceError> {
        let name = config.port.clone();
        let mut port = serialport::new(&config.port, config.baud_rate)
            .timeout(Duration::from_millis(config.timeout_ms))
            .open()
            .map_err(|source| DeviceError::Open {
                port: name.clone(),
                source,
            })?;
        port.write_data_terminal_ready(true)
            .map_err(|source| DeviceError::Configure {
                port: name.clone(),
                source,
            })?;
        tracing::info!(port = %name, baud_rate = config.baud_rate, "Connected");
        Ok(Self { port, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FrameSink for SerialDevice {
    fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.port.write_all(frame)?;
        self.port.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_port_fails_to_open() {
        let config = DeviceConfig {
            port: "/dev/mosaic-does-not-exist".to_string(),
            ..Default::default()
        };
        let err = SerialDevice::open(&config).err().unwrap();
        assert!(matches!(err, DeviceError::Open { .. }));
        assert!(err.to_string().contains("/dev/mosaic-does-not-exist"));
    }
}
