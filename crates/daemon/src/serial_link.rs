//! Conexão com a base station via porta serial (8N1).

use sensor_core::config::SerialConfig;
use sensor_core::transport::Transport;
use serialport::{DataBits, Parity, SerialPort, StopBits};
use std::io::{self, Read};
use std::time::Duration;

/// Porta serial aberta, usada pelo listener como [`Transport`].
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Abre a porta com o baud rate e timeout de leitura configurados.
    pub fn open(config: &SerialConfig) -> serialport::Result<Self> {
        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()?;
        Ok(Self { port })
    }

    pub fn name(&self) -> String {
        self.port.name().unwrap_or_else(|| "?".into())
    }
}

impl Transport for SerialLink {
    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.port.read_exact(buf)
    }
}
