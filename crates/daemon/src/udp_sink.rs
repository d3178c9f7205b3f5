//! Sink que envia cada datapoint ao backend via UDP.

use sensor_core::collector::MetricsSink;
use sensor_core::protocol::encode_datapoint;
use sensor_core::types::Datapoint;
use std::io;
use std::net::UdpSocket;
use tracing::{debug, error, warn};

pub struct UdpSink {
    sock: UdpSocket,
    dest: String,
    sent: u64,
    failed: u64,
}

impl UdpSink {
    /// Cria um socket local efêmero apontando para `dest`.
    pub fn bind(dest: &str) -> io::Result<Self> {
        let sock = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            sock,
            dest: dest.to_string(),
            sent: 0,
            failed: 0,
        })
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    fn send(&self, datapoint: &Datapoint) -> Result<usize, String> {
        let frame = encode_datapoint(datapoint).map_err(|e| e.to_string())?;
        self.sock
            .send_to(&frame, &self.dest)
            .map_err(|e| format!("Erro ao enviar UDP para {}: {e}", self.dest))
    }
}

impl MetricsSink for UdpSink {
    fn publish(&mut self, datapoint: Datapoint) {
        match self.send(&datapoint) {
            Ok(bytes) => {
                debug!(
                    "→ {bytes} bytes para {} | {} = {}",
                    self.dest, datapoint.metric, datapoint.value
                );
                self.sent += 1;
            }
            Err(e) => {
                error!("{e}");
                self.failed += 1;
            }
        }
    }

    fn flush(&mut self) {
        if self.failed > 0 {
            warn!("{} datapoints não puderam ser enviados nesta coleta", self.failed);
            self.failed = 0;
        }
    }
}
