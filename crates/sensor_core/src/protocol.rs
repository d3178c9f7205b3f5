//! Empacotamento de datapoints para o sink UDP.
//!
//! Cada pacote leva um [`Datapoint`] em bincode depois de dois bytes de
//! cabeçalho: `[0x52 'R'][versão][payload...]`. O receptor descarta
//! pacotes com outro magic ou outra versão.

use crate::types::Datapoint;

pub const MAGIC_BYTE: u8 = 0x52;

pub const PROTOCOL_VERSION: u8 = 1;

/// Bytes antes do payload.
pub const HEADER_SIZE: usize = 2;

/// Maior payload que cabe num datagrama UDP/IPv4.
pub const MAX_UDP_PAYLOAD: usize = 65507;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Falha ao serializar datapoint: {0}")]
    Serialize(#[from] bincode::Error),

    #[error("Datapoint não cabe num datagrama: {0} bytes (máximo {MAX_UDP_PAYLOAD})")]
    TooLarge(usize),
}

/// Monta o pacote de um datapoint.
pub fn encode_datapoint(datapoint: &Datapoint) -> Result<Vec<u8>, ProtocolError> {
    let size = HEADER_SIZE + bincode::serialized_size(datapoint)? as usize;
    if size > MAX_UDP_PAYLOAD {
        return Err(ProtocolError::TooLarge(size));
    }

    let mut packet = Vec::with_capacity(size);
    packet.extend_from_slice(&[MAGIC_BYTE, PROTOCOL_VERSION]);
    bincode::serialize_into(&mut packet, datapoint)?;
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Dimensions, MetricKind};
    use std::time::{Duration, SystemTime};

    fn outside_temperature() -> Datapoint {
        let mut dimensions = Dimensions::new();
        dimensions.insert("device".into(), "outside_thermometer".into());
        dimensions.insert("location".into(), "outside".into());
        dimensions.insert("prefix".into(), "TMPA".into());
        dimensions.insert("sensor_id".into(), "22".into());
        Datapoint {
            metric: "temperature.deg_c".into(),
            value: 0.95,
            timestamp: SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_123),
            dimensions,
            kind: MetricKind::CumulativeCounter,
        }
    }

    #[test]
    fn packet_starts_with_header() {
        let packet = encode_datapoint(&outside_temperature()).unwrap();
        assert_eq!(&packet[..HEADER_SIZE], &[MAGIC_BYTE, PROTOCOL_VERSION]);
    }

    #[test]
    fn payload_is_plain_bincode() {
        let datapoint = outside_temperature();
        let packet = encode_datapoint(&datapoint).unwrap();
        let decoded: Datapoint = bincode::deserialize(&packet[HEADER_SIZE..]).unwrap();
        assert_eq!(decoded, datapoint);
    }

    #[test]
    fn packet_is_compact() {
        let packet = encode_datapoint(&outside_temperature()).unwrap();
        assert!(packet.len() < 256, "pacote com {} bytes", packet.len());
    }

    #[test]
    fn oversized_datapoint_rejected() {
        let mut datapoint = outside_temperature();
        datapoint.metric = "x".repeat(MAX_UDP_PAYLOAD);
        assert!(matches!(
            encode_datapoint(&datapoint),
            Err(ProtocolError::TooLarge(n)) if n > MAX_UDP_PAYLOAD
        ));
    }
}
