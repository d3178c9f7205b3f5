//! Decodificação dos frames ASCII da base station.
//!
//! Formato no fio:
//!
//! ```text
//! ┌──────────┬──────────────────────────────────────┐
//! │ 'a' (1)  │ Corpo (11): DD PPPP V, '-' de padding │
//! └──────────┴──────────────────────────────────────┘
//! ```
//!
//! - `DD`: id do sensor, 2 dígitos
//! - `PPPP`: prefixo da medição, 4 letras maiúsculas
//! - `V`: número decimal com sinal opcional (`3.04`, `-1.35`, `.5`)
//!
//! Exemplos: `a21BATT3.04-`, `a21TMPA-1.35`, `a21AWAKE----`.
//! Frames de status (`AWAKE`, `SLEEPING`) não têm valor e são rejeitados.

use crate::types::SensorId;

/// Caractere que marca o início de um frame.
pub const FRAME_START: u8 = b'a';

/// Tamanho do corpo após o caractere de início.
pub const FRAME_BODY_LEN: usize = 11;

/// Caractere de preenchimento à direita.
pub const PADDING: char = '-';

const ID_DIGITS: usize = 2;
const PREFIX_LEN: usize = 4;

/// Erro de decodificação de frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Frame não reconhecido: {0:?}")]
    Unparsable(String),
}

/// Leitura extraída de um frame válido.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReading {
    pub sensor_id: SensorId,
    pub prefix: String,
    pub value: f64,
}

/// Decodifica o corpo de um frame (sem o `a` inicial).
///
/// Independe do prefixo: qualquer corpo cujo restante seja um decimal
/// válido é uma leitura, inclusive `BATT`.
pub fn decode_frame(body: &str) -> Result<FrameReading, DecodeError> {
    let unparsable = || DecodeError::Unparsable(body.to_string());

    let stripped = body.trim_end_matches(PADDING);
    let bytes = stripped.as_bytes();
    if bytes.len() <= ID_DIGITS + PREFIX_LEN {
        return Err(unparsable());
    }

    let (id_part, rest) = bytes.split_at(ID_DIGITS);
    let (prefix_part, value_part) = rest.split_at(PREFIX_LEN);

    if !id_part.iter().all(u8::is_ascii_digit) {
        return Err(unparsable());
    }
    if !prefix_part.iter().all(u8::is_ascii_uppercase) {
        return Err(unparsable());
    }
    if !is_decimal(value_part) {
        return Err(unparsable());
    }

    // Todos os trechos são ASCII, conversões não falham.
    let sensor_id = std::str::from_utf8(id_part)
        .ok()
        .and_then(|s| s.parse::<SensorId>().ok())
        .ok_or_else(unparsable)?;
    let prefix = String::from_utf8_lossy(prefix_part).into_owned();
    let value = std::str::from_utf8(value_part)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or_else(unparsable)?;

    Ok(FrameReading {
        sensor_id,
        prefix,
        value,
    })
}

/// Decodifica um corpo lido da serial; bytes não UTF-8 são rejeitados.
pub fn decode_frame_bytes(body: &[u8]) -> Result<FrameReading, DecodeError> {
    match std::str::from_utf8(body) {
        Ok(text) => decode_frame(text),
        Err(_) => Err(DecodeError::Unparsable(
            String::from_utf8_lossy(body).into_owned(),
        )),
    }
}

/// `[+-]? digit* ('.')? digit+`, sem mais nada.
fn is_decimal(s: &[u8]) -> bool {
    let unsigned = match s.first() {
        Some(b'+' | b'-') => &s[1..],
        _ => s,
    };
    let (int_part, frac_part) = match unsigned.iter().position(|&b| b == b'.') {
        Some(dot) => (&unsigned[..dot], &unsigned[dot + 1..]),
        None => (&[][..], unsigned),
    };
    !frac_part.is_empty()
        && int_part.iter().all(u8::is_ascii_digit)
        && frac_part.iter().all(u8::is_ascii_digit)
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
