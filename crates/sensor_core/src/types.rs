//! Tipos de dados de telemetria dos sensores RF.
//!
//! Um [`Datapoint`] é uma leitura já decodificada, calibrada e carimbada
//! com o horário da decodificação. É imutável: o Listener cria, o
//! Collector consome.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Identificador numérico de um sensor (duas casas decimais no frame).
pub type SensorId = u32;

/// Dimensões de um datapoint (chave → valor), ordenadas por chave.
pub type Dimensions = BTreeMap<String, String>;

// ──────────────────────────────────────────────
// Tipo de métrica
// ──────────────────────────────────────────────

/// Tipo de métrica entregue ao backend de monitoramento.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    #[default]
    Gauge,
    Counter,
    CumulativeCounter,
}

impl MetricKind {
    /// Nome usado pelo backend (`gauge`, `counter`, `cumulative_counter`).
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
            MetricKind::CumulativeCounter => "cumulative_counter",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Datapoint
// ──────────────────────────────────────────────

/// Leitura decodificada pronta para o sink de métricas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    /// `"<measurement>.<unit>"` ou só o nome quando não há unidade
    pub metric: String,
    /// Valor bruto + calibração, arredondado a 3 casas
    pub value: f64,
    /// Momento da decodificação (não da coleta)
    pub timestamp: SystemTime,
    /// device, location, prefix, sensor_id
    pub dimensions: Dimensions,
    pub kind: MetricKind,
}

/// Deriva o nome da métrica a partir do nome e unidade da medição.
pub fn metric_name(name: &str, units: Option<&str>) -> String {
    match units {
        Some(units) if !units.is_empty() => format!("{name}.{units}"),
        _ => name.to_string(),
    }
}

/// Aplica a calibração aditiva e arredonda para 3 casas decimais.
pub fn calibrate(raw: f64, calibration: f64) -> f64 {
    ((raw + calibration) * 1000.0).round() / 1000.0
}

/// Formata dimensões como `[a=foo,b=bar]` (plugin instance estilo SignalFx).
pub fn format_dimensions(dimensions: &Dimensions) -> String {
    let pairs: Vec<String> = dimensions
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    format!("[{}]", pairs.join(","))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
