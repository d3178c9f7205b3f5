//! Coleta periódica: drena cada buffer e entrega ao sink de métricas.

use crate::registry::Registry;
use crate::types::{Datapoint, format_dimensions};
use std::time::UNIX_EPOCH;
use tracing::info;

/// Nome do plugin informado ao backend.
pub const PLUGIN_NAME: &str = "privateeyepi";

/// Destino dos datapoints drenados. Responsável pela entrega ao backend.
pub trait MetricsSink {
    fn publish(&mut self, datapoint: Datapoint);

    /// Chamado uma vez ao fim de cada coleta.
    fn flush(&mut self) {}
}

impl MetricsSink for Vec<Datapoint> {
    fn publish(&mut self, datapoint: Datapoint) {
        self.push(datapoint);
    }
}

impl<S: MetricsSink + ?Sized> MetricsSink for &mut S {
    fn publish(&mut self, datapoint: Datapoint) {
        (**self).publish(datapoint);
    }

    fn flush(&mut self) {
        (**self).flush();
    }
}

/// Drena todos os buffers do registro, em ordem FIFO por medição.
///
/// Não bloqueia: buffers vazios são pulados. Retorna quantos datapoints
/// foram entregues.
pub fn collect(registry: &Registry, sink: &mut dyn MetricsSink) -> usize {
    let mut delivered = 0;
    for measurement in registry.measurements() {
        for datapoint in measurement.buffer().drain() {
            sink.publish(datapoint);
            delivered += 1;
        }
    }
    sink.flush();
    delivered
}

// ──────────────────────────────────────────────
// Sink de log
// ──────────────────────────────────────────────

/// Registra cada datapoint no log no formato do plugin.
#[derive(Debug, Clone)]
pub struct LogSink {
    plugin: String,
    published: u64,
}

impl LogSink {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            published: 0,
        }
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    /// Linha de log de um datapoint.
    pub fn format(&self, datapoint: &Datapoint) -> String {
        let time = datapoint
            .timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        format!(
            "plugin={} plugin_instance={} time={:.3} type={} type_instance={} values=({},)",
            self.plugin,
            format_dimensions(&datapoint.dimensions),
            time,
            datapoint.kind,
            datapoint.metric,
            datapoint.value
        )
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(PLUGIN_NAME)
    }
}

impl MetricsSink for LogSink {
    fn publish(&mut self, datapoint: Datapoint) {
        info!("{}", self.format(&datapoint));
        self.published += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::Measurement;
    use crate::registry::Sensor;
    use crate::types::{Dimensions, MetricKind};
    use std::time::{Duration, SystemTime};

    fn registry() -> Registry {
        let inside = Sensor::new(
            21,
            "rf22",
            "inside_thermometer",
            "inside",
            vec![
                Measurement::new("temperature", "TMPA", Some(18.3), Some("deg_c".into()), None),
                Measurement::new("battery", "BATT", None, Some("volts".into()), None),
            ],
        )
        .unwrap();
        let outside = Sensor::new(
            22,
            "rf22",
            "outside_thermometer",
            "outside",
            vec![Measurement::new("temperature", "TMPA", Some(2.3), Some("deg_c".into()), None)],
        )
        .unwrap();
        Registry::from_sensors([inside, outside]).unwrap()
    }

    fn record(registry: &Registry, id: u32, prefix: &str, raw: f64) {
        registry
            .sensor(id)
            .and_then(|s| s.measurement(prefix))
            .unwrap()
            .record_value(raw)
            .unwrap();
    }

    #[test]
    fn drains_everything_in_fifo_order() {
        let registry = registry();
        record(&registry, 21, "TMPA", 1.0);
        record(&registry, 22, "TMPA", -1.35);
        record(&registry, 21, "TMPA", 2.0);
        record(&registry, 21, "BATT", 3.04);

        let mut sink: Vec<Datapoint> = Vec::new();
        assert_eq!(collect(&registry, &mut sink), 4);
        let values: Vec<(String, f64)> = sink
            .iter()
            .map(|d| (d.dimensions["sensor_id"].clone(), d.value))
            .collect();
        // Sensor 21: BATT, depois TMPA na ordem de chegada; depois sensor 22.
        assert_eq!(
            values,
            vec![
                ("21".to_string(), 3.04),
                ("21".to_string(), 19.3),
                ("21".to_string(), 20.3),
                ("22".to_string(), 0.95),
            ]
        );
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn second_collect_delivers_nothing() {
        let registry = registry();
        record(&registry, 21, "BATT", 3.04);
        let mut sink: Vec<Datapoint> = Vec::new();
        assert_eq!(collect(&registry, &mut sink), 1);
        assert_eq!(collect(&registry, &mut sink), 0);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn flush_runs_once_per_pass() {
        struct Counting {
            published: usize,
            flushes: usize,
        }
        impl MetricsSink for Counting {
            fn publish(&mut self, _datapoint: Datapoint) {
                self.published += 1;
            }
            fn flush(&mut self) {
                self.flushes += 1;
            }
        }

        let registry = registry();
        record(&registry, 22, "TMPA", 0.5);
        let mut sink = Counting {
            published: 0,
            flushes: 0,
        };
        collect(&registry, &mut sink);
        collect(&registry, &mut sink);
        assert_eq!(sink.published, 1);
        assert_eq!(sink.flushes, 2);
    }

    #[test]
    fn log_sink_formats_plugin_line() {
        let mut dims = Dimensions::new();
        dims.insert("device".into(), "inside_thermometer".into());
        dims.insert("sensor_id".into(), "21".into());
        let datapoint = Datapoint {
            metric: "battery.volts".into(),
            value: 3.04,
            timestamp: SystemTime::UNIX_EPOCH + Duration::from_millis(1_500),
            dimensions: dims,
            kind: MetricKind::Gauge,
        };
        let mut sink = LogSink::default();
        assert_eq!(
            sink.format(&datapoint),
            "plugin=privateeyepi plugin_instance=[device=inside_thermometer,sensor_id=21] \
             time=1.500 type=gauge type_instance=battery.volts values=(3.04,)"
        );
        sink.publish(datapoint);
        assert_eq!(sink.published(), 1);
    }
}
