//! Registro estático de sensores e suas medições.
//!
//! Montado uma vez antes do Listener iniciar e somente leitura depois
//! disso. Só o conteúdo dos buffers muda em tempo de execução.

use crate::measurement::{Measurement, SensorIdentity};
use crate::types::{Datapoint, SensorId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maior id que cabe nos dois dígitos do frame.
pub const MAX_SENSOR_ID: SensorId = 99;

/// Erros de montagem do registro.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Sensor {0} definido mais de uma vez")]
    DuplicateSensor(SensorId),

    #[error("Sensor {sensor_id}: prefixo {prefix:?} repetido")]
    DuplicatePrefix { sensor_id: SensorId, prefix: String },

    #[error("Prefixo inválido {0:?} (esperado 4 letras maiúsculas)")]
    InvalidPrefix(String),

    #[error("Id de sensor inválido: {0} (0–{MAX_SENSOR_ID})")]
    InvalidSensorId(SensorId),

    #[error("Medição {0:?} já pertence a outro sensor")]
    AlreadyAttached(String),

    #[error("Medição {0:?} não tem sensor dono")]
    Detached(String),
}

/// Verifica se o prefixo tem o formato aceito pelo decoder de frames.
pub fn is_valid_prefix(prefix: &str) -> bool {
    prefix.len() == 4 && prefix.bytes().all(|b| b.is_ascii_uppercase())
}

// ──────────────────────────────────────────────
// Sensor
// ──────────────────────────────────────────────

/// Um sensor remoto capaz de várias medições (ex: temperatura e bateria).
#[derive(Debug)]
pub struct Sensor {
    identity: Arc<SensorIdentity>,
    measurements: BTreeMap<String, Measurement>,
}

impl Sensor {
    /// Cria o sensor e liga cada medição a ele.
    pub fn new(
        sensor_id: SensorId,
        sensor_type: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
        measurements: Vec<Measurement>,
    ) -> Result<Self, RegistryError> {
        if sensor_id > MAX_SENSOR_ID {
            return Err(RegistryError::InvalidSensorId(sensor_id));
        }

        let identity = Arc::new(SensorIdentity {
            sensor_id,
            sensor_type: sensor_type.into(),
            name: name.into(),
            location: location.into(),
        });

        let mut by_prefix = BTreeMap::new();
        for measurement in measurements {
            let prefix = measurement.prefix().to_string();
            if !is_valid_prefix(&prefix) {
                return Err(RegistryError::InvalidPrefix(prefix));
            }
            if by_prefix.contains_key(&prefix) {
                return Err(RegistryError::DuplicatePrefix { sensor_id, prefix });
            }
            measurement.attach(Arc::clone(&identity))?;
            by_prefix.insert(prefix, measurement);
        }

        Ok(Self {
            identity,
            measurements: by_prefix,
        })
    }

    pub fn id(&self) -> SensorId {
        self.identity.sensor_id
    }

    pub fn sensor_type(&self) -> &str {
        &self.identity.sensor_type
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn location(&self) -> &str {
        &self.identity.location
    }

    pub fn measurement(&self, prefix: &str) -> Option<&Measurement> {
        self.measurements.get(prefix)
    }

    pub fn measurements(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements.values()
    }

    /// Grava uma leitura bruta na medição de `prefix`.
    ///
    /// `None` se o sensor não tem essa medição.
    pub fn record(&self, prefix: &str, raw: f64) -> Option<Datapoint> {
        let measurement = self.measurements.get(prefix)?;
        Some(measurement.record_for(&self.identity, raw))
    }
}

impl std::fmt::Display for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefixes: Vec<&str> = self.measurements.keys().map(String::as_str).collect();
        write!(
            f,
            "<Sensor {:?} ID {} [{}]>",
            self.identity.name,
            self.identity.sensor_id,
            prefixes.join(", ")
        )
    }
}

// ──────────────────────────────────────────────
// Registry
// ──────────────────────────────────────────────

/// Mapa id → sensor.
#[derive(Debug, Default)]
pub struct Registry {
    sensors: BTreeMap<SensorId, Sensor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monta o registro a partir de uma lista de sensores.
    pub fn from_sensors(sensors: impl IntoIterator<Item = Sensor>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for sensor in sensors {
            registry.insert(sensor)?;
        }
        Ok(registry)
    }

    pub fn insert(&mut self, sensor: Sensor) -> Result<(), RegistryError> {
        let id = sensor.id();
        if self.sensors.contains_key(&id) {
            return Err(RegistryError::DuplicateSensor(id));
        }
        self.sensors.insert(id, sensor);
        Ok(())
    }

    pub fn sensor(&self, id: SensorId) -> Option<&Sensor> {
        self.sensors.get(&id)
    }

    /// Sensores em ordem de id.
    pub fn sensors(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.values()
    }

    /// Todas as medições, ordenadas por sensor e prefixo.
    pub fn measurements(&self) -> impl Iterator<Item = &Measurement> {
        self.sensors.values().flat_map(Sensor::measurements)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Total de datapoints aguardando coleta.
    pub fn pending(&self) -> usize {
        self.measurements().map(|m| m.buffer().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thermometer(id: SensorId) -> Sensor {
        Sensor::new(
            id,
            "rf22",
            "inside_thermometer",
            "inside",
            vec![
                Measurement::new("temperature", "TMPA", Some(18.3), Some("deg_c".into()), None),
                Measurement::new("battery", "BATT", None, Some("volts".into()), None),
            ],
        )
        .unwrap()
    }

    #[test]
    fn sensor_attaches_every_measurement() {
        let sensor = thermometer(21);
        for m in sensor.measurements() {
            assert_eq!(m.sensor().map(|s| s.sensor_id), Some(21));
        }
        assert_eq!(sensor.measurement("TMPA").unwrap().name(), "temperature");
        assert!(sensor.measurement("HUMI").is_none());
    }

    #[test]
    fn record_routes_by_prefix() {
        let sensor = thermometer(21);
        let dp = sensor.record("TMPA", -1.35).unwrap();
        assert_eq!(dp.value, 16.95);
        assert_eq!(dp.dimensions["sensor_id"], "21");
        assert_eq!(dp.dimensions["device"], "inside_thermometer");
        assert_eq!(sensor.measurement("TMPA").unwrap().buffer().pop(), Some(dp));

        assert!(sensor.record("HUMI", 40.5).is_none());
        assert!(sensor.measurements().all(|m| m.buffer().is_empty()));
    }

    #[test]
    fn duplicate_prefix_rejected() {
        let err = Sensor::new(
            21,
            "rf22",
            "x",
            "y",
            vec![
                Measurement::new("a", "TMPA", None, None, None),
                Measurement::new("b", "TMPA", None, None, None),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicatePrefix {
                sensor_id: 21,
                prefix: "TMPA".into()
            }
        );
    }

    #[test]
    fn invalid_prefix_and_id_rejected() {
        let bad_prefix = Sensor::new(1, "t", "n", "l", vec![Measurement::new("a", "tmp", None, None, None)]);
        assert!(matches!(bad_prefix, Err(RegistryError::InvalidPrefix(_))));

        let bad_id = Sensor::new(100, "t", "n", "l", Vec::new());
        assert!(matches!(bad_id, Err(RegistryError::InvalidSensorId(100))));
    }

    #[test]
    fn registry_rejects_duplicate_ids() {
        let mut registry = Registry::new();
        registry.insert(thermometer(21)).unwrap();
        assert_eq!(
            registry.insert(thermometer(21)),
            Err(RegistryError::DuplicateSensor(21))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_orders_sensors_by_id() {
        let registry = Registry::from_sensors([thermometer(22), thermometer(21)]).unwrap();
        let ids: Vec<SensorId> = registry.sensors().map(Sensor::id).collect();
        assert_eq!(ids, vec![21, 22]);
        assert_eq!(registry.measurements().count(), 4);
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn display_lists_prefixes() {
        assert_eq!(
            thermometer(21).to_string(),
            "<Sensor \"inside_thermometer\" ID 21 [BATT, TMPA]>"
        );
    }
}
