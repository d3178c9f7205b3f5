//! Medições de um sensor e o buffer FIFO de datapoints pendentes.
//!
//! Cada [`Measurement`] tem seu próprio [`Buffer`]: o Listener empilha,
//! o Collector drena. O buffer é um channel sem limite, então append e
//! drain concorrentes nunca perdem nem duplicam itens.

use crate::registry::RegistryError;
use crate::types::{Datapoint, Dimensions, MetricKind, calibrate, metric_name};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;
use tracing::debug;

// ──────────────────────────────────────────────
// Buffer
// ──────────────────────────────────────────────

/// Fila FIFO sem limite de datapoints pendentes de uma medição.
#[derive(Debug)]
pub struct Buffer {
    tx: Sender<Datapoint>,
    rx: Receiver<Datapoint>,
}

impl Default for Buffer {
    fn default() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adiciona um datapoint no fim da fila.
    pub fn append(&self, datapoint: Datapoint) {
        // Ambas as pontas vivem em `self`, o channel nunca está desconectado.
        let _ = self.tx.send(datapoint);
    }

    /// Remove o datapoint mais antigo, sem bloquear.
    pub fn pop(&self) -> Option<Datapoint> {
        self.rx.try_recv().ok()
    }

    /// Remove tudo que está na fila agora, em ordem de chegada.
    ///
    /// Itens adicionados durante o drain podem ou não entrar nesta
    /// chamada; os que ficarem de fora saem no próximo drain.
    pub fn drain(&self) -> impl Iterator<Item = Datapoint> + '_ {
        self.rx.try_iter()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

// ──────────────────────────────────────────────
// Identidade do sensor (back-reference)
// ──────────────────────────────────────────────

/// Campos do sensor que entram nas dimensões de cada datapoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorIdentity {
    pub sensor_id: crate::types::SensorId,
    pub sensor_type: String,
    pub name: String,
    pub location: String,
}

// ──────────────────────────────────────────────
// Measurement
// ──────────────────────────────────────────────

/// Um tipo de leitura que um sensor produz (ex: temperatura).
#[derive(Debug)]
pub struct Measurement {
    name: String,
    prefix: String,
    calibration: f64,
    units: Option<String>,
    kind: MetricKind,
    metric: String,
    /// Definido uma única vez pelo [`crate::registry::Sensor`] dono
    sensor: OnceLock<Arc<SensorIdentity>>,
    buffer: Buffer,
}

impl Measurement {
    pub fn new(
        name: impl Into<String>,
        prefix: impl Into<String>,
        calibration: Option<f64>,
        units: Option<String>,
        kind: Option<MetricKind>,
    ) -> Self {
        let name = name.into();
        let units = units.filter(|u| !u.is_empty());
        let metric = metric_name(&name, units.as_deref());
        Self {
            name,
            prefix: prefix.into(),
            calibration: calibration.unwrap_or(0.0),
            units,
            kind: kind.unwrap_or_default(),
            metric,
            sensor: OnceLock::new(),
            buffer: Buffer::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn calibration(&self) -> f64 {
        self.calibration
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn sensor(&self) -> Option<&SensorIdentity> {
        self.sensor.get().map(Arc::as_ref)
    }

    /// Liga a medição ao sensor dono. Só pode acontecer uma vez.
    pub(crate) fn attach(&self, sensor: Arc<SensorIdentity>) -> Result<(), RegistryError> {
        self.sensor
            .set(sensor)
            .map_err(|_| RegistryError::AlreadyAttached(self.prefix.clone()))
    }

    /// Dimensões derivadas do sensor dono.
    pub fn dimensions(&self) -> Result<Dimensions, RegistryError> {
        Ok(self.dimensions_for(self.owner()?))
    }

    fn owner(&self) -> Result<&SensorIdentity, RegistryError> {
        self.sensor()
            .ok_or_else(|| RegistryError::Detached(self.name.clone()))
    }

    fn dimensions_for(&self, sensor: &SensorIdentity) -> Dimensions {
        let mut dims = Dimensions::new();
        dims.insert("device".into(), sensor.name.clone());
        dims.insert("location".into(), sensor.location.clone());
        dims.insert("prefix".into(), self.prefix.clone());
        dims.insert("sensor_id".into(), sensor.sensor_id.to_string());
        dims
    }

    /// Cria o datapoint de uma leitura bruta, carimbado com `now`.
    pub fn datapoint(&self, raw: f64, now: SystemTime) -> Result<Datapoint, RegistryError> {
        Ok(self.datapoint_for(self.owner()?, raw, now))
    }

    fn datapoint_for(&self, sensor: &SensorIdentity, raw: f64, now: SystemTime) -> Datapoint {
        Datapoint {
            metric: self.metric.clone(),
            value: calibrate(raw, self.calibration),
            timestamp: now,
            dimensions: self.dimensions_for(sensor),
            kind: self.kind,
        }
    }

    /// Calibra, carimba e coloca a leitura no buffer para a próxima coleta.
    pub fn record_value(&self, raw: f64) -> Result<Datapoint, RegistryError> {
        Ok(self.record_for(self.owner()?, raw))
    }

    /// Grava em nome de `sensor`. Usado pelo [`crate::registry::Sensor`]
    /// dono, que já tem a própria identidade.
    pub(crate) fn record_for(&self, sensor: &SensorIdentity, raw: f64) -> Datapoint {
        let datapoint = self.datapoint_for(sensor, raw, SystemTime::now());
        debug!("Adicionando ao buffer: {datapoint:?}");
        self.buffer.append(datapoint.clone());
        datapoint
    }
}

impl std::fmt::Display for Measurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Measurement {:?}({:?})>", self.name, self.prefix)
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
