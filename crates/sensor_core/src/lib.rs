//! # Sensor Core
//!
//! Pipeline de ingestão dos sensores RF sem fio: lê frames ASCII da base
//! station pela serial, decodifica cada leitura, guarda num buffer por
//! medição e entrega tudo ao sink de métricas a cada coleta.
//!
//! ## Módulos
//! - [`frame`] – Decoder dos frames `a21TMPA-1.35`
//! - [`types`] – Datapoint, tipo de métrica, dimensões
//! - [`measurement`] – Medição e seu buffer FIFO
//! - [`registry`] – Sensores e o registro id → sensor
//! - [`transport`] – Abstração da serial (e fake para testes)
//! - [`listener`] – Thread de leitura e roteamento
//! - [`collector`] – Drenagem periódica e sinks
//! - [`pipeline`] – Dono de registro + listener, start/collect/stop
//! - [`protocol`] – Pacote binário de datapoints para o sink UDP
//! - [`config`] – Configuração unificada via TOML

pub mod collector;
pub mod config;
pub mod frame;
pub mod listener;
pub mod measurement;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod transport;
pub mod types;

// Re-exports convenientes
pub use collector::{LogSink, MetricsSink};
pub use config::AppConfig;
pub use frame::{DecodeError, FrameReading, decode_frame};
pub use pipeline::{Pipeline, PipelineError};
pub use registry::{Registry, Sensor};
pub use types::{Datapoint, MetricKind};
