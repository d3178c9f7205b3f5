//! Configuração unificada via TOML.
//!
//! Define a porta serial, a temporização do listener, o intervalo de
//! coleta, o destino das métricas e o cadastro de sensores que vira o
//! [`Registry`].

use crate::collector::PLUGIN_NAME;
use crate::listener::ListenerSettings;
use crate::measurement::Measurement;
use crate::pipeline::DEFAULT_JOIN_TIMEOUT;
use crate::registry::{Registry, RegistryError, Sensor};
use crate::types::{MetricKind, SensorId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Valor usado quando tipo ou localização do sensor não são informados.
pub const UNSPECIFIED: &str = "unspecified";

/// Maior espera aceita pelo encerramento do listener (s).
pub const MAX_JOIN_TIMEOUT_SECS: f64 = 3600.0;

/// Erros de configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro de leitura/escrita: {0}")]
    Io(#[from] std::io::Error),

    #[error("Erro ao parsear TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Erro ao gerar TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Configuração inválida: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Porta serial da base station.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Dispositivo (ex: /dev/ttyS0, COM3)
    pub port: String,
    pub baud_rate: u32,
    /// Timeout de leitura de um frame (ms)
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyS0".into(),
            baud_rate: 9600,
            read_timeout_ms: 1000,
        }
    }
}

/// Temporização do listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Espera quando a serial está ociosa (ms)
    pub idle_sleep_ms: u64,
    /// Pausa entre frames de uma rajada (ms)
    pub frame_delay_ms: u64,
    /// Tempo máximo para o listener encerrar (s)
    pub join_timeout_secs: f64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            idle_sleep_ms: 1000,
            frame_delay_ms: 200,
            join_timeout_secs: 5.0,
        }
    }
}

/// Coleta periódica.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Intervalo entre coletas em segundos
    pub interval_secs: f64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self { interval_secs: 10.0 }
    }
}

/// Destino das métricas coletadas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkMode {
    /// Apenas registra no log
    #[default]
    Log,
    /// Envia cada datapoint via UDP
    Udp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub mode: SinkMode,
    /// Endereço de destino no modo UDP
    pub dest: String,
    /// Nome do plugin nas linhas de log
    pub plugin: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            mode: SinkMode::Log,
            dest: "127.0.0.1:5005".into(),
            plugin: PLUGIN_NAME.into(),
        }
    }
}

/// Uma medição de um sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementConfig {
    pub name: String,
    /// Token de 4 letras que o frame usa (ex: "TMPA")
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<MetricKind>,
}

fn unspecified() -> String {
    UNSPECIFIED.into()
}

/// Um sensor remoto.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub id: SensorId,
    pub name: String,
    #[serde(rename = "type", default = "unspecified")]
    pub sensor_type: String,
    #[serde(default = "unspecified")]
    pub location: String,
    #[serde(default)]
    pub measurements: Vec<MeasurementConfig>,
}

impl SensorConfig {
    fn build(&self) -> Result<Sensor, RegistryError> {
        let measurements = self
            .measurements
            .iter()
            .map(|m| {
                Measurement::new(
                    m.name.clone(),
                    m.prefix.clone(),
                    m.calibration,
                    m.units.clone(),
                    m.metric_type,
                )
            })
            .collect();
        Sensor::new(
            self.id,
            self.sensor_type.clone(),
            self.name.clone(),
            self.location.clone(),
            measurements,
        )
    }
}

/// Configuração raiz do daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub listener: ListenerConfig,
    pub collector: CollectorConfig,
    pub sink: SinkConfig,
    pub sensors: Vec<SensorConfig>,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    ///
    /// Arquivo ausente ou inválido resulta na configuração padrão.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match Self::from_toml_str(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.serial.port.trim().is_empty() {
            errors.push("Porta serial não pode ser vazia".into());
        }
        if self.serial.baud_rate == 0 {
            errors.push("Baud rate não pode ser 0".into());
        }
        if self.serial.read_timeout_ms == 0 {
            errors.push("Timeout de leitura não pode ser 0".into());
        }
        if self.listener.idle_sleep_ms == 0 {
            errors.push("Espera ociosa do listener não pode ser 0".into());
        }
        let idle_secs = self.listener.idle_sleep_ms as f64 / 1000.0;
        let join_secs = self.listener.join_timeout_secs;
        if !join_secs.is_finite() || join_secs > MAX_JOIN_TIMEOUT_SECS {
            errors.push(format!(
                "Timeout de encerramento inválido: {join_secs} (máximo {MAX_JOIN_TIMEOUT_SECS}s)"
            ));
        } else if join_secs <= idle_secs {
            errors.push(format!(
                "Timeout de encerramento ({}s) deve ser maior que a espera ociosa ({idle_secs}s)",
                self.listener.join_timeout_secs
            ));
        }
        if !(0.1..=3600.0).contains(&self.collector.interval_secs) {
            errors.push(format!(
                "Intervalo de coleta inválido: {} (0.1–3600.0)",
                self.collector.interval_secs
            ));
        }
        if self.sink.mode == SinkMode::Udp && self.sink.dest.trim().is_empty() {
            errors.push("Destino UDP não pode ser vazio".into());
        }

        errors
    }

    /// Como [`validate`](Self::validate), mas como erro único.
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Monta o registro de sensores a partir do cadastro.
    pub fn build_registry(&self) -> Result<Registry, ConfigError> {
        let sensors = self
            .sensors
            .iter()
            .map(SensorConfig::build)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Registry::from_sensors(sensors)?)
    }

    pub fn listener_settings(&self) -> ListenerSettings {
        ListenerSettings {
            idle_sleep: Duration::from_millis(self.listener.idle_sleep_ms),
            frame_delay: Duration::from_millis(self.listener.frame_delay_ms),
        }
    }

    /// Valores fora do intervalo de [`Duration`] caem no padrão.
    pub fn join_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.listener.join_timeout_secs).unwrap_or(DEFAULT_JOIN_TIMEOUT)
    }

    pub fn collect_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.collector.interval_secs.max(0.1))
            .unwrap_or_else(|_| Duration::from_secs_f64(CollectorConfig::default().interval_secs))
    }
}
