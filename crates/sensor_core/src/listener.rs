//! Thread de fundo que lê a serial, separa frames e grava leituras.
//!
//! Ciclo: enquanto houver bytes disponíveis, lê um frame e espera
//! `frame_delay`; quando a serial fica vazia, dorme `idle_sleep`. O flag
//! de parada é verificado entre frames e durante cada espera.

use crate::frame::{FRAME_BODY_LEN, FRAME_START, decode_frame_bytes};
use crate::registry::Registry;
use crate::transport::Transport;
use crate::types::{Datapoint, SensorId};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError, bounded};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Maior intervalo entre verificações do flag de parada durante esperas.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Erros fatais do listener.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Falha na leitura da serial: {0}")]
    Transport(io::Error),

    #[error("Conexão serial encerrada: {0}")]
    ConnectionClosed(io::Error),

    #[error("Thread do listener terminou em pânico")]
    WorkerPanicked,
}

impl From<io::Error> for ListenerError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionAborted => ListenerError::ConnectionClosed(err),
            _ => ListenerError::Transport(err),
        }
    }
}

/// Temporização do loop de leitura.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerSettings {
    /// Espera quando a serial não tem dados
    pub idle_sleep: Duration,
    /// Pausa entre frames de uma mesma rajada
    pub frame_delay: Duration,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            idle_sleep: Duration::from_secs(1),
            frame_delay: Duration::from_millis(200),
        }
    }
}

/// O que aconteceu com um byte/frame lido.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Byte fora de frame, descartado
    Noise(u8),
    /// Corpo chegou incompleto antes do timeout
    Truncated,
    Unparsable(String),
    UnknownSensor(SensorId),
    UnknownMeasurement { sensor_id: SensorId, prefix: String },
    Recorded(Datapoint),
}

// ──────────────────────────────────────────────
// Contadores
// ──────────────────────────────────────────────

/// Contadores por tipo de resultado, atualizados pela thread do listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    noise: AtomicU64,
    truncated: AtomicU64,
    unparsable: AtomicU64,
    unknown_sensor: AtomicU64,
    unknown_measurement: AtomicU64,
    recorded: AtomicU64,
}

/// Cópia dos contadores num instante.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerCounters {
    pub noise: u64,
    pub truncated: u64,
    pub unparsable: u64,
    pub unknown_sensor: u64,
    pub unknown_measurement: u64,
    pub recorded: u64,
}

impl ListenerStats {
    fn count(&self, outcome: &FrameOutcome) {
        let counter = match outcome {
            FrameOutcome::Noise(_) => &self.noise,
            FrameOutcome::Truncated => &self.truncated,
            FrameOutcome::Unparsable(_) => &self.unparsable,
            FrameOutcome::UnknownSensor(_) => &self.unknown_sensor,
            FrameOutcome::UnknownMeasurement { .. } => &self.unknown_measurement,
            FrameOutcome::Recorded(_) => &self.recorded,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ListenerCounters {
        ListenerCounters {
            noise: self.noise.load(Ordering::Relaxed),
            truncated: self.truncated.load(Ordering::Relaxed),
            unparsable: self.unparsable.load(Ordering::Relaxed),
            unknown_sensor: self.unknown_sensor.load(Ordering::Relaxed),
            unknown_measurement: self.unknown_measurement.load(Ordering::Relaxed),
            recorded: self.recorded.load(Ordering::Relaxed),
        }
    }
}

// ──────────────────────────────────────────────
// Listener
// ──────────────────────────────────────────────

/// Dono da conexão serial; grava cada leitura válida no buffer da medição.
pub struct Listener<T: Transport> {
    transport: T,
    registry: Arc<Registry>,
    settings: ListenerSettings,
    stop: Arc<AtomicBool>,
    stats: Arc<ListenerStats>,
}

impl<T: Transport> Listener<T> {
    pub fn new(transport: T, registry: Arc<Registry>, settings: ListenerSettings) -> Self {
        Self {
            transport,
            registry,
            settings,
            stop: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(ListenerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Lê um byte e, se for início de frame, o corpo inteiro.
    pub fn read_message(&mut self) -> Result<FrameOutcome, ListenerError> {
        let mut first = [0u8; 1];
        self.transport.read_exact(&mut first)?;
        let outcome = if first[0] != FRAME_START {
            debug!(
                "Não é início de frame: {:?} != {:?}",
                char::from(first[0]),
                char::from(FRAME_START)
            );
            FrameOutcome::Noise(first[0])
        } else {
            let mut body = [0u8; FRAME_BODY_LEN];
            match self.transport.read_exact(&mut body) {
                Ok(()) => self.handle_body(&body),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    warn!("Frame incompleto descartado: {e}");
                    FrameOutcome::Truncated
                }
                Err(e) => return Err(e.into()),
            }
        };
        self.stats.count(&outcome);
        Ok(outcome)
    }

    /// Decodifica o corpo e grava no buffer da medição correspondente.
    pub fn handle_body(&self, body: &[u8]) -> FrameOutcome {
        let text = String::from_utf8_lossy(body);
        let reading = match decode_frame_bytes(body) {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Ignorando mensagem: {e}");
                return FrameOutcome::Unparsable(text.into_owned());
            }
        };

        let Some(sensor) = self.registry.sensor(reading.sensor_id) else {
            warn!(
                "Mensagem {text:?} de sensor não definido {}",
                reading.sensor_id
            );
            return FrameOutcome::UnknownSensor(reading.sensor_id);
        };

        let Some(datapoint) = sensor.record(&reading.prefix, reading.value) else {
            warn!(
                "Sensor {}: ignorando valor de medição desconhecida {}",
                reading.sensor_id, reading.prefix
            );
            return FrameOutcome::UnknownMeasurement {
                sensor_id: reading.sensor_id,
                prefix: reading.prefix,
            };
        };

        info!(
            "Sensor {}: registrado valor {} para medição {}",
            reading.sensor_id, reading.value, reading.prefix
        );
        FrameOutcome::Recorded(datapoint)
    }

    /// Dorme `duration`, acordando antes se a parada for pedida.
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(STOP_POLL));
        }
    }

    /// Loop principal; retorna quando o flag de parada é visto ou a
    /// conexão falha.
    pub fn run(&mut self) -> Result<(), ListenerError> {
        info!("Iniciando listener de sensores");
        while !self.stopped() {
            while !self.stopped() && self.transport.bytes_available()? > 0 {
                self.read_message()?;
                self.pause(self.settings.frame_delay);
            }
            self.pause(self.settings.idle_sleep);
        }
        info!("Listener de sensores encerrado");
        Ok(())
    }
}

impl<T: Transport + 'static> Listener<T> {
    /// Inicia o listener numa thread dedicada.
    pub fn spawn(mut self) -> io::Result<ListenerHandle> {
        let stop = Arc::clone(&self.stop);
        let stats = Arc::clone(&self.stats);
        let (done_tx, done_rx) = bounded(1);

        let thread = std::thread::Builder::new()
            .name("sensor-listener".into())
            .spawn(move || {
                let result = self.run();
                if let Err(e) = &result {
                    error!("Listener encerrado por falha: {e}");
                }
                let _ = done_tx.send(result);
            })?;

        Ok(ListenerHandle {
            stop,
            stats,
            done: done_rx,
            thread: Some(thread),
        })
    }
}

// ──────────────────────────────────────────────
// Handle
// ──────────────────────────────────────────────

/// Controle da thread do listener pelo dono.
pub struct ListenerHandle {
    stop: Arc<AtomicBool>,
    stats: Arc<ListenerStats>,
    done: Receiver<Result<(), ListenerError>>,
    thread: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Pede a parada; a thread termina no próximo ciclo.
    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stats(&self) -> ListenerCounters {
        self.stats.snapshot()
    }

    fn reap(&mut self, result: Result<(), ListenerError>) -> Result<(), ListenerError> {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        result
    }

    /// Resultado da thread se ela já terminou, sem bloquear.
    pub fn try_finish(&mut self) -> Option<Result<(), ListenerError>> {
        match self.done.try_recv() {
            Ok(result) => Some(self.reap(result)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.reap(Err(ListenerError::WorkerPanicked))),
        }
    }

    /// Pede a parada e espera até `timeout`. `None` se a thread continua viva.
    pub fn join(mut self, timeout: Duration) -> Option<Result<(), ListenerError>> {
        self.signal_stop();
        match self.done.recv_timeout(timeout) {
            Ok(result) => Some(self.reap(result)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(self.reap(Err(ListenerError::WorkerPanicked))),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
