//! Pipeline de ingestão: dono do registro e do listener.
//!
//! O host chama [`Pipeline::start`] uma vez na inicialização,
//! [`Pipeline::collect`] a cada intervalo e [`Pipeline::stop`] no
//! encerramento. Não há estado global.

use crate::collector::{self, MetricsSink};
use crate::listener::{Listener, ListenerCounters, ListenerError, ListenerHandle, ListenerSettings};
use crate::registry::Registry;
use crate::transport::Transport;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Tempo padrão de espera pelo listener no encerramento.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Erros do ciclo de vida do pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Listener já está rodando")]
    AlreadyStarted,

    #[error("Listener não foi iniciado")]
    NotStarted,

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Listener não encerrou em {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Falha ao criar thread do listener: {0}")]
    Spawn(io::Error),
}

pub struct Pipeline {
    registry: Arc<Registry>,
    settings: ListenerSettings,
    join_timeout: Duration,
    listener: Option<ListenerHandle>,
}

impl Pipeline {
    pub fn new(registry: Registry, settings: ListenerSettings, join_timeout: Duration) -> Self {
        Self {
            registry: Arc::new(registry),
            settings,
            join_timeout,
            listener: None,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.listener.is_some()
    }

    /// Inicia o listener sobre `transport`.
    pub fn start<T: Transport + 'static>(&mut self, transport: T) -> Result<(), PipelineError> {
        if self.listener.is_some() {
            return Err(PipelineError::AlreadyStarted);
        }
        info!(
            "Iniciando pipeline com {} sensores ({} medições)",
            self.registry.len(),
            self.registry.measurements().count()
        );
        let listener = Listener::new(transport, Arc::clone(&self.registry), self.settings);
        self.listener = Some(listener.spawn().map_err(PipelineError::Spawn)?);
        Ok(())
    }

    /// Drena todos os buffers para o sink. Seguro com o listener rodando.
    pub fn collect(&self, sink: &mut dyn MetricsSink) -> usize {
        collector::collect(&self.registry, sink)
    }

    /// Contadores do listener, se ele estiver rodando.
    pub fn stats(&self) -> Option<ListenerCounters> {
        self.listener.as_ref().map(ListenerHandle::stats)
    }

    /// Propaga a falha do listener se a thread já terminou.
    pub fn check_listener(&mut self) -> Result<(), PipelineError> {
        if let Some(result) = self.listener.as_mut().and_then(ListenerHandle::try_finish) {
            self.listener = None;
            result?;
        }
        Ok(())
    }

    /// Para o listener e espera até o timeout configurado.
    pub fn stop(&mut self) -> Result<(), PipelineError> {
        let handle = self.listener.take().ok_or(PipelineError::NotStarted)?;
        info!("Parando listener de sensores");
        match handle.join(self.join_timeout) {
            Some(result) => Ok(result?),
            None => {
                error!("Listener não encerrou em {:?}", self.join_timeout);
                Err(PipelineError::ShutdownTimeout(self.join_timeout))
            }
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::Measurement;
    use crate::registry::Sensor;
    use crate::transport::FakeTransport;
    use crate::types::Datapoint;
    use std::time::Instant;

    fn registry() -> Registry {
        let sensor = Sensor::new(
            21,
            "rf22",
            "inside_thermometer",
            "inside",
            vec![
                Measurement::new("battery", "BATT", None, None, None),
                Measurement::new("temperature", "TMPA", Some(18.3), None, None),
            ],
        )
        .unwrap();
        Registry::from_sensors([sensor]).unwrap()
    }

    fn fast() -> ListenerSettings {
        ListenerSettings {
            idle_sleep: Duration::from_millis(20),
            frame_delay: Duration::from_millis(1),
        }
    }

    fn wait_for(pipeline: &Pipeline, done: impl Fn(ListenerCounters) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !pipeline.stats().is_some_and(&done) {
            assert!(Instant::now() < deadline, "listener não processou os frames");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn end_to_end_scenario() {
        let fake = FakeTransport::new();
        let mut pipeline = Pipeline::new(registry(), fast(), DEFAULT_JOIN_TIMEOUT);
        pipeline.start(fake.clone()).unwrap();

        fake.push(b"a21BATT3.04-");
        fake.push(b"a21SLEEPING-");
        fake.push(b"a21TMPA-1.35");
        wait_for(&pipeline, |c| c.recorded == 2 && c.unparsable == 1);

        let mut sink: Vec<Datapoint> = Vec::new();
        assert_eq!(pipeline.collect(&mut sink), 2);
        pipeline.stop().unwrap();

        assert_eq!(sink[0].metric, "battery");
        assert_eq!(sink[0].value, 3.04);
        assert_eq!(sink[1].metric, "temperature");
        assert_eq!(sink[1].value, 16.95);
        assert!(sink[0].timestamp <= sink[1].timestamp);
    }

    #[test]
    fn unregistered_sensor_never_reaches_sink() {
        let fake = FakeTransport::with_bytes(b"\r\na99TMPA2.032a21BATT3.04-");
        let mut pipeline = Pipeline::new(registry(), fast(), DEFAULT_JOIN_TIMEOUT);
        pipeline.start(fake).unwrap();
        wait_for(&pipeline, |c| c.recorded == 1);

        let counters = pipeline.stats().unwrap();
        assert_eq!(counters.unknown_sensor, 1);
        assert_eq!(counters.noise, 2);

        let mut sink: Vec<Datapoint> = Vec::new();
        pipeline.collect(&mut sink);
        pipeline.stop().unwrap();
        assert_eq!(sink.len(), 1);
        assert!(sink.iter().all(|d| d.dimensions["sensor_id"] == "21"));
    }

    #[test]
    fn collect_while_listening_delivers_each_point_once() {
        let fake = FakeTransport::new();
        let mut pipeline = Pipeline::new(registry(), fast(), DEFAULT_JOIN_TIMEOUT);
        pipeline.start(fake.clone()).unwrap();

        let mut sink: Vec<Datapoint> = Vec::new();
        for i in 0..40 {
            fake.push(format!("a21BATT{}.{:02}-", i % 10, i).as_bytes());
            if i % 7 == 0 {
                pipeline.collect(&mut sink);
            }
        }
        wait_for(&pipeline, |c| c.recorded == 40);
        pipeline.collect(&mut sink);
        pipeline.stop().unwrap();

        let values: Vec<f64> = sink.iter().map(|d| d.value).collect();
        let expected: Vec<f64> = (0..40)
            .map(|i| format!("{}.{:02}", i % 10, i).parse().unwrap())
            .collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn stop_while_idle_is_prompt() {
        let settings = ListenerSettings {
            idle_sleep: Duration::from_secs(1),
            frame_delay: Duration::from_millis(200),
        };
        let mut pipeline = Pipeline::new(registry(), settings, DEFAULT_JOIN_TIMEOUT);
        pipeline.start(FakeTransport::new()).unwrap();
        std::thread::sleep(Duration::from_millis(150));

        let start = Instant::now();
        pipeline.stop().unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(!pipeline.is_running());
    }

    #[test]
    fn stop_mid_burst_is_prompt() {
        let fake = FakeTransport::new();
        for _ in 0..50 {
            fake.push(b"a21BATT3.04-");
        }
        let settings = ListenerSettings {
            idle_sleep: Duration::from_secs(1),
            frame_delay: Duration::from_millis(200),
        };
        let mut pipeline = Pipeline::new(registry(), settings, DEFAULT_JOIN_TIMEOUT);
        pipeline.start(fake.clone()).unwrap();
        wait_for(&pipeline, |c| c.recorded >= 1);

        let start = Instant::now();
        pipeline.stop().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(fake.remaining() > 0, "rajada não deveria ter sido consumida inteira");
    }

    #[test]
    fn stuck_transport_times_out_on_stop() {
        struct Stuck;
        impl Transport for Stuck {
            fn bytes_available(&mut self) -> io::Result<usize> {
                std::thread::sleep(Duration::from_secs(2));
                Ok(0)
            }
            fn read_exact(&mut self, _buf: &mut [u8]) -> io::Result<()> {
                Ok(())
            }
        }

        let mut pipeline = Pipeline::new(registry(), fast(), Duration::from_millis(200));
        pipeline.start(Stuck).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(matches!(
            pipeline.stop(),
            Err(PipelineError::ShutdownTimeout(t)) if t == Duration::from_millis(200)
        ));
    }

    #[test]
    fn transport_fault_is_observable() {
        let fake = FakeTransport::new();
        let mut pipeline = Pipeline::new(registry(), fast(), DEFAULT_JOIN_TIMEOUT);
        pipeline.start(fake.clone()).unwrap();
        assert!(pipeline.check_listener().is_ok());

        fake.inject_fault(io::ErrorKind::Other);
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match pipeline.check_listener() {
                Ok(()) if pipeline.is_running() => {
                    assert!(Instant::now() < deadline, "falha não foi propagada");
                    std::thread::sleep(Duration::from_millis(10));
                }
                Ok(()) => panic!("listener terminou sem erro"),
                Err(e) => {
                    assert!(matches!(e, PipelineError::Listener(ListenerError::Transport(_))));
                    break;
                }
            }
        }
        assert!(matches!(pipeline.stop(), Err(PipelineError::NotStarted)));
    }

    #[test]
    fn fault_surfaces_on_stop() {
        let fake = FakeTransport::new();
        fake.close();
        let mut pipeline = Pipeline::new(registry(), fast(), DEFAULT_JOIN_TIMEOUT);
        pipeline.start(fake).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert!(matches!(
            pipeline.stop(),
            Err(PipelineError::Listener(ListenerError::ConnectionClosed(_)))
        ));
    }

    #[test]
    fn double_start_rejected() {
        let mut pipeline = Pipeline::new(registry(), fast(), DEFAULT_JOIN_TIMEOUT);
        pipeline.start(FakeTransport::new()).unwrap();
        assert!(matches!(
            pipeline.start(FakeTransport::new()),
            Err(PipelineError::AlreadyStarted)
        ));
        pipeline.stop().unwrap();
    }
}
