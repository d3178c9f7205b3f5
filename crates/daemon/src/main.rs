//! # Sensor Daemon
//!
//! Lê frames dos sensores RF pela serial da base station e publica as
//! leituras a cada intervalo de coleta.
//!
//! ## Uso
//! ```bash
//! sensor_daemon                          # config.toml ao lado do executável
//! sensor_daemon --config /etc/rf.toml    # caminho explícito
//! ```

mod serial_link;
mod udp_sink;

use sensor_core::config::{AppConfig, SinkMode};
use sensor_core::{LogSink, MetricsSink, Pipeline};
use serial_link::SerialLink;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use udp_sink::UdpSink;

/// Granularidade do loop principal (Ctrl+C e falhas do listener).
const TICK: Duration = Duration::from_millis(100);

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = config_path_from_args().unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    if let Err(e) = config.ensure_valid() {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    let registry = match config.build_registry() {
        Ok(registry) => registry,
        Err(e) => {
            error!("Cadastro de sensores inválido: {e}");
            return ExitCode::FAILURE;
        }
    };
    if registry.is_empty() {
        warn!("Nenhum sensor configurado; todos os frames serão descartados");
    }
    for sensor in registry.sensors() {
        info!("Sensor cadastrado: {sensor}");
    }

    // ── Sink ──
    let mut sink: Box<dyn MetricsSink> = match config.sink.mode {
        SinkMode::Log => Box::new(LogSink::new(config.sink.plugin.clone())),
        SinkMode::Udp => match UdpSink::bind(&config.sink.dest) {
            Ok(sink) => Box::new(sink),
            Err(e) => {
                error!("Falha ao criar socket UDP: {e}");
                return ExitCode::FAILURE;
            }
        },
    };

    // ── Serial ──
    let link = match SerialLink::open(&config.serial) {
        Ok(link) => link,
        Err(e) => {
            error!("Falha ao abrir {}: {e}", config.serial.port);
            return ExitCode::FAILURE;
        }
    };
    info!("Serial {} aberta a {} baud", link.name(), config.serial.baud_rate);

    // ── Pipeline ──
    let mut pipeline = Pipeline::new(registry, config.listener_settings(), config.join_timeout());
    if let Err(e) = pipeline.start(link) {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Não foi possível instalar handler de Ctrl+C: {e}");
    }

    // ── Banner ──
    let interval = config.collect_interval();
    println!();
    println!("══════════════════════════════════════════════");
    println!("   📡 SENSOR DAEMON – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Serial:    {} @ {}", config.serial.port, config.serial.baud_rate);
    println!("  Sensores:  {}", pipeline.registry().len());
    println!("  Coleta:    a cada {:.1}s", interval.as_secs_f64());
    println!("  Destino:   {:?}", config.sink.mode);
    println!("══════════════════════════════════════════════");
    println!();

    // ── Loop principal ──
    let mut status = ExitCode::SUCCESS;
    let mut next_collect = Instant::now() + interval;
    while running.load(Ordering::SeqCst) {
        if let Err(e) = pipeline.check_listener() {
            error!("Listener parou: {e}");
            status = ExitCode::FAILURE;
            break;
        }

        let now = Instant::now();
        if now >= next_collect {
            let delivered = pipeline.collect(sink.as_mut());
            if let Some(stats) = pipeline.stats() {
                debug!("Coleta: {delivered} datapoints | listener {stats:?}");
            }
            next_collect += interval;
            if next_collect < now {
                next_collect = now + interval;
            }
        }

        std::thread::sleep(TICK.min(next_collect.saturating_duration_since(Instant::now())));
    }

    // ── Encerramento ──
    info!("Encerrando sensor daemon");
    if pipeline.is_running() {
        if let Err(e) = pipeline.stop() {
            error!("{e}");
            status = ExitCode::FAILURE;
        }
    }
    let delivered = pipeline.collect(sink.as_mut());
    info!("Coleta final: {delivered} datapoints");

    status
}

/// `--config <caminho>` na linha de comando.
fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}
