//! FluidSampler host simulator: main entry point.
//!
//! Runs the production control loop against a simulated reservoir and
//! writes the same append-only session log the board writes to its SD card.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                   Adapters (outer ring)                    │
//! │                                                            │
//! │  SimTank              FlakyStorage<AppendFile>  StdDelay   │
//! │  (Sensor+Actuator)    (LogStorage)              (DelayNs)  │
//! │  JsonConfigFile / BlobConfig (ConfigPort)       Pacer      │
//! │                                                            │
//! │  ──────────────── Port Trait Boundary ───────────────────  │
//! │                                                            │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │           ControlLoop (pure logic)                   │  │
//! │  │  Reader · Detector · FSM · Pump · Logger · Monitor   │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use fluidsampler::adapters::file_log::AppendFile;
use fluidsampler::adapters::json_config::{BlobConfig, JsonConfigFile};
use fluidsampler::adapters::sim::{FlakyStorage, SimTank};
use fluidsampler::adapters::time::{Pacer, StdDelay};
use fluidsampler::app::control_loop::ControlLoop;
use fluidsampler::app::ports::ConfigPort;
use fluidsampler::config::SystemConfig;

/// Level-triggered liquid sampler, simulated on the host.
#[derive(Parser, Debug)]
#[command(name = "fluidsampler-sim")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (`.json`, otherwise a postcard blob). Defaults
    /// are used when omitted or missing.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Session log, opened in append mode
    #[arg(short, long, default_value = "water_log.txt")]
    log: PathBuf,

    /// Number of control ticks to run
    #[arg(short, long, default_value_t = 300)]
    ticks: u64,

    /// Starting reservoir level (mm)
    #[arg(long, default_value_t = 100.0)]
    initial_level_mm: f32,

    /// Level rise per tick (mm)
    #[arg(long, default_value_t = 1.5)]
    inflow_mm: f32,

    /// Level drop per tick at full pump duty (mm)
    #[arg(long, default_value_t = 6.0)]
    drain_mm: f32,

    /// Peak transducer noise (raw codes)
    #[arg(long, default_value_t = 40)]
    noise_raw: u16,

    /// Sensor outage window as START:LEN ticks
    #[arg(long, value_parser = parse_window)]
    sensor_outage: Option<(u64, u64)>,

    /// Storage outage window as START:LEN ticks
    #[arg(long, value_parser = parse_window)]
    storage_outage: Option<(u64, u64)>,

    /// Pace ticks at the configured tick period instead of running flat out
    #[arg(long)]
    realtime: bool,

    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_window(s: &str) -> Result<(u64, u64), String> {
    let (start, len) = s
        .split_once(':')
        .ok_or_else(|| format!("expected START:LEN, got '{s}'"))?;
    let start = start.parse().map_err(|e| format!("bad start: {e}"))?;
    let len = len.parse().map_err(|e| format!("bad length: {e}"))?;
    Ok((start, len))
}

fn in_window(window: Option<(u64, u64)>, tick: u64) -> bool {
    window.is_some_and(|(start, len)| tick >= start && tick < start.saturating_add(len))
}

fn load_config(path: Option<&PathBuf>) -> Result<SystemConfig> {
    let Some(path) = path else {
        info!("No config given, using defaults");
        return Ok(SystemConfig::default());
    };
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    let loaded = if is_json {
        JsonConfigFile::new(path).load()
    } else {
        BlobConfig::new(path).load()
    };
    loaded.with_context(|| format!("loading config from {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("FluidSampler simulator v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Configuration ──────────────────────────────────────
    let config = load_config(cli.config.as_ref())?;
    let tick_period_ms = config.tick_period_ms;

    // ── 2. Adapters ───────────────────────────────────────────
    let file = AppendFile::open(&cli.log)
        .with_context(|| format!("opening log {}", cli.log.display()))?;
    let mut storage = FlakyStorage::new(file);
    let mut tank = SimTank::new(&config, cli.initial_level_mm)
        .with_inflow(cli.inflow_mm)
        .with_drain(cli.drain_mm)
        .with_noise(cli.noise_raw);
    let mut delay = StdDelay;
    let mut pacer = cli.realtime.then(|| Pacer::new(tick_period_ms));

    // ── 3. Control loop ───────────────────────────────────────
    let mut control = ControlLoop::new(config).context("building control loop")?;
    control.start(&mut storage, &mut delay);

    for tick in 1..=cli.ticks {
        if let Some((start, len)) = cli.sensor_outage {
            if tick == start {
                tank.inject_sensor_outage(u32::try_from(len).unwrap_or(u32::MAX));
            }
        }
        storage.set_offline(in_window(cli.storage_outage, tick));

        let report = control.tick(&mut tank, &mut storage, &mut delay);
        tank.step();

        if let Some(fault) = report.escalated {
            warn!("Tick {}: escalated to {fault}", report.tick);
        }
        if let Some(p) = pacer.as_mut() {
            p.wait();
        }
    }

    // ── 4. Shutdown ───────────────────────────────────────────
    storage.set_offline(false);
    if let Err(e) = control.shutdown(&mut tank, &mut storage, &mut delay) {
        warn!("Final log flush failed: {e}");
    }

    let stats = control.logger_stats();
    info!(
        "Done: {} ticks, state {:?}, {} pump runs ({} ticks pumping), level {:.1} mm",
        control.now(),
        control.state(),
        control.pump_activations(),
        tank.pumped_ticks(),
        tank.level_mm()
    );
    info!(
        "Log: {} records written, {} samples dropped, {} failed flushes, {} refused writes",
        stats.written,
        stats.dropped_samples,
        stats.failed_flushes,
        storage.rejected()
    );
    if let Some(fault) = control.latched_fault() {
        warn!("Pump locked out: {fault}");
    }
    Ok(())
}
