// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! airguard - MQ gas sensor monitoring and ventilation control

use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use airguard::notify::NotifierSet;
use airguard::sensors::{estimate, AnalogSimulator, AnalogSource, EnvironmentSample, SensorCalibration};
use airguard::{actuator, Config, Database, Monitor, SensorManager, VERSION};

/// airguard - MQ gas sensor monitoring and ventilation control
#[derive(Parser, Debug)]
#[command(name = "airguard")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Calibrate MQ gas sensors, log ppm readings and drive ventilation on critical values")]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long, global = true)]
    trace: bool,

    /// Demo mode with a simulated analog source
    #[arg(long, global = true)]
    demo: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll sensors, store readings and run alert cycles until Ctrl+C
    Run {
        /// Re-measure R0 at startup even if one is stored
        #[arg(long)]
        recalibrate: bool,
    },
    /// Measure R0 for every sensor in clean air and store it
    Calibrate,
    /// Validate the configuration and exit
    Check,
    /// Convert one averaged raw value to ppm using the stored R0
    Convert {
        /// Sensor id, e.g. mq2
        #[arg(long)]
        sensor: String,
        /// Averaged raw ADC value
        #[arg(long)]
        raw: f64,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;
    if args.demo {
        config.demo_mode = true;
    }

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("airguard v{}", VERSION);
    info!("Configuration loaded from {:?}", config_path);

    let curves = config.validate().context("invalid configuration")?;

    match args.command {
        Command::Check => {
            info!(
                "Configuration OK: {} sensors, {} curves, {} alert rules",
                config.sensors.len(),
                curves.len(),
                config.alerts.rules.len()
            );
            Ok(())
        }
        Command::Convert { sensor, raw } => convert(&config, curves, &sensor, raw),
        Command::Calibrate => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_calibration(config, curves))
        }
        Command::Run { recalibrate } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_monitor(config, curves, recalibrate))
        }
    }
}

/// Only the simulator is built in; hardware sources plug in through `AnalogSource`
fn analog_source(config: &Config) -> Result<AnalogSimulator> {
    if !config.demo_mode {
        bail!("No analog source available for this platform. Use --demo for the simulator");
    }
    let mut source = AnalogSimulator::new(config.board.analog_read_max);
    for sensor in config.sensors.values() {
        source = source.with_baseline(sensor.pin, config.board.analog_read_max / 10);
    }
    if config.environment.enabled {
        source = source.with_environment(EnvironmentSample::new(21.0, 1013.25, 45.0));
    }
    Ok(source)
}

fn convert(config: &Config, curves: airguard::sensors::CurveTable, sensor_id: &str, raw: f64) -> Result<()> {
    let sensor = config
        .sensors
        .get(sensor_id)
        .with_context(|| format!("unknown sensor {}", sensor_id))?;

    let calibration = match sensor.r0 {
        Some(r0) => SensorCalibration::new(sensor_id, sensor.clean_air_ratio, r0)?,
        None => {
            let db = Database::open(&config.database)?;
            db.load_calibrations()?
                .into_iter()
                .find(|c| c.sensor_id == sensor_id)
                .with_context(|| format!("{} is not calibrated, run `airguard calibrate` first", sensor_id))?
        }
    };

    let result = estimate(raw, &calibration, &curves, &config.board, Utc::now())?;
    println!("{} Rs/R0 = {:.4}", sensor_id, result.ratio);
    for (gas, ppm) in &result.reading.values {
        println!("  {:<8} {:>12.2} {}", gas, ppm, config.alerts.unit_for(gas));
    }
    for (gas, e) in &result.failures {
        println!("  {:<8} {}", gas, e);
    }
    Ok(())
}

async fn run_calibration(config: Config, curves: airguard::sensors::CurveTable) -> Result<()> {
    let db = Database::open(&config.database)?;
    let mut sensors = SensorManager::new(&config, curves, analog_source(&config)?)?;

    info!("Keep the sensors in clean air until calibration finishes");
    let calibrations = sensors.calibrate_all().await;
    for calibration in &calibrations {
        db.store_calibration(calibration)?;
    }

    if calibrations.len() < config.sensors.len() {
        bail!("calibrated {} of {} sensors", calibrations.len(), config.sensors.len());
    }
    info!("Stored R0 for {} sensors", calibrations.len());
    Ok(())
}

async fn run_monitor(config: Config, curves: airguard::sensors::CurveTable, recalibrate: bool) -> Result<()> {
    use tokio::sync::broadcast;

    let db = Arc::new(Database::open(&config.database)?);

    let source = analog_source(&config)?;
    info!("Analog source: {}", source.name());
    let mut sensors = SensorManager::new(&config, curves, source)?;

    if !recalibrate {
        let adopted = sensors.adopt_calibrations(db.load_calibrations()?);
        info!("Loaded {} stored calibrations", adopted);
    }
    if recalibrate || !sensors.is_fully_calibrated() {
        for calibration in sensors.calibrate_all().await {
            db.store_calibration(&calibration)?;
        }
    }
    if !sensors.is_fully_calibrated() {
        warn!("Some sensors have no R0 and will be skipped");
    }

    let notifier = NotifierSet::from_config(&config.notify).await?;
    let relay = actuator::from_config(&config.actuator).await?;
    let mut monitor = Monitor::new(&config, sensors, db, Box::new(notifier), relay);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, cleaning up...");
        }
        let _ = shutdown_tx.send(());
    });

    info!("airguard running, press Ctrl+C to shutdown");
    monitor.run(shutdown_rx).await?;

    for health in monitor.sensors().get_all_health() {
        info!(
            "{}: {:?}, {} readings, {} errors{}",
            health.sensor_id,
            health.status,
            health.readings_count,
            health.error_count,
            health.last_error.map(|e| format!(", last: {}", e)).unwrap_or_default()
        );
    }

    let stats = monitor.stats();
    info!(
        "airguard stopped after {} stored readings, {} purged and {} alert cycles",
        stats.readings_stored, stats.readings_purged, stats.alert_cycles
    );
    Ok(())
}
