//! questfleet - Manage a fleet of VR headsets through `adb`
//!
//! # Usage
//!
//! ```bash
//! # Show which adb is used and whether it runs
//! questfleet bridge
//!
//! # Detailed device list
//! questfleet devices --json
//!
//! # Watch devices come and go (Ctrl+C to stop)
//! questfleet monitor --interval 2
//!
//! # Run a shell command on every headset
//! questfleet run input keyevent 26
//!
//! # Apply performance settings, then record and pull metrics
//! questfleet configure --cpu 3 --gpu 3
//! questfleet metrics record --duration 60 --out ./captures
//!
//! # Enable debug logging
//! RUST_LOG=questfleet_bridge=trace questfleet devices
//! ```
//!
//! Exits with status 1 when any device fails a batch operation.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use questfleet_bridge::{search_paths, Platform, SearchContext};
use questfleet_core::{DeviceId, DeviceRecord};
use questfleet_fleet::{ChannelObserver, Fleet, FleetEvent, FleetMonitor, Settings};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// questfleet - VR headset fleet manager
#[derive(Parser, Debug)]
#[command(name = "questfleet", version, about)]
struct Args {
    /// Path to the adb executable
    #[arg(long, global = true, value_name = "PATH")]
    adb: Option<PathBuf>,

    /// Settings file (default: $QUESTFLEET_CONFIG or the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the resolved adb path and whether it works
    Bridge,
    /// List attached devices with model, battery and running apps
    Devices,
    /// Refresh periodically and print device events until interrupted
    Monitor {
        /// Seconds between refreshes (default from settings)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Run a shell command on every device
    Run {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Apply performance and sensor settings to every device
    Configure {
        /// CPU level, 0-4
        #[arg(long)]
        cpu: Option<i32>,
        /// GPU level, 0-4
        #[arg(long)]
        gpu: Option<i32>,
        /// Leave the proximity sensor enabled
        #[arg(long)]
        no_proximity_disable: bool,
        /// Pause the guardian boundary
        #[arg(long)]
        disable_guardian: bool,
    },
    /// Reboot every device and wait for it to come back
    Reboot,
    /// Metrics capture
    Metrics {
        #[command(subcommand)]
        action: MetricsCommand,
    },
    /// Show running apps per device
    Apps {
        /// Only report whether a configured trigger app is running
        #[arg(long)]
        trigger: bool,
    },
}

#[derive(Subcommand, Debug)]
enum MetricsCommand {
    /// Record on every device, then pull the captures
    Record {
        /// Recording length in seconds (default from settings)
        #[arg(long)]
        duration: Option<u64>,
        /// Local directory for pulled captures
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Pull the latest capture from every device
    Pull {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;

    if !run(args, settings)? {
        process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("questfleet={level}").parse()?)
                .add_directive(format!("questfleet_fleet={level}").parse()?)
                .add_directive(format!("questfleet_bridge={level}").parse()?),
        )
        .init();
    Ok(())
}

/// Runs one subcommand. Returns whether every device succeeded.
#[tokio::main]
async fn run(args: Args, settings: Settings) -> Result<bool> {
    let json = args.json;

    match args.command {
        Command::Bridge => show_bridge(&settings, args.adb, json).await,
        Command::Devices => {
            let fleet = connect(&settings, args.adb).await?;
            let records = fleet.connected_devices().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_devices(&records);
            }
            Ok(true)
        }
        Command::Monitor { interval } => {
            let fleet = connect(&settings, args.adb).await?;
            let interval = interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.monitor_interval());
            monitor(fleet, interval, json).await
        }
        Command::Run { command } => {
            let fleet = connect(&settings, args.adb).await?;
            let command = command.join(" ");
            let results = fleet.run_command_on_all(&command).await?;
            report(&results, json, |ok| if *ok { "ok".into() } else { "FAILED".into() })?;
            Ok(results.values().all(|ok| *ok))
        }
        Command::Configure {
            cpu,
            gpu,
            no_proximity_disable,
            disable_guardian,
        } => {
            let fleet = connect(&settings, args.adb).await?;
            let mut config = settings.headset.clone();
            if let Some(level) = cpu {
                config.cpu_level = level;
            }
            if let Some(level) = gpu {
                config.gpu_level = level;
            }
            if no_proximity_disable {
                config.disable_proximity = false;
            }
            if disable_guardian {
                config.disable_guardian = true;
            }
            if !config.cpu_level_in_range() {
                warn!(level = config.cpu_level, "CPU level outside 0-4 will not be applied");
            }
            if !config.gpu_level_in_range() {
                warn!(level = config.gpu_level, "GPU level outside 0-4 will not be applied");
            }

            let ok = fleet.apply_configuration_all(&config).await?;
            println!("{}", if ok { "Configuration applied" } else { "Configuration failed on some devices" });
            Ok(ok)
        }
        Command::Reboot => {
            let fleet = connect(&settings, args.adb).await?;
            info!("Rebooting all devices");
            let ok = fleet.reboot_and_wait_all().await?;
            println!("{}", if ok { "All devices rebooted" } else { "Some devices did not come back" });
            Ok(ok)
        }
        Command::Metrics { action } => {
            let fleet = connect(&settings, args.adb).await?;
            match action {
                MetricsCommand::Record { duration, out } => {
                    let duration = duration
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| settings.headset.test_duration());
                    let out = out.unwrap_or_else(|| settings.metrics.output_dir.clone());
                    record_metrics(fleet, &settings, duration, out, json).await
                }
                MetricsCommand::Pull { out } => {
                    let out = out.unwrap_or_else(|| settings.metrics.output_dir.clone());
                    let pulled = fleet.pull_latest_metrics_from_all(&out).await?;
                    report(&pulled, json, describe_pull)?;
                    Ok(pulled.values().all(Option::is_some))
                }
            }
        }
        Command::Apps { trigger } => {
            let fleet = connect(&settings, args.adb).await?;
            if trigger {
                trigger_apps(&fleet, &settings, json).await
            } else {
                let records = fleet.connected_devices().await?;
                let apps: BTreeMap<DeviceId, Vec<String>> = records
                    .into_iter()
                    .filter(DeviceRecord::is_connected)
                    .map(|r| (r.id, r.running_apps.into_iter().collect()))
                    .collect();
                report(&apps, json, |apps| apps.join(", "))?;
                Ok(true)
            }
        }
    }
}

/// Builds the fleet and checks that the bridge runs.
async fn connect(settings: &Settings, adb: Option<PathBuf>) -> Result<Arc<Fleet>> {
    let runner = settings.build_runner(adb.as_deref());
    let fleet = Arc::new(Fleet::with_config(Arc::new(runner), settings.headset.clone()));
    fleet
        .initialize()
        .await
        .context("Failed to start the device bridge (use --adb or QUESTFLEET_ADB)")?;
    Ok(fleet)
}

async fn show_bridge(settings: &Settings, adb: Option<PathBuf>, json: bool) -> Result<bool> {
    let runner = settings.build_runner(adb.as_deref());
    let searched = search_paths(&SearchContext::from_process(), Platform::current());
    let available = runner.is_available().await;

    if json {
        let value = serde_json::json!({
            "path": runner.bridge_path(),
            "available": available,
            "search_paths": searched,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Bridge:    {}", runner.bridge_path().display());
        println!("Available: {}", if available { "yes" } else { "no" });
        println!("Searched:");
        for path in &searched {
            let marker = if path.exists() { "*" } else { " " };
            println!("  {marker} {}", path.display());
        }
    }
    Ok(available)
}

async fn monitor(fleet: Arc<Fleet>, interval: Duration, json: bool) -> Result<bool> {
    let (observer, mut events) = ChannelObserver::new();
    let subscriber = fleet.subscribe(Arc::new(observer)).await;

    let mut monitor = FleetMonitor::new(Arc::clone(&fleet));
    monitor.start(interval)?;
    let shutdown = shutdown_token();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => print_event(&event, json)?,
                None => break,
            },
        }
    }

    monitor.stop().await;
    fleet.unsubscribe(subscriber).await;
    Ok(true)
}

async fn record_metrics(
    fleet: Arc<Fleet>,
    settings: &Settings,
    duration: Duration,
    out: PathBuf,
    json: bool,
) -> Result<bool> {
    let started = fleet.start_metrics_recording_all(Some(duration)).await?;
    if fleet.metrics_sessions().await.is_empty() {
        bail!("No device started recording");
    }
    if !started {
        warn!("Recording did not start on every device");
    }

    let (observer, mut events) = ChannelObserver::new();
    let subscriber = fleet.subscribe(Arc::new(observer)).await;
    let mut monitor = FleetMonitor::new(Arc::clone(&fleet));
    monitor.start(settings.monitor_interval())?;

    let shutdown = shutdown_token();
    let finished = tokio::time::sleep(duration);
    tokio::pin!(finished);

    loop {
        tokio::select! {
            _ = &mut finished => break,
            _ = shutdown.cancelled() => {
                info!("Recording interrupted, stopping early");
                break;
            }
            Some(event) = events.recv() => {
                if matches!(event, FleetEvent::MetricsProgress { .. }) {
                    print_event(&event, json)?;
                }
            }
        }
    }

    monitor.stop().await;
    fleet.unsubscribe(subscriber).await;

    let stopped = fleet.stop_metrics_recording_all().await?;
    let pulled = fleet.pull_metrics_all(&out).await?;
    report(&pulled, json, describe_pull)?;

    Ok(started && stopped && pulled.values().all(Option::is_some))
}

async fn trigger_apps(fleet: &Fleet, settings: &Settings, json: bool) -> Result<bool> {
    let candidates = &settings.metrics.trigger_apps;
    if candidates.is_empty() {
        bail!("No trigger apps configured (set metrics.trigger_apps in the settings file)");
    }

    let mut results: BTreeMap<DeviceId, Option<bool>> = BTreeMap::new();
    for entry in fleet.enumerate().await? {
        if !entry.status.is_connected() {
            continue;
        }
        let device = fleet.device(&entry.id).await;
        let running = match device.has_metrics_trigger_apps(candidates).await {
            Ok(running) => Some(running),
            Err(e) => {
                warn!(device_id = %entry.id, error = %e, "Process query failed");
                None
            }
        };
        results.insert(entry.id, running);
    }

    report(&results, json, |running| match running {
        Some(true) => "trigger app running".into(),
        Some(false) => "idle".into(),
        None => "unknown".into(),
    })?;
    Ok(results.values().all(Option::is_some))
}

// ============================================================================
// Output
// ============================================================================

fn print_devices(records: &[DeviceRecord]) {
    if records.is_empty() {
        println!("No devices attached");
        return;
    }
    println!("{:<24} {:<13} {:<16} {:>7}  APPS", "ID", "STATUS", "MODEL", "BATTERY");
    for record in records {
        let battery = record
            .battery_level
            .map(|level| format!("{level}%"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<13} {:<16} {:>7}  {}",
            record.id,
            record.status,
            record.model_or_unknown(),
            battery,
            record.running_apps.len()
        );
    }
}

fn print_event(event: &FleetEvent, json: bool) -> Result<()> {
    if json {
        let value = match event {
            FleetEvent::StatusChanged { id, status } => {
                serde_json::json!({ "event": "status", "device": id, "status": status.label() })
            }
            FleetEvent::ListUpdated(devices) => {
                serde_json::json!({ "event": "list", "devices": devices })
            }
            FleetEvent::MetricsProgress { id, percent } => {
                serde_json::json!({ "event": "progress", "device": id, "percent": percent })
            }
        };
        println!("{}", serde_json::to_string(&value)?);
        return Ok(());
    }

    let now = chrono::Local::now().format("%H:%M:%S");
    match event {
        FleetEvent::StatusChanged { id, status } => println!("[{now}] {id}: {status}"),
        FleetEvent::ListUpdated(devices) => {
            let connected = devices.iter().filter(|d| d.is_connected()).count();
            println!("[{now}] {} attached, {connected} connected", devices.len());
        }
        FleetEvent::MetricsProgress { id, percent } => {
            println!("[{now}] {id}: recording {percent:.0}%")
        }
    }
    Ok(())
}

fn describe_pull(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => path.display().to_string(),
        None => "FAILED".to_string(),
    }
}

/// Prints one line per device, or the whole map as JSON.
fn report<T, F>(results: &BTreeMap<DeviceId, T>, json: bool, describe: F) -> Result<()>
where
    T: serde::Serialize,
    F: Fn(&T) -> String,
{
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No devices attached");
    }
    for (id, value) in results {
        println!("{id}: {}", describe(value));
    }
    Ok(())
}

// ============================================================================
// Signals
// ============================================================================

/// Token cancelled on the first SIGTERM/SIGINT.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown.cancel();
    });
    token
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
