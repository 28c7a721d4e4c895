//! `rover-cli` – Rover Command Line Interface
//!
//! The process bootstrap for the rover stack.  It:
//!
//! 1. Loads `~/.rover/config.toml` (or the path given as the first argument),
//!    writing the defaults there on first run.
//! 2. Wires the drive train, proximity guard, battery watchdog, and
//!    simulated collaborators into an [`Orchestrator`].
//! 3. Reads typed intent batches from stdin until told to quit, the battery
//!    goes critical, or stdin closes.
//! 4. Intercepts **Ctrl-C** to leave the main loop and bring every actuator
//!    to rest.

mod config;
mod console;

use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

use rover_hal::drive::{DriveTrain, Motors};
use rover_hal::gesture::ServoArms;
use rover_hal::gripper::ServoGripper;
use rover_hal::sensor::{DistanceSource, share_sensor};
use rover_hal::sim::{EnvVoltage, SimulatedUltrasonic};
use rover_kernel::battery::BatteryMonitor;
use rover_kernel::safe_shutdown::{HostHalt, SafeShutdown, ShutdownMode};
use rover_kernel::wall_guard::WallGuard;
use rover_runtime::bus::Topic;
use rover_runtime::orchestrator::{Collaborators, ExitReason, Orchestrator, OrchestratorConfig};
use rover_runtime::telemetry::init_tracing;
use rover_runtime::vision::SceneVision;
use rover_types::{EventPayload, RoverError};

use crate::config::Config;
use crate::console::{ConsoleSpeech, DirectIntentSource};

/// Volts reported by the simulated battery probe when its variable is unset.
const DEFAULT_SIM_VOLTS: f32 = 12.0;

fn main() -> ExitCode {
    // Honours RUST_LOG, ROVER_LOG_FORMAT=json and OTEL_EXPORTER_OTLP_ENDPOINT.
    // The console itself still uses println! for the operator.
    let _telemetry = init_tracing("rover");

    print_banner();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::config_path);
    let cfg = match config::load_or_init(&path) {
        Ok((cfg, true)) => {
            println!(
                "  {} Default config written to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            cfg
        }
        Ok((cfg, false)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            Config::default()
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(drive_rover(cfg)) {
        Ok(reason) => {
            let message = match reason {
                ExitReason::Quit => "Goodbye.",
                ExitReason::BatteryCritical => "Battery critical – rover halted.",
                ExitReason::Interrupted => "Interrupted – rover halted.",
                ExitReason::InputClosed => "Input closed – rover halted.",
            };
            println!("{}", message.green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {}", "Startup failed".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn drive_rover(cfg: Config) -> Result<ExitReason, RoverError> {
    if !cfg.simulate {
        warn!("no GPIO motor backend is built in; driving simulated motors");
    }
    let drive = Arc::new(DriveTrain::new(cfg.drive.clone(), Motors::Simulated)?);

    let guard = if cfg.guard.enabled {
        Some(WallGuard::new(
            share_sensor(SimulatedUltrasonic::new()),
            cfg.guard.thresholds,
        )?)
    } else {
        None
    };

    let battery = BatteryMonitor::new(
        Box::new(EnvVoltage::new(cfg.battery_env.clone(), DEFAULT_SIM_VOLTS)),
        cfg.battery,
    )?;
    let mode = if cfg.simulate {
        ShutdownMode::Simulated
    } else {
        ShutdownMode::Halt(Box::new(HostHalt::new()))
    };
    let watchdog = SafeShutdown::new(battery, Arc::clone(&drive), mode);

    let collaborators = Collaborators {
        gestures: Arc::new(Mutex::new(ServoArms::simulated())),
        gripper: Arc::new(Mutex::new(ServoGripper::simulated())),
        vision: Arc::new(SceneVision::demo()),
        speech: Arc::new(ConsoleSpeech::stdin()),
    };
    let settings = OrchestratorConfig {
        auto_start: cfg.auto_start,
        autonomy: cfg.autonomy,
        battery_interval: cfg.watchdog_interval(),
        persona: cfg.persona.clone(),
        ..OrchestratorConfig::default()
    };
    let mut orchestrator = Orchestrator::new(drive, guard, watchdog, collaborators, settings, || {
        Box::new(SimulatedUltrasonic::new()) as Box<dyn DistanceSource>
    });

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let interrupter = orchestrator.interrupter();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – bringing the rover to rest …".yellow().bold());
        interrupter.stop();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Safety alerts on the console ──────────────────────────────────────
    let mut alerts = orchestrator.bus().subscribe_to(Topic::SafetyAlerts);
    let alert_printer = tokio::spawn(async move {
        while let Some(event) = alerts.recv().await {
            match event.payload {
                EventPayload::ObstacleDetected { distance_cm } => {
                    println!("{} obstacle at {distance_cm:.0} cm", "[GUARD]".yellow().bold());
                }
                EventPayload::PathClear { distance_cm } => {
                    println!("{} path clear ({distance_cm:.0} cm)", "[GUARD]".green().bold());
                }
                EventPayload::ShutdownInitiated { voltage } => {
                    println!("{} critical battery at {voltage:.2} V", "[POWER]".red().bold());
                }
                EventPayload::Battery { .. } => {}
            }
        }
    });

    print_help();
    orchestrator.start().await;
    let reason = orchestrator.run(&DirectIntentSource).await;
    orchestrator.shutdown().await;
    alert_printer.abort();
    Ok(reason)
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"    ____                      "#.bold().cyan());
    println!("{}", r#"   / __ \____ _   _____  _____"#.bold().cyan());
    println!("{}", r#"  / /_/ / __ \ | / / _ \/ ___/"#.bold().cyan());
    println!("{}", r#" / _, _/ /_/ / |/ /  __/ /    "#.bold().cyan());
    println!("{}", r#"/_/ |_|\____/|___/\___/_/     "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Rover".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Actuation arbitration console");
    println!();
}

fn print_help() {
    println!("  Type actions as {} tokens or a JSON intent batch:", "type:value".bold());
    println!("    {}", "movement:forward  movement:left  movement:stop".dimmed());
    println!("    {}", "gesture:wave  gripper:toggle  arms:set:0.5:-0.5".dimmed());
    println!("    {}", "tuning:speed_set:0.8  task:grab:red cube  vision:describe".dimmed());
    println!("    {}", "autonomy:start  autonomy:stop  speech:hello there".dimmed());
    println!("  Say {} to exit.\n", "quit".bold().cyan());
}
