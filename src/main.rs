//! Watch Telemetry Agent CLI
//!
//! Streams smartwatch sensor readings to a collector over TCP.

use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use watch_telemetry_agent::{
    Config, ConnectionManager, ForwarderConfig, Pipeline, PipelineStats, ServerAddress,
    SessionContext, SimulatedSensors, StatusEvent, StatusHub, VERSION,
};

#[derive(Parser)]
#[command(name = "watch-telemetry")]
#[command(version = VERSION)]
#[command(about = "Smartwatch sensor telemetry forwarder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream sensor readings to the collector
    Run {
        /// Collector address as host or host:port
        #[arg(long)]
        server: Option<String>,

        /// User identifier stamped on every reading
        #[arg(long)]
        user: Option<String>,

        /// Sensors to stream (comma-separated names or ids, or "all")
        #[arg(long, default_value = "all")]
        sensors: String,

        /// Delivery rate per sensor in Hz
        #[arg(long)]
        rate: Option<u32>,

        /// Outbound queue capacity
        #[arg(long)]
        capacity: Option<usize>,

        /// Stop after this many seconds (0 = run until Ctrl+C)
        #[arg(long, default_value = "0")]
        duration: u64,
    },

    /// Check that the collector is reachable
    Probe {
        /// Collector address as host or host:port
        #[arg(long)]
        server: Option<String>,
    },

    /// List available sensors
    Sensors,

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            server,
            user,
            sensors,
            rate,
            capacity,
            duration,
        } => {
            cmd_run(server, user, &sensors, rate, capacity, duration);
        }
        Commands::Probe { server } => {
            cmd_probe(server);
        }
        Commands::Sensors => {
            cmd_sensors();
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

fn cmd_run(
    server: Option<String>,
    user: Option<String>,
    sensors: &str,
    rate: Option<u32>,
    capacity: Option<usize>,
    duration: u64,
) {
    println!("Watch Telemetry Agent v{VERSION}");
    println!();

    // Load saved configuration and apply CLI overrides.
    let mut config = Config::load().unwrap_or_default();
    if let Some(server) = server {
        match server.parse::<ServerAddress>() {
            Ok(addr) => config.server = addr,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }
    if let Some(user) = user {
        config.user_id = user;
    }
    if let Some(rate) = rate {
        config.sample_rate_hz = rate;
    }
    if let Some(capacity) = capacity {
        config.queue_capacity = capacity;
    }

    // Persist the collector address and user id for the next run.
    if let Err(e) = config.save() {
        eprintln!("Warning: could not save configuration: {e}");
    }

    let source = SimulatedSensors::new();
    let selected_ids = match source.select(sensors) {
        Ok(ids) => ids,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Run 'watch-telemetry sensors' to list available sensors.");
            std::process::exit(1);
        }
    };
    let selected_names: Vec<&str> = source
        .sensors()
        .iter()
        .filter(|s| selected_ids.contains(&s.id))
        .map(|s| s.name.as_str())
        .collect();

    println!("Starting telemetry stream...");
    println!("  Device: {}", device_tag());
    println!("  Collector: {}", config.server);
    println!("  User: {}", config.user_id);
    println!("  Sensors: {}", selected_names.join(", "));
    println!("  Rate: {} Hz per sensor", config.sample_rate_hz);
    println!("  Queue capacity: {}", config.queue_capacity);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let session = SessionContext::new(config.user_id.clone(), config.server.clone());
    let forwarder_config = ForwarderConfig {
        queue_capacity: config.queue_capacity,
        ..ForwarderConfig::default()
    };

    let pipeline = match Pipeline::start(session, forwarder_config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let mut subscription = match source.subscribe(&selected_ids, config.sample_rate_hz) {
        Ok(subscription) => subscription,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc_handler(r);

    let start = Instant::now();
    let samples = subscription.samples().clone();
    let mut forwarded: u64 = 0;

    while running.load(Ordering::SeqCst) {
        if duration > 0 && start.elapsed() >= Duration::from_secs(duration) {
            break;
        }

        match samples.recv_timeout(Duration::from_millis(100)) {
            Ok(sample) => {
                if forwarded < 5 || forwarded % 100 == 0 {
                    println!(
                        "  {} [{}] x={:.2} y={:.2} z={:.2}",
                        sample.sensor_name,
                        sample.timestamp_millis,
                        sample.axes[0],
                        sample.axes[1],
                        sample.axes[2]
                    );
                }
                pipeline.submit(&sample);
                forwarded += 1;
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                eprintln!("Sensor stream ended unexpectedly");
                break;
            }
        }

        // Surface pipeline status as it changes.
        for event in pipeline.status_events().try_iter() {
            match event {
                StatusEvent::ConnectionChanged(state) => {
                    println!("[connection] {state}");
                }
                StatusEvent::QueueOverflow { evicted_sequence } => {
                    eprintln!("[queue] overflow, evicted message #{evicted_sequence}");
                }
                StatusEvent::Undeliverable { sequence } => {
                    eprintln!("[delivery] dropped message #{sequence} after retries");
                }
                StatusEvent::Delivered { .. } => {}
            }
        }
    }

    println!();
    println!("Stopping telemetry stream...");
    subscription.stop();
    let final_stats = pipeline.stop();

    println!();
    println!("{}", final_stats.summary());
}

fn cmd_probe(server: Option<String>) {
    let mut config = Config::load().unwrap_or_default();
    if let Some(server) = server {
        match server.parse::<ServerAddress>() {
            Ok(addr) => config.server = addr,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }

    println!("Probing collector at {}...", config.server);

    let stats = Arc::new(PipelineStats::new());
    let (hub, _events) = StatusHub::new(stats);
    let mut conn = ConnectionManager::new(config.server.clone(), &ForwarderConfig::default(), hub);

    match conn.ensure_connected() {
        Ok(()) => {
            println!("Collector reachable: OK");
            conn.close();
        }
        Err(e) => {
            eprintln!("Collector unreachable: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_sensors() {
    let source = SimulatedSensors::new();

    println!("Available sensors:");
    for info in source.sensors() {
        println!("  {:>3}  {}", info.id, info.name);
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}

/// Per-run device tag for display and logs.
fn device_tag() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("watch-{}-{}", host, &uuid::Uuid::new_v4().to_string()[..8])
}
