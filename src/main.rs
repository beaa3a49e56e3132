//! CLI for mqtt-loadgen
//!
//! Subcommands:
//! - `run`: run a load test and print the report
//! - `ping`: connect one thing, subscribe and publish once (useful for smoke tests)

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use mqtt_loadgen::client::LoadClient;
use mqtt_loadgen::config::{Settings, load_config_from};
use mqtt_loadgen::outcome::MemorySink;
use mqtt_loadgen::runner;
use mqtt_loadgen::scenario::{publish_label, qos_from_level, subscribe_label};
use mqtt_loadgen::session::RumqttSession;
use mqtt_loadgen::tracker::{PublishOptions, SubscribeOptions};
use mqtt_loadgen::utils::{LoadError, logging};
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "mqtt-loadgen", version, about)]
struct Cli {
    /// Configuration file (default: config/default.toml, if present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a load test
    Run(RunArgs),
    /// Connect a single thing, subscribe and publish once
    Ping(PingArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Number of simulated things
    #[arg(long)]
    users: Option<usize>,
    /// Things started per second
    #[arg(long)]
    hatch_rate: Option<f64>,
    /// Run time in seconds, 0 runs until Ctrl-C
    #[arg(long)]
    duration: Option<u64>,
    /// Write the report as JSON to this path
    #[arg(long)]
    report: Option<String>,
}

#[derive(Args)]
struct PingArgs {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long, default_value = "mqtt-loadgen/ping")]
    topic: String,
    /// Seconds to wait for the connection and the acknowledgments
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = match load_config_from(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.log.level);

    let result = match cli.command {
        Command::Run(args) => run_load(settings, args).await,
        Command::Ping(args) => ping(settings, args).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_load(mut settings: Settings, args: RunArgs) -> Result<bool, LoadError> {
    if let Some(host) = args.host {
        settings.broker.host = host;
    }
    if let Some(port) = args.port {
        settings.broker.port = port;
    }
    if let Some(users) = args.users {
        settings.load.users = users;
    }
    if let Some(rate) = args.hatch_rate {
        settings.load.hatch_rate = rate;
    }
    if let Some(duration) = args.duration {
        settings.load.duration_secs = duration;
    }
    if let Some(report) = args.report {
        settings.load.report_path = Some(report);
    }
    let report_path = settings.load.report_path.clone();

    let stats = runner::run(settings, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await?;

    println!("{}", stats.render_table());
    if let Some(path) = report_path {
        stats.write_json(path)?;
    }
    Ok(true)
}

async fn ping(mut settings: Settings, args: PingArgs) -> Result<bool, LoadError> {
    if let Some(host) = args.host {
        settings.broker.host = host;
    }
    if let Some(port) = args.port {
        settings.broker.port = port;
    }
    runner::validate(&settings)?;
    let qos = qos_from_level(settings.load.qos)?;
    let timeout = Duration::from_secs(args.timeout);

    let id = format!("{}-ping-{}", settings.load.client_id_prefix, Uuid::new_v4());
    let sink = Arc::new(MemorySink::new());
    let session = Arc::new(RumqttSession::new(id.clone(), settings.broker.clone()));
    let client = LoadClient::new(id, session, sink.clone(), &settings.reconnect);

    let tls_ok = !settings.tls.enabled || client.configure_tls(&settings.tls);
    if tls_ok && client.connect(&settings.broker.host, settings.broker.port) {
        let deadline = Instant::now() + timeout;
        if wait_until(deadline, || client.is_connected()).await {
            info!("Connected to {}:{}", settings.broker.host, settings.broker.port);
            client.subscribe(
                &args.topic,
                SubscribeOptions::default()
                    .with_qos(qos)
                    .with_label(subscribe_label(qos, &args.topic)),
            );
            client.publish(
                &args.topic,
                settings.load.payload.as_bytes(),
                PublishOptions::default()
                    .with_qos(qos)
                    .with_label(publish_label(qos, &args.topic)),
            );
            if !wait_until(deadline, || client.pending() == 0).await {
                client.tracker().sweep_expired();
            }
        } else {
            warn!("No connection within {:?}", timeout);
        }
        client.shutdown();
    }

    let events = sink.events();
    for event in &events {
        let outcome = match event.failure_kind() {
            None => "ok".to_string(),
            Some(kind) => kind.to_string(),
        };
        println!(
            "{:<6} {:<40} {:>6} ms {:>6} B  {}",
            event.category, event.label, event.elapsed_ms, event.response_size, outcome
        );
    }
    let pending = client.pending();
    if pending > 0 {
        println!("{pending} operation(s) unacknowledged");
    }
    Ok(pending == 0 && !events.is_empty() && events.iter().all(|e| e.is_success()))
}

async fn wait_until(deadline: Instant, mut done: impl FnMut() -> bool) -> bool {
    while !done() {
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    true
}
