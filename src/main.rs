//! MQTT broker entrypoint: parses CLI flags, loads layered configuration,
//! installs structured logging, and runs the broker until shutdown
//! (SPEC_FULL §10.4).
//!
//! Usage:
//!   mqttbroker [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>        Configuration file path
//!   --mqtt-host <HOST>         MQTT listener bind host
//!   --mqtt-port <PORT>         MQTT listener bind port
//!   --web-port <PORT>          Admin web port (stored, not served by this crate)
//!   --allow-anonymous          Allow unauthenticated clients
//!   --max-connections <N>      Maximum concurrent connections
//!   --max-keepalive <SECONDS>  Maximum accepted keep-alive

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mqttbroker::config::Config;
use mqttbroker::Broker;

/// MQTT 3.1.1 broker
#[derive(Parser, Debug)]
#[command(name = "mqttbroker")]
#[command(about = "A lightweight MQTT 3.1.1 message broker")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// MQTT listener bind host
    #[arg(long)]
    mqtt_host: Option<String>,

    /// MQTT listener bind port
    #[arg(long)]
    mqtt_port: Option<u16>,

    /// Admin web port (accepted for configuration compatibility; this crate
    /// does not itself start a web server on it)
    #[arg(long)]
    web_port: Option<u16>,

    /// Allow unauthenticated (anonymous) clients
    #[arg(long)]
    allow_anonymous: bool,

    /// Maximum concurrent connections
    #[arg(long)]
    max_connections: Option<usize>,

    /// Maximum accepted keep-alive, in seconds
    #[arg(long)]
    max_keepalive: Option<u16>,
}

fn apply_overrides(mut config: Config, args: &Args) -> Config {
    if let Some(host) = &args.mqtt_host {
        config.host = host.clone();
    }
    if let Some(port) = args.mqtt_port {
        config.port = port;
    }
    if let Some(web_port) = args.web_port {
        config.web_port = web_port;
    }
    if args.allow_anonymous {
        config.allow_anonymous = true;
    }
    if let Some(max_connections) = args.max_connections {
        config.max_connections = max_connections;
    }
    if let Some(max_keepalive) = args.max_keepalive {
        config.max_keepalive_seconds = max_keepalive;
    }
    config
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    let config = apply_overrides(config, &args);
    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        return ExitCode::FAILURE;
    }

    let broker = std::sync::Arc::new(Broker::new(config));

    let ctrl_c_broker = broker.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl-C, shutting down");
            ctrl_c_broker.shutdown();
        }
    });

    if let Err(e) = broker.run().await {
        error!(error = %e, "broker exited with an error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
