use clap::{Parser, ValueEnum};
use gate_server::backend::{Backend, Echo, Relay};
use gate_server::config::ConfigFile;
use gate_server::id_generator::SequentialIds;
use gate_server::network::Gateway;
use gate_server::registry::Registry;
use gate_server::router::Router;
use log::{error, info};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Which backend answers inbound packets
#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendMode {
    /// Send each payload back to its sender
    Echo,
    /// Broadcast each payload to every connection
    Relay,
}

/// Command line arguments. Anything given here overrides the config file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Server IP address to bind to
    #[arg(short = 'H', long)]
    host: Option<IpAddr>,
    /// Server port to listen on
    #[arg(short, long)]
    port: Option<u16>,
    /// Maximum number of concurrent connections
    #[arg(long)]
    max_connections: Option<usize>,
    /// Backend answering inbound packets
    #[arg(short, long, value_enum, default_value = "echo")]
    backend: BackendMode,
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

/// Loads configuration, binds the listener and serves until Ctrl+C.
#[tokio::main]
async fn main() {
    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => ConfigFile::load(path),
        None => Ok(ConfigFile::default()),
    };

    let level = args
        .log_level
        .clone()
        .or_else(|| loaded.as_ref().ok().map(|file| file.logging.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut file = match loaded {
        Ok(file) => file,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    if let Some(host) = args.host {
        file.gateway.host = host;
    }
    if let Some(port) = args.port {
        file.gateway.port = port;
    }
    if let Some(max_connections) = args.max_connections {
        file.gateway.max_connections = max_connections;
    }
    let config = match file.into_gateway_config() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let backend: Arc<dyn Backend> = match args.backend {
        BackendMode::Echo => Arc::new(Echo),
        BackendMode::Relay => Arc::new(Relay),
    };
    info!("backend: {:?}", args.backend);
    let registry = Arc::new(Registry::new(config.max_connections));
    let router = Arc::new(Router::new(registry, backend));

    let gateway = match Gateway::bind(Arc::clone(&config), Arc::new(SequentialIds::new()), router).await {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            error!("cannot listen on {}: {}", config.listen_addr, e);
            std::process::exit(1);
        }
    };

    tokio::select! {
        _ = gateway.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }
}
