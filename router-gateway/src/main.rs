//! # Router Gateway Binary
//!
//! Entry point: parse CLI args, load config, initialize logging, build the
//! server, and serve.
//!
//! ```bash
//! router-gateway --config my-config.toml --host 0.0.0.0 --port 8080
//! ```

use clap::Parser;
use router_gateway::config::{Config, LogFormat};
use router_gateway::server::create_server;
use std::net::SocketAddr;

/// Command line arguments for the gateway server.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Port to override the configured server port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to override the configured server host.
    #[arg(long)]
    host: Option<String>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

fn init_logging(level: &str, format: LogFormat) {
    let subscriber = tracing_subscriber::fmt().with_env_filter(level);
    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Config::load(&args.config)?;

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    init_logging(&config.logging.level, config.logging.format);
    config.validate()?;

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let app = create_server(config).await?;

    tracing::info!("starting router-gateway on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
