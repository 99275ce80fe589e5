//! Scanlink relay — entry point.
//!
//! ```text
//! scanlink-relay                   Run with defaults / config file
//! scanlink-relay --config <path>   Load a custom config TOML
//! scanlink-relay --port <port>     Override the listen port
//! scanlink-relay --gen-config      Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scanlink_relay::config::RelayConfig;
use scanlink_relay::server::RelayServer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "scanlink-relay", about = "Scanlink pairing relay server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "scanlink-relay.toml")]
    config: PathBuf,

    /// Override the configured listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&RelayConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config.
    let mut config = RelayConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.listen_port = port;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("scanlink-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("listen port: {}", config.network.listen_port);
    info!(
        "session ttl: {}s, sweep every {}s",
        config.session.ttl_secs, config.session.sweep_interval_secs
    );

    let server = RelayServer::new(config);
    let shutdown = server.shutdown_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received — shutting down");
        shutdown.cancel();
    });

    server.run().await?;

    Ok(())
}
