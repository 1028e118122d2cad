//! cooldns binary entry point.

use clap::{Parser, Subcommand};
use cooldns::record::validate_subdomain;
use cooldns::update::{self, UpdateState};
use cooldns::{
    telemetry, Config, CoolDnsError, Credential, Directory, DnsServer, DomainRecord, DurableStore,
    RecordStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Self-hosted dynamic DNS: authoritative DNS plus an update API.
#[derive(Parser, Debug)]
#[command(name = "cooldns")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML). Missing files are ignored.
    #[arg(short, long, global = true, default_value = "cooldns.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve DNS and the update API (default).
    Serve,
    /// Register a hostname with the secret used to update it.
    Register {
        /// Hostname, short or fully qualified.
        hostname: String,
        /// Update secret, at least eight characters.
        #[arg(long, env = "COOLDNS_SECRET", hide_env_values = true)]
        secret: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config: Config = config::Config::builder()
        .add_source(config::File::from(args.config.clone()).required(false))
        .add_source(
            config::Environment::with_prefix("COOLDNS")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .and_then(|c| c.try_deserialize::<Config>())
        .map_err(|e| CoolDnsError::Config(e.to_string()))?;

    // Initialize telemetry
    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!(
                config_file = %args.config.display(),
                dns_addr = %config.dns.listen_addr,
                zone = %config.dns.zone,
                store = %config.store.path.display(),
                "Starting cooldns"
            );
            if let Err(e) = serve(config).await {
                error!("cooldns error: {}", e);
                return Err(e);
            }
            info!("cooldns shutdown complete");
        }
        Command::Register { hostname, secret } => register(&config, &hostname, &secret)?,
    }

    Ok(())
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let directory = Directory::new();
    let store = Arc::new(DurableStore::open(&config.store.path, directory.clone())?);

    let dns = DnsServer::bind(&config.dns, directory.clone()).await?;
    let http_listener = match &config.http {
        Some(http) => Some(TcpListener::bind(http.listen_addr).await?),
        None => None,
    };

    // Setup graceful shutdown
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        signal_token.cancel();
    });

    let http_handle = http_listener.map(|listener| {
        let state = UpdateState::new(store.clone(), directory.clone(), config.dns.zone.clone());
        tokio::spawn(update::serve(listener, state, shutdown.clone()))
    });

    let result = dns.run(shutdown.clone()).await;
    shutdown.cancel();

    if let Some(handle) = http_handle {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("update API error: {}", e),
            Err(e) => error!("update API task failed: {}", e),
        }
    }

    if let Err(e) = store.close() {
        error!("failed to close record store: {}", e);
    }

    result.map_err(Into::into)
}

fn register(
    config: &Config,
    hostname: &str,
    secret: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let hostname = validate_subdomain(hostname, &config.dns.zone).ok_or_else(|| {
        CoolDnsError::InvalidRecord(format!(
            "{hostname:?} is not a valid name under {}",
            config.dns.zone
        ))
    })?;

    let store = DurableStore::open(&config.store.path, Directory::new())?;
    if store.get_auth(&hostname).is_some() {
        store.close()?;
        return Err(format!("{hostname} is already registered").into());
    }

    let credential = Credential::create(&hostname, secret)?;
    store.save_auth(credential)?;
    store.save_entry(DomainRecord::new(&hostname))?;
    store.close()?;

    info!(%hostname, "registered");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
