use std::sync::Arc;

use clap::Clap;
use color_eyre::eyre::Report;
use tokio::net::TcpListener;
use tracing::{error, info};

use battlespy_registry::{Database, MySqlDatabase, Registry};

mod config;
mod context;
mod session;

use config::Config;
use context::AppContext;
use session::Session;

#[derive(Clap, Debug)]
struct Opts {
    /// Path to the TOML configuration file.
    #[clap(short, long, default_value = "battlespy.toml")]
    config: String,
}

#[tokio::main]
pub async fn main() -> Result<(), Report> {
    install_tracing();
    color_eyre::install()?;

    let opts: Opts = Opts::parse();

    let config = match Config::load(&opts.config) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, path = %opts.config, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let database = match MySqlDatabase::connect(&config.database.connection_string()).await {
        Ok(database) => database,
        Err(err) => {
            error!(error = %err, "failed to connect to database");
            std::process::exit(1);
        }
    };
    let database: Arc<dyn Database> = Arc::new(database);

    let registry = Arc::new(Registry::new(database));

    let listen_addr = format!("{}:{}", config.server.listen_address, config.server.listen_port);
    let listener = match TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, addr = %listen_addr, "failed to bind listen address");
            std::process::exit(1);
        }
    };
    info!(addr = %listen_addr, "listening for battlespy queries");

    let context = Arc::new(AppContext::new(registry, config));

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        error!(error = %err, "failed to accept connection");
                        continue;
                    }
                };

                let context = context.clone();
                tokio::spawn(async move {
                    let session = Session::new(stream, peer_addr, context);
                    session.run().await;
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal, closing listener");
                return Ok(());
            }
        }
    }
}

fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let fmt_layer = fmt::layer().with_target(false);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}
