//! Eco-impact HTTP service.
//!
//! Serves products, alternates, users and per-user impact totals from a
//! PostgreSQL store. Every setting can come from a flag or its environment
//! variable; the database settings use the same variables as
//! `ConnectionConfig::from_env`.

use std::io::IsTerminal;
use std::net::SocketAddr;

use anyhow::Context;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use ecoimpact_common::config::ConnectionConfig;
use ecoimpact_common::impact::{ImpactWindow, DEFAULT_LOOKBACK_HOURS};
use ecoimpact_service::{router, AppState};
use ecoimpact_store::auth::PlaintextCredentials;
use ecoimpact_store::postgres::PgConnector;
use ecoimpact_store::Store;
use tracing::info;

#[derive(Parser)]
#[command(name = "ecoimpact-service", about = "Eco-impact data service")]
struct Cli {
    /// Database host, optionally `host:port`.
    #[arg(long, env = "DB_SERVER")]
    db_server: String,

    #[arg(long, env = "DB_NAME")]
    db_name: String,

    #[arg(long, env = "DB_USER")]
    db_user: String,

    #[arg(long, env = "DB_PASS", hide_env_values = true)]
    db_pass: String,

    /// Require TLS to the database.
    #[arg(long, env = "DB_ENCRYPT", default_value_t = true, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    db_encrypt: bool,

    /// Skip certificate and hostname verification when encrypting.
    #[arg(long, env = "DB_TRUST_SERVER_CERT", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    db_trust_server_cert: bool,

    /// Connection timeout in seconds.
    #[arg(long, env = "DB_TIMEOUT", default_value_t = 30)]
    db_timeout: u64,

    /// HTTP port to listen on.
    #[arg(long, env = "PORT", default_value_t = 10000)]
    port: u16,

    /// Lookback for per-user impact totals, in hours.
    #[arg(long, env = "IMPACT_WINDOW_HOURS", default_value_t = DEFAULT_LOOKBACK_HOURS, value_parser = clap::value_parser!(i64).range(1..))]
    impact_window_hours: i64,
}

impl Cli {
    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            server: self.db_server.clone(),
            database: self.db_name.clone(),
            user: self.db_user.clone(),
            password: self.db_pass.clone(),
            encrypt: self.db_encrypt,
            trust_server_certificate: self.db_trust_server_cert,
            timeout_seconds: self.db_timeout,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let ansi = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tokio_postgres=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.connection_config();
    config.host_and_port().context("invalid --db-server")?;
    let connector = PgConnector::new(&config).context("failed to configure database connector")?;
    info!(?config, "database configured");

    let app = router(AppState {
        store: Store::new(connector.clone()),
        credentials: PlaintextCredentials::new(connector),
        window: ImpactWindow::hours(cli.impact_window_hours),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
