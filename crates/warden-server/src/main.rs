//! Network Warden
//!
//! Control plane server for one warden: holder identity, node admission,
//! ID allocation and confirmation quotas.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tonic::transport::Server;
use tracing::{info, warn};

use warden_core::config::{WardenConfig, load_config};
use warden_core::tracing_init::init_tracing;
use warden_server::ControlPlane;
use warden_server::notifications::{Dispatcher, LogDispatcher};
use warden_server::server::health_service;
use warden_server::storage::WardenDatabase;

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version, about = "Network warden - registry and admission authority")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:9090")]
    addr: SocketAddr,

    /// Path to a JSON configuration file.
    #[arg(long, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Path to SQLite database file.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JWT secret key.
    #[arg(long, env = "WARDEN_JWT_SECRET", default_value = "dev-secret-change-me")]
    jwt_secret: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,

    /// Email of an admin account to create on startup if missing.
    #[arg(long, env = "WARDEN_BOOTSTRAP_ADMIN_EMAIL", requires = "bootstrap_admin_password")]
    bootstrap_admin_email: Option<String>,

    /// Password of the bootstrap admin.
    #[arg(long, env = "WARDEN_BOOTSTRAP_ADMIN_PASSWORD", hide_env_values = true)]
    bootstrap_admin_password: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if args.log_json {
        config.logging.json = true;
    }
    if let Some(path) = &args.db_path {
        config.database.path = Some(path.clone());
    }
    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        warden_id = config.app.warden_id,
        top_node = config.app.id_gen_top_node,
        "Starting warden"
    );
    if args.jwt_secret == "dev-secret-change-me" {
        warn!("Using the development JWT secret; set WARDEN_JWT_SECRET in production");
    }

    let db_path = match &config.database.path {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    info!(path = %db_path.display(), "Opening warden database");
    let db = WardenDatabase::open(&db_path).await?;

    let dispatcher = build_dispatcher(&config)?;
    let plane = ControlPlane::new(db, &config, args.jwt_secret.as_bytes(), dispatcher)?;

    if let (Some(email), Some(password)) =
        (&args.bootstrap_admin_email, &args.bootstrap_admin_password)
    {
        let admin = plane.admins.ensure_admin(email, password).await?;
        info!(admin_id = admin.id, "Bootstrap admin ready");
    }

    let router = Server::builder()
        .http2_keepalive_interval(Some(Duration::from_secs(30)))
        .http2_keepalive_timeout(Some(Duration::from_secs(10)))
        .add_service(health_service().await);

    info!(addr = %args.addr, "Warden serving (plaintext)");
    tokio::select! {
        result = router.serve(args.addr) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Warden stopped");
    Ok(())
}

#[cfg(feature = "http-dispatch")]
fn build_dispatcher(config: &WardenConfig) -> anyhow::Result<Arc<dyn Dispatcher>> {
    use warden_server::notifications::gateway::HttpDispatcher;

    let notifications = &config.notifications;
    match &notifications.gateway_url {
        Some(url) => {
            info!(url = %url, "Delivering notifications through HTTP gateway");
            Ok(Arc::new(HttpDispatcher::connect(
                url,
                notifications.sender_email.clone(),
                notifications.sender_sms.clone(),
            )?))
        }
        None => Ok(Arc::new(LogDispatcher)),
    }
}

#[cfg(not(feature = "http-dispatch"))]
#[allow(clippy::unnecessary_wraps)]
fn build_dispatcher(config: &WardenConfig) -> anyhow::Result<Arc<dyn Dispatcher>> {
    if config.notifications.gateway_url.is_some() {
        warn!("gateway_url is set but the http-dispatch feature is disabled; messages are only logged");
    }
    Ok(Arc::new(LogDispatcher))
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let data = dirs::data_local_dir()
        .ok_or_else(|| anyhow::anyhow!("Cannot determine local data directory"))?;
    Ok(data.join("warden").join("warden.db"))
}
