use anyhow::Result;
use chrono::Duration;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};

use helpdesk_server::auth::{AuthError, AuthService};
use helpdesk_server::config::Config;
use helpdesk_server::lifecycle::{LifecycleService, SelfDealingForbidden};
use helpdesk_server::repository::SqliteRepository;
use helpdesk_server::{app, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting help desk server");

    let config =
        Config::from_env().expect("Failed to load configuration from environment variables");

    let db_path = config.state_dir.join("helpdesk-state.db");
    info!("Using state database: {}", db_path.display());
    let repo =
        Arc::new(SqliteRepository::new(&db_path).expect("Failed to initialize SQLite database"));

    let lifecycle = LifecycleService::new(repo.clone(), Arc::new(SelfDealingForbidden));
    let auth = AuthService::new(
        repo,
        Duration::seconds(config.token_idle_timeout_secs),
    );

    if let Some((username, password)) = &config.bootstrap_admin {
        match auth.create_account(username, password, true).await {
            Ok(actor) => info!(username = %actor.username, "created bootstrap administrator"),
            Err(AuthError::UsernameTaken) => {
                info!(%username, "bootstrap administrator already exists")
            }
            Err(e) => return Err(e.into()),
        }
    }

    let app_state = Arc::new(AppState { lifecycle, auth });
    let app = app(app_state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
