mod config;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use umbra_api::auth::{AppState, AppStateInner, hash_password};
use umbra_api::routes;
use umbra_db::Database;
use umbra_db::models::NewUser;
use umbra_gateway::activity::{self, ActivityTracker};
use umbra_gateway::dispatcher::Dispatcher;
use umbra_types::models::Role;

use crate::config::Config;

const PRUNE_EVERY: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "umbra=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Database::open(&config.db_path)?;
    seed(&db, &config)?;

    // Online users are pruned in the background
    let activity = ActivityTracker::new();
    tokio::spawn(activity::run_prune_loop(
        activity.clone(),
        config.online_window,
        PRUNE_EVERY,
    ));

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret,
        token_ttl: config.token_ttl,
        dispatcher: Dispatcher::new(),
        activity,
        online_window: config.online_window,
    });

    let app = routes::router(state);

    info!("Umbra Magica server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Creates the configured admin account and bootstrap invite if missing.
fn seed(db: &Database, config: &Config) -> anyhow::Result<()> {
    if let Some(admin) = &config.seed_admin {
        if db.get_user_row_by_username(&admin.username)?.is_none() {
            let password_hash = hash_password(&admin.password)?;
            let user = db.create_user(&NewUser {
                username: &admin.username,
                email: &admin.email,
                password_hash: &password_hash,
                role: Role::Admin,
            })?;
            info!("Seeded admin account {} ({})", user.username, user.id);
        }
    }

    if let Some(code) = &config.bootstrap_invite {
        if db.get_invite(code)?.is_none() {
            db.create_invite(code, None)?;
            info!("Seeded bootstrap invite code");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
