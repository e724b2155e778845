use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-key",
];

pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub token_ttl: chrono::Duration,
    pub online_window: Duration,
    pub seed_admin: Option<SeedAdmin>,
    pub bootstrap_invite: Option<String>,
}

/// Admin account created at startup when its username is still free.
pub struct SeedAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = std::env::var("UMBRA_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            eprintln!("FATAL: UMBRA_JWT_SECRET is unset or still a placeholder.");
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }

        let host = std::env::var("UMBRA_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("UMBRA_PORT")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .context("UMBRA_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .context("UMBRA_HOST is not a valid address")?;

        let db_path: PathBuf = std::env::var("UMBRA_DB_PATH")
            .unwrap_or_else(|_| "umbra.db".into())
            .into();

        let ttl_days: i64 = parsed_or("UMBRA_TOKEN_TTL_DAYS", 7);
        let online_window_secs: u64 = parsed_or("UMBRA_ONLINE_WINDOW_SECS", 600);

        let seed_admin = match (
            non_empty("UMBRA_ADMIN_USERNAME"),
            non_empty("UMBRA_ADMIN_EMAIL"),
            non_empty("UMBRA_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(email), Some(password)) => Some(SeedAdmin {
                username,
                email,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            token_ttl: chrono::Duration::days(ttl_days),
            online_window: Duration::from_secs(online_window_secs),
            seed_admin,
            bootstrap_invite: non_empty("UMBRA_BOOTSTRAP_INVITE"),
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
