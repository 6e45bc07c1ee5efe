use crate::{
    api::{self, AppState, AuthConfig},
    clock::{Clock, SystemClock},
    config::Config,
    password::PasswordHasher,
    store::PgStore,
    token::PasetoMaker,
};
use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use sqlx::{migrate::Migrator, postgres::PgPoolOptions};
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, info};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub config_path: PathBuf,
    pub listen: Option<SocketAddr>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the config is invalid, the database is unreachable,
/// migrations fail, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = Config::load(&args.config_path)
        .with_context(|| format!("Failed to load config {}", args.config_path.display()))?;
    let address = match args.listen {
        Some(address) => address,
        None => config.listen_address()?,
    };
    log_startup_args(&args, &config, address);

    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(config.db_source.expose_secret())
        .await
        .context("Failed to connect to database")?;

    if let Some(dir) = config.migration_dir() {
        debug!("Running migrations from {}", dir.display());
        Migrator::new(dir.as_path())
            .await
            .with_context(|| format!("Failed to read migrations from {}", dir.display()))?
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let tokens = PasetoMaker::new(&config.token_symmetric_key, clock.clone())
        .context("Failed to create token maker")?;

    let state = Arc::new(AppState {
        store: Arc::new(PgStore::new(pool)),
        tokens: Arc::new(tokens),
        clock,
        hasher: PasswordHasher::new(config.password_hash_cost),
        config: AuthConfig::from_config(&config),
    });

    let cors = api::cors_layer(
        &config.access_control_allow_origin,
        &config.access_control_allow_headers,
        &config.access_control_allow_methods,
    )?;

    api::serve(address, api::app(state, cors)).await
}

fn log_startup_args(args: &Args, config: &Config, address: SocketAddr) {
    let entries = [
        ("name", config.name.clone()),
        ("config", args.config_path.display().to_string()),
        ("listen", address.to_string()),
        ("dsn", redact_dsn(config.db_source.expose_secret())),
        (
            "migrations",
            config
                .migration_dir()
                .map_or_else(|| "none".to_string(), |dir| dir.display().to_string()),
        ),
        ("access_token_duration", config.access_token_duration.to_string()),
        (
            "refresh_token_duration",
            config.refresh_token_duration.to_string(),
        ),
        ("default_role", config.default_role.clone()),
    ];
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
