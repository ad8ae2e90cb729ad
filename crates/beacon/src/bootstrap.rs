//! Process startup.
//!
//! Loads the configuration once, installs logging, connects the data store
//! and serves until shutdown. Every step returns a [`GatewayError`] so the
//! entry point can log it and exit with status 1.

use std::path::Path;
use std::sync::Arc;

use beacon_config::{AppConfig, ConfigLoader, Environment, LogFormat};
use beacon_server::{App, Server, ServerConfig, ShutdownSignal};
use beacon_store::{DataStore, MemoryStore, PgStore, PgStoreOptions};
use beacon_telemetry::{init_logging, LogConfig};
use tracing::info;

use crate::cli::RunOptions;
use crate::error::GatewayResult;

/// Builds the configuration: defaults, then `path` if given, then `.env`,
/// then process environment overrides.
pub fn load_config(path: Option<&Path>) -> GatewayResult<AppConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = path {
        loader = loader.with_file(path)?;
    }
    Ok(loader.with_dotenv().with_env().load()?)
}

/// The logging preset for the active environment with the configured
/// overrides applied.
#[must_use]
pub fn log_config(config: &AppConfig) -> LogConfig {
    let mut log = match config.environment {
        Environment::Production => LogConfig::production(),
        Environment::Development => LogConfig::development(),
        Environment::Test => LogConfig::test(),
    };

    if let Some(level) = &config.logging.level {
        log = log.with_level(level.to_lowercase());
    }
    if let Some(format) = config.logging.format {
        log = log.with_json(format == LogFormat::Json);
    }
    if let Some(colorize) = config.logging.colorize {
        log.ansi = colorize && !log.json_format;
    }
    log
}

/// Connects the store selected by the active database profile.
///
/// A profile without a URL gets the in-memory store; otherwise a PostgreSQL
/// pool is opened and a failed connection is returned as an error.
pub async fn connect_store(config: &AppConfig) -> GatewayResult<Arc<dyn DataStore>> {
    let profile = config.database_profile();
    let Some(url) = &profile.url else {
        info!(environment = %config.environment, "no database URL, using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let options = PgStoreOptions {
        url: url.clone(),
        max_connections: profile.max_connections,
        connect_timeout: profile.connect_timeout(),
    };
    Ok(Arc::new(PgStore::connect(&options).await?))
}

/// Connects the store and serves `config` until `shutdown` fires.
pub async fn serve(config: &AppConfig, shutdown: ShutdownSignal) -> GatewayResult<()> {
    let store = connect_store(config).await?;
    let server_config = ServerConfig::from_app_config(config)?;

    info!(
        version = crate::VERSION,
        environment = %config.environment,
        store = store.backend(),
        "starting beacon"
    );

    Server::new(server_config, App::new(config, store))
        .run_with_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Full startup for the binary: configuration, logging, then [`serve`]
/// until SIGINT or SIGTERM.
pub async fn run(options: RunOptions) -> GatewayResult<()> {
    let env_path = std::env::var_os(crate::cli::CONFIG_ENV).map(Into::into);
    let config = load_config(options.config_path(env_path).as_deref())?;
    init_logging(&log_config(&config))?;

    serve(&config, ShutdownSignal::with_os_signals()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_config::LoggingSettings;
    use std::io::Write;

    fn config(environment: Environment) -> AppConfig {
        AppConfig {
            environment,
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_log_presets_follow_environment() {
        assert!(log_config(&config(Environment::Production)).json_format);

        let dev = log_config(&config(Environment::Development));
        assert!(!dev.json_format);
        assert!(dev.ansi);
        assert_eq!(dev.level, "debug");

        assert_eq!(log_config(&config(Environment::Test)).level, "warn");
    }

    #[test]
    fn test_log_overrides() {
        let mut app = config(Environment::Development);
        app.logging = LoggingSettings {
            level: Some("INFO".into()),
            format: Some(LogFormat::Json),
            colorize: Some(true),
        };

        let log = log_config(&app);
        assert_eq!(log.level, "info");
        assert!(log.json_format);
        // JSON output is never coloured
        assert!(!log.ansi);

        app.logging.format = Some(LogFormat::Pretty);
        app.logging.colorize = Some(false);
        let log = log_config(&app);
        assert!(!log.json_format);
        assert!(!log.ansi);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "port = 9100\n\n[rate_limit]\nmax = 5").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.rate_limit.max, 5);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/beacon.toml"))).unwrap_err();
        assert!(matches!(err, crate::GatewayError::Config(_)));
    }

    #[tokio::test]
    async fn test_memory_store_without_url() {
        let store = connect_store(&AppConfig::default()).await.unwrap();
        assert_eq!(store.backend(), "memory");
    }
}
