//! Command-line arguments.

use std::path::PathBuf;

use crate::error::{GatewayError, GatewayResult};

/// Environment variable naming the configuration file when `--config` is absent.
pub const CONFIG_ENV: &str = "BEACON_CONFIG";

/// What the binary was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start the gateway.
    Run(RunOptions),
    /// Print usage.
    Help,
    /// Print the version.
    Version,
}

/// Options for [`Command::Run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Path to a TOML or JSON configuration file.
    pub config: Option<PathBuf>,
}

impl Command {
    /// Parses arguments, excluding the program name.
    pub fn parse_from<I, S>(args: I) -> GatewayResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);
        let mut options = RunOptions::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    let path = args.next().ok_or_else(|| {
                        GatewayError::Usage(format!("{arg} requires a path"))
                    })?;
                    options.config = Some(PathBuf::from(path));
                }
                "--help" | "-h" => return Ok(Self::Help),
                "--version" | "-v" => return Ok(Self::Version),
                other => {
                    return Err(GatewayError::Usage(format!("unknown argument: {other}")));
                }
            }
        }

        Ok(Self::Run(options))
    }

    /// Parses the process arguments.
    pub fn from_env() -> GatewayResult<Self> {
        Self::parse_from(std::env::args().skip(1))
    }
}

impl RunOptions {
    /// The configuration file: `--config`, else `fallback`, typically the
    /// value of [`CONFIG_ENV`].
    #[must_use]
    pub fn config_path(&self, fallback: Option<PathBuf>) -> Option<PathBuf> {
        self.config.clone().or(fallback)
    }
}

/// Usage text for `--help`.
pub const HELP: &str = r"Beacon - REST API gateway

USAGE:
    beacon [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    BEACON_CONFIG          Configuration file, when --config is not given
    PORT                   Listen port (default: 8082)
    NODE_ENV, BEACON_ENV   development | production | test (default: development)
    HOST                   Bind address (default: 0.0.0.0)
    DATABASE_URL           PostgreSQL URL; in-memory store when unset
    RATE_LIMIT_MAX         Requests per client per window (default: 30)
    RATE_LIMIT_WINDOW_MS   Window length in milliseconds (default: 60000)
    SHUTDOWN_TIMEOUT_SECS  Connection drain timeout (default: 30)
    LOG_LEVEL              trace | debug | info | warn | error
    LOG_FORMAT             json | pretty
    RUST_LOG               Full tracing filter, overrides LOG_LEVEL

A .env file in the working directory is loaded before the environment is read.
";
