//! Loading configuration from files on disk.

use std::io::Write;

use beacon_config::{ConfigError, ConfigLoader, Environment, LogFormat};

fn write_config(extension: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(extension)
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_toml_file_layers_under_env() {
    let file = write_config(
        ".toml",
        r#"
            port = 7000
            environment = "production"

            [database.production]
            url = "postgres://beacon@db/beacon"

            [logging]
            format = "json"
        "#,
    );

    let config = ConfigLoader::new()
        .with_file(file.path())
        .unwrap()
        .with_env_vars([("PORT", "7001")])
        .load()
        .unwrap();

    assert_eq!(config.port, 7001);
    assert_eq!(config.environment, Environment::Production);
    assert_eq!(
        config.database_profile().url.as_deref(),
        Some("postgres://beacon@db/beacon")
    );
    assert_eq!(config.logging.format, Some(LogFormat::Json));
    // untouched sections keep their defaults
    assert_eq!(config.rate_limit.max, 30);
}

#[test]
fn test_json_file() {
    let file = write_config(".json", r#"{"rate_limit": {"max": 3, "window_ms": 500}}"#);

    let config = ConfigLoader::new()
        .with_file(file.path())
        .unwrap()
        .load()
        .unwrap();

    assert_eq!(config.rate_limit.max, 3);
    assert_eq!(config.rate_limit.window_ms, 500);
}

#[test]
fn test_unknown_extension_is_rejected() {
    let file = write_config(".ini", "port=1");
    let result = ConfigLoader::new().with_file(file.path());
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}

#[test]
fn test_invalid_toml_is_rejected() {
    let file = write_config(".toml", "port = \"not a number\"");
    let result = ConfigLoader::new().with_file(file.path());
    assert!(matches!(result, Err(ConfigError::TomlError(_))));
}
