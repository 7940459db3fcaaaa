//! Handles settings for the application. Configuration is read from an
//! optional TOML file (`settings.toml` unless `--config` says otherwise) and
//! from `SPARAGNE__*` environment variables, e.g.
//! `SPARAGNE__SERVER__PORT=8000`.
use std::path::PathBuf;

use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Parser)]
#[command(version, about = "Sparagne ledger server")]
pub struct Cli {
    /// Settings file.
    #[arg(long, env = "SPARAGNE_CONFIG", default_value = "settings.toml")]
    pub config: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: Option<String>,
    pub port: u16,
    pub database: Database,
    /// How long a request waits for its response.
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub server: Option<Server>,
}

impl Settings {
    pub fn new(cli: &Cli) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("app.level", "info")?
            .add_source(File::from(cli.config.as_path()).required(false))
            .add_source(Environment::with_prefix("SPARAGNE").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    fn parse(toml: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn server_section_is_optional() {
        let settings = parse("[app]\nlevel = \"debug\"\n");
        assert_eq!(settings.app.level, "debug");
        assert!(settings.server.is_none());
    }

    #[test]
    fn sqlite_database_carries_its_path() {
        let settings = parse(
            "[app]\nlevel = \"info\"\n[server]\nport = 3000\ndatabase = { sqlite = \"ledger.db\" }\n",
        );
        let server = settings.server.unwrap();
        assert_eq!(server.port, 3000);
        assert!(matches!(server.database, Database::Sqlite(path) if path == "ledger.db"));
        assert!(server.request_timeout_ms.is_none());
    }

    #[test]
    fn memory_database_is_a_plain_string() {
        let settings = parse("[app]\nlevel = \"info\"\n[server]\nport = 1\ndatabase = \"memory\"\n");
        assert!(matches!(settings.server.unwrap().database, Database::Memory));
    }
}
