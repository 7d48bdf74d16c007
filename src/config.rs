//! Configuration for the taskboard server.
//!
//! Settings resolve in layers: built-in defaults, then `taskboard.toml`, then
//! the environment (a `.env` file is loaded first via `dotenvy`), then CLI
//! flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! port = 5000
//! host = "127.0.0.1"
//! db_path = ".taskboard/taskboard.db"
//! identity_header = "x-user-id"
//! dev_mode = false
//! seed_demo_user = false
//!
//! [logging]
//! filter = "taskboard=debug,tower_http=info"
//! json = false
//! dir = "logs"
//! ```
//!
//! | Variable                    | Overrides                  |
//! |-----------------------------|----------------------------|
//! | `PORT`                      | `server.port`              |
//! | `TASKBOARD_HOST`            | `server.host`              |
//! | `TASKBOARD_DB_PATH`         | `server.db_path`           |
//! | `TASKBOARD_IDENTITY_HEADER` | `server.identity_header`   |
//! | `TASKBOARD_DEV`             | `server.dev_mode`          |
//! | `TASKBOARD_SEED_DEMO_USER`  | `server.seed_demo_user`    |
//! | `TASKBOARD_LOG`             | `logging.filter`           |
//! | `TASKBOARD_LOG_JSON`        | `logging.json`             |
//! | `TASKBOARD_LOG_DIR`         | `logging.dir`              |

use anyhow::{Context, Result, bail};
use axum::http::header::HeaderName;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::service::server::ServerConfig;
use crate::telemetry::LogConfig;

pub const CONFIG_FILE_NAME: &str = "taskboard.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub db_path: Option<PathBuf>,
    pub identity_header: Option<String>,
    pub dev_mode: Option<bool>,
    pub seed_demo_user: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    pub filter: Option<String>,
    pub json: Option<bool>,
    pub dir: Option<PathBuf>,
}

/// Parsed `taskboard.toml`. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskboardToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl TaskboardToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse taskboard.toml")
    }

    /// Load `taskboard.toml` from `dir`, or defaults if the file doesn't exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Values given on the command line. Flags that are off do not override.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub dev: bool,
    pub seed_demo_user: bool,
    pub log_json: bool,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub logging: LogConfig,
}

impl Settings {
    /// Resolve from `config_path` (or `./taskboard.toml` when present), the
    /// process environment and `cli`.
    pub fn load(config_path: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        dotenvy::dotenv().ok();
        let file = match config_path {
            Some(path) => TaskboardToml::load(path)?,
            None => TaskboardToml::load_or_default(Path::new("."))?,
        };
        Self::resolve(&file, |key| std::env::var(key).ok(), cli)
    }

    /// Apply the layers over the defaults. `env` looks up a variable by name.
    pub fn resolve<F>(file: &TaskboardToml, env: F, cli: &CliOverrides) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        let server = &mut settings.server;
        let logging = &mut settings.logging;

        // File
        if let Some(port) = file.server.port {
            server.port = port;
        }
        if let Some(host) = &file.server.host {
            server.host = Some(host.clone());
        }
        if let Some(path) = &file.server.db_path {
            server.db_path = path.clone();
        }
        if let Some(header) = &file.server.identity_header {
            server.identity_header = header.clone();
        }
        if let Some(dev) = file.server.dev_mode {
            server.dev_mode = dev;
        }
        if let Some(seed) = file.server.seed_demo_user {
            server.seed_demo_user = seed;
        }
        if let Some(filter) = &file.logging.filter {
            logging.filter = Some(filter.clone());
        }
        if let Some(json) = file.logging.json {
            logging.json = json;
        }
        if let Some(dir) = &file.logging.dir {
            logging.dir = Some(dir.clone());
        }

        // Environment
        if let Some(port) = env("PORT") {
            server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT '{}'", port))?;
        }
        if let Some(host) = env("TASKBOARD_HOST") {
            server.host = Some(host);
        }
        if let Some(path) = env("TASKBOARD_DB_PATH") {
            server.db_path = PathBuf::from(path);
        }
        if let Some(header) = env("TASKBOARD_IDENTITY_HEADER") {
            server.identity_header = header;
        }
        if let Some(dev) = env("TASKBOARD_DEV") {
            server.dev_mode = parse_flag("TASKBOARD_DEV", &dev)?;
        }
        if let Some(seed) = env("TASKBOARD_SEED_DEMO_USER") {
            server.seed_demo_user = parse_flag("TASKBOARD_SEED_DEMO_USER", &seed)?;
        }
        if let Some(filter) = env("TASKBOARD_LOG") {
            logging.filter = Some(filter);
        }
        if let Some(json) = env("TASKBOARD_LOG_JSON") {
            logging.json = parse_flag("TASKBOARD_LOG_JSON", &json)?;
        }
        if let Some(dir) = env("TASKBOARD_LOG_DIR") {
            logging.dir = Some(PathBuf::from(dir));
        }

        // CLI
        if let Some(port) = cli.port {
            server.port = port;
        }
        if let Some(path) = &cli.db_path {
            server.db_path = path.clone();
        }
        server.dev_mode |= cli.dev;
        server.seed_demo_user |= cli.seed_demo_user;
        logging.json |= cli.log_json;

        Ok(settings)
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("Port 0 binds a random free port".to_string());
        }
        if HeaderName::try_from(self.server.identity_header.as_str()).is_err() {
            warnings.push(format!(
                "Invalid identity_header '{}': not a valid HTTP header name",
                self.server.identity_header
            ));
        }
        if self.server.db_path.is_dir() {
            warnings.push(format!(
                "db_path '{}' is a directory, expected a database file",
                self.server.db_path.display()
            ));
        }
        if self.server.seed_demo_user && !self.server.dev_mode {
            warnings.push("seed_demo_user is enabled outside dev mode".to_string());
        }
        if let Some(filter) = &self.logging.filter
            && tracing_subscriber::EnvFilter::try_new(filter).is_err()
        {
            warnings.push(format!("Invalid logging filter '{}'", filter));
        }

        warnings
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("Invalid {} '{}': expected true or false", name, other),
    }
}
