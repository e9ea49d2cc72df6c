//! Environment-driven configuration structures shared by all binaries.

use std::env;
use std::time::Duration;

use strum_macros::{AsRefStr, Display};
use thiserror::Error;
use url::Url;

use crate::routing::{RoutingError, RoutingTable};

/// Logical databases the application expects, in the order they are checked.
pub const DEFAULT_DATABASES: [&str; 4] = ["auth", "users", "videos", "billing"];

const DEFAULT_RETRY_INTERVAL_MS: u64 = 1_000;

/// Driver family a database URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
    #[strum(serialize = "mongodb")]
    MongoDb,
}

impl DatabaseBackend {
    /// Infers the backend from the URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split_once(':').map(|(scheme, _)| scheme)?;
        match scheme.to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mongodb" | "mongodb+srv" => Some(Self::MongoDb),
            _ => None,
        }
    }
}

/// Connection target for one logical database alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    alias: String,
    url: String,
    backend: DatabaseBackend,
}

impl DatabaseSettings {
    pub fn new(alias: impl Into<String>, url: impl Into<String>) -> Result<Self, ConfigError> {
        let alias = alias.into();
        let url = url.into();
        let backend = DatabaseBackend::from_url(&url).ok_or_else(|| {
            ConfigError::UnsupportedUrl {
                alias: alias.clone(),
                url: redact_url(&url),
            }
        })?;
        // SQL drivers parse the URL again and panic on failure, so it has to
        // be well formed before it reaches them. Mongo seed lists are not
        // plain URLs and are left to the driver.
        if backend != DatabaseBackend::MongoDb {
            if let Err(source) = Url::parse(&url) {
                return Err(ConfigError::MalformedUrl {
                    url: redact_url(&url),
                    alias,
                    source,
                });
            }
        }
        Ok(Self {
            alias,
            url,
            backend,
        })
    }

    /// Reads `DBROUTE_DATABASE_URL_<ALIAS>` for the given alias.
    pub fn from_env(alias: &str) -> Result<Self, ConfigError> {
        let key = database_url_key(alias);
        let url = read_trimmed(&key).ok_or(ConfigError::MissingDatabaseUrl {
            alias: alias.to_string(),
            key,
        })?;
        Self::new(alias, url)
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }
}

/// Configuration of the `wait_for_dbs` binary: which databases to wait for,
/// how they are routed and how long to pause between failed probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaiterConfig {
    databases: Vec<DatabaseSettings>,
    routes: RoutingTable,
    retry_interval: Duration,
}

impl WaiterConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// process variables. Missing or malformed entries surface as
    /// `ConfigError` so the binary can respond gracefully.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let aliases = match get_optional_var("DBROUTE_DATABASES") {
            Some(raw) => parse_aliases(&raw),
            None => DEFAULT_DATABASES.iter().map(|alias| alias.to_string()).collect(),
        };
        if aliases.is_empty() {
            return Err(ConfigError::MissingVar {
                key: "DBROUTE_DATABASES",
            });
        }
        let databases = aliases
            .iter()
            .map(|alias| DatabaseSettings::from_env(alias))
            .collect::<Result<Vec<_>, _>>()?;

        let routes = match get_optional_var("DBROUTE_ROUTES") {
            Some(raw) => RoutingTable::parse(&raw)?,
            None => RoutingTable::default(),
        };

        let retry_interval_ms = match get_optional_var("DBROUTE_RETRY_INTERVAL_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|source| ConfigError::InvalidNumber {
                    key: "DBROUTE_RETRY_INTERVAL_MS",
                    source,
                })?,
            None => DEFAULT_RETRY_INTERVAL_MS,
        };
        if retry_interval_ms == 0 {
            return Err(ConfigError::ZeroRetryInterval);
        }

        Ok(Self {
            databases,
            routes,
            retry_interval: Duration::from_millis(retry_interval_ms),
        })
    }

    pub fn databases(&self) -> &[DatabaseSettings] {
        &self.databases
    }

    pub fn aliases(&self) -> Vec<String> {
        self.databases
            .iter()
            .map(|settings| settings.alias().to_string())
            .collect()
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }
}

/// Environment key holding the URL of `alias`.
pub fn database_url_key(alias: &str) -> String {
    let normalized: String = alias
        .trim()
        .chars()
        .map(|c| match c {
            '-' | '.' | ' ' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect();
    format!("DBROUTE_DATABASE_URL_{normalized}")
}

fn parse_aliases(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|alias| !alias.is_empty())
        .map(str::to_string)
        .collect()
}

/// Strips credentials so URLs can appear in error messages.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

fn read_trimmed(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_optional_var(key: &'static str) -> Option<String> {
    read_trimmed(key)
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("DBROUTE_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("missing database url for `{alias}` (set `{key}`)")]
    MissingDatabaseUrl { alias: String, key: String },
    #[error("unsupported database url for `{alias}`: {url}")]
    UnsupportedUrl { alias: String, url: String },
    #[error("malformed database url for `{alias}` ({url}): {source}")]
    MalformedUrl {
        alias: String,
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("`DBROUTE_RETRY_INTERVAL_MS` must be greater than zero")]
    ZeroRetryInterval,
    #[error("invalid routing table: {0}")]
    Routing(#[from] RoutingError),
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
