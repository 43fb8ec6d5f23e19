//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use crate::broadcast::assets::ExistingAssetPolicy;
use crate::broadcast::metadata::AttributePolicy;
use crate::models::RecordStatus;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0), // Bind to 0.0.0.0 for Docker
            port: 3000,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_pool_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
            max_pool_size: 10,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Content store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root of the per-workspace upload directories
    pub upload_root: PathBuf,
    /// Optional JSON seed for the in-memory store
    pub fixture: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            upload_root: std::env::temp_dir().join("broadcast-uploads"),
            fixture: None,
        }
    }
}

/// Broadcast behaviour shared by every operation
#[derive(Debug, Clone)]
pub struct BroadcastPolicy {
    pub existing_assets: ExistingAssetPolicy,
    pub attributes: AttributePolicy,
    /// Record types the save hook broadcasts
    pub record_types: Vec<String>,
    pub allow_drafts: bool,
    pub allow_scheduled: bool,
}

impl Default for BroadcastPolicy {
    fn default() -> Self {
        Self {
            existing_assets: ExistingAssetPolicy::Use,
            attributes: AttributePolicy::default(),
            record_types: vec!["post".to_string(), "page".to_string()],
            allow_drafts: false,
            allow_scheduled: false,
        }
    }
}

impl BroadcastPolicy {
    /// Statuses a source record may have to be broadcast
    pub fn allows_status(&self, status: RecordStatus) -> bool {
        match status {
            RecordStatus::Pending | RecordStatus::Private | RecordStatus::Publish => true,
            RecordStatus::Draft => self.allow_drafts,
            RecordStatus::Future => self.allow_scheduled,
            RecordStatus::Trash => false,
        }
    }

    pub fn handles_type(&self, record_type: &str) -> bool {
        self.record_types.iter().any(|t| t == record_type)
    }
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    /// None when no database is configured; persistence then stays in memory
    pub database: Option<DatabaseConfig>,
    pub database_url: Option<String>,
    pub cors: CorsConfig,
    pub store: StoreConfig,
    pub broadcast: BroadcastPolicy,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            host: std::env::var("HOST")
                .ok()
                .and_then(|h| h.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().port),
        };

        // Try to load DATABASE_URL first, fall back to individual vars
        let database_url = std::env::var("DATABASE_URL").ok();
        let database = match &database_url {
            Some(url) => Some(Self::parse_database_url(url)?),
            None if std::env::var("DB_HOST").is_ok() => Some(DatabaseConfig {
                host: std::env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: std::env::var("DB_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(5432),
                user: std::env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string()),
                password: std::env::var("DB_PASSWORD").unwrap_or_default(),
                database: std::env::var("DB_NAME").unwrap_or_else(|_| "postgres".to_string()),
                max_pool_size: max_pool_size(),
            }),
            None => None,
        };

        let cors = CorsConfig {
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        let store = StoreConfig {
            upload_root: std::env::var("UPLOAD_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| StoreConfig::default().upload_root),
            fixture: std::env::var("CONTENT_FIXTURE").ok().map(PathBuf::from),
        };

        let broadcast = Self::load_policy()?;

        Ok(Self {
            server,
            database,
            database_url,
            cors,
            store,
            broadcast,
        })
    }

    fn load_policy() -> Result<BroadcastPolicy, ConfigError> {
        let defaults = BroadcastPolicy::default();
        let default_attributes = AttributePolicy::default();

        let existing_assets = match std::env::var("BROADCAST_EXISTING_ASSETS") {
            Ok(value) => value
                .parse()
                .map_err(|e: String| ConfigError::InvalidValue(e))?,
            Err(_) => defaults.existing_assets,
        };

        let attributes = AttributePolicy {
            broadcast_internal: env_flag("BROADCAST_INTERNAL_ATTRIBUTES")?
                .unwrap_or(default_attributes.broadcast_internal),
            whitelist: std::env::var("BROADCAST_ATTRIBUTE_WHITELIST")
                .map(|s| split_tokens(&s))
                .unwrap_or(default_attributes.whitelist),
            blacklist: std::env::var("BROADCAST_ATTRIBUTE_BLACKLIST")
                .map(|s| split_tokens(&s))
                .unwrap_or(default_attributes.blacklist),
            protectlist: std::env::var("BROADCAST_ATTRIBUTE_PROTECTLIST")
                .map(|s| split_tokens(&s))
                .unwrap_or(default_attributes.protectlist),
        };

        Ok(BroadcastPolicy {
            existing_assets,
            attributes,
            record_types: std::env::var("BROADCAST_RECORD_TYPES")
                .map(|s| split_tokens(&s))
                .unwrap_or(defaults.record_types),
            allow_drafts: env_flag("BROADCAST_ALLOW_DRAFTS")?.unwrap_or(defaults.allow_drafts),
            allow_scheduled: env_flag("BROADCAST_ALLOW_SCHEDULED")?
                .unwrap_or(defaults.allow_scheduled),
        })
    }

    /// Parse a DATABASE_URL connection string (postgresql://...)
    fn parse_database_url(url: &str) -> Result<DatabaseConfig, ConfigError> {
        match url::Url::parse(url) {
            Ok(parsed) => {
                let host = parsed.host_str()
                    .ok_or_else(|| ConfigError::InvalidValue("Missing host in DATABASE_URL".to_string()))?
                    .to_string();

                let port = parsed.port().unwrap_or(5432);

                let user = parsed.username().to_string();
                let password = parsed.password()
                    .map(|p| p.to_string())
                    .unwrap_or_default();

                let database = parsed.path()
                    .trim_start_matches('/')
                    .to_string();

                Ok(DatabaseConfig {
                    host,
                    port,
                    user,
                    password,
                    database,
                    max_pool_size: max_pool_size(),
                })
            }
            Err(_) => Err(ConfigError::InvalidValue(
                "Invalid DATABASE_URL format (expected postgresql://...)".to_string()
            ))
        }
    }
}

fn max_pool_size() -> usize {
    std::env::var("DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10)
}

/// Whitespace or newline separated list, empty tokens dropped
pub fn split_tokens(value: &str) -> Vec<String> {
    value
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

fn env_flag(name: &str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => parse_flag(&value)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue(format!("{} must be a boolean, got {}", name, value))),
        Err(_) => Ok(None),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_default_policy() {
        let policy = BroadcastPolicy::default();
        assert_eq!(policy.existing_assets, ExistingAssetPolicy::Use);
        assert!(policy.attributes.broadcast_internal);
        assert_eq!(policy.record_types, vec!["post", "page"]);
    }

    #[test]
    fn test_allowed_statuses() {
        let mut policy = BroadcastPolicy::default();
        assert!(policy.allows_status(RecordStatus::Publish));
        assert!(!policy.allows_status(RecordStatus::Draft));
        assert!(!policy.allows_status(RecordStatus::Trash));

        policy.allow_drafts = true;
        policy.allow_scheduled = true;
        assert!(policy.allows_status(RecordStatus::Draft));
        assert!(policy.allows_status(RecordStatus::Future));
    }

    #[test]
    fn test_split_tokens_drops_empty_lines() {
        assert_eq!(
            split_tokens("_wp_page_template\n\n  _aioseop_ "),
            vec!["_wp_page_template", "_aioseop_"]
        );
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("Yes"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_parse_database_url() {
        let config = Settings::parse_database_url("postgres://u:p@db.local:5433/links").unwrap();
        assert_eq!(config.host, "db.local");
        assert_eq!(config.port, 5433);
        assert_eq!(config.database, "links");
    }
}
