// ============================================================================
// PIPESTOCK - CONFIGURATION MANAGEMENT
// ============================================================================
// Module: shared/src/config.rs
// Description: Environment-based configuration for the inventory core
// ============================================================================

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    pub inventory: InventorySettings,
    pub logging: LoggingSettings,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,      // seconds
    pub idle_timeout: Option<u64>, // seconds
    pub max_lifetime: Option<u64>, // seconds
    pub test_before_acquire: bool,
}

/// Inventory engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySettings {
    /// Spare-piece reservation timeout in minutes. Reservations older than
    /// this are garbage-collected by the next combine attempt.
    pub reservation_timeout_minutes: i64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,  // trace, debug, info, warn, error
    pub format: String, // json, pretty, compact
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Database defaults
            .set_default("database.url", default_database_url())?
            .set_default("database.max_connections", 20)?
            .set_default("database.min_connections", 1)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("database.idle_timeout", 600)?
            .set_default("database.max_lifetime", 1800)?
            .set_default("database.test_before_acquire", true)?
            // Inventory defaults
            .set_default("inventory.reservation_timeout_minutes", 30)?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            // Load from config files (optional)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables
            .add_source(Environment::with_prefix("PIPESTOCK").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        if self.database.max_connections <= self.database.min_connections {
            return Err("Max connections must be greater than min connections".to_string());
        }

        if self.inventory.reservation_timeout_minutes <= 0 {
            return Err("Reservation timeout must be positive".to_string());
        }

        Ok(())
    }
}

fn default_database_url() -> String {
    std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/pipestock_dev".to_string())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseSettings {
                url: default_database_url(),
                max_connections: 20,
                min_connections: 1,
                acquire_timeout: 30,
                idle_timeout: Some(600),
                max_lifetime: Some(1800),
                test_before_acquire: true,
            },
            inventory: InventorySettings {
                reservation_timeout_minutes: 30,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}
