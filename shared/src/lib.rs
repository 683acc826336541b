pub mod config;
pub mod database;
pub mod error;
pub mod telemetry;

pub use config::AppConfig;
pub use database::begin_serializable;
pub use error::{Error, Result};
pub use telemetry::init_tracing;
