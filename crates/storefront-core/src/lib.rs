pub mod app_config;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod payload;

pub use app_config::AppConfig;
pub use cache::TtlCache;
pub use catalog::ProductDoc;
pub use config::{load_app_config, load_app_config_from_env};
pub use payload::format_payload;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),

    #[error("invalid env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
