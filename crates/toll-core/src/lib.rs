pub mod config;
pub mod types;

pub use config::{ConfigError, GuardConfig, PolicyConfig, TollgateConfig};
pub use types::*;
