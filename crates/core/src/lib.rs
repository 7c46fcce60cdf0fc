pub mod config;
pub mod error;

pub use config::{AgentConfig, AgentSettings, Config, PollConfig, ServerConfig};
pub use error::ConfigError;
