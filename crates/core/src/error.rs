use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more required environment variables are unset or empty.
    #[error("Missing environment variable(s): {}", .0.join(", "))]
    Missing(Vec<String>),
}

impl ConfigError {
    /// Names of the missing variables.
    pub fn missing_keys(&self) -> &[String] {
        match self {
            ConfigError::Missing(keys) => keys,
        }
    }
}
