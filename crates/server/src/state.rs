use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use grounded_agents::{DefaultCredential, GroundedSearch, PollPolicy, ProjectClient};
use grounded_core::{AgentSettings, Config, ConfigError};

pub struct AppState {
    pub config: Config,
    /// Validated once at startup; a config error is reported on every search.
    search: Result<Arc<GroundedSearch>, ConfigError>,
    /// Cancelled on shutdown so in-flight run waits return early.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build state against the real agents project using the ambient
    /// credential chain.
    pub fn connect(config: Config, shutdown: CancellationToken) -> Self {
        Self::from_config(config, shutdown, |settings, policy| {
            let credential = Arc::new(DefaultCredential::from_env());
            let client = ProjectClient::from_settings(&settings, credential);
            GroundedSearch::new(Arc::new(client), settings, policy)
        })
    }

    /// Build state with a caller-supplied pipeline factory. The factory only
    /// runs when the agent settings validate.
    pub fn from_config<F>(config: Config, shutdown: CancellationToken, connect: F) -> Self
    where
        F: FnOnce(AgentSettings, PollPolicy) -> GroundedSearch,
    {
        let policy = PollPolicy::from(&config.polling);
        let search = match config.agent.validate() {
            Ok(settings) => {
                info!(
                    endpoint = %settings.project_endpoint,
                    connection = %settings.bing_connection_name,
                    "Agent settings validated"
                );
                Ok(Arc::new(connect(settings, policy)))
            }
            Err(e) => {
                warn!("{}; /search will report a configuration error", e);
                Err(e)
            }
        };

        Self {
            config,
            search,
            shutdown,
        }
    }

    pub fn search(&self) -> Result<&Arc<GroundedSearch>, &ConfigError> {
        self.search.as_ref()
    }

    pub fn is_configured(&self) -> bool {
        self.search.is_ok()
    }
}
