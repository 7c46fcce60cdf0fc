//! HTTP endpoint modules.

pub mod doc;
pub mod health;
pub mod search;

pub use health::{health, HealthResponse};
pub use search::{run_search, search, SearchParams, SearchResponse};
