use cellxgene_config::domains::dataset::HostedTileDbArrayConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::connection::DatabaseError;

/// Connection settings of the annotation database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Connection timeout
    pub connection_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:")
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 10,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl TryFrom<&HostedTileDbArrayConfig> for DatabaseConfig {
    type Error = DatabaseError;

    fn try_from(hosted: &HostedTileDbArrayConfig) -> Result<Self, Self::Error> {
        match hosted.db_uri.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(Self::new(url)),
            _ => Err(DatabaseError::ConfigError(
                "user_annotations.hosted_tiledb_array.db_uri is not set".to_string(),
            )),
        }
    }
}
