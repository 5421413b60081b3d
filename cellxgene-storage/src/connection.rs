use crate::config::DatabaseConfig;
use crate::migrations::Migrator;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Database-related errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database error: {0}")]
    DbError(#[from] DbErr),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Owns the connection pool of the annotation database and hands out sessions
#[derive(Clone)]
pub struct DbSessionMaker {
    connection: DatabaseConnection,
    config: DatabaseConfig,
}

impl DbSessionMaker {
    /// Open the connection pool
    pub async fn connect(config: DatabaseConfig) -> Result<Self, DatabaseError> {
        info!("Connecting to annotation database");

        let mut opts = ConnectOptions::new(&config.url);
        opts.connect_timeout(config.connection_timeout)
            .acquire_timeout(config.connection_timeout)
            .sqlx_logging(true)
            .sqlx_logging_level(log::LevelFilter::Debug);

        // Every connection to an in-memory SQLite database opens a new, empty database
        if config.is_in_memory() {
            opts.max_connections(1).min_connections(1);
        } else {
            opts.max_connections(config.max_connections)
                .min_connections(1)
                .idle_timeout(Duration::from_secs(300))
                .max_lifetime(Duration::from_secs(3600));
        }

        let connection = Database::connect(opts).await?;
        debug!(
            "Annotation database connection established with {} max connections",
            if config.is_in_memory() { 1 } else { config.max_connections }
        );

        Ok(Self { connection, config })
    }

    /// A session on the shared pool
    pub fn session(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// A session whose changes are committed or rolled back together
    pub async fn begin(&self) -> Result<DatabaseTransaction, DatabaseError> {
        Ok(self.connection.begin().await?)
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Create missing tables
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        info!("Running annotation database migrations");
        Migrator::up(&self.connection, None)
            .await
            .map_err(|e| DatabaseError::MigrationError(e.to_string()))?;
        Ok(())
    }

    /// Check database connectivity
    pub async fn ping(&self) -> Result<(), DatabaseError> {
        debug!("Pinging annotation database");
        self.connection.ping().await?;
        Ok(())
    }

    /// Close the connection pool
    pub async fn close(self) -> Result<(), DatabaseError> {
        info!("Closing annotation database connection");
        self.connection.close().await?;
        Ok(())
    }
}

/// Drop and recreate every table of the annotation database
pub async fn create_db(sessions: &DbSessionMaker) -> Result<(), DatabaseError> {
    info!("Dropping and recreating annotation tables");
    Migrator::fresh(sessions.session())
        .await
        .map_err(|e| DatabaseError::MigrationError(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn in_memory() -> DbSessionMaker {
        DbSessionMaker::connect(DatabaseConfig::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_connect_and_ping() {
        let sessions = in_memory().await;
        assert!(sessions.ping().await.is_ok());
        assert!(sessions.config().is_in_memory());
        sessions.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_migrate_is_repeatable() {
        let sessions = in_memory().await;
        sessions.migrate().await.unwrap();
        sessions.migrate().await.unwrap();
        create_db(&sessions).await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_to_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotations.db");
        let config = DatabaseConfig::new(format!("sqlite://{}?mode=rwc", path.display()));

        let sessions = DbSessionMaker::connect(config).await.unwrap();
        sessions.migrate().await.unwrap();
        assert!(path.exists());

        create_db(&sessions).await.unwrap();
        sessions.ping().await.unwrap();
    }
}
