//! Database module providing read access to the job warehouse.

pub mod jobs;

use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::info;

use crate::error::{AppError, AppResult};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Connect to the warehouse at `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let mut options = ConnectOptions::new(database_url.to_string());
        options
            .max_connections(max_connections.max(1))
            .connect_timeout(Duration::from_secs(30))
            .sqlx_logging(false);

        let conn = Database::connect(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to database: {}", e)))?;
        info!("Database connection established");

        Ok(DbPool { conn })
    }

    /// Get access to the connection for executing queries.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }
}
