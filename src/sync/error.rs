use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid sync configuration: {0}")]
    Config(String),

    #[error("Cannot reach {store} database: {source}")]
    Connectivity {
        store: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Destination table not found: {schema}.{table}")]
    MissingTable { schema: String, table: String },

    #[error("Only Admin users may run a sync")]
    Unauthorized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Error code used in the sidecar's error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Config(_) => "sync_config_invalid",
            SyncError::Connectivity { .. } => "sync_unreachable",
            SyncError::Database(_) => "db_query_failed",
            SyncError::MissingTable { .. } => "not_found",
            SyncError::Unauthorized => "forbidden",
            SyncError::Io(_) => "io_failed",
        }
    }
}
