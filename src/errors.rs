use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backup operation failed: {0}")]
    Backup(String),

    #[error("Restore operation failed: {0}")]
    Restore(String),

    #[error("Storage operation failed: {0}")]
    Storage(String),

    /// Wraps whatever went wrong while listing or deleting expired backups.
    #[error("Retention cleanup failed: {0}")]
    Retention(#[source] Box<AppError>),
}

impl AppError {
    pub fn retention(cause: AppError) -> Self {
        AppError::Retention(Box::new(cause))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
