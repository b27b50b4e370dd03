use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to load environment variables for database connection: {0}")]
    ConnectionConfig(String),

    #[error("Database operation failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Account {0} was not found in the ledger")]
    AccountNotFound(Uuid),

    #[error("An asset with symbol '{0}' already exists")]
    DuplicateAsset(String),

    #[error("The ledger returned a row that could not be interpreted: {0}")]
    CorruptRow(String),
}
