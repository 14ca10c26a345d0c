use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("not initialized: run 'hubmigrate init'")]
    NotInitialized,

    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error("invalid alias '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidAlias(String),

    #[error("fleet '{0}' has no members")]
    EmptyFleet(String),

    #[error("operation not found: {0}")]
    OperationNotFound(String),

    #[error("operation '{name}' cannot be started: {reason}")]
    OperationUnresolvable { name: String, reason: String },

    #[error("config store for '{alias}' is unavailable: {reason}")]
    StoreUnavailable { alias: String, reason: String },

    #[error("stage ledger '{key}' cannot move backwards from {current} to {requested}")]
    LedgerRegression {
        key: String,
        current: usize,
        requested: usize,
    },

    #[error("stage ledger '{key}' holds an invalid value: {value}")]
    LedgerCorrupt { key: String, value: String },

    #[error("invalid workflow '{workflow}': {reason}")]
    InvalidWorkflow { workflow: String, reason: String },

    #[error("operator input closed while waiting for: {0}")]
    OperatorInputClosed(String),

    #[error("operator declined stage '{0}'")]
    OperatorDeclined(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MigrateError>;
