use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    #[error("Worker {worker} failed: {message}")]
    WorkerFault { worker: String, message: String },

    #[error("Dispatcher is shut down")]
    DispatcherClosed,

    #[error("Invalid display id: {0:?}")]
    InvalidDisplayId(String),

    #[error("CFA node not found: {0}")]
    NodeNotFound(u32),
}

pub type Result<T> = std::result::Result<T, Error>;
