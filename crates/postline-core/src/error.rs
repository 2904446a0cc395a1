use thiserror::Error;

#[derive(Debug, Error)]
pub enum PostlineError {
    #[error("not initialized: run 'postline init'")]
    NotInitialized,

    #[error("unknown archetype: {0}")]
    UnknownArchetype(String),

    #[error("rotation state is corrupt: {0}")]
    StateCorrupt(String),

    #[error("invalid config value for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("another postline process holds the lock at {path} (pid {pid})")]
    Locked { path: String, pid: String },

    #[error("missing environment variable: {0}")]
    MissingEnv(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, PostlineError>;
