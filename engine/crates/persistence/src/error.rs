use std::io;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{kind} file not found: {owner}/{name}")]
    NotFound {
        kind: &'static str,
        owner: String,
        name: String,
    },

    #[error("transfer count must be positive (prop {0})")]
    ZeroCount(String),

    #[error("{owner} holds {have} of {name}, cannot move {want}")]
    InsufficientCount {
        owner: String,
        name: String,
        have: u32,
        want: u32,
    },

    #[error("unique prop {name} cannot be split ({want} of {have})")]
    UniqueSplit { name: String, have: u32, want: u32 },

    #[error("source and destination are the same owner: {0}")]
    SameOwner(String),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::Serialization(e.to_string())
    }
}
