use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// More agents were created in a run than the arena can hold.
    #[error("limit of {capacity} infections reached; raise the `max_infections` option to simulate larger outbreaks")]
    ArenaFull { capacity: usize },

    /// The shifted-binomial table only exists for 0, 2, 4 and 6.
    #[error("invalid shifted-binomial parameter {0}; supported values are 0, 2, 4 and 6")]
    InvalidBinomialParameter(i64),

    #[error("invalid distribution parameters: {0}")]
    Distribution(String),

    #[error("file \"{}\" could not be opened: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

impl SimError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SimError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = SimError> = std::result::Result<T, E>;
