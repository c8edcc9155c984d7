use std::path::PathBuf;

use thiserror::Error;

/// Failure to write the on-disk snapshot.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("snapshot I/O on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why an `open` request was turned down. Never reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OpenRejected {
    #[error("envelope {0} does not exist")]
    NotFound(u64),

    #[error("envelope {0} is already opened")]
    AlreadyOpened(u64),

    #[error("envelope {0} cannot be opened by its own sender")]
    OwnEnvelope(u64),
}
