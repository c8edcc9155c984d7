pub mod error;
pub mod snapshot;
pub mod store;

pub use error::{OpenRejected, PersistError};
pub use snapshot::SnapshotFile;
pub use store::EnvelopeStore;
