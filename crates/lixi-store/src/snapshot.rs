use std::ffi::OsString;
use std::path::{Path, PathBuf};

use lixi_types::models::Envelope;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::PersistError;

/// The whole ledger as one JSON array on disk.
///
/// Writes go to `{path}.tmp` first and are renamed over `path`, so a crash
/// mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Read the last saved ledger. Missing or unreadable snapshots yield an
    /// empty ledger.
    pub async fn load(&self) -> Vec<Envelope> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No snapshot at {}, starting empty", self.path.display());
                return Vec::new();
            }
            Err(e) => {
                warn!("Failed to read snapshot {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Vec<Envelope>>(&bytes) {
            Ok(envelopes) => {
                info!(
                    "Loaded {} envelopes from {}",
                    envelopes.len(),
                    self.path.display()
                );
                envelopes
            }
            Err(e) => {
                warn!("Corrupt snapshot {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    /// Atomically replace the snapshot with `envelopes`.
    pub async fn save(&self, envelopes: &[Envelope]) -> Result<(), PersistError> {
        let data = serde_json::to_vec_pretty(envelopes)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| PersistError::Io { path: parent.to_path_buf(), source })?;
        }

        let tmp = self.temp_path();
        let io_err = |source: std::io::Error| PersistError::Io { path: tmp.clone(), source };

        let mut file = fs::File::create(&tmp).await.map_err(io_err)?;
        let written = async {
            file.write_all(&data).await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(source) = written {
            discard_temp(&tmp).await;
            return Err(io_err(source));
        }

        if let Err(source) = fs::rename(&tmp, &self.path).await {
            discard_temp(&tmp).await;
            return Err(PersistError::Io { path: self.path.clone(), source });
        }

        debug!("Saved {} envelopes to {}", envelopes.len(), self.path.display());
        Ok(())
    }
}

/// Best-effort removal of a half-written temp file.
async fn discard_temp(tmp: &Path) {
    if let Err(e) = fs::remove_file(tmp).await {
        debug!("Could not remove {}: {}", tmp.display(), e);
    }
}
