use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::mapping::{AddOutcome, RelayMapping, RemoveOutcome, RemoveTarget};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write relay file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize relay file: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("relay store task failed: {0}")]
    Task(String),
}

/// On-disk layout of the relay file. Top-level fields other than
/// `relayChannels` are carried through rewrites untouched.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RelayFile {
    #[serde(rename = "relayChannels", default)]
    relay_channels: RelayMapping,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// File-backed relay mapping.
///
/// Every operation reads the whole file and, when it changes anything,
/// rewrites the whole file through a temp file and a rename. All access goes
/// through one lock so concurrent loads and mutations never interleave.
pub struct RelayStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RelayStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `op` on tokio's blocking pool so file I/O stays off the async
    /// worker threads.
    pub async fn run_blocking<T, F>(self: &Arc<Self>, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&RelayStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Reads the current mapping. A missing, empty or invalid file is
    /// replaced with an empty mapping, which is then returned.
    pub fn load(&self) -> RelayMapping {
        let _guard = self.lock.lock();
        self.read_or_reset().relay_channels
    }

    pub fn add_destination(
        &self,
        source_id: &str,
        dest_id: u64,
    ) -> Result<(AddOutcome, RelayMapping), StoreError> {
        let _guard = self.lock.lock();
        let mut file = self.read_or_reset();

        let outcome = file.relay_channels.add(source_id, dest_id);
        match outcome {
            AddOutcome::Added => {
                self.write(&file)?;
                info!("added relay source={} destination={}", source_id, dest_id);
            }
            AddOutcome::AlreadyPresent => {
                debug!(
                    "relay already present source={} destination={}",
                    source_id, dest_id
                );
            }
        }

        Ok((outcome, file.relay_channels))
    }

    pub fn remove_entry(&self, target: &RemoveTarget) -> Result<RemoveOutcome, StoreError> {
        let _guard = self.lock.lock();
        let mut file = self.read_or_reset();

        let outcome = file.relay_channels.remove(target);
        if outcome == RemoveOutcome::Removed {
            self.write(&file)?;
            match target {
                RemoveTarget::All => info!("removed every relay"),
                RemoveTarget::Source(source_id) => {
                    info!("removed all relays of source={}", source_id)
                }
                RemoveTarget::Pair(source_id, dest_id) => {
                    info!("removed relay source={} destination={}", source_id, dest_id)
                }
            }
        }

        Ok(outcome)
    }

    fn read_or_reset(&self) -> RelayFile {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!("relay file {} not found, creating it", self.path.display());
                return self.reset();
            }
            Err(err) => {
                warn!(
                    "failed to read relay file {}: {}, resetting to default",
                    self.path.display(),
                    err
                );
                return self.reset();
            }
        };

        if content.trim().is_empty() {
            warn!("relay file {} is empty, resetting to default", self.path.display());
            return self.reset();
        }

        match serde_json::from_str::<RelayFile>(&content) {
            Ok(mut file) => {
                if file.relay_channels.normalize() {
                    debug!("pruned empty or repeated relay entries on load");
                }
                file
            }
            Err(err) => {
                warn!(
                    "relay file {} is invalid ({}), resetting to default",
                    self.path.display(),
                    err
                );
                self.reset()
            }
        }
    }

    fn reset(&self) -> RelayFile {
        let file = RelayFile::default();
        if let Err(err) = self.write(&file) {
            error!("failed to write default relay file: {err}");
        }
        file
    }

    fn write(&self, file: &RelayFile) -> Result<(), StoreError> {
        let body = serde_json::to_string_pretty(file)?;
        let io_err = |source: io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, body).map_err(io_err)?;
        fs::rename(&tmp_path, &self.path).map_err(io_err)?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
