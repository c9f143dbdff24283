use std::io;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use rmbackup_core::{ByteStream, DeviceError};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::mapping::{MappingError, MappingStore};
use super::paths::partial_path;
use super::source::DocumentSource;
use super::timestamp::Timestamp;
use super::tree::{NodeKind, RemoteNode, RemoteTree, TreeError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),
    #[error("remote path not found on the device: {0:?}")]
    UnknownRemotePath(String),
    #[error("{0:?} has not been registered or is not present on the device")]
    NotRegistered(String),
    #[error("{0:?} is a folder and cannot be downloaded")]
    IsFolder(String),
    #[error("failed to fetch {id:?}: {source}")]
    Transport {
        id: String,
        #[source]
        source: DeviceError,
    },
    #[error("failed to write {}: {source}", path.display())]
    LocalWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),
}

/// Whether a download may be skipped because the local copy looks current.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StalenessPolicy {
    /// Always fetch and overwrite.
    #[default]
    AlwaysOverwrite,
    /// Skip when the local file is at least as new as the remote document.
    SkipIfLocalNewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Written { bytes: u64 },
    UpToDate,
}

#[derive(Debug)]
pub struct SyncFailure {
    pub id: String,
    pub error: EngineError,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub written: Vec<String>,
    pub up_to_date: Vec<String>,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn succeeded(&self) -> usize {
        self.written.len() + self.up_to_date.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct SyncEngine<S> {
    source: S,
    staleness: StalenessPolicy,
}

impl<S: DocumentSource> SyncEngine<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            staleness: StalenessPolicy::default(),
        }
    }

    pub fn with_staleness(mut self, staleness: StalenessPolicy) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn build_tree(&self) -> Result<RemoteTree, EngineError> {
        let tree = RemoteTree::fetch(&self.source).await?;
        debug!(nodes = tree.len(), leaves = tree.leaf_count(), "remote tree built");
        Ok(tree)
    }

    /// Registers the document at `remote_path` for backup to `local_path`.
    /// Returns whether a new mapping was added.
    pub fn register_entry(
        &self,
        tree: &RemoteTree,
        store: &mut MappingStore,
        remote_path: &str,
        local_path: impl AsRef<Path>,
    ) -> Result<bool, EngineError> {
        let id = resolve(tree, remote_path)?;
        let added = store.register(id, local_path.as_ref())?;
        if added {
            info!(id, remote_path, path = %local_path.as_ref().display(), "registered");
        } else {
            info!(id, remote_path, "already registered");
        }
        Ok(added)
    }

    /// Returns whether a mapping was removed.
    pub fn deregister_entry(
        &self,
        tree: &RemoteTree,
        store: &mut MappingStore,
        remote_path: &str,
    ) -> Result<bool, EngineError> {
        let id = resolve(tree, remote_path)?;
        let removed = store.deregister(id);
        if removed {
            info!(id, remote_path, "deregistered");
        } else {
            info!(id, remote_path, "was not registered");
        }
        Ok(removed)
    }

    pub async fn download_one(
        &self,
        tree: &RemoteTree,
        store: &MappingStore,
        id: &str,
    ) -> Result<DownloadOutcome, EngineError> {
        let (Some(node), Some(target)) = (tree.get(id), store.get(id)) else {
            return Err(EngineError::NotRegistered(id.to_string()));
        };
        if node.kind == NodeKind::Folder {
            return Err(EngineError::IsFolder(id.to_string()));
        }
        if self.staleness == StalenessPolicy::SkipIfLocalNewer
            && local_is_current(node, target).await
        {
            debug!(id, path = %target.display(), "local copy is current, skipping");
            return Ok(DownloadOutcome::UpToDate);
        }

        info!(id, path = %target.display(), "saving document");
        let stream = self
            .source
            .open_document(id)
            .await
            .map_err(|source| EngineError::Transport {
                id: id.to_string(),
                source,
            })?;
        let bytes = write_document(id, stream, target).await?;
        Ok(DownloadOutcome::Written { bytes })
    }

    /// Downloads every registered document one after another. Failures are
    /// collected per entry and never stop the batch.
    pub async fn sync_all(&self, tree: &RemoteTree, store: &MappingStore) -> SyncReport {
        let mut report = SyncReport::default();
        for id in store.ids() {
            match self.download_one(tree, store, id).await {
                Ok(DownloadOutcome::Written { .. }) => report.written.push(id.to_string()),
                Ok(DownloadOutcome::UpToDate) => report.up_to_date.push(id.to_string()),
                Err(error) => {
                    warn!(id, error = %error, "download failed");
                    report.failures.push(SyncFailure {
                        id: id.to_string(),
                        error,
                    });
                }
            }
        }
        info!(
            written = report.written.len(),
            up_to_date = report.up_to_date.len(),
            failed = report.failed(),
            "sync finished"
        );
        report
    }
}

fn resolve<'a>(tree: &'a RemoteTree, remote_path: &str) -> Result<&'a str, EngineError> {
    tree.resolve_path(remote_path)
        .ok_or_else(|| EngineError::UnknownRemotePath(remote_path.to_string()))
}

async fn local_is_current(node: &RemoteNode, target: &Path) -> bool {
    let Some(remote) = node.last_modified else {
        return false;
    };
    let Ok(metadata) = tokio::fs::metadata(target).await else {
        return false;
    };
    match metadata.modified() {
        Ok(modified) => {
            Timestamp::from_system_time(modified).is_some_and(|local| local >= remote)
        }
        Err(_) => false,
    }
}

/// Streams into a sibling partial file and renames it over `target`, so a
/// failed transfer never leaves a truncated document behind.
async fn write_document(id: &str, stream: ByteStream, target: &Path) -> Result<u64, EngineError> {
    let local_write = |source| EngineError::LocalWrite {
        path: target.to_path_buf(),
        source,
    };
    if let Some(parent) = target.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(local_write)?;
    }

    let partial = partial_path(target);
    let result = match stream_to_file(id, stream, &partial).await {
        Ok(bytes) => tokio::fs::rename(&partial, target)
            .await
            .map(|()| bytes)
            .map_err(local_write),
        Err(err) => Err(err),
    };
    if result.is_err() {
        let _ = tokio::fs::remove_file(&partial).await;
    }
    result
}

async fn stream_to_file(id: &str, mut stream: ByteStream, partial: &Path) -> Result<u64, EngineError> {
    let local_write = |source| EngineError::LocalWrite {
        path: partial.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::create(partial).await.map_err(local_write)?;
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| EngineError::Transport {
            id: id.to_string(),
            source,
        })?;
        file.write_all(&chunk).await.map_err(local_write)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(local_write)?;
    file.sync_all().await.map_err(local_write)?;
    Ok(written)
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
