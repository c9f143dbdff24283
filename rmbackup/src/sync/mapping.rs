use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::paths::partial_path;

const SEPARATOR: u8 = b':';

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("failed to read mapping file {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write mapping file {}: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot record mapping for {id:?}: {reason}")]
    InvalidRecord { id: String, reason: &'static str },
}

/// Why a mapped local file could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalFileState {
    Missing,
    Inaccessible(io::ErrorKind),
}

/// Remote document ids and the local files they are backed up to.
///
/// On disk this is one `id:path` record per line. The record splits at the
/// first `:`, so ids can never contain one while paths may. Paths are kept
/// as raw bytes, so any path the filesystem accepts survives a save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingStore {
    entries: BTreeMap<String, PathBuf>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses mapping records. The first record for an id wins. A broken
    /// record is skipped without affecting the others.
    pub fn parse(contents: impl AsRef<[u8]>) -> Self {
        let mut store = Self::new();
        for (number, line) in contents.as_ref().split(|byte| *byte == b'\n').enumerate() {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.trim_ascii().is_empty() {
                continue;
            }
            let Some(split) = line.iter().position(|byte| *byte == SEPARATOR) else {
                warn!(line = number + 1, "skipping mapping record without separator");
                continue;
            };
            let Ok(id) = std::str::from_utf8(&line[..split]) else {
                warn!(line = number + 1, "skipping mapping record whose id is not UTF-8");
                continue;
            };
            if id.is_empty() {
                warn!(line = number + 1, "skipping mapping record with empty id");
                continue;
            }
            let Some(local_path) = path_from_bytes(&line[split + 1..]) else {
                warn!(id, line = number + 1, "skipping mapping record with unusable path");
                continue;
            };
            if store.entries.contains_key(id) {
                debug!(id, line = number + 1, "ignoring duplicate mapping record");
                continue;
            }
            store.entries.insert(id.to_string(), local_path);
        }
        store
    }

    /// Reads the mapping file. A file that does not exist yet is an empty
    /// mapping, not an error.
    pub async fn load(path: &Path) -> Result<Self, MappingError> {
        match tokio::fs::read(path).await {
            Ok(contents) => Ok(Self::parse(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "mapping file does not exist yet");
                Ok(Self::new())
            }
            Err(source) => Err(MappingError::Load {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Returns the entries whose local file cannot be found. Nothing is
    /// created.
    pub async fn missing_local_files(&self) -> Vec<(&str, &Path, LocalFileState)> {
        let mut missing = Vec::new();
        for (id, local_path) in &self.entries {
            let state = match tokio::fs::try_exists(local_path).await {
                Ok(true) => continue,
                Ok(false) => {
                    warn!(id = %id, path = %local_path.display(), "mapped local file does not exist");
                    LocalFileState::Missing
                }
                Err(err) => {
                    warn!(
                        id = %id,
                        path = %local_path.display(),
                        error = %err,
                        "cannot check mapped local file"
                    );
                    LocalFileState::Inaccessible(err.kind())
                }
            };
            missing.push((id.as_str(), local_path.as_path(), state));
        }
        missing
    }

    pub fn render(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (id, local_path) in &self.entries {
            let Some(path) = path_to_bytes(local_path) else {
                warn!(id = %id, path = %local_path.display(), "dropping mapping record with unusable path");
                continue;
            };
            out.extend_from_slice(id.as_bytes());
            out.push(SEPARATOR);
            out.extend_from_slice(path);
            out.push(b'\n');
        }
        out
    }

    /// Writes every record, sorted by id, replacing the file atomically.
    pub async fn save(&self, path: &Path) -> Result<(), MappingError> {
        let partial = partial_path(path);
        let result = write_file(&partial, &self.render()).await;
        let result = match result {
            Ok(()) => tokio::fs::rename(&partial, path).await,
            Err(err) => Err(err),
        };
        if let Err(source) = result {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(MappingError::Save {
                path: path.to_path_buf(),
                source,
            });
        }
        debug!(path = %path.display(), entries = self.entries.len(), "mapping saved");
        Ok(())
    }

    /// Adds a mapping unless the id already has one. Returns whether the
    /// store changed. Relative local paths are resolved against the current
    /// directory.
    pub fn register(
        &mut self,
        id: &str,
        local_path: impl AsRef<Path>,
    ) -> Result<bool, MappingError> {
        let invalid = |reason: &'static str| MappingError::InvalidRecord {
            id: id.to_string(),
            reason,
        };
        if id.is_empty() {
            return Err(invalid("id is empty"));
        }
        if id.bytes().any(|byte| matches!(byte, SEPARATOR | b'\n' | b'\r')) {
            return Err(invalid("id contains ':' or a line break"));
        }
        let local_path = local_path.as_ref();
        match path_to_bytes(local_path) {
            None => return Err(invalid("local path cannot be stored")),
            Some(bytes) if bytes.iter().any(|byte| matches!(byte, b'\n' | b'\r')) => {
                return Err(invalid("local path contains a line break"));
            }
            Some(_) => {}
        }
        if self.entries.contains_key(id) {
            return Ok(false);
        }
        let local_path = std::path::absolute(local_path)
            .map_err(|_| invalid("local path cannot be made absolute"))?;
        self.entries.insert(id.to_string(), local_path);
        Ok(true)
    }

    /// Removes the mapping for `id`. Returns whether one existed.
    pub fn deregister(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&Path> {
        self.entries.get(id).map(PathBuf::as_path)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries
            .iter()
            .map(|(id, path)| (id.as_str(), path.as_path()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    file.sync_all().await
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> Option<PathBuf> {
    use std::os::unix::ffi::OsStrExt;
    Some(PathBuf::from(std::ffi::OsStr::from_bytes(bytes)))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> Option<PathBuf> {
    std::str::from_utf8(bytes).ok().map(PathBuf::from)
}

#[cfg(unix)]
fn path_to_bytes(path: &Path) -> Option<&[u8]> {
    use std::os::unix::ffi::OsStrExt;
    Some(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_to_bytes(path: &Path) -> Option<&[u8]> {
    path.to_str().map(str::as_bytes)
}
