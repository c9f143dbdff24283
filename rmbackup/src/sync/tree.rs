use std::collections::hash_map::Entry as MapEntry;
use std::collections::{HashMap, HashSet};

use rmbackup_core::{DeviceError, Entry, EntryType, ROOT_ID};
use thiserror::Error;
use tracing::{debug, warn};

use super::paths::{child_remote_path, normalize_remote_path};
use super::source::DocumentSource;
use super::timestamp::Timestamp;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("failed to list folder {folder_id:?}: {source}")]
    Transport {
        folder_id: String,
        #[source]
        source: DeviceError,
    },
    #[error("malformed listing for folder {folder_id:?}: {reason}")]
    MalformedResponse { folder_id: String, reason: String },
    #[error("id {0:?} appears more than once in the tree")]
    DuplicateId(String),
    #[error("no listing was fetched for folder {0:?}")]
    MissingListing(String),
}

impl TreeError {
    fn from_device(folder_id: &str, source: DeviceError) -> Self {
        match source {
            DeviceError::Malformed(err) => TreeError::MalformedResponse {
                folder_id: folder_id.to_string(),
                reason: err.to_string(),
            },
            source => TreeError::Transport {
                folder_id: folder_id.to_string(),
                source,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIndex(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Folder,
    Document,
}

impl From<EntryType> for NodeKind {
    fn from(value: EntryType) -> Self {
        match value {
            EntryType::Collection => NodeKind::Folder,
            EntryType::Document => NodeKind::Document,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteNode {
    pub kind: NodeKind,
    pub id: String,
    pub parent_id: Option<String>,
    pub name: Option<String>,
    pub last_modified: Option<Timestamp>,
    parent: Option<NodeIndex>,
    // `None` for documents, which never have a listing.
    children: Option<Vec<NodeIndex>>,
}

impl RemoteNode {
    fn root() -> Self {
        Self {
            kind: NodeKind::Folder,
            id: ROOT_ID.to_string(),
            parent_id: None,
            name: None,
            last_modified: None,
            parent: None,
            children: Some(Vec::new()),
        }
    }

    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    pub fn children(&self) -> Option<&[NodeIndex]> {
        self.children.as_deref()
    }

    pub fn has_children(&self) -> bool {
        self.children.as_ref().is_some_and(|c| !c.is_empty())
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }
}

/// Raw folder listings keyed by folder id, as fetched from the device.
pub type Listings = HashMap<String, Vec<Entry>>;

/// The device's document hierarchy, stored as an arena with index links.
///
/// Only leaves are indexed: every document, plus any folder that turned out
/// to be empty. Callers that download must still check the node kind.
#[derive(Debug, Clone)]
pub struct RemoteTree {
    nodes: Vec<RemoteNode>,
    by_id: HashMap<String, NodeIndex>,
    path_to_id: HashMap<String, String>,
    paths: HashMap<NodeIndex, String>,
}

impl RemoteTree {
    pub async fn fetch<S: DocumentSource>(source: &S) -> Result<Self, TreeError> {
        let listings = fetch_listings(source).await?;
        Self::assemble(listings)
    }

    pub fn assemble(mut listings: Listings) -> Result<Self, TreeError> {
        let mut tree = Self {
            nodes: vec![RemoteNode::root()],
            by_id: HashMap::new(),
            path_to_id: HashMap::new(),
            paths: HashMap::new(),
        };
        let mut seen = HashSet::from([ROOT_ID.to_string()]);
        let mut pending = vec![(NodeIndex(0), String::new())];

        while let Some((index, path)) = pending.pop() {
            if tree.nodes[index.0].is_folder() {
                let folder_id = tree.nodes[index.0].id.clone();
                let entries = listings
                    .remove(&folder_id)
                    .ok_or_else(|| TreeError::MissingListing(folder_id.clone()))?;
                let mut children = Vec::with_capacity(entries.len());
                for entry in entries {
                    if !seen.insert(entry.id.clone()) {
                        return Err(TreeError::DuplicateId(entry.id));
                    }
                    let node = materialize(&folder_id, index, entry)?;
                    children.push(NodeIndex(tree.nodes.len()));
                    tree.nodes.push(node);
                }
                tree.nodes[index.0].children = Some(children);
            }

            let node = &tree.nodes[index.0];
            if !node.has_children() {
                tree.index_leaf(index, path);
                continue;
            }
            // Reverse so the first listed child is visited first.
            for &child in node.children().unwrap_or_default().iter().rev() {
                let name = tree.nodes[child.0].name.as_deref().unwrap_or_default();
                pending.push((child, child_remote_path(&path, name)));
            }
        }

        Ok(tree)
    }

    fn index_leaf(&mut self, index: NodeIndex, path: String) {
        let id = self.nodes[index.0].id.clone();
        self.by_id.insert(id.clone(), index);
        match self.path_to_id.entry(path.clone()) {
            MapEntry::Vacant(slot) => {
                slot.insert(id);
            }
            MapEntry::Occupied(existing) => {
                warn!(
                    remote_path = %path,
                    kept = %existing.get(),
                    shadowed = %id,
                    "two entries share a remote path; only the first can be registered by path"
                );
            }
        }
        self.paths.insert(index, path);
    }

    pub fn root(&self) -> &RemoteNode {
        &self.nodes[0]
    }

    pub fn node(&self, index: NodeIndex) -> &RemoteNode {
        &self.nodes[index.0]
    }

    /// Looks up an indexed leaf by id.
    pub fn get(&self, id: &str) -> Option<&RemoteNode> {
        self.by_id.get(id).map(|index| &self.nodes[index.0])
    }

    pub fn resolve_path(&self, remote_path: &str) -> Option<&str> {
        self.path_to_id
            .get(normalize_remote_path(remote_path))
            .map(String::as_str)
    }

    pub fn path_of(&self, id: &str) -> Option<&str> {
        let index = self.by_id.get(id)?;
        self.paths.get(index).map(String::as_str)
    }

    pub fn leaf_count(&self) -> usize {
        self.by_id.len()
    }

    /// Total nodes in the arena, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Indexed leaves sorted by remote path.
    pub fn leaves(&self) -> Vec<(&str, &RemoteNode)> {
        let mut leaves: Vec<_> = self
            .paths
            .iter()
            .map(|(index, path)| (path.as_str(), &self.nodes[index.0]))
            .collect();
        leaves.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        leaves
    }
}

/// Walks the folders depth first, one listing request at a time.
pub async fn fetch_listings<S: DocumentSource>(source: &S) -> Result<Listings, TreeError> {
    let mut listings = Listings::new();
    let mut pending = vec![ROOT_ID.to_string()];

    while let Some(folder_id) = pending.pop() {
        if listings.contains_key(&folder_id) {
            return Err(TreeError::DuplicateId(folder_id));
        }
        let entries = source
            .list_children(&folder_id)
            .await
            .map_err(|err| TreeError::from_device(&folder_id, err))?;
        debug!(folder_id = %folder_id, entries = entries.len(), "listed folder");
        pending.extend(
            entries
                .iter()
                .rev()
                .filter(|entry| entry.entry_type.is_folder())
                .map(|entry| entry.id.clone()),
        );
        listings.insert(folder_id, entries);
    }

    Ok(listings)
}

fn materialize(folder_id: &str, parent: NodeIndex, entry: Entry) -> Result<RemoteNode, TreeError> {
    let kind = NodeKind::from(entry.entry_type);
    let (last_modified, children) = match kind {
        NodeKind::Folder => (None, Some(Vec::new())),
        NodeKind::Document => {
            let raw = entry.modified_client.as_deref().ok_or_else(|| {
                TreeError::MalformedResponse {
                    folder_id: folder_id.to_string(),
                    reason: format!("document {:?} has no modification time", entry.id),
                }
            })?;
            let modified =
                Timestamp::parse(raw).map_err(|err| TreeError::MalformedResponse {
                    folder_id: folder_id.to_string(),
                    reason: err.to_string(),
                })?;
            (Some(modified), None)
        }
    };

    Ok(RemoteNode {
        kind,
        id: entry.id,
        parent_id: Some(folder_id.to_string()),
        name: Some(entry.visible_name),
        last_modified,
        parent: Some(parent),
        children,
    })
}
