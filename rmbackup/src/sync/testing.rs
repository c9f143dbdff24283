//! In-memory device used by the sync tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use bytes::Bytes;
use futures_util::StreamExt;
use rmbackup_core::{ByteStream, DeviceError, Entry, EntryType, StatusCode};

use super::source::DocumentSource;

pub const MODIFIED: &str = "2023-06-01T06:51:07.000000Z";

#[derive(Default)]
pub struct FakeSource {
    listings: HashMap<String, Vec<Entry>>,
    documents: HashMap<String, Vec<u8>>,
    failing_listings: HashSet<String>,
    failing_documents: HashSet<String>,
    truncated_documents: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        let mut source = Self::default();
        source.listings.insert(String::new(), Vec::new());
        source
    }

    pub fn folder(mut self, parent: &str, id: &str, name: &str) -> Self {
        self.push_entry(parent, id, name, EntryType::Collection, None);
        self.listings.entry(id.to_string()).or_default();
        self
    }

    pub fn document(self, parent: &str, id: &str, name: &str, body: &[u8]) -> Self {
        self.document_modified(parent, id, name, MODIFIED, body)
    }

    pub fn document_modified(
        mut self,
        parent: &str,
        id: &str,
        name: &str,
        modified: &str,
        body: &[u8],
    ) -> Self {
        self.push_entry(
            parent,
            id,
            name,
            EntryType::Document,
            Some(modified.to_string()),
        );
        self.documents.insert(id.to_string(), body.to_vec());
        self
    }

    /// Adds a raw listing row without any of the bookkeeping above.
    pub fn raw_entry(mut self, parent: &str, entry: Entry) -> Self {
        self.listings
            .entry(parent.to_string())
            .or_default()
            .push(entry);
        self
    }

    pub fn fail_listing(mut self, folder_id: &str) -> Self {
        self.failing_listings.insert(folder_id.to_string());
        self
    }

    pub fn fail_document(mut self, id: &str) -> Self {
        self.failing_documents.insert(id.to_string());
        self
    }

    /// The document's first chunk arrives, then the connection drops.
    pub fn truncate_document(mut self, id: &str) -> Self {
        self.truncated_documents.insert(id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| call.strip_prefix("open:").map(str::to_string))
            .collect()
    }

    fn push_entry(
        &mut self,
        parent: &str,
        id: &str,
        name: &str,
        entry_type: EntryType,
        modified_client: Option<String>,
    ) {
        self.listings
            .entry(parent.to_string())
            .or_default()
            .push(Entry {
                id: id.to_string(),
                parent: Some(parent.to_string()),
                visible_name: name.to_string(),
                entry_type,
                modified_client,
            });
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn unavailable() -> DeviceError {
    DeviceError::Api {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: "device busy".into(),
    }
}

impl DocumentSource for FakeSource {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<Entry>, DeviceError> {
        self.record(format!("list:{folder_id}"));
        if self.failing_listings.contains(folder_id) {
            return Err(unavailable());
        }
        Ok(self.listings.get(folder_id).cloned().unwrap_or_default())
    }

    async fn open_document(&self, id: &str) -> Result<ByteStream, DeviceError> {
        self.record(format!("open:{id}"));
        if self.failing_documents.contains(id) {
            return Err(unavailable());
        }
        let body = Bytes::from(self.documents.get(id).cloned().unwrap_or_default());
        let chunks = if self.truncated_documents.contains(id) {
            vec![Ok(body), Err(unavailable())]
        } else {
            vec![Ok(body)]
        };
        Ok(futures_util::stream::iter(chunks).boxed())
    }
}
