use rmbackup_core::{ByteStream, DeviceClient, DeviceError, Entry};

/// Where the tree listings and document bytes come from.
///
/// `list_children` is only ever called for folders and `open_document` only
/// for documents; the device serves the two through different endpoints.
#[allow(async_fn_in_trait)]
pub trait DocumentSource {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<Entry>, DeviceError>;

    async fn open_document(&self, id: &str) -> Result<ByteStream, DeviceError>;
}

impl DocumentSource for DeviceClient {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<Entry>, DeviceError> {
        DeviceClient::list_children(self, folder_id).await
    }

    async fn open_document(&self, id: &str) -> Result<ByteStream, DeviceError> {
        DeviceClient::open_document(self, id).await
    }
}
