use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Address the tablet answers on when attached over USB.
pub const DEFAULT_BASE_URL: &str = "http://10.11.99.1";

/// The root folder has no id of its own; listing it uses the empty id.
pub const ROOT_ID: &str = "";

pub type ByteStream = BoxStream<'static, Result<Bytes, DeviceError>>;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("device returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("malformed listing: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct DeviceClient {
    http: Client,
    base_url: Url,
}

impl DeviceClient {
    pub fn new() -> Result<Self, DeviceError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, DeviceError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
        })
    }

    pub fn with_connect_timeout(base_url: &str, timeout: Duration) -> Result<Self, DeviceError> {
        let http = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Lists the immediate entries of a folder. Only valid for folders; the
    /// device has no listing endpoint for documents.
    pub async fn list_children(&self, folder_id: &str) -> Result<Vec<Entry>, DeviceError> {
        let url = self.endpoint(&format!("/documents/{folder_id}"))?;
        let response = self.http.get(url).send().await?;
        let body = Self::check_status(response).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Opens the PDF export of a document as a byte stream.
    pub async fn open_document(&self, id: &str) -> Result<ByteStream, DeviceError> {
        let url = self.endpoint(&format!("/download/{id}/pdf"))?;
        let response = self.http.get(url).send().await?;
        let response = Self::check_status(response).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(DeviceError::from))
            .boxed())
    }

    fn endpoint(&self, path: &str) -> Result<Url, DeviceError> {
        Ok(self.base_url.join(path)?)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DeviceError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DeviceError::Api { status, body })
        }
    }
}

/// One row of a folder listing as the device serves it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Entry {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Parent", default)]
    pub parent: Option<String>,
    // The firmware spells it with a double "s".
    #[serde(rename = "VissibleName", alias = "VisibleName")]
    pub visible_name: String,
    #[serde(rename = "Type")]
    pub entry_type: EntryType,
    #[serde(rename = "ModifiedClient", default)]
    pub modified_client: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum EntryType {
    #[serde(rename = "CollectionType")]
    Collection,
    #[serde(rename = "DocumentType")]
    Document,
}

impl EntryType {
    pub fn is_folder(self) -> bool {
        self == EntryType::Collection
    }
}
