mod client;

pub use client::{ByteStream, DEFAULT_BASE_URL, DeviceClient, DeviceError, Entry, EntryType, ROOT_ID};
pub use reqwest::StatusCode;
