use async_trait::async_trait;
use log::debug;
use reqwest::header::{ HeaderMap, HeaderValue, CONTENT_TYPE };
use reqwest::{ Client as HttpClient, StatusCode };
use serde_json::Value as JsonValue;
use url::Url;

use super::{ encode_document, DocumentStore, Resource, StorageError };

const BLOB_TYPE_HEADER: &str = "x-ms-blob-type";

/// Documents addressed by pre-signed (SAS) URLs on a remote object store.
pub struct BlobDocumentStore {
    http: HttpClient,
    readings_url: Url,
    conversations_url: Url,
}

fn parse_blob_url(raw: &str) -> Result<Url, StorageError> {
    Url::parse(raw).map_err(|e| StorageError::Config(format!("Invalid blob URL: {}", e)))
}

/// Blob URL without its signature, safe to log.
fn redacted(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}

impl BlobDocumentStore {
    pub fn new(readings_url: &str, conversations_url: &str) -> Result<Self, StorageError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| StorageError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            readings_url: parse_blob_url(readings_url)?,
            conversations_url: parse_blob_url(conversations_url)?,
        })
    }

    fn url_for(&self, resource: Resource) -> &Url {
        match resource {
            Resource::Readings => &self.readings_url,
            Resource::Conversations => &self.conversations_url,
        }
    }
}

#[async_trait]
impl DocumentStore for BlobDocumentStore {
    async fn read(&self, resource: Resource) -> Result<JsonValue, StorageError> {
        let url = self.url_for(resource);
        let resp = self.http
            .get(url.clone())
            .send().await
            .map_err(|source| StorageError::Http { resource, source })?;

        match resp.status() {
            StatusCode::NOT_FOUND => {
                debug!("Blob {} not found, using empty default", redacted(url));
                Ok(resource.empty_default())
            }
            s if s.is_success() => {
                let bytes = resp
                    .bytes().await
                    .map_err(|source| StorageError::Http { resource, source })?;
                serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
                    resource,
                    source,
                })
            }
            s => {
                let body = resp.text().await.unwrap_or_default();
                Err(StorageError::Status { resource, status: s.as_u16(), body })
            }
        }
    }

    async fn write(&self, resource: Resource, value: &JsonValue) -> Result<(), StorageError> {
        let url = self.url_for(resource);
        let body = encode_document(resource, value, false)?;
        let resp = self.http
            .put(url.clone())
            .header(BLOB_TYPE_HEADER, "BlockBlob")
            .body(body)
            .send().await
            .map_err(|source| StorageError::Http { resource, source })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Status { resource, status: status.as_u16(), body });
        }
        debug!("Uploaded {}", redacted(url));
        Ok(())
    }
}
