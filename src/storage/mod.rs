mod blob;
mod local;
mod memory;

pub use blob::BlobDocumentStore;
pub use local::LocalDocumentStore;
pub use memory::MemoryDocumentStore;

use async_trait::async_trait;
use log::info;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use crate::cli::Args;

/// The two JSON documents the service persists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    Readings,
    Conversations,
}

impl Resource {
    pub fn document_name(&self) -> &'static str {
        match self {
            Resource::Readings => "readings.json",
            Resource::Conversations => "conversations.json",
        }
    }

    /// Value a missing document reads as.
    pub fn empty_default(&self) -> JsonValue {
        match self {
            Resource::Readings => JsonValue::Object(serde_json::Map::new()),
            Resource::Conversations => JsonValue::Array(Vec::new()),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.document_name())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage IO error for {resource}: {source}")]
    Io {
        resource: Resource,
        #[source]
        source: std::io::Error,
    },
    #[error("Storage request for {resource} failed: {source}")]
    Http {
        resource: Resource,
        #[source]
        source: reqwest::Error,
    },
    #[error("Storage returned status {status} for {resource}: {body}")]
    Status {
        resource: Resource,
        status: u16,
        body: String,
    },
    #[error("Stored document {resource} is not valid JSON: {source}")]
    Corrupt {
        resource: Resource,
        #[source]
        source: serde_json::Error,
    },
    #[error("Document {resource} has unexpected shape: {source}")]
    Shape {
        resource: Resource,
        #[source]
        source: serde_json::Error,
    },
    #[error("Storage configuration error: {0}")]
    Config(String),
}

/// Serializes a document for a backend write. Both backends go through here so
/// a value that will not serialize is reported the same way.
pub(crate) fn encode_document(
    resource: Resource,
    value: &JsonValue,
    pretty: bool
) -> Result<Vec<u8>, StorageError> {
    let encoded = if pretty { serde_json::to_vec_pretty(value) } else { serde_json::to_vec(value) };
    encoded.map_err(|source| StorageError::Shape { resource, source })
}

/// Whole-document persistence. Reads of a missing document yield
/// `Resource::empty_default`; writes replace the document entirely.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read(&self, resource: Resource) -> Result<JsonValue, StorageError>;

    async fn write(&self, resource: Resource, value: &JsonValue) -> Result<(), StorageError>;
}

pub fn create_document_store(
    args: &Args
) -> Result<Arc<dyn DocumentStore>, StorageError> {
    match args.storage_type.to_lowercase().as_str() {
        "local" => Ok(Arc::new(LocalDocumentStore::new(&args.data_dir))),
        "blob" => {
            let readings_url = args.readings_blob_url
                .as_deref()
                .ok_or_else(|| StorageError::Config("READINGS_BLOB_URL is required for blob storage".into()))?;
            let conversations_url = args.conversations_blob_url
                .as_deref()
                .ok_or_else(|| StorageError::Config("CONVERSATIONS_BLOB_URL is required for blob storage".into()))?;
            Ok(Arc::new(BlobDocumentStore::new(readings_url, conversations_url)?))
        }
        "memory" => Ok(Arc::new(MemoryDocumentStore::new())),
        other => Err(StorageError::Config(format!("Unsupported storage type: {}", other))),
    }
}

pub fn initialize_document_store(
    args: &Args
) -> Result<Arc<dyn DocumentStore>, StorageError> {
    match args.storage_type.to_lowercase().as_str() {
        "local" => info!("Readings and conversations will be stored in: {}", args.data_dir),
        other => info!("Readings and conversations will be stored in: {}", other),
    }
    create_document_store(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_match_document_kind() {
        assert!(Resource::Readings.empty_default().as_object().unwrap().is_empty());
        assert!(Resource::Conversations.empty_default().as_array().unwrap().is_empty());
    }

    #[test]
    fn encode_document_honours_layout() {
        let value = serde_json::json!({"2024-01-01": {"hba1c": 5.4}});
        let compact = encode_document(Resource::Readings, &value, false).unwrap();
        let pretty = encode_document(Resource::Readings, &value, true).unwrap();
        assert_eq!(compact, br#"{"2024-01-01":{"hba1c":5.4}}"#.to_vec());
        assert!(String::from_utf8(pretty).unwrap().contains("\n  \"2024-01-01\""));
    }

    #[test]
    fn shape_error_does_not_claim_invalid_json() {
        let source = serde_json::from_str::<u8>("\"x\"").unwrap_err();
        let err = StorageError::Shape { resource: Resource::Readings, source };
        let message = err.to_string();
        assert!(message.starts_with("Document readings.json has unexpected shape"));
        assert!(!message.contains("not valid JSON"));
    }

    #[test]
    fn blob_backend_needs_both_urls() {
        let args = Args::parse_from([
            "health-monitor",
            "--storage-type",
            "blob",
            "--readings-blob-url",
            "https://example.blob.core.windows.net/data/readings.json?sig=a",
        ]);
        assert!(matches!(create_document_store(&args), Err(StorageError::Config(_))));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let args = Args::parse_from(["health-monitor", "--storage-type", "s3"]);
        assert!(matches!(create_document_store(&args), Err(StorageError::Config(_))));
    }
}
