use async_trait::async_trait;
use log::debug;
use serde_json::Value as JsonValue;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

use super::{ encode_document, DocumentStore, Resource, StorageError };

/// One JSON file per resource inside `data_dir`.
pub struct LocalDocumentStore {
    data_dir: PathBuf,
}

impl LocalDocumentStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    fn path_for(&self, resource: Resource) -> PathBuf {
        self.data_dir.join(resource.document_name())
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn read(&self, resource: Resource) -> Result<JsonValue, StorageError> {
        let path = self.path_for(resource);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} not found, using empty default", path.display());
                return Ok(resource.empty_default());
            }
            Err(source) => {
                return Err(StorageError::Io { resource, source });
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt { resource, source })
    }

    async fn write(&self, resource: Resource, value: &JsonValue) -> Result<(), StorageError> {
        fs::create_dir_all(&self.data_dir).await.map_err(|source| StorageError::Io {
            resource,
            source,
        })?;
        let path = self.path_for(resource);
        let body = encode_document(resource, value, true)?;
        fs::write(&path, body).await.map_err(|source| StorageError::Io { resource, source })?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_files_read_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDocumentStore::new(dir.path().join("not-yet-created"));

        assert_eq!(store.read(Resource::Readings).await.unwrap(), json!({}));
        assert_eq!(store.read(Resource::Conversations).await.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn write_replaces_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDocumentStore::new(dir.path());

        store.write(Resource::Readings, &json!({"2024-01-01": {"hba1c": 5.4}})).await.unwrap();
        store.write(Resource::Readings, &json!({"2024-02-01": {"hba1c": 5.6}})).await.unwrap();

        let stored = store.read(Resource::Readings).await.unwrap();
        assert_eq!(stored, json!({"2024-02-01": {"hba1c": 5.6}}));
        assert!(dir.path().join("readings.json").exists());
        assert!(!dir.path().join("conversations.json").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("conversations.json"), b"[{\"role\":").unwrap();
        let store = LocalDocumentStore::new(dir.path());

        let err = store.read(Resource::Conversations).await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { resource: Resource::Conversations, .. }));
    }
}
