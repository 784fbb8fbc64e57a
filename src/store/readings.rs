use log::debug;
use std::sync::Arc;

use crate::models::reading::{ Reading, ReadingSet };
use crate::storage::{ DocumentStore, Resource, StorageError };

/// Date-keyed readings persisted as a single document.
///
/// `upsert` is a read-modify-write of the whole document with no lock held
/// across it; concurrent upserts race and the last write wins.
#[derive(Clone)]
pub struct ReadingStore {
    documents: Arc<dyn DocumentStore>,
}

impl ReadingStore {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    pub async fn get_all(&self) -> Result<ReadingSet, StorageError> {
        let value = self.documents.read(Resource::Readings).await?;
        serde_json::from_value(value).map_err(|source| StorageError::Shape {
            resource: Resource::Readings,
            source,
        })
    }

    pub async fn upsert(&self, date: &str, reading: Reading) -> Result<(), StorageError> {
        let mut readings = self.get_all().await?;
        match readings.get_mut(date) {
            Some(existing) => {
                debug!("Updating existing record for {}", date);
                existing.apply(reading);
            }
            None => {
                debug!("Creating reading record for {}", date);
                readings.insert(date.to_string(), reading);
            }
        }
        self.save(&readings).await
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        self.save(&ReadingSet::new()).await
    }

    async fn save(&self, readings: &ReadingSet) -> Result<(), StorageError> {
        let value = serde_json::to_value(readings).map_err(|source| StorageError::Shape {
            resource: Resource::Readings,
            source,
        })?;
        self.documents.write(Resource::Readings, &value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryDocumentStore;

    fn store() -> ReadingStore {
        ReadingStore::new(Arc::new(MemoryDocumentStore::new()))
    }

    fn full_reading() -> Reading {
        Reading {
            hs_crp: Some(1.2),
            hba1c: Some(5.4),
            fasting_glucose: Some(90.0),
            ldl_cholesterol: Some(100.0),
            triglycerides: Some(80.0),
            hdl_cholesterol: Some(50.0),
            alt_liver_enzymes: Some(20.0),
            triglyceride_hdl_ratio: None,
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn upsert_new_date_creates_one_record() {
        let store = store();
        store.upsert("2024-01-01", full_reading()).await.unwrap();

        let readings = store.get_all().await.unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings["2024-01-01"], full_reading());
    }

    #[tokio::test]
    async fn upsert_same_date_updates_record() {
        let store = store();
        let mut first = full_reading();
        first.triglyceride_hdl_ratio = Some(1.6);
        store.upsert("2024-01-01", first).await.unwrap();

        let mut second = full_reading();
        second.hba1c = Some(6.1);
        store.upsert("2024-01-01", second).await.unwrap();

        let readings = store.get_all().await.unwrap();
        assert_eq!(readings.len(), 1);
        let merged = &readings["2024-01-01"];
        assert_eq!(merged.hba1c, Some(6.1));
        assert_eq!(merged.triglyceride_hdl_ratio, Some(1.6));
    }

    #[tokio::test]
    async fn clear_empties_the_set() {
        let store = store();
        store.upsert("2024-01-01", full_reading()).await.unwrap();
        store.upsert("2024-03-01", full_reading()).await.unwrap();
        store.clear().await.unwrap();

        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_object_document_is_a_shape_error() {
        let documents = Arc::new(MemoryDocumentStore::new());
        documents.write(Resource::Readings, &serde_json::json!([1, 2])).await.unwrap();

        let err = ReadingStore::new(documents).get_all().await.unwrap_err();
        assert!(matches!(err, StorageError::Shape { .. }));
    }
}
