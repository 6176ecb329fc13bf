//! Process-local [`BucketStore`] used by `--dev` mode and tests.

use async_trait::async_trait;
use dashmap::DashSet;
use tracing::debug;

use super::{BucketStore, StoreError};

/// Keeps bucket names in memory; nothing is persisted.
#[derive(Debug, Default)]
pub struct InMemoryBucketStore {
    buckets: DashSet<String>,
}

impl InMemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    async fn bucket_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.buckets.contains(name))
    }

    async fn create_bucket(&self, name: &str) -> Result<(), StoreError> {
        if self.buckets.insert(name.to_owned()) {
            debug!(bucket = name, "bucket created");
        }
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<(), StoreError> {
        match self.buckets.remove(name) {
            Some(_) => {
                debug!(bucket = name, "bucket deleted");
                Ok(())
            }
            None => Err(StoreError::NotFound(name.to_owned())),
        }
    }
}
