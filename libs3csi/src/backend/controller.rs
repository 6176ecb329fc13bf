//! Controller service backed by an object store: one bucket per volume.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::controller::CsiController;
use crate::error::CsiError;
use crate::store::{BucketStore, StoreError};
use crate::types::*;

pub struct S3Controller {
    store: Arc<dyn BucketStore>,
    bucket_prefix: String,
    region: String,
}

impl S3Controller {
    pub fn new(
        store: Arc<dyn BucketStore>,
        bucket_prefix: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket_prefix: bucket_prefix.into(),
            region: region.into(),
        }
    }

    /// Bucket backing the volume called `name`.
    fn bucket_name(&self, name: &str) -> VolumeId {
        let id = VolumeId::from_name(name);
        if self.bucket_prefix.is_empty() {
            id
        } else {
            VolumeId(format!("{}-{id}", self.bucket_prefix))
        }
    }
}

#[async_trait]
impl CsiController for S3Controller {
    #[instrument(skip(self, req), fields(name = %req.name))]
    async fn create_volume(&self, req: CreateVolumeRequest) -> Result<Volume, CsiError> {
        if req.name.is_empty() {
            return Err(CsiError::invalid("volume name missing"));
        }
        if req.volume_capabilities.is_empty() {
            return Err(CsiError::invalid("volume capabilities missing"));
        }

        let volume_id = self.bucket_name(&req.name);
        self.store.create_bucket(volume_id.as_str()).await?;
        info!(%volume_id, "volume created");

        Ok(Volume {
            volume_id,
            capacity_bytes: req.capacity_bytes,
            volume_context: HashMap::from([
                (CONTEXT_CAPACITY.to_owned(), req.capacity_bytes.to_string()),
                (CONTEXT_REGION.to_owned(), self.region.clone()),
            ]),
        })
    }

    #[instrument(skip(self))]
    async fn delete_volume(&self, volume_id: &VolumeId) -> Result<(), CsiError> {
        if volume_id.is_empty() {
            debug!("empty volume id, nothing to delete");
            return Ok(());
        }

        match self.store.delete_bucket(volume_id.as_str()).await {
            Ok(()) => {
                info!("volume deleted");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => {
                debug!("bucket already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, capabilities))]
    async fn validate_volume_capabilities(
        &self,
        volume_id: &VolumeId,
        capabilities: &[VolumeCapability],
    ) -> Result<CapabilityValidation, CsiError> {
        if volume_id.is_empty() {
            return Err(CsiError::invalid("volume id missing"));
        }
        if !self.store.bucket_exists(volume_id.as_str()).await? {
            return Err(CsiError::NotFound(format!("volume {volume_id}")));
        }

        if capabilities.iter().any(|c| !c.is_mount()) {
            return Ok(CapabilityValidation::Rejected(
                "only filesystem volumes are supported".to_owned(),
            ));
        }
        Ok(CapabilityValidation::Confirmed(capabilities.to_vec()))
    }

    async fn get_capabilities(&self) -> Result<Vec<ControllerCapability>, CsiError> {
        Ok(vec![
            ControllerCapability::CreateDeleteVolume,
            ControllerCapability::PublishUnpublishVolume,
        ])
    }
}
