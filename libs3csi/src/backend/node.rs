//! Node service: stages a bucket through the S3 FUSE bridge and publishes it
//! with bind mounts.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::config::DriverConfig;
use crate::error::CsiError;
use crate::mount::{MountRequest, MountState, Mounter};
use crate::node::CsiNode;
use crate::types::*;

/// Secret key overriding the configured access key for one volume.
pub const SECRET_ACCESS_KEY_ID: &str = "accessKeyID";
/// Secret key overriding the configured secret key for one volume.
pub const SECRET_SECRET_ACCESS_KEY: &str = "secretAccessKey";

pub struct S3Node {
    node_id: String,
    endpoint: String,
    region: String,
    access_key: String,
    secret_key: String,
    /// Mounts the bucket at the staging path.
    stager: Arc<dyn Mounter>,
    /// Binds the staging path onto target paths.
    publisher: Arc<dyn Mounter>,
}

impl S3Node {
    pub fn new(
        config: &DriverConfig,
        stager: Arc<dyn Mounter>,
        publisher: Arc<dyn Mounter>,
    ) -> Self {
        Self {
            node_id: config.node_id.clone(),
            endpoint: config.s3.endpoint.clone(),
            region: config.s3.region.clone(),
            access_key: config.credentials.access_key.clone(),
            secret_key: config.credentials.secret_key.clone(),
            stager,
            publisher,
        }
    }

    /// Credentials for one stage call: the request secrets when they carry
    /// both keys, the configured ones otherwise.
    fn credentials<'a>(&'a self, secrets: &'a HashMap<String, String>) -> (&'a str, &'a str) {
        match (
            secrets.get(SECRET_ACCESS_KEY_ID),
            secrets.get(SECRET_SECRET_ACCESS_KEY),
        ) {
            (Some(ak), Some(sk)) if !ak.is_empty() && !sk.is_empty() => (ak.as_str(), sk.as_str()),
            _ => (self.access_key.as_str(), self.secret_key.as_str()),
        }
    }

    fn region(&self, context: &VolumeContext) -> String {
        context
            .get(CONTEXT_REGION)
            .filter(|r| !r.is_empty())
            .unwrap_or(&self.region)
            .clone()
    }
}

#[async_trait]
impl CsiNode for S3Node {
    #[instrument(skip(self, req), fields(volume_id = %req.volume_id, staging = %req.staging_target_path))]
    async fn stage_volume(&self, req: NodeStageVolumeRequest) -> Result<(), CsiError> {
        if req.staging_target_path.is_empty() {
            return Err(CsiError::invalid("staging target path missing"));
        }
        if req.volume_id.is_empty() {
            return Err(CsiError::invalid("volume id missing"));
        }

        // A corrupted stage falls through and is mounted again.
        if self.stager.state(&req.staging_target_path).await? == MountState::Mounted {
            debug!("volume already staged");
            return Ok(());
        }

        let (access_key, secret_key) = self.credentials(&req.secrets);
        if access_key.is_empty() || secret_key.is_empty() {
            return Err(CsiError::invalid("invalid credentials"));
        }

        let gid = req
            .volume_capability
            .as_ref()
            .and_then(VolumeCapability::volume_mount_group)
            .map(str::to_owned);

        let mount = MountRequest {
            staging_target_path: req.staging_target_path.clone(),
            target_path: req.staging_target_path.clone(),
            bucket: req.volume_id.to_string(),
            endpoint: self.endpoint.clone(),
            region: self.region(&req.volume_context),
            access_key: access_key.to_owned(),
            secret_key: secret_key.to_owned(),
            read_only: false,
            gid,
            options: req.volume_context.clone(),
        };
        self.stager.mount(&mount).await?;

        info!("volume staged");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unstage_volume(
        &self,
        volume_id: &VolumeId,
        staging_target_path: &str,
    ) -> Result<(), CsiError> {
        if staging_target_path.is_empty() {
            debug!("empty staging path, nothing to unstage");
            return Ok(());
        }
        if !self.stager.is_mounted(staging_target_path).await? {
            debug!("volume not staged");
            return Ok(());
        }

        self.stager.unmount(staging_target_path).await?;
        info!("volume unstaged");
        Ok(())
    }

    #[instrument(skip(self, req), fields(volume_id = %req.volume_id, target = %req.target_path))]
    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError> {
        if req.target_path.is_empty() {
            return Err(CsiError::invalid("target path missing"));
        }
        if req.staging_target_path.is_empty() {
            return Err(CsiError::invalid("staging target path missing"));
        }
        if req.volume_context.is_empty() {
            return Err(CsiError::invalid("volume context missing"));
        }
        if req.volume_id.is_empty() {
            return Err(CsiError::invalid("volume id missing"));
        }

        if self.publisher.state(&req.target_path).await? == MountState::Mounted {
            debug!("volume already published");
            return Ok(());
        }

        let read_only = req.read_only
            || req
                .volume_capability
                .as_ref()
                .is_some_and(VolumeCapability::is_read_only);

        let mount = MountRequest {
            staging_target_path: req.staging_target_path.clone(),
            target_path: req.target_path.clone(),
            bucket: req.volume_id.to_string(),
            region: self.region(&req.volume_context),
            read_only,
            options: req.volume_context.clone(),
            ..Default::default()
        };
        self.publisher.mount(&mount).await?;

        info!(read_only, "volume published");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unpublish_volume(
        &self,
        volume_id: &VolumeId,
        target_path: &str,
    ) -> Result<(), CsiError> {
        if target_path.is_empty() {
            debug!("empty target path, nothing to unpublish");
            return Ok(());
        }
        if self.publisher.is_mounted(target_path).await? {
            self.publisher.unmount(target_path).await?;
        } else {
            debug!("volume not published");
        }

        // The orchestrator created the mount point only for this bind.
        match tokio::fs::remove_dir(target_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "failed to remove target directory"),
        }

        info!("volume unpublished");
        Ok(())
    }

    async fn get_info(&self) -> Result<NodeInfo, CsiError> {
        Ok(NodeInfo {
            node_id: self.node_id.clone(),
        })
    }

    async fn get_capabilities(&self) -> Result<Vec<NodeCapability>, CsiError> {
        Ok(vec![
            NodeCapability::StageUnstageVolume,
            NodeCapability::VolumeMountGroup,
        ])
    }
}
