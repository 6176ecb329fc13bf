//! Object-store backed implementation of the CSI services.
//!
//! [`S3Controller`] maps volumes to buckets, [`S3Node`] stages buckets with
//! the S3 FUSE bridge and publishes them with bind mounts, and
//! [`S3Identity`] reports plugin metadata.  [`S3Driver`] bundles the three so
//! one handler can be served by [`CsiServer`](crate::transport::CsiServer).

mod controller;
mod identity;
mod node;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DriverConfig;
use crate::controller::CsiController;
use crate::error::CsiError;
use crate::identity::CsiIdentity;
use crate::mount::{
    BindMounter, CommandRunner, MountTable, Mounter, ProcMountTable, S3Mounter,
    TokioCommandRunner,
};
use crate::node::CsiNode;
use crate::store::BucketStore;
use crate::types::*;

pub use controller::S3Controller;
pub use identity::S3Identity;
pub use node::{S3Node, SECRET_ACCESS_KEY_ID, SECRET_SECRET_ACCESS_KEY};

/// All three CSI services behind one handler.
pub struct S3Driver {
    identity: S3Identity,
    controller: S3Controller,
    node: S3Node,
}

impl S3Driver {
    pub fn new(identity: S3Identity, controller: S3Controller, node: S3Node) -> Self {
        Self {
            identity,
            controller,
            node,
        }
    }

    /// Wire the services from configuration with explicit seams for the
    /// bucket store, the mount table and the subprocess runner.
    pub fn with_parts(
        config: &DriverConfig,
        store: Arc<dyn BucketStore>,
        table: Arc<dyn MountTable>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let stager: Arc<dyn Mounter> = Arc::new(S3Mounter::new(
            &config.mount_binary_s3,
            table.clone(),
            runner.clone(),
        ));
        let publisher: Arc<dyn Mounter> =
            Arc::new(BindMounter::new(&config.mount_binary, table, runner));

        Self::new(
            S3Identity::new(config.meta.clone()),
            S3Controller::new(store, &config.s3.bucket_prefix, &config.s3.region),
            S3Node::new(config, stager, publisher),
        )
    }

    /// Production wiring: `/proc/self/mounts` and real subprocesses.
    pub fn from_config(config: &DriverConfig, store: Arc<dyn BucketStore>) -> Self {
        Self::with_parts(
            config,
            store,
            Arc::new(ProcMountTable::new()),
            Arc::new(TokioCommandRunner),
        )
    }
}

#[async_trait]
impl CsiIdentity for S3Driver {
    async fn get_plugin_info(&self) -> Result<PluginInfo, CsiError> {
        self.identity.get_plugin_info().await
    }

    async fn probe(&self) -> Result<bool, CsiError> {
        self.identity.probe().await
    }

    async fn get_plugin_capabilities(&self) -> Result<Vec<PluginCapability>, CsiError> {
        self.identity.get_plugin_capabilities().await
    }
}

#[async_trait]
impl CsiController for S3Driver {
    async fn create_volume(&self, req: CreateVolumeRequest) -> Result<Volume, CsiError> {
        self.controller.create_volume(req).await
    }

    async fn delete_volume(&self, volume_id: &VolumeId) -> Result<(), CsiError> {
        self.controller.delete_volume(volume_id).await
    }

    async fn validate_volume_capabilities(
        &self,
        volume_id: &VolumeId,
        capabilities: &[VolumeCapability],
    ) -> Result<CapabilityValidation, CsiError> {
        self.controller
            .validate_volume_capabilities(volume_id, capabilities)
            .await
    }

    async fn get_capabilities(&self) -> Result<Vec<ControllerCapability>, CsiError> {
        self.controller.get_capabilities().await
    }
}

#[async_trait]
impl CsiNode for S3Driver {
    async fn stage_volume(&self, req: NodeStageVolumeRequest) -> Result<(), CsiError> {
        self.node.stage_volume(req).await
    }

    async fn unstage_volume(
        &self,
        volume_id: &VolumeId,
        staging_target_path: &str,
    ) -> Result<(), CsiError> {
        self.node
            .unstage_volume(volume_id, staging_target_path)
            .await
    }

    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError> {
        self.node.publish_volume(req).await
    }

    async fn unpublish_volume(
        &self,
        volume_id: &VolumeId,
        target_path: &str,
    ) -> Result<(), CsiError> {
        self.node.unpublish_volume(volume_id, target_path).await
    }

    async fn get_info(&self) -> Result<NodeInfo, CsiError> {
        self.node.get_info().await
    }

    async fn get_capabilities(&self) -> Result<Vec<NodeCapability>, CsiError> {
        CsiNode::get_capabilities(&self.node).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::fake::{FakeMountTable, RecordingRunner};
    use crate::store::InMemoryBucketStore;

    #[tokio::test]
    async fn volume_round_trip_through_driver() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = tmp.path().join("stage").to_str().unwrap().to_owned();
        let target = tmp.path().join("target").to_str().unwrap().to_owned();

        let mut config = DriverConfig::default();
        config.node_id = "node-1".into();
        config.s3.endpoint = "http://127.0.0.1:9000".into();
        config.s3.bucket_prefix = "pvc".into();
        config.credentials.access_key = "ak".into();
        config.credentials.secret_key = "sk".into();

        let store = Arc::new(InMemoryBucketStore::new());
        let table = Arc::new(FakeMountTable::default());
        let runner = Arc::new(RecordingRunner::succeeding(table.clone()));
        let driver = S3Driver::with_parts(&config, store.clone(), table.clone(), runner.clone());

        let volume = driver
            .create_volume(CreateVolumeRequest {
                name: "Data".into(),
                capacity_bytes: 0,
                volume_capabilities: vec![VolumeCapability::default()],
            })
            .await
            .unwrap();
        assert_eq!(volume.volume_id.as_str(), "pvc-data");

        driver
            .stage_volume(NodeStageVolumeRequest {
                volume_id: volume.volume_id.clone(),
                staging_target_path: staging.clone(),
                volume_context: volume.volume_context.clone(),
                ..Default::default()
            })
            .await
            .unwrap();
        driver
            .publish_volume(NodePublishVolumeRequest {
                volume_id: volume.volume_id.clone(),
                staging_target_path: staging.clone(),
                target_path: target.clone(),
                volume_context: volume.volume_context.clone(),
                ..Default::default()
            })
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].program, config.mount_binary_s3);
        assert!(calls[0].args.iter().any(|a| a == "pvc-data"));
        assert_eq!(calls[1].program, config.mount_binary);

        driver
            .unpublish_volume(&volume.volume_id, &target)
            .await
            .unwrap();
        driver
            .unstage_volume(&volume.volume_id, &staging)
            .await
            .unwrap();
        driver.delete_volume(&volume.volume_id).await.unwrap();

        assert!(store.is_empty());
        assert!(!table.is_marked(&staging));
        assert!(!table.is_marked(&target));
    }
}
