//! CSI Node service trait.
//!
//! The Node service runs on each worker node and drives the two mount tiers
//! of a volume:
//!
//! 1. **Stage**: mount the bucket once per node at the staging path.
//! 2. **Publish**: bind-mount the staging path into a workload target path.
//! 3. **Unpublish**: remove the bind-mount.
//! 4. **Unstage**: unmount the bucket.
//!
//! No state is kept between calls; whether a volume is staged or published
//! is read from the OS mount table every time.

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{
    NodeCapability, NodeInfo, NodePublishVolumeRequest, NodeStageVolumeRequest, VolumeId,
};

/// Node service: local mount / unmount operations.
#[async_trait]
pub trait CsiNode: Send + Sync {
    /// Stage a volume: mount the bucket at the staging path.
    ///
    /// Succeeds without mounting again when the staging path is already a
    /// mount point.
    async fn stage_volume(&self, req: NodeStageVolumeRequest) -> Result<(), CsiError>;

    /// Unstage a volume: unmount the bucket from the staging path.
    ///
    /// An empty or unmounted path is a successful no-op.
    async fn unstage_volume(
        &self,
        volume_id: &VolumeId,
        staging_target_path: &str,
    ) -> Result<(), CsiError>;

    /// Publish a volume: bind-mount the staging path onto `target_path`.
    ///
    /// Succeeds without mounting again when `target_path` is already a mount
    /// point.
    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError>;

    /// Unpublish a volume: remove the bind-mount at `target_path`.
    ///
    /// An empty or unmounted path is a successful no-op.
    async fn unpublish_volume(
        &self,
        volume_id: &VolumeId,
        target_path: &str,
    ) -> Result<(), CsiError>;

    /// Return information about the node on which this service is running.
    async fn get_info(&self) -> Result<NodeInfo, CsiError>;

    /// Advertise the node capabilities.
    async fn get_capabilities(&self) -> Result<Vec<NodeCapability>, CsiError>;
}
