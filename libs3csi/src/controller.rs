//! CSI Controller service trait.
//!
//! The Controller service owns the volume ⇄ bucket mapping: it creates the
//! backing bucket when a volume is provisioned and removes it when the volume
//! is deleted.  It never touches a node's filesystem.

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{
    CapabilityValidation, ControllerCapability, CreateVolumeRequest, Volume, VolumeCapability,
    VolumeId,
};

/// Controller service: centralized volume management.
#[async_trait]
pub trait CsiController: Send + Sync {
    /// Provision a new volume.
    ///
    /// The returned [`Volume`] carries the `volume_id` and the
    /// `volume_context` that the orchestrator forwards to every subsequent
    /// Node operation.  Provisioning an existing volume again succeeds.
    async fn create_volume(&self, req: CreateVolumeRequest) -> Result<Volume, CsiError>;

    /// Delete a previously provisioned volume.
    ///
    /// An empty id or an already deleted volume is a successful no-op.
    async fn delete_volume(&self, volume_id: &VolumeId) -> Result<(), CsiError>;

    /// Check whether the given capabilities can be served.
    ///
    /// Unsupported capabilities are reported as
    /// [`CapabilityValidation::Rejected`], not as an error.  An unknown
    /// volume is [`CsiError::NotFound`].
    async fn validate_volume_capabilities(
        &self,
        volume_id: &VolumeId,
        capabilities: &[VolumeCapability],
    ) -> Result<CapabilityValidation, CsiError>;

    /// Advertise the controller capabilities.
    async fn get_capabilities(&self) -> Result<Vec<ControllerCapability>, CsiError>;
}
