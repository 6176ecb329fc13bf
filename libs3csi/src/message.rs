//! CSI protocol messages transmitted over QUIC.
//!
//! [`CsiMessage`] is the envelope for every request and response exchanged
//! between the orchestrator-side client and the driver over QUIC
//! bi-directional streams, serialized as JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CsiError;
use crate::types::*;

/// Top-level message envelope for CSI over QUIC.
///
/// Each bi-stream carries exactly one request followed by one response.  The
/// client sends a *request* variant and the server replies with the matching
/// *response* variant, [`CsiMessage::Ok`], or [`CsiMessage::Error`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CsiMessage {
    // ----- Requests --------------------------------------------------------
    /// Identity.
    GetPluginInfo,
    GetPluginCapabilities,
    Probe,

    /// Controller: provision a bucket-backed volume.
    CreateVolume(CreateVolumeRequest),
    /// Controller: delete the bucket behind a volume.
    DeleteVolume(VolumeId),
    ValidateVolumeCapabilities {
        volume_id: VolumeId,
        capabilities: Vec<VolumeCapability>,
    },
    ControllerGetCapabilities,

    /// Node: mount the bucket at the staging path.
    StageVolume(NodeStageVolumeRequest),
    UnstageVolume {
        volume_id: VolumeId,
        staging_target_path: String,
    },
    /// Node: bind the staging path onto a workload path.
    PublishVolume(NodePublishVolumeRequest),
    UnpublishVolume {
        volume_id: VolumeId,
        target_path: String,
    },
    GetNodeInfo,
    NodeGetCapabilities,

    // ----- Responses -------------------------------------------------------
    PluginInfoResponse(PluginInfo),
    PluginCapabilitiesResponse(Vec<PluginCapability>),
    ProbeResult(bool),
    VolumeCreated(Volume),
    CapabilitiesValidated(CapabilityValidation),
    ControllerCapabilities(Vec<ControllerCapability>),
    NodeInfoResponse(NodeInfo),
    NodeCapabilities(Vec<NodeCapability>),

    /// Success without payload.
    Ok,
    Error(CsiError),
}

impl CsiMessage {
    /// Whether this variant is sent by clients.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Self::GetPluginInfo
                | Self::GetPluginCapabilities
                | Self::Probe
                | Self::CreateVolume(_)
                | Self::DeleteVolume(_)
                | Self::ValidateVolumeCapabilities { .. }
                | Self::ControllerGetCapabilities
                | Self::StageVolume(_)
                | Self::UnstageVolume { .. }
                | Self::PublishVolume(_)
                | Self::UnpublishVolume { .. }
                | Self::GetNodeInfo
                | Self::NodeGetCapabilities
        )
    }
}

// Request payloads may carry secrets; only identifiers are printed.
impl fmt::Display for CsiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetPluginInfo => f.write_str("GetPluginInfo"),
            Self::GetPluginCapabilities => f.write_str("GetPluginCapabilities"),
            Self::Probe => f.write_str("Probe"),
            Self::CreateVolume(req) => write!(f, "CreateVolume(name={})", req.name),
            Self::DeleteVolume(id) => write!(f, "DeleteVolume({id})"),
            Self::ValidateVolumeCapabilities { volume_id, .. } => {
                write!(f, "ValidateVolumeCapabilities({volume_id})")
            }
            Self::ControllerGetCapabilities => f.write_str("ControllerGetCapabilities"),
            Self::StageVolume(req) => write!(f, "StageVolume({})", req.volume_id),
            Self::UnstageVolume { volume_id, .. } => write!(f, "UnstageVolume({volume_id})"),
            Self::PublishVolume(req) => write!(f, "PublishVolume({})", req.volume_id),
            Self::UnpublishVolume { volume_id, .. } => write!(f, "UnpublishVolume({volume_id})"),
            Self::GetNodeInfo => f.write_str("GetNodeInfo"),
            Self::NodeGetCapabilities => f.write_str("NodeGetCapabilities"),
            Self::PluginInfoResponse(info) => write!(f, "PluginInfo(name={})", info.name),
            Self::PluginCapabilitiesResponse(caps) => {
                write!(f, "PluginCapabilities(count={})", caps.len())
            }
            Self::ProbeResult(ready) => write!(f, "ProbeResult({ready})"),
            Self::VolumeCreated(v) => write!(f, "VolumeCreated({})", v.volume_id),
            Self::CapabilitiesValidated(CapabilityValidation::Confirmed(_)) => {
                f.write_str("CapabilitiesValidated(confirmed)")
            }
            Self::CapabilitiesValidated(CapabilityValidation::Rejected(msg)) => {
                write!(f, "CapabilitiesValidated(rejected: {msg})")
            }
            Self::ControllerCapabilities(caps) => {
                write!(f, "ControllerCapabilities(count={})", caps.len())
            }
            Self::NodeInfoResponse(info) => write!(f, "NodeInfo({})", info.node_id),
            Self::NodeCapabilities(caps) => write!(f, "NodeCapabilities(count={})", caps.len()),
            Self::Ok => f.write_str("Ok"),
            Self::Error(e) => write!(f, "Error({e})"),
        }
    }
}
