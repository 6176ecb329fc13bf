//! Core CSI types: volumes, capabilities, requests, and plugin metadata.
//!
//! These types form the data model shared by the CSI traits, transport layer,
//! and the S3 backend.  They are all [`Serialize`]/[`Deserialize`] so they can
//! be transmitted over QUIC as JSON.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fmt;

/// Longest volume name that is used verbatim as a bucket name.
pub const MAX_VOLUME_NAME_LEN: usize = 63;

/// [`VolumeContext`] key carrying the bucket region.
pub const CONTEXT_REGION: &str = "region";

/// [`VolumeContext`] key carrying the requested capacity in bytes.
pub const CONTEXT_CAPACITY: &str = "capacity";

/// Opaque key/value context attached to a volume by `CreateVolume` and handed
/// back unchanged on every node-side call.
pub type VolumeContext = HashMap<String, String>;

// ---------------------------------------------------------------------------
// Volume identity
// ---------------------------------------------------------------------------

/// Opaque, unique identifier for a volume.  Doubles as the bucket name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VolumeId(pub String);

impl VolumeId {
    /// Derive the volume identifier from a requested volume name.
    ///
    /// The name is lower-cased; if the result is longer than
    /// [`MAX_VOLUME_NAME_LEN`] it is replaced by its hex SHA-1 digest so it
    /// still fits S3 bucket naming limits.  Hash collisions between distinct
    /// long names are not guarded against.
    pub fn from_name(name: &str) -> Self {
        let lowered = name.to_lowercase();
        if lowered.len() > MAX_VOLUME_NAME_LEN {
            let digest = Sha1::digest(lowered.as_bytes());
            return Self(hex::encode(digest));
        }
        Self(lowered)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VolumeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VolumeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Access mode & capabilities
// ---------------------------------------------------------------------------

/// Describes how a volume may be accessed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccessMode {
    /// Single-node read-write.
    ReadWriteOnce,
    /// Single-node read-only.
    ReadOnlyOnce,
    /// Multi-node read-only.
    ReadOnlyMany,
    /// Multi-node read-write.
    ReadWriteMany,
}

impl AccessMode {
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::ReadOnlyOnce | Self::ReadOnlyMany)
    }
}

/// Whether the volume is consumed as a filesystem or as a raw block device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccessType {
    /// Filesystem mount.
    Mount {
        /// Filesystem type hint, unused by the S3 bridge.
        #[serde(default)]
        fs_type: String,
        /// Additional mount flags (e.g. `"noatime"`).
        #[serde(default)]
        mount_flags: Vec<String>,
        /// Group that should own the mounted files, if the CO asks for one.
        #[serde(default)]
        volume_mount_group: Option<String>,
    },
    /// Raw block device.  Never supported by this driver.
    Block,
}

/// Describes the capabilities required from a volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeCapability {
    /// Requested access mode.
    pub access_mode: AccessMode,
    /// Requested access type.
    pub access_type: AccessType,
}

impl VolumeCapability {
    /// Filesystem capability with the given access mode and no extra flags.
    pub fn mount(access_mode: AccessMode) -> Self {
        Self {
            access_mode,
            access_type: AccessType::Mount {
                fs_type: String::new(),
                mount_flags: Vec::new(),
                volume_mount_group: None,
            },
        }
    }

    pub fn is_mount(&self) -> bool {
        matches!(self.access_type, AccessType::Mount { .. })
    }

    pub fn is_read_only(&self) -> bool {
        self.access_mode.is_read_only()
    }

    /// The requested group owner of the mount, ignoring empty strings.
    pub fn volume_mount_group(&self) -> Option<&str> {
        match &self.access_type {
            AccessType::Mount {
                volume_mount_group: Some(group),
                ..
            } if !group.is_empty() => Some(group),
            _ => None,
        }
    }
}

impl Default for VolumeCapability {
    fn default() -> Self {
        Self::mount(AccessMode::ReadWriteMany)
    }
}

/// Outcome of `ValidateVolumeCapabilities`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CapabilityValidation {
    /// Every requested capability is supported.
    Confirmed(Vec<VolumeCapability>),
    /// At least one capability is unsupported; carries the reason.
    Rejected(String),
}

// ---------------------------------------------------------------------------
// Volume metadata
// ---------------------------------------------------------------------------

/// A provisioned volume as returned by `CreateVolume`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    /// Unique volume identifier (the bucket name).
    pub volume_id: VolumeId,
    /// Requested capacity in bytes.  Buckets are unbounded, so this is a hint.
    pub capacity_bytes: u64,
    /// Opaque context passed from Controller to Node operations.
    #[serde(default)]
    pub volume_context: VolumeContext,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Request to create a new volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateVolumeRequest {
    /// Human-readable name for the volume.
    pub name: String,
    /// Desired capacity in bytes.
    #[serde(default)]
    pub capacity_bytes: u64,
    /// Required capabilities.
    #[serde(default)]
    pub volume_capabilities: Vec<VolumeCapability>,
}

/// Request to stage (mount the bucket at) a node-global path.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct NodeStageVolumeRequest {
    /// Volume to stage.
    pub volume_id: VolumeId,
    /// Global staging mount point,
    /// e.g. `/var/lib/kubelet/plugins/kubernetes.io/csi/<driver>/<hash>/globalmount`.
    pub staging_target_path: String,
    /// Requested capability.
    #[serde(default)]
    pub volume_capability: Option<VolumeCapability>,
    /// Opaque context carried from `CreateVolume`.
    #[serde(default)]
    pub volume_context: VolumeContext,
    /// Per-volume secrets supplied by the CO.
    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

impl fmt::Debug for NodeStageVolumeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeStageVolumeRequest")
            .field("volume_id", &self.volume_id)
            .field("staging_target_path", &self.staging_target_path)
            .field("volume_capability", &self.volume_capability)
            .field("volume_context", &self.volume_context)
            .field("secrets", &self.secrets.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Request to publish (bind-mount) a staged volume into a workload path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePublishVolumeRequest {
    /// Volume to publish.
    pub volume_id: VolumeId,
    /// The global staging mount point (source of the bind mount).
    pub staging_target_path: String,
    /// Workload-visible target path,
    /// e.g. `/var/lib/kubelet/pods/<pod-uid>/volumes/kubernetes.io~csi/<pv>/mount`.
    pub target_path: String,
    /// Requested capability.
    #[serde(default)]
    pub volume_capability: Option<VolumeCapability>,
    /// Opaque context carried from `CreateVolume`.
    #[serde(default)]
    pub volume_context: VolumeContext,
    /// Whether the bind mount should be read-only.
    #[serde(default)]
    pub read_only: bool,
}

// ---------------------------------------------------------------------------
// Plugin & node info
// ---------------------------------------------------------------------------

/// Information about the CSI plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin name, e.g. `"s3.csi.k8s.io"`.
    pub name: String,
    /// Vendor-provided version string.
    pub vendor_version: String,
}

/// Capabilities advertised by the Identity service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PluginCapability {
    /// Plugin provides a Controller service.
    ControllerService,
}

/// RPCs supported by the Controller service beyond the mandatory ones.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ControllerCapability {
    CreateDeleteVolume,
    PublishUnpublishVolume,
}

/// RPCs and features supported by the Node service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeCapability {
    StageUnstageVolume,
    VolumeMountGroup,
}

/// Information about the node on which the CSI Node service runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique node identifier.
    pub node_id: String,
}
