//! Mount executor: idempotent mount / unmount of a bucket or a bind mount.
//!
//! Two strategies share the [`Mounter`] capability set:
//!
//! | Strategy | Used by | Binary |
//! |---|---|---|
//! | [`S3Mounter`] | `NodeStageVolume` | FUSE bridge (e.g. `mount-s3`) |
//! | [`BindMounter`] | `NodePublishVolume` | `mount --bind` |
//!
//! No mount state is kept in memory.  Whether a path is mounted is always
//! re-derived from the OS mount table through [`MountTable`], and every
//! external binary goes through [`CommandRunner`], so both seams can be
//! replaced in tests.

mod bind;
mod command;
mod s3;
mod table;

#[cfg(test)]
pub(crate) mod fake;

use std::collections::HashMap;
use std::fmt;
use std::io;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use bind::BindMounter;
pub use command::{CommandOutput, CommandRunner, CommandSpec, TokioCommandRunner};
pub use s3::S3Mounter;
pub use table::{MountTable, ProcMountTable};

/// Failures of the mount executor.
#[derive(Debug, Error)]
pub enum MountError {
    /// The mount target directory could not be created.
    #[error("create directory {path}: {source}")]
    CreateDir { path: String, source: io::Error },

    /// The mount table (or the path itself) could not be inspected.
    #[error("inspect mount point {path}: {source}")]
    Probe { path: String, source: io::Error },

    /// The external binary could not be started.
    #[error("spawn {program}: {source}")]
    Spawn { program: String, source: io::Error },

    /// The external binary ran and reported failure.
    #[error("mount {target} failed: {status} output={output}")]
    CommandFailed {
        target: String,
        status: String,
        output: String,
    },

    /// A bind mount was requested from a staging path that is not mounted.
    #[error("staging path {0} is not mounted")]
    SourceNotMounted(String),

    /// The unmount syscall failed.
    #[error("unmount {path}: {source}")]
    Unmount { path: String, source: io::Error },
}

/// Describes one mount operation.  Built fresh for every call.
#[derive(Clone, Default)]
pub struct MountRequest {
    /// Staging path; the bind source for [`BindMounter`].
    pub staging_target_path: String,
    /// Path the mount is attached to.
    pub target_path: String,

    pub bucket: String,
    pub endpoint: String,
    pub region: String,

    pub access_key: String,
    pub secret_key: String,

    pub read_only: bool,
    /// Group owner for files and directories of the mount.
    pub gid: Option<String>,

    pub options: HashMap<String, String>,
}

impl fmt::Debug for MountRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountRequest")
            .field("staging_target_path", &self.staging_target_path)
            .field("target_path", &self.target_path)
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("read_only", &self.read_only)
            .field("gid", &self.gid)
            .field("options", &self.options)
            .finish()
    }
}

/// What the kernel reports for a mount target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    /// Missing, or a plain directory.
    NotMounted,
    Mounted,
    /// A FUSE mount whose daemon died: `stat` fails with `ENOTCONN`.
    /// Teardown unmounts it, setup unmounts and mounts again.
    Corrupted,
}

impl MountState {
    /// Whether something is attached at the path, healthy or not.
    pub fn is_mounted(self) -> bool {
        self != Self::NotMounted
    }
}

/// Capability set shared by both mount strategies.
#[async_trait]
pub trait Mounter: Send + Sync {
    /// Mount according to `req`.  A healthy mount already at the target is
    /// left untouched and reported as success; a corrupted one is replaced.
    async fn mount(&self, req: &MountRequest) -> Result<(), MountError>;

    /// Unmount `target_path`.  A path that is not mounted is a no-op.
    async fn unmount(&self, target_path: &str) -> Result<(), MountError>;

    /// Current state of `target_path`.  A missing path is
    /// [`MountState::NotMounted`].
    async fn state(&self, target_path: &str) -> Result<MountState, MountError>;

    /// Whether anything, corrupted mounts included, is attached at
    /// `target_path`.
    async fn is_mounted(&self, target_path: &str) -> Result<bool, MountError> {
        Ok(self.state(target_path).await?.is_mounted())
    }
}

// ---------------------------------------------------------------------------
// Behavior shared by both strategies
// ---------------------------------------------------------------------------

fn probe_error(path: &str, source: io::Error) -> MountError {
    MountError::Probe {
        path: path.to_owned(),
        source,
    }
}

/// Inspect `path` and return its state with the path to act on.
///
/// The mount table lists resolved paths, so a healthy path is canonicalized
/// before the lookup; a symlink, `..` or `//` would otherwise never match.
/// A corrupted mount cannot be resolved and is returned as given.
pub(crate) async fn inspect(
    table: &dyn MountTable,
    path: &str,
) -> Result<(MountState, String), MountError> {
    match table.stat(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path, "path does not exist, not mounted");
            return Ok((MountState::NotMounted, path.to_owned()));
        }
        Err(e) if e.raw_os_error() == Some(nix::libc::ENOTCONN) => {
            warn!(path, "transport endpoint not connected, mount is corrupted");
            return Ok((MountState::Corrupted, path.to_owned()));
        }
        Err(source) => return Err(probe_error(path, source)),
    }

    let resolved = tokio::fs::canonicalize(path)
        .await
        .map_err(|source| probe_error(path, source))?
        .to_string_lossy()
        .into_owned();
    let mounted = table
        .is_mount_point(&resolved)
        .await
        .map_err(|source| probe_error(path, source))?;
    let state = if mounted {
        MountState::Mounted
    } else {
        MountState::NotMounted
    };
    Ok((state, resolved))
}

pub(crate) async fn probe(table: &dyn MountTable, path: &str) -> Result<MountState, MountError> {
    Ok(inspect(table, path).await?.0)
}

async fn detach(table: &dyn MountTable, path: &str) -> Result<(), MountError> {
    table
        .unmount(path)
        .await
        .map_err(|source| MountError::Unmount {
            path: path.to_owned(),
            source,
        })?;
    info!(path, "unmounted");
    Ok(())
}

/// Unmount `path` only if something is attached there.
pub(crate) async fn unmount_if_mounted(
    table: &dyn MountTable,
    path: &str,
) -> Result<(), MountError> {
    let (state, resolved) = inspect(table, path).await?;
    if !state.is_mounted() {
        debug!(path, "not mounted, nothing to unmount");
        return Ok(());
    }
    detach(table, &resolved).await
}

/// Get `path` ready for a new mount.  Returns `true` when a healthy mount is
/// already in place; a corrupted one is unmounted first.
pub(crate) async fn prepare_target(
    table: &dyn MountTable,
    path: &str,
) -> Result<bool, MountError> {
    let (state, resolved) = inspect(table, path).await?;
    match state {
        MountState::Mounted => Ok(true),
        MountState::NotMounted => Ok(false),
        MountState::Corrupted => {
            warn!(path, "unmounting corrupted mount before mounting again");
            detach(table, &resolved).await?;
            Ok(false)
        }
    }
}

pub(crate) async fn ensure_dir(path: &str) -> Result<(), MountError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| MountError::CreateDir {
            path: path.to_owned(),
            source,
        })
}

/// Run the mount binary and turn a non-zero exit into
/// [`MountError::CommandFailed`] carrying the combined output.
pub(crate) async fn execute(
    runner: &dyn CommandRunner,
    spec: &CommandSpec,
    target: &str,
) -> Result<(), MountError> {
    let out = runner
        .run(spec)
        .await
        .map_err(|source| MountError::Spawn {
            program: spec.program.display().to_string(),
            source,
        })?;

    if !out.success {
        return Err(MountError::CommandFailed {
            target: target.to_owned(),
            status: out.status(),
            output: out.output,
        });
    }

    if !out.output.trim().is_empty() {
        debug!(target, output = %out.output.trim(), "mount command output");
    }
    Ok(())
}
