//! Access to the OS mount table.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;

/// Default location of the per-process mount table on Linux.
const PROC_MOUNTS: &str = "/proc/self/mounts";

/// Source of truth for mount state.
#[async_trait]
pub trait MountTable: Send + Sync {
    /// Whether `path` is listed as a mount point.
    async fn is_mount_point(&self, path: &str) -> io::Result<bool>;

    /// Detach the mount at `path`.
    async fn unmount(&self, path: &str) -> io::Result<()>;

    /// `stat` the path itself.  Fails with `ENOTCONN` on a FUSE mount whose
    /// daemon is gone.
    async fn stat(&self, path: &str) -> io::Result<()> {
        tokio::fs::metadata(path).await.map(drop)
    }
}

/// [`MountTable`] backed by `/proc/self/mounts` and `umount(2)`.
#[derive(Debug, Clone)]
pub struct ProcMountTable {
    mounts_file: PathBuf,
}

impl ProcMountTable {
    pub fn new() -> Self {
        Self::with_mounts_file(PROC_MOUNTS)
    }

    /// Read mount entries from `mounts_file` instead of `/proc/self/mounts`.
    pub fn with_mounts_file(mounts_file: impl Into<PathBuf>) -> Self {
        Self {
            mounts_file: mounts_file.into(),
        }
    }
}

impl Default for ProcMountTable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MountTable for ProcMountTable {
    async fn is_mount_point(&self, path: &str) -> io::Result<bool> {
        let contents = tokio::fs::read_to_string(&self.mounts_file).await?;
        let wanted = path.trim_end_matches('/');
        let wanted = if wanted.is_empty() { "/" } else { wanted };
        // Format: <device> <mountpoint> <fstype> <options> <dump> <pass>
        Ok(contents
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .any(|mount_point| unescape_mount_point(mount_point) == wanted))
    }

    async fn unmount(&self, path: &str) -> io::Result<()> {
        let path = path.to_owned();
        // FUSE unmounts can block while the daemon flushes.
        tokio::task::spawn_blocking(move || nix::mount::umount(path.as_str()))
            .await
            .map_err(io::Error::other)?
            .map_err(io::Error::from)
    }
}

/// Decode the octal escapes (`\040` for space, `\011` for tab, `\012` for
/// newline, `\134` for backslash) used in `/proc/self/mounts`.
fn unescape_mount_point(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..=i + 3];
            if (b'0'..=b'3').contains(&digits[0])
                && digits[1..].iter().all(|b| (b'0'..=b'7').contains(b))
            {
                out.push((digits[0] - b'0') * 64 + (digits[1] - b'0') * 8 + (digits[2] - b'0'));
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
