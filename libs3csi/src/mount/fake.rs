//! In-memory stand-ins for the mount table and the subprocess runner.

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{CommandOutput, CommandRunner, CommandSpec, MountTable};

/// Mount table holding an explicit set of mounted paths.
///
/// Paths are stored resolved, the way the kernel lists them, while lookups
/// through [`MountTable`] compare the given string as is.
#[derive(Debug, Default)]
pub(crate) struct FakeMountTable {
    mounted: Mutex<HashSet<String>>,
    corrupted: Mutex<HashSet<String>>,
    unmounts: AtomicUsize,
}

fn resolved(path: &str) -> String {
    std::fs::canonicalize(path)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_owned())
}

impl FakeMountTable {
    pub(crate) fn mark_mounted(&self, path: &str) {
        self.mounted.lock().unwrap().insert(resolved(path));
    }

    /// Make `stat` on `path` fail like a FUSE mount whose daemon died.
    pub(crate) fn mark_corrupted(&self, path: &str) {
        self.corrupted.lock().unwrap().insert(path.to_owned());
    }

    pub(crate) fn is_marked(&self, path: &str) -> bool {
        self.mounted.lock().unwrap().contains(&resolved(path))
    }

    pub(crate) fn unmount_calls(&self) -> usize {
        self.unmounts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MountTable for FakeMountTable {
    async fn is_mount_point(&self, path: &str) -> io::Result<bool> {
        Ok(self.mounted.lock().unwrap().contains(path))
    }

    async fn unmount(&self, path: &str) -> io::Result<()> {
        self.unmounts.fetch_add(1, Ordering::SeqCst);
        self.mounted.lock().unwrap().remove(path);
        self.corrupted.lock().unwrap().remove(path);
        Ok(())
    }

    async fn stat(&self, path: &str) -> io::Result<()> {
        let corrupted = self.corrupted.lock().unwrap().contains(path);
        if corrupted {
            return Err(io::Error::from_raw_os_error(nix::libc::ENOTCONN));
        }
        tokio::fs::metadata(path).await.map(drop)
    }
}

/// Records every invocation.  On success the last argument (the mount
/// target) is marked mounted in the shared table, like a real mount would.
#[derive(Debug)]
pub(crate) struct RecordingRunner {
    table: Arc<FakeMountTable>,
    failure: Option<String>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl RecordingRunner {
    pub(crate) fn succeeding(table: Arc<FakeMountTable>) -> Self {
        Self {
            table,
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(table: Arc<FakeMountTable>, output: &str) -> Self {
        Self {
            table,
            failure: Some(output.to_owned()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        if let Some(output) = &self.failure {
            return Ok(CommandOutput {
                success: false,
                code: Some(1),
                output: output.clone(),
            });
        }
        if let Some(target) = spec.args.last() {
            self.table.mark_mounted(target);
        }
        Ok(CommandOutput {
            success: true,
            code: Some(0),
            output: String::new(),
        })
    }
}
