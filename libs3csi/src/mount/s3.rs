//! Remote-bucket mount through a FUSE bridge binary such as `mount-s3`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::{
    CommandRunner, CommandSpec, MountError, MountRequest, MountTable, Mounter, ensure_dir,
    MountState, execute, prepare_target, probe, unmount_if_mounted,
};

/// Permission bits applied to directories when a group owner is requested.
const DIR_MODE: &str = "0775";
/// Permission bits applied to files when a group owner is requested.
const FILE_MODE: &str = "0664";

/// Mounts a bucket onto a local path by running the S3 FUSE bridge.
///
/// Credentials are handed over through `AWS_ACCESS_KEY_ID` and
/// `AWS_SECRET_ACCESS_KEY` and never appear on the command line, where any
/// local user could read them from the process list.
pub struct S3Mounter {
    binary: PathBuf,
    table: Arc<dyn MountTable>,
    runner: Arc<dyn CommandRunner>,
}

impl S3Mounter {
    pub fn new(
        binary: impl Into<PathBuf>,
        table: Arc<dyn MountTable>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let binary = binary.into();
        debug!(binary = %binary.display(), "S3 mounter initialized");
        Self {
            binary,
            table,
            runner,
        }
    }

    fn command(&self, req: &MountRequest) -> CommandSpec {
        let mut spec =
            CommandSpec::new(&self.binary).args(["--endpoint-url", req.endpoint.as_str()]);
        if !req.region.is_empty() {
            spec = spec.args(["--region", req.region.as_str()]);
        }
        spec = spec.args(["--force-path-style", "--incremental-upload", "--allow-other"]);
        if let Some(gid) = &req.gid {
            spec = spec.args([
                "--gid",
                gid.as_str(),
                "--dir-mode",
                DIR_MODE,
                "--file-mode",
                FILE_MODE,
            ]);
        }
        if req.read_only {
            spec = spec.arg("--read-only");
        }
        spec.args([req.bucket.as_str(), req.target_path.as_str()])
            .env("AWS_ACCESS_KEY_ID", &req.access_key)
            .env("AWS_SECRET_ACCESS_KEY", &req.secret_key)
    }
}

#[async_trait]
impl Mounter for S3Mounter {
    #[instrument(skip_all, fields(bucket = %req.bucket, target = %req.target_path))]
    async fn mount(&self, req: &MountRequest) -> Result<(), MountError> {
        if prepare_target(self.table.as_ref(), &req.target_path).await? {
            debug!("bucket already mounted");
            return Ok(());
        }
        ensure_dir(&req.target_path).await?;

        let spec = self.command(req);
        debug!(args = ?spec.args, "mounting bucket");
        execute(self.runner.as_ref(), &spec, &req.target_path).await?;

        info!(read_only = req.read_only, "bucket mounted");
        Ok(())
    }

    async fn unmount(&self, target_path: &str) -> Result<(), MountError> {
        unmount_if_mounted(self.table.as_ref(), target_path).await
    }

    async fn state(&self, target_path: &str) -> Result<MountState, MountError> {
        probe(self.table.as_ref(), target_path).await
    }
}
