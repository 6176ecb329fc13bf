//! Bind mount of an already staged path onto a workload target path.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::{
    CommandRunner, CommandSpec, MountError, MountRequest, MountTable, Mounter, ensure_dir,
    MountState, execute, prepare_target, probe, unmount_if_mounted,
};

/// Bind-mounts `staging_target_path` onto `target_path` with the system
/// `mount` binary.
///
/// Read-only applies to the bind only; the staged bucket mount underneath is
/// left as it is.
pub struct BindMounter {
    binary: PathBuf,
    table: Arc<dyn MountTable>,
    runner: Arc<dyn CommandRunner>,
}

impl BindMounter {
    pub fn new(
        binary: impl Into<PathBuf>,
        table: Arc<dyn MountTable>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let binary = binary.into();
        debug!(binary = %binary.display(), "bind mounter initialized");
        Self {
            binary,
            table,
            runner,
        }
    }

    fn command(&self, req: &MountRequest) -> CommandSpec {
        let mode = if req.read_only { "--read-only" } else { "--rw" };
        CommandSpec::new(&self.binary).args([
            "--bind",
            mode,
            req.staging_target_path.as_str(),
            req.target_path.as_str(),
        ])
    }
}

#[async_trait]
impl Mounter for BindMounter {
    #[instrument(skip_all, fields(source = %req.staging_target_path, target = %req.target_path))]
    async fn mount(&self, req: &MountRequest) -> Result<(), MountError> {
        if prepare_target(self.table.as_ref(), &req.target_path).await? {
            debug!("target already bind-mounted");
            return Ok(());
        }
        ensure_dir(&req.target_path).await?;

        // An unmounted staging directory would publish an empty local
        // directory instead of the bucket; a corrupted one, a dead endpoint.
        if probe(self.table.as_ref(), &req.staging_target_path).await? != MountState::Mounted {
            return Err(MountError::SourceNotMounted(
                req.staging_target_path.clone(),
            ));
        }

        let spec = self.command(req);
        debug!(args = ?spec.args, "bind mounting");
        execute(self.runner.as_ref(), &spec, &req.target_path).await?;

        info!(read_only = req.read_only, "bind mount created");
        Ok(())
    }

    async fn unmount(&self, target_path: &str) -> Result<(), MountError> {
        unmount_if_mounted(self.table.as_ref(), target_path).await
    }

    async fn state(&self, target_path: &str) -> Result<MountState, MountError> {
        probe(self.table.as_ref(), target_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::fake::{FakeMountTable, RecordingRunner};
    use super::*;

    struct Paths {
        _tmp: tempfile::TempDir,
        staging: String,
        target: String,
    }

    fn paths() -> Paths {
        let tmp = tempfile::tempdir().unwrap();
        let staging = tmp.path().join("globalmount");
        std::fs::create_dir_all(&staging).unwrap();
        let target = tmp.path().join("pods/p1/mount");
        Paths {
            staging: staging.to_str().unwrap().to_owned(),
            target: target.to_str().unwrap().to_owned(),
            _tmp: tmp,
        }
    }

    fn request(p: &Paths, read_only: bool) -> MountRequest {
        MountRequest {
            staging_target_path: p.staging.clone(),
            target_path: p.target.clone(),
            bucket: "bucket".into(),
            read_only,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn binds_staging_path_read_write() {
        let p = paths();
        let table = Arc::new(FakeMountTable::default());
        table.mark_mounted(&p.staging);
        let runner = Arc::new(RecordingRunner::succeeding(table.clone()));
        let mounter = BindMounter::new("/bin/mount", table.clone(), runner.clone());

        mounter.mount(&request(&p, false)).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, PathBuf::from("/bin/mount"));
        assert_eq!(
            calls[0].args,
            vec!["--bind", "--rw", p.staging.as_str(), p.target.as_str()]
        );
        assert!(calls[0].envs.is_empty());
        assert!(mounter.is_mounted(&p.target).await.unwrap());
    }

    #[tokio::test]
    async fn binds_read_only_when_requested() {
        let p = paths();
        let table = Arc::new(FakeMountTable::default());
        table.mark_mounted(&p.staging);
        let runner = Arc::new(RecordingRunner::succeeding(table.clone()));
        let mounter = BindMounter::new("/bin/mount", table.clone(), runner.clone());

        mounter.mount(&request(&p, true)).await.unwrap();
        assert_eq!(runner.calls()[0].args[1], "--read-only");
    }

    #[tokio::test]
    async fn refuses_unstaged_source() {
        let p = paths();
        let table = Arc::new(FakeMountTable::default());
        let runner = Arc::new(RecordingRunner::succeeding(table.clone()));
        let mounter = BindMounter::new("/bin/mount", table.clone(), runner.clone());

        let err = mounter.mount(&request(&p, false)).await.unwrap_err();
        assert!(matches!(err, MountError::SourceNotMounted(_)));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn existing_bind_is_left_alone() {
        let p = paths();
        std::fs::create_dir_all(&p.target).unwrap();
        let table = Arc::new(FakeMountTable::default());
        table.mark_mounted(&p.staging);
        table.mark_mounted(&p.target);
        let runner = Arc::new(RecordingRunner::succeeding(table.clone()));
        let mounter = BindMounter::new("/bin/mount", table.clone(), runner.clone());

        mounter.mount(&request(&p, false)).await.unwrap();
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn refuses_corrupted_source() {
        let p = paths();
        let table = Arc::new(FakeMountTable::default());
        table.mark_corrupted(&p.staging);
        let runner = Arc::new(RecordingRunner::succeeding(table.clone()));
        let mounter = BindMounter::new("/bin/mount", table.clone(), runner.clone());

        let err = mounter.mount(&request(&p, false)).await.unwrap_err();
        assert!(matches!(err, MountError::SourceNotMounted(_)));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn corrupted_bind_is_rebound() {
        let p = paths();
        std::fs::create_dir_all(&p.target).unwrap();
        let table = Arc::new(FakeMountTable::default());
        table.mark_mounted(&p.staging);
        table.mark_corrupted(&p.target);
        let runner = Arc::new(RecordingRunner::succeeding(table.clone()));
        let mounter = BindMounter::new("/bin/mount", table.clone(), runner.clone());

        assert_eq!(mounter.state(&p.target).await.unwrap(), MountState::Corrupted);
        mounter.mount(&request(&p, false)).await.unwrap();

        assert_eq!(table.unmount_calls(), 1);
        assert_eq!(runner.calls().len(), 1);
        assert_eq!(mounter.state(&p.target).await.unwrap(), MountState::Mounted);
    }
}
