//! Subprocess execution for the external mount binaries.

use std::fmt;
use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, instrument};

/// A fully described invocation of an external binary.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra environment variables, appended to the inherited environment.
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

// Environment values carry credentials, only the keys are printed.
impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field(
                "envs",
                &self.envs.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Result of a finished subprocess.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
    /// stdout followed by stderr.
    pub output: String,
}

impl CommandOutput {
    /// Human-readable exit status.
    pub fn status(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_owned(),
        }
    }
}

/// Spawns external binaries.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput>;
}

/// [`CommandRunner`] backed by [`tokio::process::Command`].
///
/// The child is killed when the returned future is dropped, so a cancelled
/// RPC does not leave a mount helper behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    #[instrument(skip_all, fields(program = %spec.program.display()))]
    async fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        debug!(args = ?spec.args, "spawning");
        let out = tokio::process::Command::new(&spec.program)
            .args(&spec.args)
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));

        Ok(CommandOutput {
            success: out.status.success(),
            code: out.status.code(),
            output,
        })
    }
}
