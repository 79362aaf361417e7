//! Connection adapters: run an assembled unit somewhere and expose its
//! stdin, stdout and stderr.

use std::process::Stdio;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

use crate::error::{ExecError, Result};

pub mod cache;
pub mod local;
pub mod ssh;

pub use cache::{CacheAdapter, CachingAdapter};
pub use local::LocalStdinAdapter;
pub use ssh::SshStdinAdapter;

pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// How the execution environment finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Success,
    Failed { code: Option<i32> },
}

/// Open duplex channel to an execution environment.
///
/// Callers write the unit to `stdin`, drain both output streams to the end,
/// and only then call [`Completion::wait`].
pub struct Channel {
    pub stdin: BoxedWriter,
    pub stdout: BoxedReader,
    pub stderr: BoxedReader,
    pub completion: Completion,
}

pub struct Completion(CompletionKind);

enum CompletionKind {
    Process(Child),
    Replayed,
    Recording(cache::Recording),
}

impl Completion {
    pub async fn wait(self) -> Result<Termination> {
        match self.0 {
            CompletionKind::Process(child) => wait_child(child).await,
            CompletionKind::Replayed => Ok(Termination::Success),
            CompletionKind::Recording(recording) => recording.finish().await,
        }
    }
}

async fn wait_child(mut child: Child) -> Result<Termination> {
    let status = child.wait().await?;
    if status.success() {
        Ok(Termination::Success)
    } else {
        Ok(Termination::Failed { code: status.code() })
    }
}

/// Adapters that launch a fresh environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DirectAdapter {
    Local(LocalStdinAdapter),
    Ssh(SshStdinAdapter),
}

impl DirectAdapter {
    pub fn kind(&self) -> &'static str {
        match self {
            DirectAdapter::Local(_) => "local",
            DirectAdapter::Ssh(_) => "ssh",
        }
    }

    /// Canonical text of the adapter parameters, used in the content hash.
    pub fn params(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            ExecError::Config(format!("cannot serialize adapter parameters: {}", e))
        })
    }

    pub fn connection_name(&self) -> String {
        match self {
            DirectAdapter::Local(a) => a.connection_name(),
            DirectAdapter::Ssh(a) => a.connection_name(),
        }
    }

    fn command(&self) -> Result<Command> {
        match self {
            DirectAdapter::Local(a) => a.command(),
            DirectAdapter::Ssh(a) => a.command(),
        }
    }

    pub(crate) fn spawn(&self) -> Result<(Child, BoxedWriter, BoxedReader, BoxedReader)> {
        let mut cmd = self.command()?;
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start_error = |source: std::io::Error| ExecError::AdapterStart {
            connection: self.connection_name(),
            source,
        };
        let mut child = cmd.spawn().map_err(start_error)?;
        let missing = |what: &str| {
            start_error(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("no {} pipe", what),
            ))
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        tracing::debug!(connection = %self.connection_name(), "spawned execution environment");
        Ok((child, Box::new(stdin), Box::new(stdout), Box::new(stderr)))
    }

    pub fn open(&self) -> Result<Channel> {
        let (child, stdin, stdout, stderr) = self.spawn()?;
        Ok(Channel {
            stdin,
            stdout,
            stderr,
            completion: Completion(CompletionKind::Process(child)),
        })
    }
}

/// Every way a unit can be run.
#[derive(Debug, Clone)]
pub enum Adapter {
    Direct(DirectAdapter),
    Replay(CacheAdapter),
    Recording(CachingAdapter),
}

impl Adapter {
    pub fn connection_name(&self) -> String {
        match self {
            Adapter::Direct(a) => a.connection_name(),
            Adapter::Replay(a) => a.connection_name().to_string(),
            Adapter::Recording(a) => a.connection_name(),
        }
    }

    pub fn open(&self) -> Result<Channel> {
        match self {
            Adapter::Direct(a) => a.open(),
            Adapter::Replay(a) => a.open(),
            Adapter::Recording(a) => a.open(),
        }
    }
}

/// Split an interpreter command line such as `ruby -W0` into program and args.
pub(crate) fn split_interpreter(interpreter: &str) -> Result<(String, Vec<String>)> {
    let mut parts = shlex::split(interpreter)
        .filter(|parts| !parts.is_empty())
        .ok_or_else(|| ExecError::Config(format!("invalid interpreter '{}'", interpreter)))?;
    let program = parts.remove(0);
    Ok((program, parts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpreter_with_arguments() {
        let (program, args) = split_interpreter("ruby -W0 --disable-gems").unwrap();
        assert_eq!(program, "ruby");
        assert_eq!(args, vec!["-W0", "--disable-gems"]);
    }

    #[test]
    fn empty_interpreter_is_rejected() {
        assert!(matches!(split_interpreter("  "), Err(ExecError::Config(_))));
        assert!(matches!(split_interpreter("ruby 'unterminated"), Err(ExecError::Config(_))));
    }

    #[test]
    fn params_differ_between_kinds_and_settings() {
        let local = DirectAdapter::Local(LocalStdinAdapter::new("."));
        let other_dir = DirectAdapter::Local(LocalStdinAdapter::new("/srv"));
        let ssh = DirectAdapter::Ssh(SshStdinAdapter::new("example.org", "."));
        assert_eq!(local.params().unwrap(), local.clone().params().unwrap());
        assert_ne!(local.params().unwrap(), other_dir.params().unwrap());
        assert_ne!(local.params().unwrap(), ssh.params().unwrap());
        assert_eq!(ssh.kind(), "ssh");
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_working_dir_is_a_config_error() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = OsStr::from_bytes(b"/srv/\xff");
        let adapter = DirectAdapter::Local(LocalStdinAdapter::new(dir));
        assert!(matches!(adapter.params(), Err(ExecError::Config(_))));
    }

    #[tokio::test]
    async fn missing_program_is_a_start_failure() {
        let adapter = DirectAdapter::Local(
            LocalStdinAdapter::new(".").with_interpreter("/nonexistent/interpreter"),
        );
        let err = adapter.open().err().unwrap();
        assert!(matches!(err, ExecError::AdapterStart { .. }));
    }
}
