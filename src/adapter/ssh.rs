//! Run the interpreter on a remote host through the `ssh` client.

use serde::Serialize;
use tokio::process::Command;

use super::{local::DEFAULT_INTERPRETER, split_interpreter};
use crate::error::{ExecError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshStdinAdapter {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub working_dir: String,
    pub interpreter: String,
}

impl SshStdinAdapter {
    pub fn new(host: impl Into<String>, working_dir: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
            working_dir: working_dir.into(),
            interpreter: DEFAULT_INTERPRETER.to_string(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    pub fn connection_name(&self) -> String {
        format!("{}:{}", self.destination(), self.working_dir)
    }

    /// Shell command executed by the remote login shell.
    pub fn remote_command(&self) -> Result<String> {
        let (program, args) = split_interpreter(&self.interpreter)?;
        let quote = |s: &str| {
            shlex::try_quote(s)
                .map(|q| q.into_owned())
                .map_err(|e| ExecError::Config(format!("cannot quote '{}': {}", s, e)))
        };
        let mut words = vec![quote(&program)?];
        for arg in &args {
            words.push(quote(arg)?);
        }
        Ok(format!("cd {} && {}", quote(&self.working_dir)?, words.join(" ")))
    }

    pub(super) fn command(&self) -> Result<Command> {
        let mut cmd = Command::new("ssh");
        if let Some(port) = self.port {
            cmd.arg("-p").arg(port.to_string());
        }
        cmd.arg(self.destination()).arg(self.remote_command()?);
        Ok(cmd)
    }
}
