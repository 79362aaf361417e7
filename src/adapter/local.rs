//! Run the interpreter as a local child process inside a working directory.

use std::path::PathBuf;

use serde::Serialize;
use tokio::process::Command;

use super::split_interpreter;
use crate::error::Result;

pub const DEFAULT_INTERPRETER: &str = "ruby";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalStdinAdapter {
    pub working_dir: PathBuf,
    pub interpreter: String,
}

impl LocalStdinAdapter {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            interpreter: DEFAULT_INTERPRETER.to_string(),
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn connection_name(&self) -> String {
        self.working_dir.display().to_string()
    }

    pub(super) fn command(&self) -> Result<Command> {
        let (program, args) = split_interpreter(&self.interpreter)?;
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.working_dir);
        Ok(cmd)
    }
}
