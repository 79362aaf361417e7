//! Flavours: preamble generators injected ahead of user code.

use std::{fs, path::Path};

use crate::codec::ruby_string_literal;
use crate::error::{ExecError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flavour {
    /// `require` each library before the user code runs.
    Require { libraries: Vec<String> },
    /// Set environment variables inside the execution environment.
    Env { vars: Vec<(String, String)> },
    /// Arbitrary preamble text, emitted verbatim.
    Prelude { text: String },
}

impl Flavour {
    pub fn name(&self) -> &'static str {
        match self {
            Flavour::Require { .. } => "require",
            Flavour::Env { .. } => "env",
            Flavour::Prelude { .. } => "prelude",
        }
    }

    pub fn code_header(&self) -> String {
        match self {
            Flavour::Require { libraries } => libraries
                .iter()
                .map(|lib| format!("require {}\n", ruby_string_literal(lib)))
                .collect(),
            Flavour::Env { vars } => vars
                .iter()
                .map(|(k, v)| {
                    format!("ENV[{}] = {}\n", ruby_string_literal(k), ruby_string_literal(v))
                })
                .collect(),
            Flavour::Prelude { text } => {
                if text.ends_with('\n') {
                    text.clone()
                } else {
                    format!("{}\n", text)
                }
            }
        }
    }

    /// Build a prelude flavour from a file on disk.
    pub fn prelude_from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            ExecError::Config(format!("cannot read prelude '{}': {}", path.display(), e))
        })?;
        Ok(Flavour::Prelude { text })
    }
}

/// Parse `A,b , c` into trimmed, non-empty items.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `K=V;K2=V2` pairs for the env flavour.
pub fn parse_env_pairs(raw: &str) -> Result<Vec<(String, String)>> {
    let mut vars = Vec::new();
    for item in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (k, v) = item
            .split_once('=')
            .ok_or_else(|| ExecError::Config(format!("env flavour entry '{}' is not K=V", item)))?;
        let k = k.trim();
        if k.is_empty() {
            return Err(ExecError::Config(format!("env flavour entry '{}' has no name", item)));
        }
        vars.push((k.to_string(), v.trim().to_string()));
    }
    Ok(vars)
}
