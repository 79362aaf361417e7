use std::path::PathBuf;

use clap::{ArgGroup, Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AdapterKind {
    Local,
    Ssh,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "rrun", about = "Run Ruby code out of process, with replayable caching", version)]
#[command(group(ArgGroup::new("input").args(["code", "file"]).multiple(false)))]
#[command(group(ArgGroup::new("maintenance").args(["list_cache", "clear_cache"]).multiple(false)))]
pub struct Cli {
    /// Ruby code to run. Read from stdin when omitted.
    #[arg(value_name = "CODE")]
    pub code: Option<String>,

    /// Read the code from a file.
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Input binding as name=JSON. Can be used multiple times: --local x=41 --local s='"hi"'
    #[arg(short = 'l', long = "local", value_name = "NAME=JSON", action = clap::ArgAction::Append)]
    pub locals: Vec<String>,

    /// Replay from the cache when an entry exists.
    #[arg(long = "use-cache")]
    pub use_cache: bool,

    /// Record live runs into the cache.
    #[arg(long = "save-cache")]
    pub save_cache: bool,

    /// Never run live; fail when the cache has no entry.
    #[arg(long)]
    pub offline: bool,

    /// Cache directory (default: ./cache).
    #[arg(long = "cache-dir")]
    pub cache_dir: Option<PathBuf>,

    /// Where to run the code.
    #[arg(long, value_enum)]
    pub adapter: Option<AdapterKind>,

    /// Working directory of the interpreter (local path or remote path for ssh).
    #[arg(short = 'C', long = "working-dir")]
    pub working_dir: Option<String>,

    /// Remote host for the ssh adapter.
    #[arg(long)]
    pub host: Option<String>,

    /// Remote user for the ssh adapter.
    #[arg(long)]
    pub user: Option<String>,

    /// Remote port for the ssh adapter.
    #[arg(long)]
    pub port: Option<u16>,

    /// Interpreter command line, e.g. "ruby -W0".
    #[arg(long)]
    pub interpreter: Option<String>,

    /// List cached runs and exit.
    #[arg(long = "list-cache")]
    pub list_cache: bool,

    /// Remove every cached run and exit.
    #[arg(long = "clear-cache")]
    pub clear_cache: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Flag values as config overrides, using the same keys as the config file.
    pub fn overrides(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::new();
        let mut put = |k: &str, v: String| out.push((k.to_string(), v));
        if self.use_cache {
            put("RRUN_USE_CACHE", "true".into());
        }
        if self.save_cache {
            put("RRUN_SAVE_CACHE", "true".into());
        }
        if self.offline {
            put("RRUN_OFFLINE", "true".into());
        }
        if let Some(d) = &self.cache_dir {
            put("RRUN_CACHE_DIR", d.to_string_lossy().into_owned());
        }
        if let Some(a) = self.adapter {
            let kind = match a {
                AdapterKind::Local => "local",
                AdapterKind::Ssh => "ssh",
            };
            put("RRUN_ADAPTER", kind.into());
        }
        if let Some(d) = &self.working_dir {
            put("RRUN_WORKING_DIR", d.clone());
        }
        if let Some(h) = &self.host {
            put("RRUN_SSH_HOST", h.clone());
        }
        if let Some(u) = &self.user {
            put("RRUN_SSH_USER", u.clone());
        }
        if let Some(p) = self.port {
            put("RRUN_SSH_PORT", p.to_string());
        }
        if let Some(i) = &self.interpreter {
            put("RRUN_INTERPRETER", i.clone());
        }
        out
    }
}
