use std::{
    collections::HashMap,
    env, fs,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use directories::BaseDirs;

use crate::adapter::{DirectAdapter, LocalStdinAdapter, SshStdinAdapter};
use crate::error::{ExecError, Result};
use crate::flavour::{parse_env_pairs, parse_list, Flavour};

const PREFIX: &str = "RRUN_";

/// Raw `KEY=VALUE` settings: config file overlaid by `RRUN_*` environment variables.
#[derive(Debug, Clone, Default)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let config_path = default_config_path();
        let mut map = HashMap::new();

        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(|l| l.ok()) {
                    if let Some((k, v)) = parse_line(&line) {
                        map.insert(k, v);
                    }
                }
            }
        }

        // Environment takes precedence over the file
        for (k, v) in env::vars() {
            if k.starts_with(PREFIX) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            inner: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            config_path: PathBuf::new(),
        }
    }

    /// Override a single setting, e.g. from a command-line flag.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false)
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (k, v) = line.split_once('=')?;
    Some((k.trim().to_string(), v.trim().to_string()))
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("rrun").join("config")
}

/// Typed settings consumed by [`crate::context::ExecutionContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    pub adapter: DirectAdapter,
    /// Replay from cache when an entry exists.
    pub use_cache: bool,
    /// Record live runs into the cache.
    pub save_cache: bool,
    /// Fail instead of running live when no cache entry exists.
    pub offline: bool,
    pub cache_dir: PathBuf,
    pub flavours: Vec<Flavour>,
}

impl ExecutionConfig {
    /// Local adapter rooted at `working_dir`, no caching, no flavours.
    pub fn local(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            adapter: DirectAdapter::Local(LocalStdinAdapter::new(working_dir)),
            use_cache: false,
            save_cache: false,
            offline: false,
            cache_dir: default_cache_dir(),
            flavours: Vec::new(),
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let working_dir = cfg.get("RRUN_WORKING_DIR").unwrap_or_else(|| ".".into());
        let interpreter = cfg.get("RRUN_INTERPRETER");

        let adapter = match cfg.get("RRUN_ADAPTER").as_deref().unwrap_or("local") {
            "local" => {
                let mut a = LocalStdinAdapter::new(working_dir);
                if let Some(i) = interpreter {
                    a = a.with_interpreter(i);
                }
                DirectAdapter::Local(a)
            }
            "ssh" => {
                let host = cfg
                    .get("RRUN_SSH_HOST")
                    .ok_or_else(|| ExecError::Config("ssh adapter needs RRUN_SSH_HOST".into()))?;
                let mut a = SshStdinAdapter::new(host, working_dir);
                if let Some(user) = cfg.get("RRUN_SSH_USER") {
                    a = a.with_user(user);
                }
                if let Some(port) = cfg.get("RRUN_SSH_PORT") {
                    let port = port
                        .parse::<u16>()
                        .map_err(|_| ExecError::Config(format!("invalid RRUN_SSH_PORT '{}'", port)))?;
                    a = a.with_port(port);
                }
                if let Some(i) = interpreter {
                    a = a.with_interpreter(i);
                }
                DirectAdapter::Ssh(a)
            }
            other => return Err(ExecError::Config(format!("unknown adapter '{}'", other))),
        };

        Ok(Self {
            adapter,
            use_cache: cfg.get_bool("RRUN_USE_CACHE"),
            save_cache: cfg.get_bool("RRUN_SAVE_CACHE"),
            offline: cfg.get_bool("RRUN_OFFLINE"),
            cache_dir: cfg.get_path("RRUN_CACHE_DIR").unwrap_or_else(default_cache_dir),
            flavours: flavours_from_config(cfg)?,
        })
    }
}

/// Resolve `RRUN_FLAVOURS` (ordered) into flavours, reading each one's options.
pub fn flavours_from_config(cfg: &Config) -> Result<Vec<Flavour>> {
    let names = cfg.get("RRUN_FLAVOURS").map(|v| parse_list(&v)).unwrap_or_default();
    let mut flavours = Vec::with_capacity(names.len());
    for name in names {
        let flavour = match name.as_str() {
            "require" => Flavour::Require {
                libraries: cfg.get("RRUN_REQUIRE").map(|v| parse_list(&v)).unwrap_or_default(),
            },
            "env" => Flavour::Env {
                vars: parse_env_pairs(&cfg.get("RRUN_ENV").unwrap_or_default())?,
            },
            "prelude" => {
                let path = cfg
                    .get_path("RRUN_PRELUDE")
                    .ok_or_else(|| ExecError::Config("prelude flavour needs RRUN_PRELUDE".into()))?;
                Flavour::prelude_from_file(&path)?
            }
            other => return Err(ExecError::Config(format!("unknown flavour '{}'", other))),
        };
        flavours.push(flavour);
    }
    Ok(flavours)
}

fn default_cache_dir() -> PathBuf {
    env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join("cache")
}
