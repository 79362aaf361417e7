mod cli;

use std::fs;
use std::io::{self, Read};

use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;
use is_terminal::IsTerminal;
use remote_run::cache::CacheStore;
use remote_run::{Config, ExecutionConfig, ExecutionContext};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_tracing();

    // Config file and RRUN_* env first, then flags on top
    let mut cfg = Config::load();
    for (k, v) in args.overrides() {
        cfg.set(k, v);
    }
    let exec_cfg = ExecutionConfig::from_config(&cfg)
        .with_context(|| format!("loading configuration ({})", cfg.config_path.display()))?;

    if args.list_cache {
        let store = CacheStore::open(&exec_cfg.cache_dir)?;
        for hash in store.list() {
            println!("{}", hash);
        }
        return Ok(());
    }
    if args.clear_cache {
        let store = CacheStore::open(&exec_cfg.cache_dir)?;
        let removed = store.clear()?;
        println!("Removed {} cached run(s) from {}", removed, store.dir().display());
        return Ok(());
    }

    let code = read_code(&args)?;
    if code.trim().is_empty() {
        bail!("No code given: pass CODE, --file, or pipe it on stdin");
    }
    let locals = parse_locals(&args.locals)?;

    let mut ctx = ExecutionContext::new(exec_cfg)?;
    let outcome = ctx.execute(&code, &locals).await?;

    println!("{}", serde_json::to_string(&outcome.value)?);
    for (name, value) in &outcome.changed {
        println!("{} = {}", name, value);
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RRUN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn read_code(args: &cli::Cli) -> Result<String> {
    if let Some(code) = &args.code {
        return Ok(code.clone());
    }
    if let Some(path) = &args.file {
        return fs::read_to_string(path).with_context(|| format!("reading code file: {}", path.display()));
    }
    if io::stdin().is_terminal() {
        bail!("No code given: pass CODE, --file, or pipe it on stdin");
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn parse_locals(raw: &[String]) -> Result<IndexMap<String, Value>> {
    let mut locals = IndexMap::new();
    for item in raw {
        let (name, json) = item
            .split_once('=')
            .ok_or_else(|| anyhow!("--local expects NAME=JSON, got '{}'", item))?;
        let value: Value = serde_json::from_str(json)
            .with_context(|| format!("invalid JSON for local '{}': {}", name, json))?;
        locals.insert(name.trim().to_string(), value);
    }
    Ok(locals)
}
