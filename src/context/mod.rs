//! Execution context: the entry point tying assembly, adapter choice,
//! running and result extraction together.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;

use crate::adapter::{Adapter, CacheAdapter, CachingAdapter};
use crate::cache::CacheStore;
use crate::compiler::{assemble, ExecutionUnit, HashContext};
use crate::config::ExecutionConfig;
use crate::error::{ExecError, Result};
use crate::execution::Runner;
use crate::printer::OutputPrinter;

/// Receives updated bindings, standing in for the caller's variable scope.
pub trait ScopeBinder {
    fn bind(&mut self, name: &str, value: Value);
}

impl ScopeBinder for IndexMap<String, Value> {
    fn bind(&mut self, name: &str, value: Value) {
        self.insert(name.to_string(), value);
    }
}

impl ScopeBinder for HashMap<String, Value> {
    fn bind(&mut self, name: &str, value: Value) {
        self.insert(name.to_string(), value);
    }
}

/// Where a call's result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSource {
    Live,
    Recorded,
    Replayed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub value: Value,
    /// Input bindings whose value changed during the run.
    pub changed: IndexMap<String, Value>,
    pub output: String,
    pub errors: String,
    pub source: RunSource,
    pub hash: String,
}

pub struct ExecutionContext {
    config: ExecutionConfig,
    store: CacheStore,
    runner: Runner,
}

impl ExecutionContext {
    /// Build a context echoing remote output to this process's stdout/stderr.
    pub fn new(config: ExecutionConfig) -> Result<Self> {
        Self::with_printers(config, OutputPrinter::stdout(), OutputPrinter::stderr())
    }

    /// Creates the cache directory as a side effect.
    pub fn with_printers(config: ExecutionConfig, out: OutputPrinter, err: OutputPrinter) -> Result<Self> {
        let store = CacheStore::open(&config.cache_dir)?;
        Ok(Self {
            config,
            store,
            runner: Runner::new(out, err),
        })
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.store
    }

    pub fn compile(&self, source: &str, locals: &IndexMap<String, Value>) -> Result<ExecutionUnit> {
        let ctx = HashContext {
            adapter_kind: self.config.adapter.kind().to_string(),
            params: self.config.adapter.params()?,
        };
        assemble(source, locals, &self.config.flavours, &ctx)
    }

    fn select_adapter(&self, unit: &ExecutionUnit) -> Result<(Adapter, RunSource)> {
        let direct = &self.config.adapter;
        let hash = unit.hash();

        if self.config.use_cache && self.store.exists(hash) {
            let replay = CacheAdapter::new(direct.connection_name(), self.store.clone(), hash);
            return Ok((Adapter::Replay(replay), RunSource::Replayed));
        }
        if self.config.offline {
            return Err(ExecError::CacheMiss {
                hash: hash.to_string(),
                dir: self.store.dir().display().to_string(),
            });
        }
        if self.config.save_cache {
            let recording = CachingAdapter::new(direct.clone(), self.store.clone(), hash);
            return Ok((Adapter::Recording(recording), RunSource::Recorded));
        }
        Ok((Adapter::Direct(direct.clone()), RunSource::Live))
    }

    /// Run `source` with the given input bindings.
    pub async fn execute(&mut self, source: &str, locals: &IndexMap<String, Value>) -> Result<CallOutcome> {
        let unit = self.compile(source, locals)?;
        let (adapter, run_source) = self.select_adapter(&unit)?;
        tracing::info!(
            hash = %unit.hash(),
            source = ?run_source,
            connection = %adapter.connection_name(),
            "executing unit"
        );

        let result = match self.runner.run(&unit, &adapter).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(hash = %unit.hash(), error = %e, "execution failed");
                return Err(e);
            }
        };

        // Only names the caller sent are reported back, and only if they changed.
        let changed = result
            .locals
            .into_iter()
            .filter(|(name, value)| locals.get(name).is_some_and(|sent| sent != value))
            .collect();

        Ok(CallOutcome {
            value: result.value,
            changed,
            output: result.output,
            errors: result.errors,
            source: run_source,
            hash: unit.hash().to_string(),
        })
    }

    /// Run `source` and push every changed binding into `binder`.
    pub async fn execute_into<B: ScopeBinder>(
        &mut self,
        source: &str,
        locals: &IndexMap<String, Value>,
        binder: &mut B,
    ) -> Result<Value> {
        let outcome = self.execute(source, locals).await?;
        for (name, value) in outcome.changed {
            binder.bind(&name, value);
        }
        Ok(outcome.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{DirectAdapter, LocalStdinAdapter};
    use crate::cache::CacheEntry;
    use crate::codec::{encode_payload, Payload};
    use crate::compiler::{RESULT_BEGIN, RESULT_END};
    use crate::printer::{SharedBuffer, StreamKind};
    use serde_json::json;

    /// Context whose interpreter cannot start, so any live run fails loudly.
    fn unlaunchable(dir: &std::path::Path) -> ExecutionConfig {
        ExecutionConfig {
            adapter: DirectAdapter::Local(
                LocalStdinAdapter::new(".").with_interpreter("/nonexistent/ruby"),
            ),
            use_cache: true,
            save_cache: false,
            offline: false,
            cache_dir: dir.to_path_buf(),
            flavours: Vec::new(),
        }
    }

    fn recorded_stdout(result: Value, locals: &[(&str, Value)]) -> Vec<u8> {
        let payload = Payload {
            result,
            locals: locals.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        };
        format!("working...\n\n{}{}{}\n", RESULT_BEGIN, encode_payload(&payload), RESULT_END)
            .into_bytes()
    }

    fn x(value: i64) -> IndexMap<String, Value> {
        let mut m = IndexMap::new();
        m.insert("x".to_string(), json!(value));
        m
    }

    #[tokio::test]
    async fn replays_without_launching_environment() {
        let tmp = tempfile::tempdir().unwrap();
        let out = SharedBuffer::default();
        let mut ctx = ExecutionContext::with_printers(
            unlaunchable(tmp.path()),
            OutputPrinter::new(Box::new(out.clone()), StreamKind::Stdout, false),
            OutputPrinter::silent(StreamKind::Stderr),
        )
        .unwrap();

        let unit = ctx.compile("x = x + 1; x", &x(41)).unwrap();
        let entry = CacheEntry {
            stdout: recorded_stdout(json!(42), &[("x", json!(42)), ("extra", json!(1))]),
            stderr: b"note\n".to_vec(),
        };
        ctx.cache().write(unit.hash(), &entry).unwrap();

        let outcome = ctx.execute("x = x + 1; x", &x(41)).await.unwrap();
        assert_eq!(outcome.source, RunSource::Replayed);
        assert_eq!(outcome.value, json!(42));
        assert_eq!(outcome.changed, x(42));
        assert_eq!(outcome.output, "working...\n");
        assert_eq!(outcome.errors, "note\n");
        assert_eq!(out.contents(), ".> working...\n");
    }

    #[tokio::test]
    async fn unchanged_bindings_are_not_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = ExecutionContext::with_printers(
            unlaunchable(tmp.path()),
            OutputPrinter::silent(StreamKind::Stdout),
            OutputPrinter::silent(StreamKind::Stderr),
        )
        .unwrap();
        let unit = ctx.compile("x + 1", &x(41)).unwrap();
        let entry = CacheEntry { stdout: recorded_stdout(json!(42), &[("x", json!(41))]), stderr: vec![] };
        ctx.cache().write(unit.hash(), &entry).unwrap();

        let mut scope = x(41);
        let value = ctx.execute_into("x + 1", &x(41), &mut scope).await.unwrap();
        assert_eq!(value, json!(42));
        assert_eq!(scope, x(41));
    }

    #[tokio::test]
    async fn offline_miss_never_runs_live() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = unlaunchable(tmp.path());
        config.offline = true;
        let mut ctx = ExecutionContext::with_printers(
            config,
            OutputPrinter::silent(StreamKind::Stdout),
            OutputPrinter::silent(StreamKind::Stderr),
        )
        .unwrap();
        let err = ctx.execute("1", &IndexMap::new()).await.unwrap_err();
        assert!(matches!(err, ExecError::CacheMiss { .. }));
    }

    #[tokio::test]
    async fn cache_miss_falls_back_to_live_run() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = ExecutionContext::with_printers(
            unlaunchable(tmp.path()),
            OutputPrinter::silent(StreamKind::Stdout),
            OutputPrinter::silent(StreamKind::Stderr),
        )
        .unwrap();
        let err = ctx.execute("1", &IndexMap::new()).await.unwrap_err();
        assert!(matches!(err, ExecError::AdapterStart { .. }));
    }

    #[test]
    fn construction_creates_cache_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a").join("cache");
        let mut config = unlaunchable(&dir);
        config.use_cache = false;
        ExecutionContext::with_printers(
            config,
            OutputPrinter::silent(StreamKind::Stdout),
            OutputPrinter::silent(StreamKind::Stderr),
        )
        .unwrap();
        assert!(dir.is_dir());
    }
}
