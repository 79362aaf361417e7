//! Run self-contained Ruby code out of process and get back its value and
//! the bindings it changed.
//!
//! ```no_run
//! use indexmap::IndexMap;
//! use remote_run::{ExecutionConfig, ExecutionContext};
//! use serde_json::json;
//!
//! # async fn demo() -> remote_run::Result<()> {
//! let mut config = ExecutionConfig::local(".");
//! config.save_cache = true;
//! let mut ctx = ExecutionContext::new(config)?;
//!
//! let mut locals = IndexMap::new();
//! locals.insert("x".to_string(), json!(41));
//! let outcome = ctx.execute("x = x + 1; x", &locals).await?;
//! assert_eq!(outcome.value, json!(42));
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod cache;
pub mod codec;
pub mod compiler;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod flavour;
pub mod printer;

pub use config::{Config, ExecutionConfig};
pub use context::{CallOutcome, ExecutionContext, RunSource, ScopeBinder};
pub use error::{ExecError, ProtocolViolation, Result};
pub use execution::ExecutionResult;
