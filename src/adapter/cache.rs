//! Cache-aware adapters: replay a stored run, or record a live one.

use std::{
    io::{self, Cursor},
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::Child;

use super::{wait_child, Channel, Completion, CompletionKind, DirectAdapter, Termination};
use crate::cache::{CacheEntry, CacheStore};
use crate::error::{ExecError, Result};

/// Streams a previously recorded run without touching any environment.
#[derive(Debug, Clone)]
pub struct CacheAdapter {
    connection_name: String,
    store: CacheStore,
    hash: String,
}

impl CacheAdapter {
    pub fn new(connection_name: impl Into<String>, store: CacheStore, hash: impl Into<String>) -> Self {
        Self {
            connection_name: connection_name.into(),
            store,
            hash: hash.into(),
        }
    }

    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    pub fn open(&self) -> Result<Channel> {
        let entry = self.store.read(&self.hash)?.ok_or_else(|| ExecError::CacheMiss {
            hash: self.hash.clone(),
            dir: self.store.dir().display().to_string(),
        })?;
        tracing::debug!(hash = %self.hash, stdout = entry.stdout.len(), stderr = entry.stderr.len(), "replaying cached run");

        Ok(Channel {
            stdin: Box::new(tokio::io::sink()),
            stdout: Box::new(Cursor::new(entry.stdout)),
            stderr: Box::new(Cursor::new(entry.stderr)),
            completion: Completion(CompletionKind::Replayed),
        })
    }
}

/// Wraps a direct adapter and saves its output once it exits successfully.
#[derive(Debug, Clone)]
pub struct CachingAdapter {
    adapter: DirectAdapter,
    store: CacheStore,
    hash: String,
}

impl CachingAdapter {
    pub fn new(adapter: DirectAdapter, store: CacheStore, hash: impl Into<String>) -> Self {
        Self { adapter, store, hash: hash.into() }
    }

    pub fn connection_name(&self) -> String {
        self.adapter.connection_name()
    }

    pub fn open(&self) -> Result<Channel> {
        let (child, stdin, stdout, stderr) = self.adapter.spawn()?;
        let out_capture = Capture::default();
        let err_capture = Capture::default();

        Ok(Channel {
            stdin,
            stdout: Box::new(TeeReader::new(stdout, out_capture.clone())),
            stderr: Box::new(TeeReader::new(stderr, err_capture.clone())),
            completion: Completion(CompletionKind::Recording(Recording {
                child,
                store: self.store.clone(),
                hash: self.hash.clone(),
                stdout: out_capture,
                stderr: err_capture,
            })),
        })
    }
}

/// Shared buffer a [`TeeReader`] mirrors bytes into.
#[derive(Debug, Clone, Default)]
pub(super) struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn append(&self, bytes: &[u8]) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).extend_from_slice(bytes);
    }

    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Reader that copies everything it yields into a [`Capture`].
pub(super) struct TeeReader<R> {
    inner: R,
    capture: Capture,
}

impl<R> TeeReader<R> {
    pub(super) fn new(inner: R, capture: Capture) -> Self {
        Self { inner, capture }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for TeeReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            this.capture.append(&buf.filled()[before..]);
        }
        poll
    }
}

/// Completion of a recording run: persists the capture only on success.
pub(super) struct Recording {
    child: Child,
    store: CacheStore,
    hash: String,
    stdout: Capture,
    stderr: Capture,
}

impl Recording {
    pub(super) async fn finish(self) -> Result<Termination> {
        let termination = wait_child(self.child).await?;
        match termination {
            Termination::Success => {
                let entry = CacheEntry {
                    stdout: self.stdout.take(),
                    stderr: self.stderr.take(),
                };
                match self.store.write(&self.hash, &entry) {
                    Ok(()) => tracing::info!(hash = %self.hash, "recorded run to cache"),
                    Err(e) => tracing::warn!(hash = %self.hash, error = %e, "failed to record run to cache"),
                }
            }
            Termination::Failed { code } => {
                tracing::info!(hash = %self.hash, code = ?code, "run failed; not recording");
            }
        }
        Ok(termination)
    }
}
