//! Runner: drives one adapter through one assembled unit.

use std::io;

use indexmap::IndexMap;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};

use crate::adapter::{Adapter, Channel, Termination};
use crate::compiler::ExecutionUnit;
use crate::error::{ExecError, Result};
use crate::printer::OutputPrinter;

pub mod extract;

use extract::{extract, EchoFilter};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    /// Value the user code evaluated to.
    pub value: Value,
    /// Final value of every input binding, as reported by the environment.
    pub locals: IndexMap<String, Value>,
    /// Console output with the result payload removed, as text. Invalid
    /// UTF-8 is replaced here; `stdout` keeps the exact bytes.
    pub output: String,
    /// Pass-through stdout bytes exactly as the environment wrote them.
    pub stdout: Vec<u8>,
    pub errors: String,
}

pub struct Runner {
    out: OutputPrinter,
    err: OutputPrinter,
}

impl Runner {
    pub fn new(out: OutputPrinter, err: OutputPrinter) -> Self {
        Self { out, err }
    }

    /// Run `unit` through `adapter` and decode its result.
    ///
    /// Blocks until the environment exits; there is no timeout.
    pub async fn run(&mut self, unit: &ExecutionUnit, adapter: &Adapter) -> Result<ExecutionResult> {
        let connection = adapter.connection_name();
        let Channel { mut stdin, stdout, stderr, completion } = adapter.open()?;

        let code = unit.code().as_bytes();
        let write = async move {
            if let Err(e) = write_all_and_close(&mut stdin, code).await {
                if e.kind() != io::ErrorKind::BrokenPipe {
                    return Err(ExecError::from(e));
                }
                tracing::debug!("environment closed stdin before reading the whole unit");
            }
            Ok(())
        };
        let (_, stdout, stderr) = tokio::try_join!(
            write,
            drain(stdout, &mut self.out, &connection, true),
            drain(stderr, &mut self.err, &connection, false),
        )?;

        let errors = String::from_utf8_lossy(&stderr).into_owned();
        if let Termination::Failed { code } = completion.wait().await? {
            return Err(ExecError::NonSuccessExit { connection, code, stderr: errors });
        }

        let (passthrough, payload) = extract(&stdout)?;
        Ok(ExecutionResult {
            value: payload.result,
            locals: payload.locals,
            output: String::from_utf8_lossy(&passthrough).into_owned(),
            stdout: passthrough,
            errors,
        })
    }
}

async fn write_all_and_close(stdin: &mut crate::adapter::BoxedWriter, code: &[u8]) -> io::Result<()> {
    stdin.write_all(code).await?;
    stdin.flush().await?;
    stdin.shutdown().await
}

/// Read a stream to the end, echoing each line as it arrives.
async fn drain<R: AsyncRead + Unpin>(
    reader: R,
    printer: &mut OutputPrinter,
    connection: &str,
    hide_payload: bool,
) -> Result<Vec<u8>> {
    let mut reader = BufReader::new(reader);
    let mut filter = EchoFilter::default();
    let mut captured = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        captured.extend_from_slice(&line);
        if hide_payload {
            for visible in filter.feed(&line) {
                printer.print_line(connection, &visible)?;
            }
        } else {
            printer.print_line(connection, &line)?;
        }
    }
    for visible in filter.finish() {
        printer.print_line(connection, &visible)?;
    }
    Ok(captured)
}
