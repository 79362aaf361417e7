//! Live echo of remote output, labelled with the connection name.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

pub struct OutputPrinter {
    sink: Box<dyn Write + Send>,
    kind: StreamKind,
    color: bool,
}

impl OutputPrinter {
    pub fn new(sink: Box<dyn Write + Send>, kind: StreamKind, color: bool) -> Self {
        Self { sink, kind, color }
    }

    /// Echo to this process's stdout, colored when it is a terminal.
    pub fn stdout() -> Self {
        let color = io::stdout().is_terminal();
        Self::new(Box::new(io::stdout()), StreamKind::Stdout, color)
    }

    pub fn stderr() -> Self {
        let color = io::stderr().is_terminal();
        Self::new(Box::new(io::stderr()), StreamKind::Stderr, color)
    }

    /// Discard everything.
    pub fn silent(kind: StreamKind) -> Self {
        Self::new(Box::new(io::sink()), kind, false)
    }

    /// Print one line of remote output. A missing trailing newline is added.
    pub fn print_line(&mut self, connection: &str, line: &[u8]) -> io::Result<()> {
        let owned = String::from_utf8_lossy(line);
        let text = owned.strip_suffix('\n').unwrap_or(&owned[..]);
        let label = format!("{}>", connection);
        if self.color {
            match self.kind {
                StreamKind::Stdout => writeln!(self.sink, "{} {}", label.green(), text)?,
                StreamKind::Stderr => writeln!(self.sink, "{} {}", label.red(), text)?,
            }
        } else {
            writeln!(self.sink, "{} {}", label, text)?;
        }
        self.sink.flush()
    }
}

/// In-memory sink whose contents stay readable after it is handed to a printer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap_or_else(|e| e.into_inner())).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_labelled() {
        let buf = SharedBuffer::default();
        let mut printer = OutputPrinter::new(Box::new(buf.clone()), StreamKind::Stdout, false);
        printer.print_line("/srv", b"hello\n").unwrap();
        printer.print_line("/srv", b"no newline").unwrap();
        assert_eq!(buf.contents(), "/srv> hello\n/srv> no newline\n");
    }

    #[test]
    fn colored_lines_keep_text() {
        let buf = SharedBuffer::default();
        let mut printer = OutputPrinter::new(Box::new(buf.clone()), StreamKind::Stderr, true);
        printer.print_line("box", b"oops\n").unwrap();
        let out = buf.contents();
        assert!(out.contains("oops"));
        assert!(out.contains('\u{1b}'));
    }
}
