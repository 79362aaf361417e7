//! Separate the embedded result payload from ordinary console output.

use crate::codec::{decode_payload, Payload};
use crate::compiler::{RESULT_BEGIN, RESULT_END};
use crate::error::{ProtocolViolation, Result};

/// Split fully captured stdout into pass-through bytes and the decoded payload.
///
/// The last begin marker wins: the trailer always writes last, so an earlier
/// marker printed by user code cannot shadow it. Bytes outside the payload
/// are returned untouched, invalid UTF-8 included.
pub fn extract(stdout: &[u8]) -> Result<(Vec<u8>, Payload)> {
    let start = rfind(stdout, RESULT_BEGIN.as_bytes()).ok_or(ProtocolViolation::MissingMarker)?;
    let body_start = start + RESULT_BEGIN.len();
    let body_len = find(&stdout[body_start..], RESULT_END.as_bytes())
        .ok_or(ProtocolViolation::Unterminated)?;
    let body = std::str::from_utf8(&stdout[body_start..body_start + body_len])
        .map_err(|e| ProtocolViolation::Undecodable(e.to_string()))?;
    let payload = decode_payload(body)?;

    // The trailer frames the payload with one newline on each side.
    let before = &stdout[..start];
    let before = before.strip_suffix(b"\n").unwrap_or(before);
    let after = &stdout[body_start + body_len + RESULT_END.len()..];
    let after = after.strip_prefix(b"\n").unwrap_or(after);

    let mut passthrough = Vec::with_capacity(before.len() + after.len());
    passthrough.extend_from_slice(before);
    passthrough.extend_from_slice(after);
    Ok((passthrough, payload))
}

/// Line filter that hides the payload from live echo.
///
/// Only a line carrying a complete begin..end span is treated as payload,
/// which is how the trailer writes it. A bare newline is held back for one
/// line, since the trailer writes one right before the begin marker.
#[derive(Debug, Default)]
pub(crate) struct EchoFilter {
    held_blank: bool,
}

impl EchoFilter {
    /// Feed one line (including its newline, if any); returns the lines to echo.
    pub(crate) fn feed(&mut self, line: &[u8]) -> Vec<Vec<u8>> {
        let mut visible = Vec::new();

        if let Some((start, end)) = payload_span(line) {
            self.held_blank = false;
            if start > 0 {
                visible.push(line[..start].to_vec());
            }
            let rest = &line[end..];
            if !rest.is_empty() && rest != b"\n" {
                visible.push(rest.to_vec());
            }
            return visible;
        }

        if self.held_blank {
            visible.push(b"\n".to_vec());
            self.held_blank = false;
        }
        if line == b"\n" {
            self.held_blank = true;
        } else {
            visible.push(line.to_vec());
        }
        visible
    }

    /// Flush whatever is still held back at end of stream.
    pub(crate) fn finish(&mut self) -> Vec<Vec<u8>> {
        if std::mem::take(&mut self.held_blank) {
            vec![b"\n".to_vec()]
        } else {
            Vec::new()
        }
    }
}

/// Byte range of the last begin marker through its end marker, if both are on `line`.
fn payload_span(line: &[u8]) -> Option<(usize, usize)> {
    let start = rfind(line, RESULT_BEGIN.as_bytes())?;
    let body = start + RESULT_BEGIN.len();
    let end = find(&line[body..], RESULT_END.as_bytes())?;
    Some((start, body + end + RESULT_END.len()))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
