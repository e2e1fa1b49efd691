//! Newline-delimited JSON framing shared by server and client.
//!
//! # Wire format
//!
//! ```text
//! ┌──────────────────────────────┬──────────────────────────────┐
//! │ JSON object + '\n'           │ raw payload (frames only)    │
//! │ single line, UTF-8           │ width*height*channels bytes  │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! Requests and server-info responses are bare JSON lines. A frame header
//! line is immediately followed by its raw payload with no further
//! framing; the payload length is implied entirely by the header fields.
//!
//! ## Reassembly rules
//!
//! TCP gives no message boundaries, so a reader must not assume a JSON
//! line and the following payload arrive in separate reads: any bytes
//! received in the same chunk as the line's trailing newline belong to
//! the payload and are handed back as [`LineRead::trailing`].
//!
//! A line that grows past [`MAX_HEADER_BYTES`] without a terminator is a
//! protocol error (bounds memory against a misbehaving peer). A zero-byte
//! read anywhere is an orderly peer close and is reported as a connection
//! error, never a protocol error.

use crate::error::{Error, Result};
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};

/// Hard ceiling on the accumulated size of a single header line.
pub const MAX_HEADER_BYTES: usize = 65536;

/// Serialize a message as a single JSON line, newline terminated.
pub fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut bytes =
        serde_json::to_vec(message).map_err(|e| Error::Serialization(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// One reassembled line plus whatever bytes followed its newline in the
/// same transport read.
#[derive(Debug)]
pub struct LineRead {
    /// The line, without its trailing newline.
    pub line: Vec<u8>,
    /// Bytes past the newline; for a frame header these are the start of
    /// the payload and must be retained.
    pub trailing: Vec<u8>,
}

/// Read chunks until a newline is observed, retaining bytes past it.
///
/// `scratch` is a caller-owned buffer reused across calls; each read pulls
/// at most `scratch.len()` bytes.
pub fn read_line<R: Read>(reader: &mut R, scratch: &mut [u8], max_line: usize) -> Result<LineRead> {
    let mut line = Vec::new();
    loop {
        if line.len() > max_line {
            return Err(Error::Protocol(format!(
                "header exceeds {} bytes without a terminator",
                max_line
            )));
        }

        let received = read_chunk(reader, scratch)?;
        if received == 0 {
            return Err(Error::Connection(
                "peer closed the connection".to_string(),
            ));
        }

        let chunk = &scratch[..received];
        match chunk.iter().position(|&b| b == b'\n') {
            Some(newline) => {
                line.extend_from_slice(&chunk[..newline]);
                return Ok(LineRead {
                    line,
                    trailing: chunk[newline + 1..].to_vec(),
                });
            }
            None => line.extend_from_slice(chunk),
        }
    }
}

/// Stateful line reader for a request stream.
///
/// `next_image` gets no response, so a client may legally have a second
/// request in flight right behind it; both lines can then arrive in one
/// TCP segment. The scanner carries bytes left over past a newline into
/// the next call instead of discarding them, so no request is ever lost
/// to segment coalescing. A timeout leaves any partial line in the carry
/// buffer and accumulation resumes on the next call.
#[derive(Debug, Default)]
pub struct LineScanner {
    carry: Vec<u8>,
}

impl LineScanner {
    pub fn new() -> Self {
        Self { carry: Vec::new() }
    }

    /// Read one line, without its newline. Bytes past the newline stay
    /// buffered for the next call.
    pub fn read_line<R: Read>(
        &mut self,
        reader: &mut R,
        scratch: &mut [u8],
        max_line: usize,
    ) -> Result<Vec<u8>> {
        if let Some(newline) = self.carry.iter().position(|&b| b == b'\n') {
            let rest = self.carry.split_off(newline + 1);
            let mut line = std::mem::replace(&mut self.carry, rest);
            line.pop();
            return Ok(line);
        }

        loop {
            if self.carry.len() > max_line {
                self.carry.clear();
                return Err(Error::Protocol(format!(
                    "request exceeds {} bytes without a terminator",
                    max_line
                )));
            }

            let received = read_chunk(reader, scratch)?;
            if received == 0 {
                return Err(Error::Connection(
                    "peer closed the connection".to_string(),
                ));
            }

            let chunk = &scratch[..received];
            match chunk.iter().position(|&b| b == b'\n') {
                Some(newline) => {
                    let mut line = std::mem::take(&mut self.carry);
                    line.extend_from_slice(&chunk[..newline]);
                    self.carry = chunk[newline + 1..].to_vec();
                    return Ok(line);
                }
                None => self.carry.extend_from_slice(chunk),
            }
        }
    }
}

/// Single socket read with timeout classification.
///
/// Returns the number of bytes read; zero means the peer performed an
/// orderly close (callers decide how to report that).
pub fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    match reader.read(buf) {
        Ok(received) => Ok(received),
        Err(e) => Err(classify_io(e)),
    }
}

/// Write the whole buffer, classifying timeouts and peer departures.
pub fn write_all<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    writer.write_all(bytes).map_err(classify_io)
}

fn classify_io(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => Error::Timeout,
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
        | ErrorKind::UnexpectedEof => Error::Connection(e.to_string()),
        _ => Error::Io(e),
    }
}
