//! An IO-agnostic implementation of the tester box framing.
//!
//! Requests are a command string terminated by a single `\n`. Responses are a status byte (`'0'`
//! on success), an optional payload, and a terminating `@`. The size of a response is not known in
//! advance, so it is accumulated until the terminator shows up at the end of the received bytes.

use crate::Error;

/// Byte that ends every request
pub const LINE_END: u8 = b'\n';
/// Byte that ends every response
pub const TERMINATOR: u8 = b'@';
/// Leading status byte of a successful response
pub const STATUS_OK: u8 = b'0';

/// Build the bytes of a request for `command`
pub(crate) fn encode(command: &str) -> Result<Vec<u8>, Error> {
    if command.as_bytes().contains(&LINE_END) {
        return Err(Error::InvalidCommand(command.to_owned()));
    }
    let mut bytes = Vec::with_capacity(command.len() + 1);
    bytes.extend_from_slice(command.as_bytes());
    bytes.push(LINE_END);
    Ok(bytes)
}

/// Accumulates the chunks of a response until it is complete
#[derive(Debug, Default)]
pub(crate) struct ResponseBuffer {
    buf: Vec<u8>,
}

impl ResponseBuffer {
    /// Append a received chunk, returning true once the response is complete
    pub(crate) fn extend(&mut self, chunk: &[u8]) -> bool {
        self.buf.extend_from_slice(chunk);
        self.is_complete()
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.buf.last() == Some(&TERMINATOR)
    }

    /// The accumulated response with the terminator stripped
    pub(crate) fn into_frame(mut self) -> Vec<u8> {
        if self.is_complete() {
            self.buf.pop();
        }
        self.buf
    }
}

/// Check the status byte of a response `frame` to `command` and return the payload that follows
/// it. The payload of a failed command is never looked at.
pub(crate) fn decode<'a>(command: &str, frame: &'a [u8]) -> Result<&'a [u8], Error> {
    match frame.split_first() {
        Some((&STATUS_OK, payload)) => Ok(payload),
        Some((&status, _)) => Err(Error::CommandFailed {
            command: command.to_owned(),
            status: Some(char::from(status)),
        }),
        None => Err(Error::CommandFailed {
            command: command.to_owned(),
            status: None,
        }),
    }
}
