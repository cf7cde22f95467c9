//! A client for the RTM tester box.
//!
//! The tester box is an auxiliary device that sits on the other side of the RTM's digital I/O,
//! driving its inputs and observing its outputs. It speaks a small line protocol over a single
//! long-lived TCP connection:
//!
//! | Command      | Meaning                         | Payload             |
//! |--------------|---------------------------------|---------------------|
//! | `=<decimal>` | Drive the tester box outputs    | none                |
//! | `?`          | Read the tester box inputs      | decimal input word  |
//! | `i`          | Read the firmware information   | free text           |
//!
//! There is no reconnect logic; losing the connection is fatal for the rest of a test run.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod frame;

use frame::ResponseBuffer;
use std::{
    io::{
        ErrorKind,
        Read,
        Write,
    },
    net::{
        TcpStream,
        ToSocketAddrs,
    },
};
use tracing::{
    debug,
    info,
    trace,
};

/// Size of the buffer used for each read from the connection
const RECV_CHUNK: usize = 1024;

/// Errors that can be thrown from tester box interactions
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Internal system IO error")]
    Io(#[from] std::io::Error),
    #[error("Socket connection broken")]
    ConnectionBroken,
    #[error("Command `{command}` failed with status {status:?}")]
    CommandFailed {
        command: String,
        status: Option<char>,
    },
    #[error("Malformed response payload: {0:?}")]
    MalformedResponse(String),
    #[error("Commands may not contain a line terminator: {0:?}")]
    InvalidCommand(String),
}

/// A connection to the tester box. The stream is owned exclusively, so there is never more than
/// one request in flight.
#[derive(Debug)]
pub struct Tester<S = TcpStream> {
    stream: S,
}

impl Tester<TcpStream> {
    /// Connect to the tester box at `addr`
    /// # Errors
    /// Will return an error if the TCP connection can't be established
    pub fn connect<A>(addr: A) -> Result<Self, Error>
    where
        A: ToSocketAddrs,
    {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        info!(peer = ?stream.peer_addr().ok(), "Connected to tester box");
        Ok(Self::new(stream))
    }
}

impl<S> Tester<S>
where
    S: Read + Write,
{
    /// Wrap an already connected stream
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Give back the underlying stream
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Send `command` and return the payload of its response
    /// # Errors
    /// Returns an error if the connection breaks, the command is rejected by the tester box, or the
    /// payload isn't valid text
    pub fn send_command(&mut self, command: &str) -> Result<String, Error> {
        let request = frame::encode(command)?;
        debug!(command, "Sending tester box command");
        self.send_all(&request)?;
        let response = self.recv_frame()?;
        let payload = frame::decode(command, &response)?;
        String::from_utf8(payload.to_vec())
            .map_err(|e| Error::MalformedResponse(String::from_utf8_lossy(e.as_bytes()).into()))
    }

    /// Drive the tester box outputs to `value`
    /// # Errors
    /// Returns an error on a failed exchange
    pub fn write_outputs(&mut self, value: u32) -> Result<(), Error> {
        self.send_command(&format!("={value}"))?;
        Ok(())
    }

    /// Read the word observed on the tester box inputs
    /// # Errors
    /// Returns an error on a failed exchange or if the payload isn't a number
    pub fn read_inputs(&mut self) -> Result<u32, Error> {
        let payload = self.send_command("?")?;
        payload
            .trim()
            .parse()
            .map_err(|_| Error::MalformedResponse(payload))
    }

    /// Read the firmware information string of the tester box
    /// # Errors
    /// Returns an error on a failed exchange
    pub fn read_info(&mut self) -> Result<String, Error> {
        self.send_command("i")
    }

    /// Write every byte of `data`, however many writes that takes
    fn send_all(&mut self, data: &[u8]) -> Result<(), Error> {
        let mut total_sent = 0;
        while total_sent < data.len() {
            match self.stream.write(&data[total_sent..]) {
                Ok(0) => return Err(Error::ConnectionBroken),
                Ok(sent) => total_sent += sent,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.stream.flush()?;
        Ok(())
    }

    /// Read chunks until the response terminator arrives, returning the response without it
    fn recv_frame(&mut self) -> Result<Vec<u8>, Error> {
        let mut response = ResponseBuffer::default();
        let mut chunk = [0u8; RECV_CHUNK];
        loop {
            let nbytes = match self.stream.read(&mut chunk) {
                Ok(0) => return Err(Error::ConnectionBroken),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            trace!(nbytes, "Received tester box bytes");
            if response.extend(&chunk[..nbytes]) {
                return Ok(response.into_frame());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::VecDeque,
        io,
        net::TcpListener,
    };

    /// A stream that hands out scripted read chunks and accepts at most `write_limit` bytes per
    /// write
    #[derive(Debug, Default)]
    struct Scripted {
        chunks: VecDeque<Vec<u8>>,
        written: Vec<u8>,
        write_limit: Option<usize>,
    }

    impl Scripted {
        fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
                ..Default::default()
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = self.write_limit.map_or(buf.len(), |lim| lim.min(buf.len()));
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_chunked_response() {
        let mut tester = Tester::new(Scripted::new(&[b"0OK", b"@"]));
        assert_eq!(tester.send_command("i").unwrap(), "OK");
        assert_eq!(tester.into_inner().written, b"i\n");
    }

    #[test]
    fn test_byte_at_a_time_response() {
        let mut tester = Tester::new(Scripted::new(&[b"0", b"1", b"2", b"8", b"@"]));
        assert_eq!(tester.read_inputs().unwrap(), 128);
    }

    #[test]
    fn test_partial_writes() {
        let mut stream = Scripted::new(&[b"0@"]);
        stream.write_limit = Some(1);
        let mut tester = Tester::new(stream);
        tester.write_outputs(64).unwrap();
        assert_eq!(tester.into_inner().written, b"=64\n");
    }

    #[test]
    fn test_zero_write_is_broken() {
        let mut stream = Scripted::new(&[b"0@"]);
        stream.write_limit = Some(0);
        let mut tester = Tester::new(stream);
        assert!(matches!(
            tester.write_outputs(1),
            Err(Error::ConnectionBroken)
        ));
    }

    #[test]
    fn test_zero_read_is_broken() {
        let mut tester = Tester::new(Scripted::new(&[b"0O"]));
        assert!(matches!(tester.read_info(), Err(Error::ConnectionBroken)));
    }

    #[test]
    fn test_failed_status() {
        // The payload would also be malformed, but it must never be interpreted
        let mut tester = Tester::new(Scripted::new(&[b"1abc@"]));
        match tester.read_inputs() {
            Err(Error::CommandFailed { command, status }) => {
                assert_eq!(command, "?");
                assert_eq!(status, Some('1'));
            }
            other => panic!("Unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_malformed_inputs() {
        let mut tester = Tester::new(Scripted::new(&[b"0abc@"]));
        match tester.read_inputs() {
            Err(Error::MalformedResponse(payload)) => assert_eq!(payload, "abc"),
            other => panic!("Unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_negative_inputs_are_malformed() {
        let mut tester = Tester::new(Scripted::new(&[b"0-1@"]));
        assert!(matches!(
            tester.read_inputs(),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_read_info() {
        let mut tester = Tester::new(Scripted::new(&[b"0RTM tester v1.2", b"@"]));
        assert_eq!(tester.read_info().unwrap(), "RTM tester v1.2");
    }

    #[test]
    fn test_invalid_command_sends_nothing() {
        let mut tester = Tester::new(Scripted::new(&[b"0@"]));
        assert!(matches!(
            tester.send_command("=1\n"),
            Err(Error::InvalidCommand(_))
        ));
        assert!(tester.into_inner().written.is_empty());
    }

    #[test]
    fn test_tcp_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut byte = [0u8; 1];
            while request.last() != Some(&b'\n') {
                conn.read_exact(&mut byte).unwrap();
                request.push(byte[0]);
            }
            // Deliver the response in two separate writes
            conn.write_all(b"01").unwrap();
            conn.flush().unwrap();
            conn.write_all(b"7@").unwrap();
            request
        });
        let mut tester = Tester::connect(addr).unwrap();
        assert_eq!(tester.read_inputs().unwrap(), 17);
        assert_eq!(server.join().unwrap(), b"?\n");
    }
}
