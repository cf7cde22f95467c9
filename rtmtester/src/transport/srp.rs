//! The register transport for version 3 of the SLAC Register Protocol (SRPv3) over UDP
//!
//! Every request is a five word little-endian header, followed by the data to write for write
//! requests. The response echoes the header, carries the data (read or written) and ends with a
//! single status word.
use super::{
    lookup,
    Transport,
    TransportResult,
};
use crate::core::{
    register_map,
    RegisterMap,
};
use packed_struct::prelude::*;
use rtm_utils::description::Description;
use std::{
    net::{
        Ipv4Addr,
        SocketAddr,
        UdpSocket,
    },
    time::Duration,
};
use thiserror::Error;
use tracing::{
    debug,
    warn,
};

const DEFAULT_TIMEOUT: f32 = 0.5;
/// Attempts made for each transaction unless set otherwise
pub const DEFAULT_RETRIES: usize = 5;
/// The UDP port SRP is served on unless the description says otherwise
pub const DEFAULT_PORT: u16 = 8192;

const VERSION: u8 = 0x03;
/// Bus timeout the firmware applies to each transaction
const BUS_TIMEOUT: u8 = 0x0A;
const WORD: usize = 4;
const HEADER_LEN: usize = 5 * WORD;
const FOOTER_LEN: usize = WORD;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Internal system IO error")]
    Io(#[from] std::io::Error),
    #[error("Description has no usable `{0}` field on its root device")]
    Description(&'static str),
    #[error("Failed to pack or unpack an SRP word")]
    Packing(#[from] PackingError),
    #[error("Response frame of {0} bytes is too short")]
    Incomplete(usize),
    #[error("Response doesn't match the request ({0})")]
    Mismatch(&'static str),
    #[error("Bus responded with an error: {0:?}")]
    Bus(Footer),
    #[error("Unaligned write of {len} bytes at {addr:#x}")]
    Unaligned { addr: u64, len: usize },
    #[error("Retry count exceeded")]
    Timeout,
}

#[derive(PrimitiveEnum_u8, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Opcode {
    NonPostedRead = 0,
    NonPostedWrite = 1,
    PostedWrite = 2,
    Null = 3,
}

/// The first header word. Bit ranges are msb0, so bit `n` here is bit `31 - n` of the word.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "4")]
pub struct Command {
    #[packed_field(bits = "0..=7")]
    pub timeout: u8,
    #[packed_field(bits = "17")]
    pub ignore_mem_resp: bool,
    #[packed_field(bits = "22..=23", ty = "enum")]
    pub opcode: Opcode,
    #[packed_field(bits = "24..=31")]
    pub version: u8,
}

/// The status word that ends every response, all zero on success
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "4")]
pub struct Footer {
    #[packed_field(bits = "19")]
    pub request_size_error: bool,
    #[packed_field(bits = "20")]
    pub version_mismatch: bool,
    #[packed_field(bits = "21")]
    pub frame_error: bool,
    #[packed_field(bits = "22")]
    pub eofe: bool,
    #[packed_field(bits = "23")]
    pub timeout: bool,
    #[packed_field(bits = "24..=31")]
    pub mem_resp: u8,
}

/// Fetch the little-endian word at word index `idx`, which the caller has bounds checked
fn le_word(bytes: &[u8], idx: usize) -> u32 {
    let i = idx * WORD;
    u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
}

/// Packed structs are laid out as big-endian words, the wire is little-endian
fn pack_word<P>(word: &P) -> Result<u32, PackingError>
where
    P: PackedStruct<ByteArray = [u8; 4]>,
{
    Ok(u32::from_be_bytes(word.pack()?))
}

fn unpack_word<P>(word: u32) -> Result<P, PackingError>
where
    P: PackedStruct<ByteArray = [u8; 4]>,
{
    P::unpack(&word.to_be_bytes())
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Header {
    pub opcode: Opcode,
    pub tid: u32,
    pub addr: u64,
    /// Number of bytes in the transaction, always a multiple of the word size
    pub size: u32,
}

impl Header {
    fn pack(&self) -> Result<Vec<u8>, Error> {
        let command = pack_word(&Command {
            timeout: BUS_TIMEOUT,
            ignore_mem_resp: false,
            opcode: self.opcode,
            version: VERSION,
        })?;
        // Truncation splits the address into its two halves
        #[allow(clippy::cast_possible_truncation)]
        let words = [
            command,
            self.tid,
            self.addr as u32,
            (self.addr >> 32) as u32,
            self.size - 1,
        ];
        Ok(words.iter().flat_map(|w| w.to_le_bytes()).collect())
    }

    fn unpack(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Incomplete(bytes.len()));
        }
        let command: Command = unpack_word(le_word(bytes, 0))?;
        if command.version != VERSION {
            return Err(Error::Mismatch("version"));
        }
        Ok(Self {
            opcode: command.opcode,
            tid: le_word(bytes, 1),
            addr: u64::from(le_word(bytes, 2)) | (u64::from(le_word(bytes, 3)) << 32),
            size: le_word(bytes, 4).wrapping_add(1),
        })
    }
}

/// Validate a response frame against the `request` that provoked it, returning the data it
/// carries. Returns `None` for a stale response to an earlier transaction.
fn check_response(request: &Header, frame: &[u8]) -> Result<Option<Vec<u8>>, Error> {
    let header = Header::unpack(frame)?;
    if header.tid != request.tid {
        debug!(
            expected = request.tid,
            got = header.tid,
            "Dropping stale SRP response"
        );
        return Ok(None);
    }
    if frame.len() < HEADER_LEN + FOOTER_LEN {
        return Err(Error::Incomplete(frame.len()));
    }
    if header.opcode != request.opcode {
        return Err(Error::Mismatch("opcode"));
    }
    if header.addr != request.addr {
        return Err(Error::Mismatch("address"));
    }
    if header.size != request.size {
        return Err(Error::Mismatch("size"));
    }
    let footer_start = frame.len() - FOOTER_LEN;
    let status = le_word(&frame[footer_start..], 0);
    if status != 0 {
        return Err(Error::Bus(unpack_word(status)?));
    }
    let data = &frame[HEADER_LEN..footer_start];
    if data.len() != request.size as usize {
        return Err(Error::Incomplete(frame.len()));
    }
    Ok(Some(data.to_vec()))
}

#[derive(Debug)]
/// An SRP connection (newtype for a [`UdpSocket`]) along with the registers it can reach
pub struct Srp {
    socket: UdpSocket,
    registers: RegisterMap,
    retries: usize,
    tid: u32,
}

impl Srp {
    /// Create and connect to an SRP transport
    /// # Errors
    /// Will return an error if the UDP socket fails to connect
    pub fn connect(host: SocketAddr, registers: RegisterMap) -> TransportResult<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(Error::from)?;
        // Set explicit nonblocking
        socket.set_nonblocking(false).map_err(Error::from)?;
        // Set a default timeout
        let timeout = Duration::from_secs_f32(DEFAULT_TIMEOUT);
        socket
            .set_write_timeout(Some(timeout))
            .map_err(Error::from)?;
        socket
            .set_read_timeout(Some(timeout))
            .map_err(Error::from)?;
        socket.connect(host).map_err(Error::from)?;
        debug!(%host, registers = registers.len(), "Connected SRP transport");
        Ok(Self {
            socket,
            registers,
            retries: DEFAULT_RETRIES,
            tid: 0,
        })
    }

    /// Connect to the device a description is rooted at, using its `ipAddr` and optional
    /// `srpPort` metadata
    /// # Errors
    /// Returns an error if the metadata is missing or invalid, or if the socket fails to connect
    pub fn from_description(desc: &Description) -> TransportResult<Self> {
        let ip: Ipv4Addr = desc
            .root_meta("ipAddr")
            .and_then(|ip| ip.parse().ok())
            .ok_or(Error::Description("ipAddr"))?;
        let port = match desc.root_meta("srpPort") {
            Some(port) => port.parse().map_err(|_| Error::Description("srpPort"))?,
            None => DEFAULT_PORT,
        };
        Self::connect(SocketAddr::from((ip, port)), register_map(desc))
    }

    /// Set the number of attempts made for each transaction, at least one
    pub fn set_retries(&mut self, retries: usize) {
        self.retries = retries.max(1);
    }

    fn next_tid(&mut self) -> u32 {
        self.tid = self.tid.wrapping_add(1);
        self.tid
    }

    /// Run a single transaction of `size` bytes at `addr`, retrying with backoff on timeouts
    fn transaction(
        &mut self,
        opcode: Opcode,
        addr: u64,
        size: usize,
        data: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let request = Header {
            opcode,
            tid: self.next_tid(),
            addr,
            size: u32::try_from(size).map_err(|_| Error::Unaligned { addr, len: size })?,
        };
        let mut frame = request.pack()?;
        frame.extend_from_slice(data);
        // Leave room for a word more than we expect so oversized responses are caught
        let mut buf = vec![0u8; HEADER_LEN + size + FOOTER_LEN + WORD];
        for retry_count in 0..self.retries {
            if retry_count > 0 {
                warn!(tid = request.tid, retry_count, "Retrying SRP transaction");
            }
            #[allow(clippy::cast_precision_loss)]
            std::thread::sleep(Duration::from_secs_f64(
                (2f64.powf(retry_count as f64) - 1f64) / 1000f64,
            ));
            match self.socket.send(&frame) {
                Ok(_) => {}
                Err(e) => match e.kind() {
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => continue,
                    _ => return Err(e.into()),
                },
            }
            loop {
                match self.socket.recv(&mut buf) {
                    Ok(nbytes) => {
                        if let Some(data) = check_response(&request, &buf[..nbytes])? {
                            return Ok(data);
                        }
                    }
                    Err(e) => match e.kind() {
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => break,
                        _ => return Err(e.into()),
                    },
                }
            }
        }
        Err(Error::Timeout)
    }
}

impl Transport for Srp {
    fn read_n_bytes(
        &mut self,
        register: &str,
        offset: usize,
        n: usize,
    ) -> TransportResult<Vec<u8>> {
        let reg = lookup(&self.registers, register, offset, n)?;
        if n == 0 {
            return Ok(vec![]);
        }
        let addr = reg.addr + offset as u64;
        // Widen the read to whole words and cut the requested bytes back out
        let start = addr & !(WORD as u64 - 1);
        let lead = (addr - start) as usize;
        let size = (lead + n).div_ceil(WORD) * WORD;
        let data = self.transaction(Opcode::NonPostedRead, start, size, &[])?;
        Ok(data[lead..lead + n].to_vec())
    }

    fn write_bytes(&mut self, register: &str, offset: usize, data: &[u8]) -> TransportResult<()> {
        let reg = lookup(&self.registers, register, offset, data.len())?;
        let addr = reg.addr + offset as u64;
        if addr % WORD as u64 != 0 || data.len() % WORD != 0 || data.is_empty() {
            return Err(Error::Unaligned {
                addr,
                len: data.len(),
            }
            .into());
        }
        self.transaction(Opcode::NonPostedWrite, addr, data.len(), data)?;
        Ok(())
    }

    fn listdev(&mut self) -> TransportResult<RegisterMap> {
        Ok(self.registers.clone())
    }
}
