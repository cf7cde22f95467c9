//! Defines the transport mechanisms the register bus can reach the FPGA through

pub mod mock;
pub mod srp;

use crate::core::{
    Register,
    RegisterMap,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Requested register doesn't exist - `{0}`")]
    MissingRegister(String),
    #[error("Access of {len} bytes at offset {offset} runs past the end of `{register}`")]
    OutOfBounds {
        register: String,
        offset: usize,
        len: usize,
    },
    #[error("Error from the SRP transport")]
    Srp(#[from] srp::Error),
}

pub type TransportResult<T> = Result<T, Error>;

/// The trait that is implemented for register transport mechanisms.
/// The methods of this trait *assume* that the device is already connected.
pub trait Transport {
    /// Read `n` bytes from `register` from byte offset `offset`
    /// # Errors
    /// Returns an error if the register doesn't exist, the access runs past its end, or the
    /// transaction itself fails
    fn read_n_bytes(&mut self, register: &str, offset: usize, n: usize)
        -> TransportResult<Vec<u8>>;

    /// Write `data` to `register` from byte offset `offset`
    /// # Errors
    /// Returns an error if the register doesn't exist, the access runs past its end, or the
    /// transaction itself fails
    fn write_bytes(&mut self, register: &str, offset: usize, data: &[u8]) -> TransportResult<()>;

    /// Retrieve the registers that are reachable through this transport
    /// # Errors
    /// Returns an error if the register map can't be retrieved
    fn listdev(&mut self) -> TransportResult<RegisterMap>;
}

/// Look up `register` and make sure an access of `len` bytes at `offset` stays inside of it
pub(crate) fn lookup<'a>(
    registers: &'a RegisterMap,
    register: &str,
    offset: usize,
    len: usize,
) -> TransportResult<&'a Register> {
    let reg = registers
        .get(register)
        .ok_or_else(|| Error::MissingRegister(register.to_owned()))?;
    match offset.checked_add(len) {
        Some(end) if end <= reg.length => Ok(reg),
        _ => Err(Error::OutOfBounds {
            register: register.to_owned(),
            offset,
            len,
        }),
    }
}
