//! Mock transport implementations used in testing the interface

use super::{
    lookup,
    Transport,
    TransportResult,
};
use crate::core::{
    Register,
    RegisterMap,
};
use kstring::KString;
use std::collections::HashMap;
use tracing::trace;

/// A platform that mocks reads and writes, useful for testing
#[derive(Debug)]
pub struct Mock {
    memory: HashMap<u64, u8>,
    registers: RegisterMap,
    mirrors: HashMap<KString, KString>,
}

impl Mock {
    /// Construct a new mock platform by providing a register map `registers`
    #[must_use]
    pub fn new(registers: RegisterMap) -> Self {
        // Each address is represented lazily instead of as a dense array
        let mut memory: HashMap<u64, u8> = HashMap::default();
        for Register { addr, length, .. } in registers.values() {
            for i in 0..*length as u64 {
                memory.insert(addr + i, 0u8);
            }
        }
        Self {
            memory,
            registers,
            mirrors: HashMap::new(),
        }
    }

    /// Copy every write to `source` into `dest` as well, the way a hardware read-back path would
    pub fn mirror(&mut self, source: &str, dest: &str) {
        self.mirrors
            .insert(KString::from_ref(source), KString::from_ref(dest));
    }

    fn store(&mut self, register: &str, offset: usize, data: &[u8]) -> TransportResult<()> {
        let reg = lookup(&self.registers, register, offset, data.len())?;
        let base = reg.addr + offset as u64;
        for (addr, byte) in (base..).zip(data) {
            self.memory.insert(addr, *byte);
        }
        Ok(())
    }
}

impl Transport for Mock {
    fn read_n_bytes(
        &mut self,
        register: &str,
        offset: usize,
        n: usize,
    ) -> TransportResult<Vec<u8>> {
        let reg = lookup(&self.registers, register, offset, n)?;
        let base = reg.addr + offset as u64;
        Ok((base..base + n as u64)
            .map(|addr| self.memory.get(&addr).copied().unwrap_or_default())
            .collect())
    }

    fn write_bytes(&mut self, register: &str, offset: usize, data: &[u8]) -> TransportResult<()> {
        self.store(register, offset, data)?;
        if let Some(dest) = self.mirrors.get(register).cloned() {
            trace!(register, mirror = dest.as_str(), "Mirroring mock write");
            self.store(&dest, offset, data)?;
        }
        Ok(())
    }

    fn listdev(&mut self) -> TransportResult<RegisterMap> {
        Ok(self.registers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::Access,
        transport::Error,
    };

    fn scratchpad() -> Mock {
        Mock::new(HashMap::from([
            (
                "scratchpad".into(),
                Register {
                    addr: 0,
                    length: 4,
                    access: Access::ReadWrite,
                },
            ),
            (
                "readback".into(),
                Register {
                    addr: 4,
                    length: 4,
                    access: Access::ReadOnly,
                },
            ),
        ]))
    }

    #[test]
    fn test_read() {
        let mut transport = scratchpad();
        let bytes = transport.read_n_bytes("scratchpad", 0, 4).unwrap();
        assert_eq!(bytes, [0, 0, 0, 0]);
    }

    #[test]
    fn test_read_offset() {
        let mut transport = scratchpad();
        let bytes = transport.read_n_bytes("scratchpad", 2, 2).unwrap();
        assert_eq!(bytes, [0, 0]);
    }

    #[test]
    fn test_write_read() {
        let mut transport = scratchpad();
        transport
            .write_bytes("scratchpad", 0, &[0xDE, 0xAD, 0xBE, 0xEF])
            .unwrap();
        let bytes = transport.read_n_bytes("scratchpad", 0, 4).unwrap();
        assert_eq!(bytes, [0xDE, 0xAD, 0xBE, 0xEF]);
        // Neighbouring registers are untouched
        let bytes = transport.read_n_bytes("readback", 0, 4).unwrap();
        assert_eq!(bytes, [0, 0, 0, 0]);
    }

    #[test]
    fn test_write_read_offset() {
        let mut transport = scratchpad();
        transport.write_bytes("scratchpad", 2, &[0xBE, 0xEF]).unwrap();
        let bytes = transport.read_n_bytes("scratchpad", 0, 4).unwrap();
        assert_eq!(bytes, [0, 0, 0xBE, 0xEF]);
    }

    #[test]
    fn test_missing_register() {
        let mut transport = scratchpad();
        assert!(matches!(
            transport.read_n_bytes("nope", 0, 4),
            Err(Error::MissingRegister(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_out_of_bounds() {
        let mut transport = scratchpad();
        assert!(matches!(
            transport.write_bytes("scratchpad", 2, &[1, 2, 3]),
            Err(Error::OutOfBounds { offset: 2, len: 3, .. })
        ));
        assert!(matches!(
            transport.read_n_bytes("scratchpad", usize::MAX, 2),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_mirror() {
        let mut transport = scratchpad();
        transport.mirror("scratchpad", "readback");
        transport.write_bytes("scratchpad", 0, &[5, 0, 0, 0]).unwrap();
        let bytes = transport.read_n_bytes("readback", 0, 4).unwrap();
        assert_eq!(bytes, [5, 0, 0, 0]);
    }
}
