//! Named scalar endpoints on the register bus, and the bus of the six RTM test registers

use crate::{
    core::{
        Access,
        RegisterMap,
    },
    transport::{
        self,
        Transport,
    },
};
use std::sync::{
    Arc,
    Mutex,
    Weak,
};
use thiserror::Error;
use tracing::trace;

/// Timing receiver clock select, 0 for LCLS-I and 1 for LCLS-II
pub const CLOCK_SELECT: &str = "mmio/AmcCarrierCore/AmcCarrierTiming/TimingFrameRx/ClkSel";
/// Nonzero while the timing receiver is locked
pub const LINK_UP: &str = "mmio/AmcCarrierCore/AmcCarrierTiming/TimingFrameRx/RxLinkUp";
/// Crossbar routing of the timing signal into the receiver
pub const OUTPUT_CONFIG: &str = "mmio/AmcCarrierCore/AxiSy56040/OutputConfig[1]";
/// The word driven onto the RTM digital outputs
pub const OUTPUT_BITS: &str = "mmio/AppTop/AppCore/MpsLinkNodeCore/MpsDigitalMessage/OutputBits";
/// Independent read-back of the RTM digital outputs
pub const OUTPUT_READBACK: &str = "mmio/AppTop/AppCore/RtmMpsLinkNode/RtmDout";
/// The word observed on the RTM digital inputs
pub const INPUTS: &str = "mmio/AppTop/AppCore/RtmMpsLinkNode/RtmDin";

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] transport::Error),
    #[error("Register `{0}` couldn't be resolved")]
    Unresolved(String),
    #[error("Register `{0}` is read-only")]
    ReadOnly(String),
    #[error("Register `{name}` is {length} bytes wide, scalars are 1 to 8 bytes")]
    Width { name: String, length: usize },
    #[error("Value {value:#x} doesn't fit the {length} byte register `{name}`")]
    Overflow {
        name: String,
        value: u64,
        length: usize,
    },
    #[error("The transport has been dropped")]
    Disconnected,
    #[error("The transport lock is poisoned")]
    Poisoned,
}

/// An unsigned scalar register, stored little-endian in 1 to 8 bytes
#[derive(Debug)]
pub struct ScalVal<T> {
    /// Upwards pointer to the bus' transport
    transport: Weak<Mutex<T>>,
    /// The path of the register
    name: String,
    /// Width in bytes
    length: usize,
    /// Access this endpoint was opened with
    access: Access,
}

impl<T> ScalVal<T>
where
    T: Transport,
{
    /// Resolve the register at `path`, opening it with `access`. Opening a read-only register for
    /// writing fails here rather than at the first write.
    /// # Errors
    /// Returns an error if the register isn't in `registers`, isn't writable when `access`
    /// requires it, or has an unsupported width
    pub fn resolve(
        transport: &Arc<Mutex<T>>,
        registers: &RegisterMap,
        path: &str,
        access: Access,
    ) -> Result<Self, Error> {
        let reg = registers
            .get(path)
            .ok_or_else(|| Error::Unresolved(path.to_owned()))?;
        if access == Access::ReadWrite && reg.access == Access::ReadOnly {
            return Err(Error::ReadOnly(path.to_owned()));
        }
        if !(1..=8).contains(&reg.length) {
            return Err(Error::Width {
                name: path.to_owned(),
                length: reg.length,
            });
        }
        Ok(Self {
            transport: Arc::downgrade(transport),
            name: path.to_owned(),
            length: reg.length,
            access,
        })
    }

    #[must_use]
    pub fn access(&self) -> Access {
        self.access
    }

    fn with_transport<R, F>(&self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut T) -> transport::TransportResult<R>,
    {
        let tarc = self.transport.upgrade().ok_or(Error::Disconnected)?;
        let mut transport = tarc.lock().map_err(|_| Error::Poisoned)?;
        Ok(f(&mut *transport)?)
    }

    /// Read the current value
    /// # Errors
    /// Returns an error on transport failures
    pub fn read(&self) -> Result<u64, Error> {
        let bytes = self.with_transport(|t| t.read_n_bytes(&self.name, 0, self.length))?;
        let mut word = [0u8; 8];
        word[..bytes.len()].copy_from_slice(&bytes);
        let value = u64::from_le_bytes(word);
        trace!(register = self.name.as_str(), value, "Read");
        Ok(value)
    }

    /// Write `value`
    /// # Errors
    /// Returns an error if the endpoint is read-only, `value` is too wide, or on transport failures
    pub fn write(&self, value: u64) -> Result<(), Error> {
        if self.access == Access::ReadOnly {
            return Err(Error::ReadOnly(self.name.clone()));
        }
        if self.length < 8 && value >> (8 * self.length) != 0 {
            return Err(Error::Overflow {
                name: self.name.clone(),
                value,
                length: self.length,
            });
        }
        trace!(register = self.name.as_str(), value, "Write");
        let bytes = value.to_le_bytes();
        self.with_transport(|t| t.write_bytes(&self.name, 0, &bytes[..self.length]))
    }
}

/// The registers the RTM tests need, resolved once when the bus is created
#[derive(Debug)]
pub struct RegisterBus<T> {
    transport: Arc<Mutex<T>>,
    pub clock_select: ScalVal<T>,
    pub link_up: ScalVal<T>,
    pub output_config: ScalVal<T>,
    pub output_bits: ScalVal<T>,
    pub output_readback: ScalVal<T>,
    pub inputs: ScalVal<T>,
}

impl<T> RegisterBus<T>
where
    T: Transport,
{
    /// Take ownership of `transport` and resolve every endpoint through it
    /// # Errors
    /// Returns an error if the register list can't be retrieved or any endpoint fails to resolve
    pub fn new(transport: T) -> Result<Self, Error> {
        let transport = Arc::new(Mutex::new(transport));
        let registers = transport.lock().map_err(|_| Error::Poisoned)?.listdev()?;
        let rw = |path: &str| ScalVal::resolve(&transport, &registers, path, Access::ReadWrite);
        let ro = |path: &str| ScalVal::resolve(&transport, &registers, path, Access::ReadOnly);
        Ok(Self {
            clock_select: rw(CLOCK_SELECT)?,
            link_up: ro(LINK_UP)?,
            output_config: rw(OUTPUT_CONFIG)?,
            output_bits: rw(OUTPUT_BITS)?,
            output_readback: ro(OUTPUT_READBACK)?,
            inputs: ro(INPUTS)?,
            transport,
        })
    }

    /// The shared transport behind every endpoint
    #[must_use]
    pub fn transport(&self) -> &Arc<Mutex<T>> {
        &self.transport
    }
}


#[cfg(test)]
mod tests {
    use super::{
        fixtures::*,
        *,
    };
    use crate::{
        core::Register,
        transport::mock::Mock,
    };
    use paste::paste;
    use std::collections::HashMap;

    fn scalar(length: usize, access: Access) -> (Arc<Mutex<Mock>>, ScalVal<Mock>) {
        let registers = HashMap::from([(
            "mmio/Scalar".into(),
            Register {
                addr: 0x10,
                length,
                access,
            },
        )]);
        let transport = Arc::new(Mutex::new(Mock::new(registers.clone())));
        let val = ScalVal::resolve(&transport, &registers, "mmio/Scalar", access).unwrap();
        (transport, val)
    }

    macro_rules! test_rw_width {
        ($width:literal, $v:literal) => {
            paste! {
                #[test]
                fn [<test_rw_width_$width>]() {
                    let (_transport, val) = scalar($width, Access::ReadWrite);
                    val.write($v).unwrap();
                    assert_eq!(val.read().unwrap(), $v);
                }
            }
        };
    }

    test_rw_width!(1, 0xAB);
    test_rw_width!(2, 0xABCD);
    test_rw_width!(4, 0xDEAD_BEEF);
    test_rw_width!(8, 0xFFFF_FFFF_FFFF_FFFF);

    #[test]
    fn test_little_endian() {
        let (transport, val) = scalar(4, Access::ReadWrite);
        val.write(0x0102_0304).unwrap();
        let bytes = transport
            .lock()
            .unwrap()
            .read_n_bytes("mmio/Scalar", 0, 4)
            .unwrap();
        assert_eq!(bytes, [4, 3, 2, 1]);
    }

    #[test]
    fn test_overflow() {
        let (_transport, val) = scalar(1, Access::ReadWrite);
        assert!(matches!(
            val.write(256),
            Err(Error::Overflow { value: 256, length: 1, .. })
        ));
    }

    #[test]
    fn test_write_read_only() {
        let (_transport, val) = scalar(4, Access::ReadOnly);
        assert!(matches!(val.write(1), Err(Error::ReadOnly(_))));
        assert_eq!(val.read().unwrap(), 0);
    }

    #[test]
    fn test_disconnected() {
        let (transport, val) = scalar(4, Access::ReadWrite);
        drop(transport);
        assert!(matches!(val.read(), Err(Error::Disconnected)));
    }

    #[test]
    fn test_bad_width() {
        let registers = HashMap::from([(
            "mmio/Wide".into(),
            Register {
                addr: 0,
                length: 16,
                access: Access::ReadOnly,
            },
        )]);
        let transport = Arc::new(Mutex::new(Mock::new(registers.clone())));
        assert!(matches!(
            ScalVal::resolve(&transport, &registers, "mmio/Wide", Access::ReadOnly),
            Err(Error::Width { length: 16, .. })
        ));
    }

    #[test]
    fn test_bus_resolves() {
        let bus = RegisterBus::new(rtm_mock()).unwrap();
        assert_eq!(bus.inputs.access(), Access::ReadOnly);
        assert_eq!(bus.output_bits.access(), Access::ReadWrite);
        bus.output_bits.write(0x5A).unwrap();
        assert_eq!(bus.output_readback.read().unwrap(), 0x5A);
    }

    #[test]
    fn test_bus_missing_register() {
        let mut registers = rtm_registers(4);
        registers.remove(LINK_UP);
        assert!(matches!(
            RegisterBus::new(Mock::new(registers)),
            Err(Error::Unresolved(name)) if name == LINK_UP
        ));
    }

    #[test]
    fn test_bus_read_only_where_writable_needed() {
        let mut registers = rtm_registers(4);
        if let Some(reg) = registers.get_mut(CLOCK_SELECT) {
            reg.access = Access::ReadOnly;
        }
        assert!(matches!(
            RegisterBus::new(Mock::new(registers)),
            Err(Error::ReadOnly(name)) if name == CLOCK_SELECT
        ));
    }
}
