//! The core types for locating registers on the FPGA bus
use kstring::KString;
use rtm_utils::description::Description;
use std::collections::HashMap;

pub use rtm_utils::description::Access;

/// The representation of an internal register
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Register {
    /// The address in FPGA memory of this register
    pub addr: u64,
    /// The number of bytes stored at this location
    pub length: usize,
    /// Whether client applications may write this register
    pub access: Access,
}

/// The mapping from register paths and their data (address, size and access)
pub type RegisterMap = HashMap<KString, Register>;

/// Collect every register below the root of a loaded description, keyed by its path relative to
/// the root
#[must_use]
pub fn register_map(desc: &Description) -> RegisterMap {
    desc.registers()
        .map(|(name, reg)| {
            (
                name.clone(),
                Register {
                    addr: reg.addr,
                    length: reg.size as usize,
                    access: reg.access,
                },
            )
        })
        .collect()
}
