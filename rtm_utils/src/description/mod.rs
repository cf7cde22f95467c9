//! Register descriptions of a loaded design, rooted at one named device

use kstring::KString;
use std::{
    collections::HashMap,
    ffi::OsString,
    net::Ipv4Addr,
    path::Path,
};
use thiserror::Error;

pub mod file;

pub use file::read_description_file;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Parsing failed to match the grammar")]
    ParseMatch,
    #[error("Root device `{0}` is not part of the description")]
    MissingRoot(String),
    #[error("Root device has no `{0}` field to override")]
    MissingField(&'static str),
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid UTF8 while parsing a string")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("Invalid integer")]
    Integer(#[from] std::num::ParseIntError),
}

/// Whether client applications may write a register
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
/// A register on the FPGA bus described by its 64-bit address, size in bytes and access mode
pub struct Register {
    pub addr: u64,
    pub size: u32,
    pub access: Access,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
/// A node of the device hierarchy, with its potential register and any (String,String) metadata
pub struct Node {
    pub register: Option<Register>,
    pub metadata: HashMap<KString, String>,
}

impl Node {
    fn add_meta(&mut self, k: KString, v: String) {
        self.metadata.insert(k, v);
    }
}

/// A map from hierarchical node path to [`Node`]
pub type Nodes = HashMap<KString, Node>;

/// A description that has been narrowed to a single root device. Node paths are relative to that
/// root, e.g. `mmio/AppTop/AppCore/RtmMpsLinkNode/RtmDin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    pub root_name: KString,
    pub root: Node,
    pub nodes: Nodes,
    pub filename: OsString,
}

impl Description {
    /// Look up a node by its path relative to the root
    #[must_use]
    pub fn find_by_name(&self, path: &str) -> Option<&Node> {
        self.nodes.get(path)
    }

    /// Iterate over every node that is backed by a register
    pub fn registers(&self) -> impl Iterator<Item = (&KString, &Register)> {
        self.nodes
            .iter()
            .filter_map(|(name, node)| node.register.as_ref().map(|reg| (name, reg)))
    }

    /// Get a metadata field of the root device
    #[must_use]
    pub fn root_meta(&self, key: &str) -> Option<&str> {
        self.root.metadata.get(key).map(String::as_str)
    }
}

/// A hook that is allowed to rewrite the description after it is loaded, but before any register
/// is resolved from it
pub trait Fixup {
    /// Apply the fixup to the root device and its children
    /// # Errors
    /// Returns an error if the field this fixup targets doesn't exist
    fn fixup(&self, root: &mut Node, nodes: &mut Nodes) -> Result<(), Error>;
}

/// Overrides the `ipAddr` field of the root device with an address only known at runtime
#[derive(Debug, Copy, Clone)]
pub struct IpAddrFixup {
    pub ip_addr: Ipv4Addr,
}

impl IpAddrFixup {
    pub const FIELD: &'static str = "ipAddr";

    #[must_use]
    pub fn new(ip_addr: Ipv4Addr) -> Self {
        Self { ip_addr }
    }
}

impl Fixup for IpAddrFixup {
    fn fixup(&self, root: &mut Node, _nodes: &mut Nodes) -> Result<(), Error> {
        let field = root
            .metadata
            .get_mut(Self::FIELD)
            .ok_or(Error::MissingField(Self::FIELD))?;
        *field = self.ip_addr.to_string();
        Ok(())
    }
}

/// Split a full set of nodes into the root named `root_name` and its children, re-keyed relative
/// to the root. Nodes that belong to other roots are dropped.
pub(crate) fn select_root(
    mut nodes: Nodes,
    root_name: &str,
    filename: OsString,
) -> Result<Description, Error> {
    let root = nodes
        .remove(root_name)
        .ok_or_else(|| Error::MissingRoot(root_name.to_owned()))?;
    let prefix = format!("{root_name}/");
    let nodes = nodes
        .into_iter()
        .filter_map(|(path, node)| {
            path.strip_prefix(prefix.as_str())
                .map(|rel| (KString::from_ref(rel), node))
        })
        .collect();
    Ok(Description {
        root_name: KString::from_ref(root_name),
        root,
        nodes,
        filename,
    })
}

/// Load a description file, select `root_name` as the root device and run the optional `fixup`
/// # Errors
/// Returns an error on IO errors, invalid files, a missing root or a failing fixup
pub fn load_description<P>(
    filename: P,
    root_name: &str,
    fixup: Option<&dyn Fixup>,
) -> Result<Description, Error>
where
    P: AsRef<Path>,
{
    let mut desc = read_description_file(filename, root_name)?;
    if let Some(fixup) = fixup {
        fixup.fixup(&mut desc.root, &mut desc.nodes)?;
    }
    Ok(desc)
}
