//! The line-oriented register description file format.
//!
//! A file starts with `#!/bin/rtmdesc`, lists registers and metadata (in any order) and ends with
//! `?quit`:
//! ```text
//! #!/bin/rtmdesc
//! ?register	NetIODev/mmio/AppTop/AppCore/RtmMpsLinkNode/RtmDin	0x0a000104	0x4	ro
//! ?meta	NetIODev	ipAddr	10.0.1.102
//! ?quit
//! ```
//! Paths are hierarchical, `/` separated, and start with the name of the root device they belong
//! to.
use super::{
    select_root,
    Access,
    Description,
    Error,
    Nodes,
    ParseError,
    Register,
};
use kstring::KString;
use nom::{
    branch::alt,
    bytes::complete::{
        tag,
        take_till,
    },
    character::{
        complete::{
            hex_digit1,
            line_ending,
            not_line_ending,
            space1,
        },
        is_space,
    },
    combinator::{
        map,
        map_res,
        value,
    },
    multi::many0,
    sequence::{
        preceded,
        terminated,
    },
    IResult,
};
use std::{
    io::Read,
    path::Path,
    str::from_utf8,
};

enum Line<'a> {
    Register(&'a str, Register),
    Meta(&'a str, &'a str, &'a str),
}

fn shebang(input: &[u8]) -> IResult<&[u8], &[u8]> {
    terminated(tag("#!/bin/rtmdesc"), line_ending)(input)
}

fn from_hex(input: &[u8]) -> Result<u64, ParseError> {
    let in_str = from_utf8(input)?;
    let num = u64::from_str_radix(in_str, 16)?;
    Ok(num)
}

fn hex_number(input: &[u8]) -> IResult<&[u8], u64> {
    map_res(preceded(tag("0x"), hex_digit1), from_hex)(input)
}

fn utf8_string(input: &[u8]) -> Result<&str, ParseError> {
    let in_str = from_utf8(input)?;
    Ok(in_str)
}

fn word(input: &[u8]) -> IResult<&[u8], &str> {
    map_res(preceded(space1, take_till(is_space)), utf8_string)(input)
}

fn access(input: &[u8]) -> IResult<&[u8], Access> {
    alt((
        value(Access::ReadOnly, tag("ro")),
        value(Access::ReadWrite, tag("rw")),
    ))(input)
}

fn register(input: &[u8]) -> IResult<&[u8], (&str, Register)> {
    let (remaining, _) = tag("?register")(input)?;
    let (remaining, name) = word(remaining)?;
    let (remaining, addr) = preceded(space1, hex_number)(remaining)?;
    let (remaining, size) = map_res(preceded(space1, hex_number), u32::try_from)(remaining)?;
    let (remaining, access) = terminated(preceded(space1, access), line_ending)(remaining)?;
    Ok((remaining, (name, Register { addr, size, access })))
}

type Metadata<'a> = (&'a str, &'a str, &'a str);

fn meta(input: &[u8]) -> IResult<&[u8], Metadata> {
    let (remaining, _) = tag("?meta")(input)?;
    let (remaining, node) = word(remaining)?;
    let (remaining, meta_key) = word(remaining)?;
    let (remaining, meta_value) = map_res(
        preceded(space1, terminated(not_line_ending, line_ending)),
        utf8_string,
    )(remaining)?;
    Ok((remaining, (node, meta_key, meta_value.trim_end())))
}

fn line(input: &[u8]) -> IResult<&[u8], Line> {
    alt((
        map(register, |(name, reg)| Line::Register(name, reg)),
        map(meta, |(node, k, v)| Line::Meta(node, k, v)),
    ))(input)
}

fn quit(input: &[u8]) -> IResult<&[u8], &[u8]> {
    terminated(tag("?quit"), line_ending)(input)
}

pub(crate) fn description_file(input: &[u8]) -> IResult<&[u8], Nodes> {
    let (remaining, _) = shebang(input)?;
    let (remaining, lines) = many0(line)(remaining)?;
    let (remaining, _) = quit(remaining)?;

    let mut nodes: Nodes = Nodes::new();
    for line in lines {
        match line {
            Line::Register(name, reg) => {
                nodes.entry(KString::from_ref(name)).or_default().register = Some(reg);
            }
            Line::Meta(node, k, v) => {
                nodes
                    .entry(KString::from_ref(node))
                    .or_default()
                    .add_meta(KString::from_ref(k), v.to_owned());
            }
        }
    }
    Ok((remaining, nodes))
}

/// Reads a register description file and narrows it to the device named `root_name`
/// # Errors
/// Returns an error on IO errors, invalid files, or if `root_name` isn't described
pub fn read_description_file<T>(filename: T, root_name: &str) -> Result<Description, Error>
where
    T: AsRef<Path>,
{
    let mut file = std::fs::File::open(filename.as_ref())?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;

    let (_, nodes) = description_file(&contents).map_err(|_| Error::ParseMatch)?;
    let fname = filename
        .as_ref()
        .file_name()
        .map(ToOwned::to_owned)
        .unwrap_or_default();
    select_root(nodes, root_name, fname)
}
