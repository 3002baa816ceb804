//! 128-bit GUIDs in registry (string) and wire (packed) form.

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use crate::error::{FdsError, Result};

/// Size of a packed GUID on the wire.
pub const GUID_SIZE: usize = 16;

/// A GUID split the way the firmware wire format stores it: `data1..data3`
/// little-endian, `data4` as literal bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid {
    data1: u32,
    data2: u16,
    data3: u16,
    data4: [u8; 8],
}

impl Guid {
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Guid {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// Parse `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let groups: Vec<&str> = s.split('-').collect();
        if groups.len() != 5 {
            return Err(FdsError::format(format!(
                "GUID '{}' must have 5 dash-separated groups, found {}",
                s,
                groups.len()
            )));
        }
        const WIDTHS: [usize; 5] = [8, 4, 4, 4, 12];
        for (group, width) in groups.iter().zip(WIDTHS) {
            if group.len() != width || !group.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(FdsError::format(format!(
                    "GUID '{}' has malformed group '{}' (expected {} hex digits)",
                    s, group, width
                )));
            }
        }

        let hex = |g: &str| u32::from_str_radix(g, 16).map_err(|e| FdsError::format(e.to_string()));
        let data1 = hex(groups[0])?;
        let data2 = hex(groups[1])? as u16;
        let data3 = hex(groups[2])? as u16;

        let mut data4 = [0u8; 8];
        let tail = format!("{}{}", groups[3], groups[4]);
        for (i, byte) in data4.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&tail[i * 2..i * 2 + 2], 16)
                .map_err(|e| FdsError::format(e.to_string()))?;
        }
        Ok(Guid::new(data1, data2, data3, data4))
    }

    pub fn to_bytes(&self) -> [u8; GUID_SIZE] {
        let mut out = [0u8; GUID_SIZE];
        LittleEndian::write_u32(&mut out[0..4], self.data1);
        LittleEndian::write_u16(&mut out[4..6], self.data2);
        LittleEndian::write_u16(&mut out[6..8], self.data3);
        out[8..].copy_from_slice(&self.data4);
        out
    }

    pub fn from_bytes(bytes: &[u8; GUID_SIZE]) -> Self {
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(&bytes[8..]);
        Guid::new(
            LittleEndian::read_u32(&bytes[0..4]),
            LittleEndian::read_u16(&bytes[4..6]),
            LittleEndian::read_u16(&bytes[6..8]),
            data4,
        )
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let data1 = r.read_u32::<LittleEndian>()?;
        let data2 = r.read_u16::<LittleEndian>()?;
        let data3 = r.read_u16::<LittleEndian>()?;
        let mut data4 = [0u8; 8];
        r.read_exact(&mut data4)?;
        Ok(Guid::new(data1, data2, data3, data4))
    }
}

impl FromStr for Guid {
    type Err = FdsError;

    fn from_str(s: &str) -> Result<Self> {
        Guid::parse(s)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:04X}-{:012X}",
            self.data1,
            self.data2,
            self.data3,
            BigEndian::read_u16(&self.data4[0..2]),
            BigEndian::read_u48(&self.data4[2..8]),
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
