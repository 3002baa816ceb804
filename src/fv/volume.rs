//! Parsed description of a firmware volume and the flash layout around it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{FdsError, Result};
use crate::ffs::{AprioriGenerator, FfsGenerator};

/// Erase polarity of the flash part: the value of an erased bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErasePolarity {
    Zero,
    #[default]
    One,
}

impl FromStr for ErasePolarity {
    type Err = FdsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "0" => Ok(ErasePolarity::Zero),
            "1" => Ok(ErasePolarity::One),
            other => Err(FdsError::format(format!(
                "erase polarity must be '0' or '1', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ErasePolarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErasePolarity::Zero => write!(f, "0"),
            ErasePolarity::One => write!(f, "1"),
        }
    }
}

/// One `BlockSize`/`NumBlocks` pair. Either half may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockSizeEntry {
    pub block_size: Option<u64>,
    pub num_blocks: Option<u64>,
}

impl BlockSizeEntry {
    pub fn new(block_size: u64, num_blocks: u64) -> Self {
        Self {
            block_size: Some(block_size),
            num_blocks: Some(num_blocks),
        }
    }
}

/// Payload source of an extension-header entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtEntryKind {
    /// Contents of a file, absolute or relative to the workspace.
    File(PathBuf),
    /// Literal bytes.
    Data(Vec<u8>),
}

/// A typed entry of the volume extension header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtEntry {
    pub type_code: u16,
    pub kind: ExtEntryKind,
}

impl ExtEntry {
    pub fn file(type_code: u16, path: impl Into<PathBuf>) -> Self {
        Self {
            type_code,
            kind: ExtEntryKind::File(path.into()),
        }
    }

    pub fn data(type_code: u16, bytes: Vec<u8>) -> Self {
        Self {
            type_code,
            kind: ExtEntryKind::Data(bytes),
        }
    }

    /// Build a DATA entry from a `"01,02,0x3"` style byte list.
    pub fn data_from_hex(type_code: u16, list: &str) -> Result<Self> {
        Ok(Self::data(type_code, parse_hex_bytes(list)?))
    }

    /// Build an entry from the flash description's three parallel tokens
    /// (`FILE`/`DATA`, hex type value, data).
    pub fn from_tokens(kind: &str, type_value: &str, data: &str) -> Result<Self> {
        let type_code = parse_hex_u16(type_value)?;
        match kind.trim().to_ascii_uppercase().as_str() {
            "FILE" => Ok(Self::file(type_code, data.trim())),
            "DATA" => Self::data_from_hex(type_code, data),
            other => Err(FdsError::format(format!(
                "extension entry kind must be FILE or DATA, got '{other}'"
            ))),
        }
    }
}

fn strip_hex_prefix(token: &str) -> &str {
    token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token)
}

fn parse_hex_u16(token: &str) -> Result<u16> {
    let t = token.trim();
    u16::from_str_radix(strip_hex_prefix(t), 16)
        .map_err(|_| FdsError::format(format!("'{t}' is not a 16-bit hex value")))
}

/// Decode a comma-separated list of hex byte tokens.
pub fn parse_hex_bytes(list: &str) -> Result<Vec<u8>> {
    list.split(',')
        .map(|token| {
            let t = token.trim();
            let digits = strip_hex_prefix(t);
            if digits.is_empty() || digits.len() > 2 {
                return Err(FdsError::format(format!(
                    "'{t}' in byte list '{list}' is not a hex byte"
                )));
            }
            u8::from_str_radix(digits, 16).map_err(|_| {
                FdsError::format(format!("'{t}' in byte list '{list}' is not a hex byte"))
            })
        })
        .collect()
}

/// A firmware volume as declared in the flash description.
#[derive(Clone, Default)]
pub struct FirmwareVolumeSpec {
    pub ui_name: String,
    pub capsule_name: Option<String>,
    pub base_address: Option<u64>,
    pub bs_base_address: Option<u64>,
    pub rt_base_address: Option<u64>,
    pub block_sizes: Vec<BlockSizeEntry>,
    pub erase_polarity: ErasePolarity,
    /// `EFI_<name> = <value>` attribute lines, ordered by name.
    pub attributes: BTreeMap<String, String>,
    pub alignment: Option<String>,
    pub name_guid: Option<String>,
    pub ext_entries: Vec<ExtEntry>,
    /// Macros defined in the volume's own section, layered over the caller's.
    pub define_vars: BTreeMap<String, String>,
    pub apriori_sections: Vec<Arc<dyn AprioriGenerator>>,
    pub ffs_files: Vec<Arc<dyn FfsGenerator>>,
    /// Explicit output path, replacing `<FvDir>/<UiFvName>.Fv`.
    pub create_file_name: Option<PathBuf>,
}

impl FirmwareVolumeSpec {
    pub fn new(ui_name: impl Into<String>) -> Self {
        Self {
            ui_name: ui_name.into(),
            ..Default::default()
        }
    }

    /// `FvNameGuid`, treating an empty string as unset.
    pub fn name_guid(&self) -> Option<&str> {
        self.name_guid
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
    }
}

impl fmt::Debug for FirmwareVolumeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirmwareVolumeSpec")
            .field("ui_name", &self.ui_name)
            .field("capsule_name", &self.capsule_name)
            .field("base_address", &self.base_address)
            .field("block_sizes", &self.block_sizes)
            .field("erase_polarity", &self.erase_polarity)
            .field("attributes", &self.attributes)
            .field("alignment", &self.alignment)
            .field("name_guid", &self.name_guid)
            .field("ext_entries", &self.ext_entries)
            .field("apriori_sections", &self.apriori_sections.len())
            .field("ffs_files", &self.ffs_files.len())
            .field("create_file_name", &self.create_file_name)
            .finish()
    }
}

/// A region of a flash device description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashRegion {
    /// `FV`, `FILE`, `DATA`, `CAPSULE`, ...
    pub region_type: String,
    pub data: Vec<String>,
}

impl FlashRegion {
    pub fn fv(names: &[&str]) -> Self {
        Self {
            region_type: "FV".to_string(),
            data: names.iter().map(|n| n.to_string()).collect(),
        }
    }
}

/// A flash device (`[FD.<name>]`) and its regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashDescription {
    pub name: String,
    pub regions: Vec<FlashRegion>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_byte_lists() {
        assert_eq!(parse_hex_bytes("01,02,03").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_hex_bytes(" 0xff, A ,0X10").unwrap(), vec![0xff, 0x0a, 0x10]);
        for bad in ["", "01,,02", "100", "zz", "0x"] {
            assert!(
                matches!(parse_hex_bytes(bad), Err(FdsError::Format(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn entries_from_tokens() {
        assert_eq!(
            ExtEntry::from_tokens("DATA", "0x0001", "01,02,03").unwrap(),
            ExtEntry::data(1, vec![1, 2, 3])
        );
        assert_eq!(
            ExtEntry::from_tokens("file", "2", "Platform/ext.bin").unwrap(),
            ExtEntry::file(2, "Platform/ext.bin")
        );
        assert!(ExtEntry::from_tokens("BLOB", "1", "00").is_err());
        assert!(ExtEntry::from_tokens("DATA", "10000", "00").is_err());
    }

    #[test]
    fn erase_polarity_tokens() {
        assert_eq!("0".parse::<ErasePolarity>().unwrap(), ErasePolarity::Zero);
        assert_eq!(ErasePolarity::default().to_string(), "1");
        assert!("2".parse::<ErasePolarity>().is_err());
    }

    #[test]
    fn blank_name_guid_is_unset() {
        let mut fv = FirmwareVolumeSpec::new("FvMain");
        assert_eq!(fv.name_guid(), None);
        fv.name_guid = Some("  ".into());
        assert_eq!(fv.name_guid(), None);
        fv.name_guid = Some("12345678-1234-1234-1234-123456789ABC".into());
        assert!(fv.name_guid().is_some());
    }
}
