//! Firmware volume extension header.
//!
//! Layout (all little-endian):
//!
//! ```text
//! +0   FvName          16 bytes, packed GUID
//! +16  ExtHeaderSize   u32, header plus every entry
//! +20  entries...      u16 size (payload + 4), u16 type, payload
//! ```

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use crate::error::{FdsError, IoContext, Result};
use crate::fv::volume::{ExtEntry, ExtEntryKind};
use crate::guid::{Guid, GUID_SIZE};

/// Bytes before the first entry.
pub const EXT_HEADER_SIZE: usize = GUID_SIZE + 4;
/// Bytes of each entry before its payload.
pub const EXT_ENTRY_HEADER_SIZE: usize = 4;

/// A decoded extension-header entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExtEntry {
    pub type_code: u16,
    pub payload: Vec<u8>,
}

/// A decoded extension header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtHeader {
    pub fv_name: Guid,
    pub entries: Vec<RawExtEntry>,
}

/// Pack the extension header for a volume.
///
/// Returns `Ok(None)` when the volume has no name GUID. Declaring entries
/// without a name GUID is a configuration error. FILE payloads resolve
/// relative paths against `workspace`.
pub fn build_ext_header(
    fv_name_guid: Option<&str>,
    entries: &[ExtEntry],
    workspace: &Path,
) -> Result<Option<Vec<u8>>> {
    let guid = match fv_name_guid.map(str::trim).filter(|g| !g.is_empty()) {
        Some(g) => Guid::parse(g)?,
        None if entries.is_empty() => return Ok(None),
        None => {
            return Err(FdsError::config(format!(
                "{} extension header entries declared with no FvNameGuid",
                entries.len()
            )))
        }
    };

    // Size everything first so the header can be emitted in one pass.
    let mut payloads = Vec::with_capacity(entries.len());
    let mut total_size = EXT_HEADER_SIZE as u32;
    for entry in entries {
        let payload = load_payload(entry, workspace)?;
        let entry_size = payload.len() + EXT_ENTRY_HEADER_SIZE;
        let entry_size = u16::try_from(entry_size).map_err(|_| {
            FdsError::format(format!(
                "extension entry type {:#06x} is {} bytes, over the 16-bit size limit",
                entry.type_code, entry_size
            ))
        })?;
        total_size += u32::from(entry_size);
        payloads.push((entry_size, entry.type_code, payload));
    }

    let mut out = Vec::with_capacity(total_size as usize);
    let mut head = [0u8; EXT_HEADER_SIZE];
    head[..GUID_SIZE].copy_from_slice(&guid.to_bytes());
    LittleEndian::write_u32(&mut head[GUID_SIZE..], total_size);
    out.extend_from_slice(&head);
    for (size, type_code, payload) in payloads {
        let mut entry_head = [0u8; EXT_ENTRY_HEADER_SIZE];
        LittleEndian::write_u16(&mut entry_head[0..2], size);
        LittleEndian::write_u16(&mut entry_head[2..4], type_code);
        out.extend_from_slice(&entry_head);
        out.extend_from_slice(&payload);
    }
    Ok(Some(out))
}

fn load_payload(entry: &ExtEntry, workspace: &Path) -> Result<Vec<u8>> {
    match &entry.kind {
        ExtEntryKind::Data(bytes) => Ok(bytes.clone()),
        ExtEntryKind::File(path) => {
            let full = resolve_entry_path(path, workspace);
            fs::read(&full).at(&full)
        }
    }
}

fn resolve_entry_path(path: &Path, workspace: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

/// Decode a packed extension header.
pub fn parse_ext_header(bytes: &[u8]) -> Result<ExtHeader> {
    let truncated = |what: &str| FdsError::format(format!("extension header truncated in {what}"));
    if bytes.len() < EXT_HEADER_SIZE {
        return Err(truncated("header"));
    }

    let mut cursor = Cursor::new(bytes);
    let fv_name = Guid::read_from(&mut cursor).map_err(|_| truncated("FvName"))?;
    let total_size = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| truncated("ExtHeaderSize"))?;
    if total_size as usize != bytes.len() {
        return Err(FdsError::format(format!(
            "ExtHeaderSize {} does not match buffer length {}",
            total_size,
            bytes.len()
        )));
    }

    let mut entries = Vec::new();
    while (cursor.position() as usize) < bytes.len() {
        let size = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| truncated("entry size"))? as usize;
        let type_code = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| truncated("entry type"))?;
        if size < EXT_ENTRY_HEADER_SIZE {
            return Err(FdsError::format(format!(
                "extension entry type {type_code:#06x} declares size {size}"
            )));
        }
        let mut payload = vec![0u8; size - EXT_ENTRY_HEADER_SIZE];
        cursor
            .read_exact(&mut payload)
            .map_err(|_| truncated("entry payload"))?;
        entries.push(RawExtEntry { type_code, payload });
    }

    Ok(ExtHeader { fv_name, entries })
}
