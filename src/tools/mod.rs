//! GUID-keyed registry of external section processing tools.
//!
//! A GUID-defined section names its transformation by GUID (LZMA, Tiano,
//! CRC32, signing, ...). The registry maps that GUID to the executable that
//! performs it. It is filled at configuration time and only read afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{FdsError, Result};
use crate::guid::Guid;
use crate::process::resolve_program;

pub const LZMA_COMPRESS_GUID: &str = "EE4E5898-3914-4259-9D6E-DC7BD79403CF";
pub const TIANO_COMPRESS_GUID: &str = "A31280AD-481E-41B6-95E8-127F4C984779";
pub const CRC32_GUID: &str = "FC1BCDB0-7D31-49AA-936A-A4600D9DD083";

const DEFAULT_TOOLS: &[(&str, &str)] = &[
    (LZMA_COMPRESS_GUID, "LzmaCompress"),
    (TIANO_COMPRESS_GUID, "TianoCompress"),
    (CRC32_GUID, "GenCrc32"),
];

/// GUID → processing tool.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<Guid, PathBuf>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the stock EDK II GUIDed tools.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (guid, tool) in DEFAULT_TOOLS {
            // The table above is well-formed.
            if let Ok(guid) = Guid::parse(guid) {
                registry.tools.insert(guid, PathBuf::from(*tool));
            }
        }
        registry
    }

    /// Bind (or rebind) `guid` to `tool`.
    pub fn register(&mut self, guid: &str, tool: impl Into<PathBuf>) -> Result<()> {
        let guid = Guid::parse(guid)?;
        self.tools.insert(guid, tool.into());
        Ok(())
    }

    /// Look up the tool for a section GUID. Case-insensitive.
    pub fn lookup(&self, guid: &str) -> Result<&Path> {
        let key = Guid::parse(guid).map_err(|_| FdsError::UnknownTool(guid.to_string()))?;
        self.tools
            .get(&key)
            .map(PathBuf::as_path)
            .ok_or_else(|| FdsError::UnknownTool(guid.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Guid, &Path)> {
        self.tools.iter().map(|(g, p)| (g, p.as_path()))
    }

    /// Check that every GUID in `guids` is bound to a resolvable executable,
    /// replacing each binding with its resolved path.
    pub fn ensure_bound<'a>(&mut self, guids: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for guid in guids {
            let tool = self.lookup(guid)?.to_path_buf();
            let resolved = resolve_program(&tool)?;
            let key = Guid::parse(guid)?;
            self.tools.insert(key, resolved);
        }
        Ok(())
    }
}
