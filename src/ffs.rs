//! Contracts for the FFS file generators a volume pulls in.
//!
//! Generating an individual FFS file (modules, raw files, apriori lists) is
//! done elsewhere; the assembler only needs each generator to hand back the
//! path of the file it produced.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{FdsError, Result};

/// Macro name → value, as visible to FFS generation.
pub type MacroMap = BTreeMap<String, String>;

/// Produces one FFS file placed in a volume's `[files]` list.
pub trait FfsGenerator: Send + Sync {
    fn gen_ffs(&self, macros: &MacroMap) -> Result<PathBuf>;
}

/// Produces the apriori file of a volume. Apriori files are dispatched
/// ahead of every other module in the volume.
pub trait AprioriGenerator: Send + Sync {
    fn gen_ffs(&self, fv_name: &str, macros: &MacroMap) -> Result<PathBuf>;
}

/// An FFS file that already exists on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrebuiltFfs {
    path: PathBuf,
}

impl PrebuiltFfs {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn existing(&self) -> Result<PathBuf> {
        if !self.path.is_file() {
            return Err(FdsError::io(
                &self.path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "FFS file not found"),
            ));
        }
        Ok(self.path.clone())
    }
}

impl FfsGenerator for PrebuiltFfs {
    fn gen_ffs(&self, _macros: &MacroMap) -> Result<PathBuf> {
        self.existing()
    }
}

impl AprioriGenerator for PrebuiltFfs {
    fn gen_ffs(&self, _fv_name: &str, _macros: &MacroMap) -> Result<PathBuf> {
        self.existing()
    }
}
