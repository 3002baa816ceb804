//! Section generation.
//!
//! A section generator writes one section file for a module and returns its
//! path. Leaf sections wrap an existing file; [`GuidSection`] nests other
//! generators and pushes the result through a GUID-selected tool.

pub mod guided;

pub use guided::GuidSection;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::context::BuildContext;
use crate::error::{FdsError, IoContext, Result};
use crate::process::ToolInvocation;

/// Nesting limit for section trees.
pub const MAX_SECTION_DEPTH: usize = 16;

/// Section types GenSec knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Raw,
    Pe32,
    Pic,
    Te,
    DxeDepex,
    PeiDepex,
    SmmDepex,
    Version,
    Ui,
    Compat16,
    FreeformSubtypeGuid,
    FvImage,
    Compress,
    Guided,
}

impl SectionKind {
    /// `-s` argument for GenSec.
    pub fn token(self) -> &'static str {
        match self {
            SectionKind::Raw => "EFI_SECTION_RAW",
            SectionKind::Pe32 => "EFI_SECTION_PE32",
            SectionKind::Pic => "EFI_SECTION_PIC",
            SectionKind::Te => "EFI_SECTION_TE",
            SectionKind::DxeDepex => "EFI_SECTION_DXE_DEPEX",
            SectionKind::PeiDepex => "EFI_SECTION_PEI_DEPEX",
            SectionKind::SmmDepex => "EFI_SECTION_SMM_DEPEX",
            SectionKind::Version => "EFI_SECTION_VERSION",
            SectionKind::Ui => "EFI_SECTION_USER_INTERFACE",
            SectionKind::Compat16 => "EFI_SECTION_COMPATIBILITY16",
            SectionKind::FreeformSubtypeGuid => "EFI_SECTION_FREEFORM_SUBTYPE_GUID",
            SectionKind::FvImage => "EFI_SECTION_FIRMWARE_VOLUME_IMAGE",
            SectionKind::Compress => "EFI_SECTION_COMPRESSION",
            SectionKind::Guided => "EFI_SECTION_GUID_DEFINED",
        }
    }

    /// Suffix appended to the module name for this kind's section file.
    pub fn suffix(self) -> &'static str {
        match self {
            SectionKind::Raw => ".raw",
            SectionKind::Pe32 => ".pe32",
            SectionKind::Pic => ".pic",
            SectionKind::Te => ".te",
            SectionKind::DxeDepex | SectionKind::PeiDepex => ".dpx",
            SectionKind::SmmDepex => ".smm",
            SectionKind::Version => ".ver",
            SectionKind::Ui => ".ui",
            SectionKind::Compat16 => ".com16",
            SectionKind::FreeformSubtypeGuid => ".guid",
            SectionKind::FvImage => "fv.sec",
            SectionKind::Compress => ".com",
            SectionKind::Guided => ".guided",
        }
    }
}

impl FromStr for SectionKind {
    type Err = FdsError;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.trim().to_ascii_uppercase().as_str() {
            "RAW" => SectionKind::Raw,
            "PE32" => SectionKind::Pe32,
            "PIC" => SectionKind::Pic,
            "TE" => SectionKind::Te,
            "DXE_DEPEX" => SectionKind::DxeDepex,
            "PEI_DEPEX" => SectionKind::PeiDepex,
            "SMM_DEPEX" => SectionKind::SmmDepex,
            "VERSION" => SectionKind::Version,
            "UI" => SectionKind::Ui,
            "COMPAT16" => SectionKind::Compat16,
            "FREEFORM_SUBTYPE_GUID" => SectionKind::FreeformSubtypeGuid,
            "FV_IMAGE" => SectionKind::FvImage,
            "COMPRESS" => SectionKind::Compress,
            "GUIDED" => SectionKind::Guided,
            other => {
                return Err(FdsError::format(format!("unknown section type '{other}'")))
            }
        };
        Ok(kind)
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Where in a section tree a generator is running.
#[derive(Debug, Clone, Default)]
pub struct SectionScope {
    depth: usize,
    /// Enclosing GUIDed sections, outermost first, by node address.
    guided: Vec<(*const (), String)>,
}

impl SectionScope {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Scope for the children of the GUIDed section `node`.
    ///
    /// Fails if the nesting limit is reached or `node` itself already
    /// encloses this scope. Distinct sections sharing a GUID may nest.
    pub fn enter_guided(&self, node: *const (), guid: &str) -> Result<Self> {
        if self.depth >= MAX_SECTION_DEPTH {
            return Err(FdsError::config(format!(
                "section nesting exceeds {} levels at GUIDed section {}",
                MAX_SECTION_DEPTH, guid
            )));
        }
        if self.guided.iter().any(|(n, _)| std::ptr::eq(*n, node)) {
            let chain: Vec<&str> = self.guided.iter().map(|(_, g)| g.as_str()).collect();
            return Err(FdsError::config(format!(
                "GUIDed section {} contains itself ({} -> {})",
                guid,
                chain.join(" -> "),
                guid
            )));
        }
        let mut guided = self.guided.clone();
        guided.push((node, guid.to_string()));
        Ok(Self {
            depth: self.depth + 1,
            guided,
        })
    }
}

/// Writes one section file for a module.
pub trait SectionGenerator: Send + Sync {
    fn gen_section_in(
        &self,
        ctx: &BuildContext,
        scope: &SectionScope,
        output_dir: &Path,
        module_name: &str,
    ) -> Result<PathBuf>;

    /// Generate as a top-level section.
    fn gen_section(
        &self,
        ctx: &BuildContext,
        output_dir: &Path,
        module_name: &str,
    ) -> Result<PathBuf> {
        self.gen_section_in(ctx, &SectionScope::root(), output_dir, module_name)
    }

    /// GUIDs of every GUIDed section in this subtree.
    fn guided_guids(&self, _out: &mut Vec<String>) {}
}

/// A section whose body is an existing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSection {
    pub kind: SectionKind,
    pub file: PathBuf,
}

impl DataSection {
    pub fn new(kind: SectionKind, file: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            file: file.into(),
        }
    }
}

impl SectionGenerator for DataSection {
    fn gen_section_in(
        &self,
        ctx: &BuildContext,
        _scope: &SectionScope,
        output_dir: &Path,
        module_name: &str,
    ) -> Result<PathBuf> {
        let output = section_path(output_dir, module_name, self.kind);
        let file = if self.file.is_absolute() {
            self.file.clone()
        } else {
            ctx.workspace_dir().join(&self.file)
        };
        gen_sec(ctx, &output, self.kind, &[file])?;
        Ok(output)
    }
}

pub(crate) fn section_path(output_dir: &Path, module_name: &str, kind: SectionKind) -> PathBuf {
    output_dir.join(format!("{}{}", module_name, kind.suffix()))
}

/// Run GenSec: `GenSec -o <output> -s <TOKEN> <inputs>...`.
pub(crate) fn gen_sec(
    ctx: &BuildContext,
    output: &Path,
    kind: SectionKind,
    inputs: &[PathBuf],
) -> Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).at(parent)?;
    }
    let mut invocation = ToolInvocation::new(ctx.gen_sec())
        .output_arg("-o", output)
        .args(["-s", kind.token()]);
    for input in inputs {
        invocation = invocation.input_arg(input);
    }
    ctx.runner().run(&invocation)?;
    Ok(())
}
