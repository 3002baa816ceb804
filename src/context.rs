//! Build context shared by volume assembly and section composition.
//!
//! Holds everything that is fixed for a build run: output directories,
//! resolved tool paths, the GUIDed tool registry, the flash layout used for
//! placement checks, and the image cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::ImageCache;
use crate::config::FdsConfig;
use crate::error::Result;
use crate::fv::volume::FlashDescription;
use crate::process::{check_required_tools, ProcessRunner, ToolRunner};
use crate::section::SectionGenerator;
use crate::tools::ToolRegistry;

pub const DEFAULT_GEN_FV: &str = "GenFv";
pub const DEFAULT_GEN_SEC: &str = "GenSec";

/// Output layout of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDirs {
    /// Root for relative paths in the flash description.
    pub workspace: PathBuf,
    /// Volumes, control descriptions and extension headers.
    pub fv_dir: PathBuf,
    /// Per-volume address descriptors.
    pub ffs_dir: PathBuf,
    /// Shared address file copied for every volume.
    pub address_file: Option<PathBuf>,
}

impl BuildDirs {
    /// `<root>/FV` and `<root>/FV/Ffs` under a workspace at `root`.
    pub fn under(root: &Path) -> Self {
        Self {
            workspace: root.to_path_buf(),
            fv_dir: root.join("FV"),
            ffs_dir: root.join("FV").join("Ffs"),
            address_file: None,
        }
    }
}

pub struct BuildContext {
    dirs: BuildDirs,
    gen_fv: PathBuf,
    gen_sec: PathBuf,
    registry: ToolRegistry,
    flash: Vec<FlashDescription>,
    cache: Arc<ImageCache>,
    runner: Arc<dyn ToolRunner>,
}

impl BuildContext {
    /// Context with default tool names and registry. Tools are not resolved.
    pub fn new(dirs: BuildDirs, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            dirs,
            gen_fv: PathBuf::from(DEFAULT_GEN_FV),
            gen_sec: PathBuf::from(DEFAULT_GEN_SEC),
            registry: ToolRegistry::with_defaults(),
            flash: Vec::new(),
            cache: Arc::new(ImageCache::new()),
            runner,
        }
    }

    /// Context from a loaded configuration. GenFv and GenSec must resolve.
    pub fn from_config(config: FdsConfig) -> Result<Self> {
        let resolved = check_required_tools(&[
            (config.gen_fv.as_path(), "firmware volume builder"),
            (config.gen_sec.as_path(), "section builder"),
        ])?;
        let runner = Arc::new(ProcessRunner::new(config.tool_timeout));
        let mut ctx = Self::new(config.dirs, runner).with_registry(config.guided_tools);
        ctx.gen_fv = resolved[0].clone();
        ctx.gen_sec = resolved[1].clone();
        Ok(ctx)
    }

    pub fn with_tools(mut self, gen_fv: impl Into<PathBuf>, gen_sec: impl Into<PathBuf>) -> Self {
        self.gen_fv = gen_fv.into();
        self.gen_sec = gen_sec.into();
        self
    }

    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_flash_descriptions(mut self, flash: Vec<FlashDescription>) -> Self {
        self.flash = flash;
        self
    }

    /// Share an image cache with other contexts of the same run.
    pub fn with_cache(mut self, cache: Arc<ImageCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Resolve every GUIDed tool the given section trees will need.
    ///
    /// Call before composition starts; the registry is read-only afterwards.
    pub fn validate_sections(&mut self, sections: &[&dyn SectionGenerator]) -> Result<()> {
        let mut guids = Vec::new();
        for section in sections {
            section.guided_guids(&mut guids);
        }
        guids.sort();
        guids.dedup();
        self.registry.ensure_bound(guids.iter().map(String::as_str))
    }

    pub fn dirs(&self) -> &BuildDirs {
        &self.dirs
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.dirs.workspace
    }

    pub fn fv_dir(&self) -> &Path {
        &self.dirs.fv_dir
    }

    pub fn ffs_dir(&self) -> &Path {
        &self.dirs.ffs_dir
    }

    pub fn gen_fv(&self) -> &Path {
        &self.gen_fv
    }

    pub fn gen_sec(&self) -> &Path {
        &self.gen_sec
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn flash_descriptions(&self) -> &[FlashDescription] {
        &self.flash
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    pub fn runner(&self) -> &dyn ToolRunner {
        self.runner.as_ref()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::FdsError;
    use crate::section::{DataSection, GuidSection, SectionKind};
    use crate::tools::{CRC32_GUID, TIANO_COMPRESS_GUID};
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(tmp: &TempDir, gen_fv: &str) -> FdsConfig {
        FdsConfig {
            dirs: BuildDirs::under(tmp.path()),
            gen_fv: PathBuf::from(gen_fv),
            gen_sec: PathBuf::from("sh"),
            tool_timeout: Duration::from_secs(5),
            guided_tools: ToolRegistry::new(),
        }
    }

    #[test]
    fn from_config_resolves_tools() {
        let tmp = TempDir::new().unwrap();
        let ctx = BuildContext::from_config(config(&tmp, "sh")).unwrap();
        assert!(ctx.gen_fv().is_absolute());
        assert!(ctx.gen_sec().is_absolute());
    }

    #[test]
    fn from_config_fails_fast_on_missing_tool() {
        let tmp = TempDir::new().unwrap();
        let err = BuildContext::from_config(config(&tmp, "nonexistent_GenFv_xyz")).err();
        assert!(matches!(err, Some(FdsError::BuildTool { .. })));
    }

    #[test]
    fn validate_sections_checks_every_guid() {
        let tmp = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new();
        registry.register(CRC32_GUID, "sh").unwrap();
        let mut ctx = BuildContext::new(
            BuildDirs::under(tmp.path()),
            Arc::new(ProcessRunner::default()),
        )
        .with_registry(registry);

        let crc = GuidSection::new(CRC32_GUID)
            .with_section(Arc::new(DataSection::new(SectionKind::Raw, "a.bin")));
        ctx.validate_sections(&[&crc]).unwrap();

        let tiano = GuidSection::new(TIANO_COMPRESS_GUID).with_section(Arc::new(crc));
        assert!(matches!(
            ctx.validate_sections(&[&tiano]),
            Err(FdsError::UnknownTool(_))
        ));
    }
}
