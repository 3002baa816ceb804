//! Firmware volume assembly.
//!
//! [`FvAssembler::add_to_buffer`] turns a [`FirmwareVolumeSpec`] into a
//! volume image via GenFv and appends the image to the caller's buffer.
//! Each volume name is built at most once per [`ImageCache`]; later requests
//! get the cached path back and nothing is appended.
//!
//! [`ImageCache`]: crate::cache::ImageCache

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::cache::Cached;
use crate::context::BuildContext;
use crate::error::{FdsError, IoContext, Result};
use crate::ffs::MacroMap;
use crate::fsutil::save_file_on_change;
use crate::fv::ext_header::build_ext_header;
use crate::fv::inf::{ControlDescription, Placement};
use crate::fv::volume::{ErasePolarity, FirmwareVolumeSpec};
use crate::process::ToolInvocation;

/// Per-call inputs from the enclosing flash device or capsule.
#[derive(Debug, Clone, Default)]
pub struct AddToBufferRequest {
    pub placement: Placement,
    /// Overrides the volume's own erase polarity.
    pub erase_polarity: Option<ErasePolarity>,
    /// Volume name → VTF file to list first in that volume.
    pub vtf: BTreeMap<String, PathBuf>,
    pub macros: MacroMap,
}

pub struct FvAssembler<'a> {
    ctx: &'a BuildContext,
}

impl<'a> FvAssembler<'a> {
    pub fn new(ctx: &'a BuildContext) -> Self {
        Self { ctx }
    }

    /// Build `fv` (unless already built) and append its image to `buffer`.
    ///
    /// Returns the path of the volume image.
    pub fn add_to_buffer<W: Write>(
        &self,
        fv: &FirmwareVolumeSpec,
        buffer: &mut W,
        request: &AddToBufferRequest,
    ) -> Result<PathBuf> {
        let cache = self.ctx.cache();
        if let Some(path) = cache.get(&fv.ui_name) {
            log::debug!("{} FV already built at {}", fv.ui_name, path.display());
            return Ok(path);
        }

        self.check_capsule_placement(fv)?;

        let cached = cache.get_or_build(&fv.ui_name, || {
            let output = self.generate(fv, request)?;
            let image = fs::read(&output).map_err(|e| {
                FdsError::tool(
                    self.gen_fv_name(),
                    format!("reading produced volume '{}': {e}", output.display()),
                )
            })?;
            buffer.write_all(&image).at(&output)?;
            log::debug!("Generate {} FV Successfully", fv.ui_name);
            Ok(output)
        })?;

        if let Cached::Hit(path) = &cached {
            log::debug!("{} FV built concurrently at {}", fv.ui_name, path.display());
        }
        Ok(cached.into_path())
    }

    /// A volume inside a capsule must not also sit directly in a flash
    /// device region.
    fn check_capsule_placement(&self, fv: &FirmwareVolumeSpec) -> Result<()> {
        let Some(capsule) = fv.capsule_name.as_deref() else {
            return Ok(());
        };
        let cache = self.ctx.cache();
        for fd in self.ctx.flash_descriptions() {
            for region in &fd.regions {
                if !region.region_type.eq_ignore_ascii_case("FV") {
                    continue;
                }
                for token in &region.data {
                    if token.to_ascii_lowercase().ends_with(".fv") || cache.contains(token) {
                        continue;
                    }
                    if token.eq_ignore_ascii_case(&fv.ui_name) {
                        return Err(FdsError::config(format!(
                            "Capsule {} in FD region can't contain a FV {} in FD region (FD {})",
                            capsule,
                            fv.ui_name.to_uppercase(),
                            fd.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn generate(&self, fv: &FirmwareVolumeSpec, request: &AddToBufferRequest) -> Result<PathBuf> {
        log::info!("Generating {} FV", fv.ui_name);

        // Packed first: a bad extension header must fail before anything
        // is written.
        let ext_header =
            build_ext_header(fv.name_guid(), &fv.ext_entries, self.ctx.workspace_dir())?;

        let fv_dir = self.ctx.fv_dir();
        fs::create_dir_all(fv_dir).at(fv_dir)?;

        let polarity = request.erase_polarity.unwrap_or(fv.erase_polarity);
        let mut inf = ControlDescription::for_volume(fv, &request.placement, polarity);

        if let Some(bytes) = ext_header.filter(|b| !b.is_empty()) {
            let ext_path = fv_dir.join(format!("{}.ext", fv.ui_name));
            save_file_on_change(&ext_path, &bytes)?;
            inf.set_ext_header(&ext_path);
        }

        if let Some(vtf) = request.vtf.get(&fv.ui_name) {
            inf.push_file(vtf);
        }

        let mut macros = request.macros.clone();
        macros.extend(
            fv.define_vars
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        log::debug!("First generate Apriori file !");
        let mut ffs_files = Vec::with_capacity(fv.apriori_sections.len() + fv.ffs_files.len());
        for apriori in &fv.apriori_sections {
            let file = apriori.gen_ffs(&fv.ui_name, &macros)?;
            inf.push_file(&file);
            ffs_files.push(file);
        }
        for ffs in &fv.ffs_files {
            let file = ffs.gen_ffs(&macros)?;
            inf.push_file(&file);
            ffs_files.push(file);
        }

        let inf_path = fv_dir.join(format!("{}.inf", fv.ui_name));
        save_file_on_change(&inf_path, inf.render().as_bytes())?;

        let output = match &fv.create_file_name {
            Some(path) => path.clone(),
            None => fv_dir.join(format!("{}.Fv", fv.ui_name)),
        };
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).at(parent)?;
        }

        let address_file = self.write_address_file(fv)?;

        let mut invocation = ToolInvocation::new(self.ctx.gen_fv())
            .output_arg("-o", &output)
            .arg("-i")
            .input_arg(&inf_path)
            .arg("-a")
            .input_arg(&address_file);
        for file in &ffs_files {
            invocation = invocation.input(file);
        }
        self.ctx.runner().run(&invocation)?;
        Ok(output)
    }

    /// Copy the shared address file to `<FfsDir>/<UiFvName>.inf`.
    fn write_address_file(&self, fv: &FirmwareVolumeSpec) -> Result<PathBuf> {
        let content = match &self.ctx.dirs().address_file {
            Some(shared) => fs::read(shared).at(shared)?,
            None => Vec::new(),
        };
        let path = self.ctx.ffs_dir().join(format!("{}.inf", fv.ui_name));
        save_file_on_change(&path, &content)?;
        Ok(path)
    }

    fn gen_fv_name(&self) -> String {
        tool_name(self.ctx.gen_fv())
    }
}

fn tool_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .into_owned()
}
