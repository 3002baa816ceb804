//! INF-style control description consumed by GenFv.
//!
//! Line formats, including their odd spacing, are fixed: GenFv parses them
//! by keyword.

use std::fmt::Write as _;
use std::path::Path;

use crate::fv::volume::{ErasePolarity, FirmwareVolumeSpec};

/// Placement overrides handed down by the enclosing flash device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Placement {
    pub base_address: Option<u64>,
    pub block_size: Option<u64>,
    pub num_blocks: Option<u64>,
}

/// Control description under construction.
#[derive(Debug, Clone, Default)]
pub struct ControlDescription {
    options: String,
    attributes: String,
    files: String,
}

impl ControlDescription {
    /// Fill `[options]` and `[attributes]` for `fv`.
    pub fn for_volume(
        fv: &FirmwareVolumeSpec,
        placement: &Placement,
        erase_polarity: ErasePolarity,
    ) -> Self {
        let mut inf = Self::default();
        inf.write_options(fv, placement);
        inf.write_attributes(fv, erase_polarity);
        inf
    }

    fn write_options(&mut self, fv: &FirmwareVolumeSpec, placement: &Placement) {
        let o = &mut self.options;
        if let Some(base) = placement.base_address.or(fv.base_address) {
            let _ = writeln!(o, "EFI_BASE_ADDRESS = {:#X}", base);
        }

        if let Some(size) = placement.block_size {
            let _ = writeln!(o, "EFI_BLOCK_SIZE = {:#X}", size);
            if let Some(num) = placement.num_blocks {
                let _ = writeln!(o, "EFI_NUM_BLOCKS   =  {:#X}", num);
            }
        } else {
            for entry in &fv.block_sizes {
                if let Some(size) = entry.block_size {
                    let _ = writeln!(o, "EFI_BLOCK_SIZE = {:#X}", size);
                }
                if let Some(num) = entry.num_blocks {
                    let _ = writeln!(o, "EFI_NUM_BLOCKS   =  {:#X}", num);
                }
            }
        }

        if let Some(addr) = fv.bs_base_address {
            let _ = writeln!(o, "EFI_BOOT_DRIVER_BASE_ADDRESS = {:#X}", addr);
        }
        if let Some(addr) = fv.rt_base_address {
            let _ = writeln!(o, "EFI_RUNTIME_DRIVER_BASE_ADDRESS = {:#X}", addr);
        }
    }

    fn write_attributes(&mut self, fv: &FirmwareVolumeSpec, erase_polarity: ErasePolarity) {
        let a = &mut self.attributes;
        let _ = writeln!(a, "EFI_ERASE_POLARITY    =  {}", erase_polarity);
        for (name, value) in &fv.attributes {
            let _ = writeln!(a, "EFI_{} = {}", name, value);
        }
        if let Some(align) = fv.alignment.as_deref().map(str::trim) {
            if !align.is_empty() {
                let _ = writeln!(a, "EFI_FVB2_ALIGNMENT_{} = TRUE", align);
            }
        }
    }

    /// Reference a persisted extension header.
    pub fn set_ext_header(&mut self, path: &Path) {
        let _ = writeln!(
            self.attributes,
            "EFI_FV_EXT_HEADER_FILE_NAME = {}",
            path.display()
        );
    }

    /// Append an `EFI_FILE_NAME` line. Order of calls is order in the volume.
    pub fn push_file(&mut self, path: &Path) {
        let _ = writeln!(self.files, "EFI_FILE_NAME = {}", path.display());
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(
            self.options.len() + self.attributes.len() + self.files.len() + 40,
        );
        out.push_str("[options]\n");
        out.push_str(&self.options);
        out.push_str("[attributes]\n");
        out.push_str(&self.attributes);
        out.push_str("[files]\n");
        out.push_str(&self.files);
        out
    }
}
