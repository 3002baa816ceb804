//! Firmware volumes: declaration, extension header, GenFv control
//! description and assembly.

pub mod assembler;
pub mod ext_header;
pub mod inf;
pub mod volume;

pub use assembler::{AddToBufferRequest, FvAssembler};
pub use ext_header::{build_ext_header, parse_ext_header, ExtHeader, RawExtEntry};
pub use inf::{ControlDescription, Placement};
pub use volume::{
    BlockSizeEntry, ErasePolarity, ExtEntry, ExtEntryKind, FirmwareVolumeSpec, FlashDescription,
    FlashRegion,
};
