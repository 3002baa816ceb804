//! Firmware volume assembly and GUID-defined section composition.
//!
//! This crate drives the EDK II base tools to turn declared firmware volumes
//! and section trees into binary images:
//!
//! - **Volumes** - [`FvAssembler`] writes the GenFv control description and
//!   extension header, runs GenFv, and appends the image to a flash buffer.
//!   Each volume is built at most once per [`ImageCache`].
//! - **Sections** - [`GuidSection`] combines child sections with GenSec,
//!   runs the tool registered for its GUID, and rewraps the result.
//! - **Tools** - [`ToolRegistry`] maps section GUIDs to processing tools;
//!   [`ToolRunner`] is the seam every external invocation goes through.
//!
//! # Architecture
//!
//! ```text
//! FdsConfig (TOML) ──> BuildContext ──┬── ImageCache
//!                                     ├── ToolRegistry
//!                                     └── ToolRunner (ProcessRunner)
//!
//! FvAssembler ── ext_header ── inf ── GenFv
//! GuidSection ── GenSec ── <guided tool> ── GenSec
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use fdgen::{load_config, AddToBufferRequest, BuildContext, FirmwareVolumeSpec, FvAssembler};
//!
//! let ctx = BuildContext::from_config(load_config("fds.toml".as_ref())?)?;
//! let fv = FirmwareVolumeSpec::new("FvMain");
//! let mut flash = Vec::new();
//! let image = FvAssembler::new(&ctx).add_to_buffer(&fv, &mut flash, &AddToBufferRequest::default())?;
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod ffs;
pub mod fsutil;
pub mod fv;
pub mod guid;
pub mod process;
pub mod section;
pub mod tools;

pub use cache::{Cached, ImageCache};
pub use config::{load_config, parse_config, FdsConfig};
pub use context::{BuildContext, BuildDirs};
pub use error::{FdsError, Result};
pub use ffs::{AprioriGenerator, FfsGenerator, MacroMap, PrebuiltFfs};
pub use fv::{AddToBufferRequest, FirmwareVolumeSpec, FvAssembler};
pub use guid::Guid;
pub use process::{ProcessRunner, ToolInvocation, ToolOutput, ToolRunner};
pub use section::{DataSection, GuidSection, SectionGenerator, SectionKind};
pub use tools::ToolRegistry;
