//! GUID-defined section composition.
//!
//! The GUIDed tools (compressors, CRC, signers) operate on a whole section
//! image and emit only a payload, so composition is two GenSec passes around
//! one tool call:
//!
//! 1. GenSec combines the child sections into `<module>.guided`.
//! 2. The tool registered for `name_guid` turns that into `<module>.tmp`.
//! 3. GenSec wraps `<module>.tmp` back into `<module>.guided` with a
//!    GUID-defined section header.
//!
//! Nothing is memoized here; every call regenerates all three files.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::context::BuildContext;
use crate::error::{FdsError, IoContext, Result};
use crate::process::ToolInvocation;
use crate::section::{gen_sec, section_path, SectionGenerator, SectionKind, SectionScope};

#[derive(Clone)]
pub struct GuidSection {
    /// Section alignment token. Not applied here; the FFS generator that
    /// places this section reads it when laying out the file.
    pub alignment: Option<String>,
    /// Selects the processing tool.
    pub name_guid: String,
    pub sections: Vec<Arc<dyn SectionGenerator>>,
}

impl GuidSection {
    pub fn new(name_guid: impl Into<String>) -> Self {
        Self {
            alignment: None,
            name_guid: name_guid.into(),
            sections: Vec::new(),
        }
    }

    pub fn with_alignment(mut self, alignment: impl Into<String>) -> Self {
        self.alignment = Some(alignment.into());
        self
    }

    pub fn with_section(mut self, section: Arc<dyn SectionGenerator>) -> Self {
        self.sections.push(section);
        self
    }
}

impl fmt::Debug for GuidSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuidSection")
            .field("alignment", &self.alignment)
            .field("name_guid", &self.name_guid)
            .field("sections", &self.sections.len())
            .finish()
    }
}

impl SectionGenerator for GuidSection {
    fn gen_section_in(
        &self,
        ctx: &BuildContext,
        scope: &SectionScope,
        output_dir: &Path,
        module_name: &str,
    ) -> Result<PathBuf> {
        let tool = ctx.registry().lookup(&self.name_guid)?.to_path_buf();
        let node = (self as *const Self).cast::<()>();
        let inner = scope.enter_guided(node, &self.name_guid)?;
        if self.sections.is_empty() {
            return Err(FdsError::config(format!(
                "GUIDed section {} in {} has no child sections",
                self.name_guid, module_name
            )));
        }

        fs::create_dir_all(output_dir).at(output_dir)?;

        // Children get their own names so their files never collide with
        // this section's `.guided`/`.tmp` or with each other.
        let mut child_files = Vec::with_capacity(self.sections.len());
        for (index, section) in self.sections.iter().enumerate() {
            let child_name = format!("{}SEC{}", module_name, index + 1);
            child_files.push(section.gen_section_in(ctx, &inner, output_dir, &child_name)?);
        }

        let output = section_path(output_dir, module_name, SectionKind::Guided);
        gen_sec(ctx, &output, SectionKind::Guided, &child_files)?;

        let processed = output_dir.join(format!("{}.tmp", module_name));
        log::debug!(
            "processing {} with {} for GUID {}",
            output.display(),
            tool.display(),
            self.name_guid
        );
        let invocation = ToolInvocation::new(&tool)
            .output_arg("-o", &processed)
            .input_arg(&output);
        ctx.runner().run(&invocation)?;

        gen_sec(ctx, &output, SectionKind::Guided, &[processed])?;
        Ok(output)
    }

    fn guided_guids(&self, out: &mut Vec<String>) {
        out.push(self.name_guid.clone());
        for section in &self.sections {
            section.guided_guids(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BuildContext, BuildDirs};
    use crate::error::FdsError;
    use crate::process::{ToolOutput, ToolRunner};
    use crate::section::DataSection;
    use crate::tools::{ToolRegistry, CRC32_GUID, LZMA_COMPRESS_GUID};
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Records invocations and fakes outputs without spawning anything.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<ToolInvocation>>,
    }

    impl ToolRunner for Recorder {
        fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
            crate::process::check_inputs(invocation)?;
            if let Some(out) = &invocation.output {
                fs::write(out, invocation.tool_name()).unwrap();
            }
            self.calls.lock().push(invocation.clone());
            Ok(ToolOutput::default())
        }
    }

    fn context(tmp: &TempDir, runner: Arc<Recorder>) -> BuildContext {
        let dirs = BuildDirs::under(tmp.path());
        let mut registry = ToolRegistry::new();
        registry.register(LZMA_COMPRESS_GUID, "LzmaCompress").unwrap();
        BuildContext::new(dirs, runner).with_registry(registry)
    }

    #[test]
    fn three_tool_calls_in_order() {
        let tmp = TempDir::new().unwrap();
        let runner = Arc::new(Recorder::default());
        let ctx = context(&tmp, runner.clone());
        let body = tmp.path().join("PeiCore.efi");
        fs::write(&body, b"MZ").unwrap();

        let section = GuidSection::new(LZMA_COMPRESS_GUID)
            .with_section(Arc::new(DataSection::new(SectionKind::Pe32, &body)));
        let out_dir = tmp.path().join("out");
        let out = section.gen_section(&ctx, &out_dir, "PeiCore").unwrap();
        assert_eq!(out, out_dir.join("PeiCore.guided"));

        let calls = runner.calls.lock();
        let summary: Vec<(String, Vec<String>)> = calls
            .iter()
            .map(|c| {
                (
                    c.tool_name(),
                    c.args.iter().map(|a| a.to_string_lossy().into_owned()).collect(),
                )
            })
            .collect();
        let p = |name: &str| out_dir.join(name).display().to_string();
        assert_eq!(
            summary,
            vec![
                (
                    "GenSec".to_string(),
                    vec![
                        "-o".into(),
                        p("PeiCoreSEC1.pe32"),
                        "-s".into(),
                        "EFI_SECTION_PE32".into(),
                        body.display().to_string(),
                    ]
                ),
                (
                    "GenSec".to_string(),
                    vec![
                        "-o".into(),
                        p("PeiCore.guided"),
                        "-s".into(),
                        "EFI_SECTION_GUID_DEFINED".into(),
                        p("PeiCoreSEC1.pe32"),
                    ]
                ),
                (
                    "LzmaCompress".to_string(),
                    vec!["-o".into(), p("PeiCore.tmp"), p("PeiCore.guided")]
                ),
                (
                    "GenSec".to_string(),
                    vec![
                        "-o".into(),
                        p("PeiCore.guided"),
                        "-s".into(),
                        "EFI_SECTION_GUID_DEFINED".into(),
                        p("PeiCore.tmp"),
                    ]
                ),
            ]
        );
    }

    #[test]
    fn unknown_guid_fails_before_any_work() {
        let tmp = TempDir::new().unwrap();
        let runner = Arc::new(Recorder::default());
        let ctx = context(&tmp, runner.clone());
        let section = GuidSection::new(CRC32_GUID).with_section(Arc::new(DataSection::new(
            SectionKind::Raw,
            tmp.path().join("blob.bin"),
        )));
        let out_dir = tmp.path().join("out");
        let err = section.gen_section(&ctx, &out_dir, "Blob").unwrap_err();
        assert!(matches!(err, FdsError::UnknownTool(g) if g == CRC32_GUID));
        assert!(runner.calls.lock().is_empty());
        assert!(!out_dir.exists());
    }

    #[test]
    fn nested_same_guid_is_composed() {
        let tmp = TempDir::new().unwrap();
        let runner = Arc::new(Recorder::default());
        let ctx = context(&tmp, runner.clone());
        let body = tmp.path().join("blob.bin");
        fs::write(&body, b"x").unwrap();

        let inner = GuidSection::new(LZMA_COMPRESS_GUID)
            .with_section(Arc::new(DataSection::new(SectionKind::Raw, &body)));
        let outer = GuidSection::new(LZMA_COMPRESS_GUID).with_section(Arc::new(inner));
        let out_dir = tmp.path().join("out");
        let out = outer.gen_section(&ctx, &out_dir, "Blob").unwrap();
        assert_eq!(out, out_dir.join("Blob.guided"));
        assert!(out_dir.join("BlobSEC1.guided").is_file());

        let calls = runner.calls.lock();
        let tools: Vec<String> = calls.iter().map(|c| c.tool_name()).collect();
        assert_eq!(
            tools,
            vec![
                "GenSec",
                "GenSec",
                "LzmaCompress",
                "GenSec",
                "GenSec",
                "LzmaCompress",
                "GenSec"
            ]
        );
        assert_eq!(calls[6].inputs, vec![out_dir.join("Blob.tmp")]);
    }

    #[test]
    fn alignment_is_carried_not_passed_to_tools() {
        let tmp = TempDir::new().unwrap();
        let runner = Arc::new(Recorder::default());
        let ctx = context(&tmp, runner.clone());
        let body = tmp.path().join("blob.bin");
        fs::write(&body, b"x").unwrap();

        let section = GuidSection::new(LZMA_COMPRESS_GUID)
            .with_alignment("16")
            .with_section(Arc::new(DataSection::new(SectionKind::Raw, &body)));
        assert_eq!(section.alignment.as_deref(), Some("16"));
        section
            .gen_section(&ctx, &tmp.path().join("out"), "Blob")
            .unwrap();
        assert!(runner
            .calls
            .lock()
            .iter()
            .all(|c| c.args.iter().all(|a| a != "16")));
    }

    #[test]
    fn empty_section_list_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, Arc::new(Recorder::default()));
        let err = GuidSection::new(LZMA_COMPRESS_GUID)
            .gen_section(&ctx, tmp.path(), "Empty")
            .unwrap_err();
        assert!(matches!(err, FdsError::Configuration(_)));
    }

    #[test]
    fn collects_nested_guids() {
        let inner = GuidSection::new(CRC32_GUID)
            .with_section(Arc::new(DataSection::new(SectionKind::Raw, "a.bin")));
        let outer = GuidSection::new(LZMA_COMPRESS_GUID).with_section(Arc::new(inner));
        let mut guids = Vec::new();
        outer.guided_guids(&mut guids);
        assert_eq!(guids, vec![LZMA_COMPRESS_GUID, CRC32_GUID]);
    }
}
