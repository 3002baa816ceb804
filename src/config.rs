//! Build configuration loaded from TOML.
//!
//! ```toml
//! [workspace]
//! dir = "/work/edk2"
//! fv_dir = "Build/Ovmf/FV"
//! ffs_dir = "Build/Ovmf/FV/Ffs"
//! address_file = "Build/Ovmf/FV/FvAddress.inf"
//!
//! [tools]
//! gen_fv = "GenFv"
//! gen_sec = "GenSec"
//! timeout_secs = 600
//!
//! [guided_tools]
//! "EE4E5898-3914-4259-9D6E-DC7BD79403CF" = "/opt/edk2/bin/LzmaCompress"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::context::{BuildDirs, DEFAULT_GEN_FV, DEFAULT_GEN_SEC};
use crate::process::DEFAULT_TOOL_TIMEOUT;
use crate::tools::ToolRegistry;

#[derive(Debug, Clone)]
pub struct FdsConfig {
    pub dirs: BuildDirs,
    pub gen_fv: PathBuf,
    pub gen_sec: PathBuf,
    pub tool_timeout: Duration,
    pub guided_tools: ToolRegistry,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FdsToml {
    workspace: WorkspaceToml,
    tools: Option<ToolsToml>,
    guided_tools: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkspaceToml {
    dir: String,
    fv_dir: String,
    ffs_dir: Option<String>,
    address_file: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolsToml {
    gen_fv: Option<String>,
    gen_sec: Option<String>,
    timeout_secs: Option<u64>,
}

pub fn load_config(path: &Path) -> Result<FdsConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading build config '{}'", path.display()))?;
    parse_config(&text, path.parent().unwrap_or(Path::new(".")))
        .with_context(|| format!("parsing build config '{}'", path.display()))
}

/// Parse configuration text. A relative `workspace.dir` resolves against
/// `base_dir`; other relative paths resolve against the workspace.
pub fn parse_config(text: &str, base_dir: &Path) -> Result<FdsConfig> {
    let parsed: FdsToml = toml::from_str(text).context("invalid TOML")?;

    let workspace = resolve(base_dir, &parsed.workspace.dir);
    let fv_dir = resolve(&workspace, &parsed.workspace.fv_dir);
    let ffs_dir = match parsed.workspace.ffs_dir.as_deref() {
        Some(dir) => resolve(&workspace, dir),
        None => fv_dir.join("Ffs"),
    };
    let address_file = parsed
        .workspace
        .address_file
        .as_deref()
        .map(|f| resolve(&workspace, f));

    let tools = parsed.tools.unwrap_or(ToolsToml {
        gen_fv: None,
        gen_sec: None,
        timeout_secs: None,
    });
    let tool_timeout = match tools.timeout_secs {
        Some(0) => bail!("tools.timeout_secs must be greater than zero"),
        Some(secs) => Duration::from_secs(secs),
        None => DEFAULT_TOOL_TIMEOUT,
    };

    let mut guided_tools = ToolRegistry::with_defaults();
    for (guid, tool) in parsed.guided_tools.unwrap_or_default() {
        guided_tools
            .register(&guid, tool_path(&tool))
            .with_context(|| format!("guided_tools entry '{}'", guid))?;
    }

    Ok(FdsConfig {
        dirs: BuildDirs {
            workspace,
            fv_dir,
            ffs_dir,
            address_file,
        },
        gen_fv: tool_path(tools.gen_fv.as_deref().unwrap_or(DEFAULT_GEN_FV)),
        gen_sec: tool_path(tools.gen_sec.as_deref().unwrap_or(DEFAULT_GEN_SEC)),
        tool_timeout,
        guided_tools,
    })
}

fn resolve(base: &Path, value: &str) -> PathBuf {
    let path = Path::new(value.trim());
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn tool_path(value: &str) -> PathBuf {
    PathBuf::from(value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{CRC32_GUID, LZMA_COMPRESS_GUID};
    use tempfile::TempDir;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse_config(
            "[workspace]\ndir = \"/work\"\nfv_dir = \"Build/FV\"\n",
            Path::new("/ignored"),
        )
        .unwrap();
        assert_eq!(cfg.dirs.workspace, PathBuf::from("/work"));
        assert_eq!(cfg.dirs.fv_dir, PathBuf::from("/work/Build/FV"));
        assert_eq!(cfg.dirs.ffs_dir, PathBuf::from("/work/Build/FV/Ffs"));
        assert_eq!(cfg.dirs.address_file, None);
        assert_eq!(cfg.gen_fv, PathBuf::from("GenFv"));
        assert_eq!(cfg.gen_sec, PathBuf::from("GenSec"));
        assert_eq!(cfg.tool_timeout, DEFAULT_TOOL_TIMEOUT);
        assert_eq!(cfg.guided_tools.len(), 3);
    }

    #[test]
    fn full_config_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fds.toml");
        fs::write(
            &path,
            r#"
[workspace]
dir = "edk2"
fv_dir = "Build/FV"
ffs_dir = "/abs/Ffs"
address_file = "Build/FV/FvAddress.inf"

[tools]
gen_fv = "/opt/bin/GenFv"
timeout_secs = 30

[guided_tools]
"ee4e5898-3914-4259-9d6e-dc7bd79403cf" = "/opt/bin/LzmaCompress"
"#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        let ws = tmp.path().join("edk2");
        assert_eq!(cfg.dirs.workspace, ws);
        assert_eq!(cfg.dirs.ffs_dir, PathBuf::from("/abs/Ffs"));
        assert_eq!(
            cfg.dirs.address_file,
            Some(ws.join("Build/FV/FvAddress.inf"))
        );
        assert_eq!(cfg.gen_fv, PathBuf::from("/opt/bin/GenFv"));
        assert_eq!(cfg.tool_timeout, Duration::from_secs(30));
        assert_eq!(
            cfg.guided_tools.lookup(LZMA_COMPRESS_GUID).unwrap(),
            Path::new("/opt/bin/LzmaCompress")
        );
        assert_eq!(
            cfg.guided_tools.lookup(CRC32_GUID).unwrap(),
            Path::new("GenCrc32")
        );
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        let base = Path::new("/");
        assert!(parse_config("[workspace]\ndir=\"/w\"\nfv_dir=\"F\"\nbogus=1\n", base).is_err());
        assert!(parse_config(
            "[workspace]\ndir=\"/w\"\nfv_dir=\"F\"\n[tools]\ntimeout_secs=0\n",
            base
        )
        .is_err());
        assert!(parse_config(
            "[workspace]\ndir=\"/w\"\nfv_dir=\"F\"\n[guided_tools]\n\"nope\"=\"x\"\n",
            base
        )
        .is_err());
    }
}
