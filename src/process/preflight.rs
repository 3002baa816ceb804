//! Host tool resolution.
//!
//! Tool bindings are resolved once, when the build context is created, so a
//! missing GenFv or compressor fails the build before any volume work starts.

use std::path::{Path, PathBuf};

use crate::error::{FdsError, Result};

/// Check if a command exists on the host system.
pub fn command_exists(cmd: &str) -> bool {
    resolve_program(Path::new(cmd)).is_ok()
}

/// Resolve a configured tool to an executable path.
///
/// Bare names are searched on `PATH`; anything with a directory component
/// must point at an existing file.
pub fn resolve_program(program: &Path) -> Result<PathBuf> {
    let name = program.display().to_string();
    if program.components().count() > 1 || program.is_absolute() {
        if program.is_file() {
            return Ok(program.to_path_buf());
        }
        return Err(FdsError::tool(
            name,
            format!("executable not found at '{}'", program.display()),
        ));
    }
    which::which(program).map_err(|e| FdsError::tool(name, format!("not found on PATH: {e}")))
}

/// Check that specific tools are available.
///
/// Each tuple is (command, purpose). All missing tools are reported at once.
pub fn check_required_tools(tools: &[(&Path, &str)]) -> Result<Vec<PathBuf>> {
    let mut resolved = Vec::with_capacity(tools.len());
    let mut missing = Vec::new();

    for (tool, purpose) in tools {
        match resolve_program(tool) {
            Ok(path) => resolved.push(path),
            Err(_) => missing.push((tool.display().to_string(), *purpose)),
        }
    }

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} ({})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        return Err(FdsError::tool(
            "preflight",
            format!("missing required build tools:\n{}", msg),
        ));
    }

    Ok(resolved)
}
