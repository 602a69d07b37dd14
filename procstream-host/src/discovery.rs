//! Resolution of a program name to an executable path.

use crate::error::HostError;
use std::path::{Path, PathBuf};
use which::which;

/// Locates the executable for `program`.
///
/// Resolution order:
/// 1. A value containing a path separator is used as-is and must exist.
/// 2. A bare name is resolved via `$PATH`.
///
/// # Errors
///
/// Returns `HostError::ExecutableNotFound` for a missing explicit path, or
/// `HostError::WhichError` when the `$PATH` lookup fails.
pub fn resolve_program(program: &str) -> Result<PathBuf, HostError> {
    if program.trim().is_empty() {
        return Err(HostError::ExecutableNotFound(
            "program name is empty".to_string(),
        ));
    }

    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        if candidate.exists() {
            return Ok(candidate.to_path_buf());
        }
        return Err(HostError::ExecutableNotFound(format!(
            "Explicit path does not exist: {}",
            candidate.display()
        )));
    }

    Ok(which(program)?)
}
