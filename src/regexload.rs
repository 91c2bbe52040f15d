//! Loads the adult-content regex source string from a text file.

use std::path::Path;

use crate::errors::{Result, SetupError};

/// Read the first line of `path` that contains a non-whitespace character,
/// strip leading/trailing whitespace, and return it as a regex source
/// string. The regex itself is never compiled here; the caller picks the
/// engine.
pub fn load(path: &Path) -> Result<String> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| SetupError(format!("cannot read regex file {}: {e}", path.display())))?;

    let line = contents
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty());

    match line {
        Some(l) => Ok(l.to_string()),
        None => Err(SetupError(format!("regex file {} is empty", path.display())).into()),
    }
}
