//! Contains a collection of useful utility functions.

use std::fs::read;
use std::path::{Path, PathBuf};

use crate::Result;

/// Create a static deser object from given path using serde.
pub fn deser_struct_from_path<T>(file_path: PathBuf) -> Result<T>
where
    for<'de> T: serde::Deserialize<'de>,
{
    let bytes = read(&file_path)?;
    let d: T = toml::from_slice(&bytes)?;
    Ok(d)
}

/// Canonicalizes the given path, falling back to the input on failure.
pub fn canonical(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
