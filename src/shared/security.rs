use crate::shared::Result;
use std::fs;
use std::path::Path;

/// Validates that a path is not a symbolic link
///
/// # Security
/// Uses `symlink_metadata()` so the link itself is inspected, not its target.
///
/// # Errors
/// Returns an error if the path is a symbolic link or if metadata cannot be read
pub fn validate_not_symlink(path: &Path, operation: &str) -> Result<()> {
    let metadata = fs::symlink_metadata(path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to read metadata for {} operation on {}: {}",
            operation,
            path.display(),
            e
        )
    })?;

    if metadata.is_symlink() {
        anyhow::bail!(
            "Security: {} is a symbolic link. For security reasons, {} operations on symbolic links are not allowed.",
            path.display(),
            operation
        );
    }

    Ok(())
}

/// Prepares the storage directory: creates it when missing, then rejects
/// symlinks and non-directories.
pub fn prepare_storage_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to create storage directory {}: {}",
                path.display(),
                e
            )
        })?;
    }

    validate_not_symlink(path, "storage")?;

    if !path.is_dir() {
        anyhow::bail!("Storage path {} is not a directory", path.display());
    }

    Ok(())
}
