//! File transfer for imports
//!
//! Preference order is hardlink → copy → move, falling back on error.
//! Copies land in a `.partial~` temp sibling, get fsynced, then rename
//! atomically into the final name. A move is copy-then-fsync-then-unlink;
//! never an in-place rename across filesystems.

use reelvault_core::error::{ReelvaultError, Result};
use reelvault_core::models::ImportMechanism;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// How the file actually reached its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Hardlinked,
    Copied,
    Moved,
}

fn fs_error(path: &Path, err: std::io::Error) -> ReelvaultError {
    match err.kind() {
        std::io::ErrorKind::NotFound => {
            ReelvaultError::not_found(format!("file {}", path.display()))
        }
        std::io::ErrorKind::PermissionDenied => ReelvaultError::PermissionDenied {
            path: path.display().to_string(),
            message: err.to_string(),
        },
        _ => ReelvaultError::internal(format!("{}: {}", path.display(), err)),
    }
}

fn partial_sibling(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("import");
    destination.with_file_name(format!(".{}.partial~", name))
}

/// Copy `source` into place via a temp sibling with an fsync before the
/// final atomic rename.
async fn copy_into_place(source: &Path, destination: &Path) -> Result<()> {
    let partial = partial_sibling(destination);
    fs::copy(source, &partial)
        .await
        .map_err(|e| fs_error(source, e))?;

    // Data must be durable before the rename makes it visible.
    let file = fs::File::open(&partial)
        .await
        .map_err(|e| fs_error(&partial, e))?;
    file.sync_all().await.map_err(|e| fs_error(&partial, e))?;
    drop(file);

    fs::rename(&partial, destination)
        .await
        .map_err(|e| fs_error(destination, e))?;
    Ok(())
}

/// Transfer `source` to `destination` honoring the configured mechanism,
/// falling back hardlink → copy → move on errors.
pub async fn transfer_file(
    source: &Path,
    destination: &Path,
    mechanism: ImportMechanism,
) -> Result<TransferOutcome> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| fs_error(parent, e))?;
    }

    if mechanism == ImportMechanism::Hardlink {
        match fs::hard_link(source, destination).await {
            Ok(()) => {
                debug!(
                    source = %source.display(),
                    destination = %destination.display(),
                    "hardlinked"
                );
                return Ok(TransferOutcome::Hardlinked);
            }
            Err(e) => {
                // Cross-device links and permission refusals fall back to a
                // copy; the seed file keeps seeding either way.
                warn!(
                    source = %source.display(),
                    "hardlink failed ({}), falling back to copy", e
                );
            }
        }
    }

    copy_into_place(source, destination).await?;

    if mechanism == ImportMechanism::Move {
        fs::remove_file(source)
            .await
            .map_err(|e| fs_error(source, e))?;
        debug!(source = %source.display(), destination = %destination.display(), "moved");
        return Ok(TransferOutcome::Moved);
    }
    debug!(source = %source.display(), destination = %destination.display(), "copied");
    Ok(TransferOutcome::Copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn hardlink_shares_the_inode() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.mkv");
        let destination = dir.path().join("library/movie.mkv");
        fs::write(&source, b"data").await.unwrap();

        let outcome = transfer_file(&source, &destination, ImportMechanism::Hardlink)
            .await
            .unwrap();
        assert_eq!(outcome, TransferOutcome::Hardlinked);
        assert!(source.exists());
        assert_eq!(fs::read(&destination).await.unwrap(), b"data");

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let a = std::fs::metadata(&source).unwrap();
            let b = std::fs::metadata(&destination).unwrap();
            assert_eq!(a.ino(), b.ino());
        }
    }

    #[tokio::test]
    async fn copy_keeps_the_source_and_leaves_no_partial() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.mkv");
        let destination = dir.path().join("library/movie.mkv");
        fs::write(&source, b"payload").await.unwrap();

        let outcome = transfer_file(&source, &destination, ImportMechanism::Copy)
            .await
            .unwrap();
        assert_eq!(outcome, TransferOutcome::Copied);
        assert!(source.exists());
        assert_eq!(fs::read(&destination).await.unwrap(), b"payload");
        assert!(!partial_sibling(&destination).exists());
    }

    #[tokio::test]
    async fn move_unlinks_the_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.mkv");
        let destination = dir.path().join("library/movie.mkv");
        fs::write(&source, b"payload").await.unwrap();

        let outcome = transfer_file(&source, &destination, ImportMechanism::Move)
            .await
            .unwrap();
        assert_eq!(outcome, TransferOutcome::Moved);
        assert!(!source.exists());
        assert_eq!(fs::read(&destination).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn missing_source_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = transfer_file(
            &dir.path().join("nope.mkv"),
            &dir.path().join("out.mkv"),
            ImportMechanism::Copy,
        )
        .await;
        assert!(matches!(result, Err(ReelvaultError::NotFound { .. })));
    }
}
