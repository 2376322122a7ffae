//! Moving rendered artefacts out of a job's scratch directory.
//!
//! Scratch directories usually live on a tmpfs while the output directory is
//! on persistent storage, so a plain rename can fail with EXDEV.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// EXDEV on Linux and macOS.
const EXDEV: i32 = 18;

/// Move `src` to `dst`, falling back to copy + delete across filesystems.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if !src.exists() {
        return Err(MediaError::FileNotFound(src.to_path_buf()));
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(EXDEV) => {
            debug!(
                "Cross-device rename, copying instead: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_across(src, dst).await
        }
        Err(e) => Err(e.into()),
    }
}

/// Move `src` into `dir`, keeping its file name. Returns the new path.
pub async fn move_into(src: impl AsRef<Path>, dir: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let src = src.as_ref();
    let name = src
        .file_name()
        .ok_or_else(|| MediaError::internal(format!("no file name in {}", src.display())))?;
    let dst = dir.as_ref().join(name);
    move_file(src, &dst).await?;
    Ok(dst)
}

async fn copy_across(src: &Path, dst: &Path) -> MediaResult<()> {
    // Stage next to dst so the final rename stays on one filesystem.
    let staged = dst.with_extension("moving");

    if let Err(e) = fs::copy(src, &staged).await {
        let _ = fs::remove_file(&staged).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&staged, dst).await {
        let _ = fs::remove_file(&staged).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        warn!("Left source behind after cross-device move: {}: {}", src.display(), e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_file_creates_parent() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("short_01.mp4");
        let dst = dir.path().join("out").join("job").join("short_01.mp4");
        fs::write(&src, b"video").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_move_into_keeps_name_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).await.unwrap();
        fs::write(out.join("short_01.ass"), b"old").await.unwrap();

        let src = dir.path().join("short_01.ass");
        fs::write(&src, b"new").await.unwrap();

        let moved = move_into(&src, &out).await.unwrap();
        assert_eq!(moved, out.join("short_01.ass"));
        assert_eq!(fs::read(&moved).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_move_missing_source() {
        let dir = TempDir::new().unwrap();
        let result = move_file(dir.path().join("nope"), dir.path().join("dst")).await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
