use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tracing::{debug, warn};

/// Scratch space for intermediate downloads. The directory is created on
/// first use and reused afterwards; nothing here wipes it.
#[derive(Debug, Clone)]
pub struct TempStorage {
    root: PathBuf,
}

impl TempStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    /// Allocates `<nanos>-video.mp4` / `<nanos>-audio.mp4`. Nothing is created
    /// on disk beyond the scratch directory itself.
    pub async fn allocate(&self) -> std::io::Result<TempPair> {
        self.ensure_dir().await?;
        let mut stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        loop {
            let pair = TempPair {
                video: self.root.join(format!("{stamp}-video.mp4")),
                audio: self.root.join(format!("{stamp}-audio.mp4")),
            };
            if !fs::try_exists(&pair.video).await? && !fs::try_exists(&pair.audio).await? {
                debug!(video = %pair.video.display(), "allocated temp pair");
                return Ok(pair);
            }
            stamp += 1;
        }
    }
}

/// Intermediate files for one trailer. Dropping the pair keeps the files
/// on disk so failed runs can be inspected; `release` removes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempPair {
    pub video: PathBuf,
    pub audio: PathBuf,
}

impl TempPair {
    pub async fn release(self) {
        for path in [&self.video, &self.audio] {
            match fs::remove_file(path).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove temp file")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn directory_is_created_lazily_and_reused() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("temp");
        let storage = TempStorage::new(&root);
        assert!(!root.exists());

        let pair = storage.allocate().await.unwrap();
        assert!(root.is_dir());
        std::fs::write(&pair.video, b"keep").unwrap();

        storage.ensure_dir().await.unwrap();
        assert_eq!(std::fs::read(&pair.video).unwrap(), b"keep");
    }

    #[tokio::test]
    async fn names_carry_role_suffix_and_do_not_collide() {
        let base = tempfile::tempdir().unwrap();
        let storage = TempStorage::new(base.path());
        let first = storage.allocate().await.unwrap();
        std::fs::write(&first.video, b"v").unwrap();
        std::fs::write(&first.audio, b"a").unwrap();
        let second = storage.allocate().await.unwrap();

        assert_ne!(first, second);
        let name = first.video.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("-video.mp4"));
        let name = first.audio.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("-audio.mp4"));
    }

    #[tokio::test]
    async fn release_removes_both_files() {
        let base = tempfile::tempdir().unwrap();
        let storage = TempStorage::new(base.path());
        let pair = storage.allocate().await.unwrap();
        std::fs::write(&pair.video, b"v").unwrap();
        std::fs::write(&pair.audio, b"a").unwrap();
        let (video, audio) = (pair.video.clone(), pair.audio.clone());

        pair.release().await;
        assert!(!video.exists());
        assert!(!audio.exists());
    }
}
