//! Candidate-file discovery inside a finished download

use reelvault_core::error::{ReelvaultError, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tracing::debug;

/// Video extensions considered for import.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "wmv", "mov", "flv", "m4v", "mpg", "mpeg", "ts", "webm",
];

/// Name fragments that mark a file as a sample.
pub const SAMPLE_INDICATORS: &[&str] = &["sample", "preview", "trailer"];

/// Files below this size are skipped as samples.
pub const SAMPLE_SIZE_BYTES: i64 = 150 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub size_bytes: i64,
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn looks_like_sample(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_lowercase();
    SAMPLE_INDICATORS.iter().any(|s| name.contains(s))
}

/// Enumerate importable video files under `path` (a file or a directory).
/// Sample-sized and sample-named files are skipped.
pub async fn scan_candidates(path: &Path) -> Result<Vec<CandidateFile>> {
    let metadata = fs::metadata(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            ReelvaultError::not_found(format!("download path {}", path.display()))
        }
        std::io::ErrorKind::PermissionDenied => ReelvaultError::PermissionDenied {
            path: path.display().to_string(),
            message: e.to_string(),
        },
        _ => ReelvaultError::internal(format!("stat {}: {}", path.display(), e)),
    })?;

    let mut candidates = Vec::new();
    if metadata.is_file() {
        consider(path.to_path_buf(), metadata.len() as i64, &mut candidates);
    } else {
        walk(path.to_path_buf(), &mut candidates).await?;
    }
    candidates.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes).then(a.path.cmp(&b.path)));
    Ok(candidates)
}

fn consider(path: PathBuf, size_bytes: i64, candidates: &mut Vec<CandidateFile>) {
    if !is_video(&path) {
        return;
    }
    if looks_like_sample(&path) || size_bytes < SAMPLE_SIZE_BYTES {
        debug!(path = %path.display(), size_bytes, "skipping sample-like file");
        return;
    }
    candidates.push(CandidateFile { path, size_bytes });
}

fn walk<'a>(
    dir: PathBuf,
    candidates: &'a mut Vec<CandidateFile>,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| ReelvaultError::internal(format!("read {}: {}", dir.display(), e)))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ReelvaultError::internal(format!("read {}: {}", dir.display(), e)))?
        {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if metadata.is_dir() {
                walk(path, candidates).await?;
            } else {
                consider(path, metadata.len() as i64, candidates);
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn touch(path: &Path, size: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.unwrap();
        }
        fs::write(path, vec![0u8; size]).await.unwrap();
    }

    #[tokio::test]
    async fn finds_the_main_video_and_skips_samples() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("Movie.2020.1080p/movie.mkv"), 200 * 1024 * 1024).await;
        touch(&root.join("Movie.2020.1080p/sample.mkv"), 200 * 1024 * 1024).await;
        touch(&root.join("Movie.2020.1080p/tiny.mkv"), 1024).await;
        touch(&root.join("Movie.2020.1080p/notes.nfo"), 1024).await;

        let found = scan_candidates(root).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].path.ends_with("movie.mkv"));
        assert_eq!(found[0].size_bytes, 200 * 1024 * 1024);
    }

    #[tokio::test]
    async fn accepts_a_single_file_path() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("movie.mp4");
        touch(&file, 200 * 1024 * 1024).await;
        let found = scan_candidates(&file).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn missing_path_is_not_found() {
        let result = scan_candidates(Path::new("/definitely/not/here")).await;
        assert!(matches!(result, Err(ReelvaultError::NotFound { .. })));
    }

    #[tokio::test]
    async fn biggest_file_sorts_first() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("a.mkv"), 160 * 1024 * 1024).await;
        touch(&root.join("b.mkv"), 300 * 1024 * 1024).await;
        let found = scan_candidates(root).await.unwrap();
        assert!(found[0].path.ends_with("b.mkv"));
    }
}
