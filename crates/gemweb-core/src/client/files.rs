//! Attachment materialization
//!
//! Inline file bytes arriving with a request are written to temp files
//! before upload. The [`UploadGuard`] owns those files and removes them on
//! drop, so release happens unconditionally after a call regardless of its
//! outcome.

use super::extension_for_mime;
use crate::error::{GemWebError, GemWebResult};
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Owns materialized attachment files for the duration of one request
#[derive(Debug, Default)]
pub struct UploadGuard {
    files: Vec<NamedTempFile>,
    paths: Vec<PathBuf>,
}

impl UploadGuard {
    /// Paths of the materialized files, in request order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

/// Write inline attachment bytes to temp files
///
/// `mimes` is aligned to `files`; missing entries fall back to a binary
/// extension. The returned guard removes every file when dropped.
pub fn materialize_inline_files(files: &[Vec<u8>], mimes: &[String]) -> GemWebResult<UploadGuard> {
    let mut guard = UploadGuard::default();
    for (i, data) in files.iter().enumerate() {
        let ext = mimes
            .get(i)
            .map(|m| extension_for_mime(m))
            .unwrap_or("bin");
        let mut file = tempfile::Builder::new()
            .prefix("gemweb-upload-")
            .suffix(&format!(".{}", ext))
            .tempfile()
            .map_err(|e| GemWebError::io_with_path(e.to_string(), "tempdir".to_string()))?;
        file.write_all(data)
            .map_err(|e| GemWebError::io_with_path(e.to_string(), file.path().display().to_string()))?;
        file.flush()
            .map_err(|e| GemWebError::io_with_path(e.to_string(), file.path().display().to_string()))?;
        guard.paths.push(file.path().to_path_buf());
        guard.files.push(file);
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialized_files_are_released_on_drop() {
        let files = vec![b"png bytes".to_vec(), b"plain".to_vec()];
        let mimes = vec!["image/png".to_string(), "text/plain".to_string()];
        let guard = materialize_inline_files(&files, &mimes).unwrap();
        assert_eq!(guard.len(), 2);

        let paths: Vec<PathBuf> = guard.paths().to_vec();
        assert!(paths[0].to_string_lossy().ends_with(".png"));
        assert!(paths[1].to_string_lossy().ends_with(".txt"));
        assert!(paths.iter().all(|p| p.exists()));

        drop(guard);
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[test]
    fn missing_mime_falls_back_to_binary() {
        let files = vec![b"data".to_vec()];
        let guard = materialize_inline_files(&files, &[]).unwrap();
        assert!(guard.paths()[0].to_string_lossy().ends_with(".bin"));
    }
}
