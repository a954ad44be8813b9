//! Per-job scratch directories shared with the sandbox.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::job::filename::SafeFilename;

/// Prefix for workspace directory names under the workspace root.
const WORKSPACE_PREFIX: &str = "pdf2wiki-";

/// An exclusively owned, uniquely named temporary directory.
///
/// The directory is removed recursively by [`Workspace::destroy`], or by
/// `Drop` if the owning task unwinds or is cancelled first.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh directory under `root` with a random name.
    pub async fn create(root: &Path) -> io::Result<Self> {
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || Self::create_blocking(&root))
            .await
            .map_err(io::Error::other)?
    }

    fn create_blocking(root: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(root)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Persist the uploaded bytes under their sanitized name.
    pub async fn write_input(&self, name: &SafeFilename, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = name.path_in(self.path());
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Read `{base}_wikitext.txt`, or `None` if the worker never wrote it.
    pub async fn read_result(&self, name: &SafeFilename) -> io::Result<Option<String>> {
        let path = self.path().join(name.result_name());
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Result is not valid UTF-8, decoding lossily");
                    String::from_utf8_lossy(e.as_bytes()).into_owned()
                }
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove the directory and everything the sandbox left in it.
    pub fn destroy(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => tracing::debug!(workspace = %path.display(), "Workspace removed"),
            Err(e) => {
                tracing::warn!(workspace = %path.display(), "Failed to remove workspace: {}", e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn workspaces_are_unique_and_removed() {
        let root = tempfile::tempdir().unwrap();

        let a = Workspace::create(root.path()).await.unwrap();
        let b = Workspace::create(root.path()).await.unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(root.path()));

        let a_path = a.path().to_path_buf();
        let b_path = b.path().to_path_buf();
        a.destroy();
        drop(b);

        assert!(!a_path.exists());
        assert!(!b_path.exists());
    }

    #[tokio::test]
    async fn destroy_is_recursive() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).await.unwrap();
        std::fs::create_dir_all(ws.path().join("nested/deeper")).unwrap();
        std::fs::write(ws.path().join("nested/deeper/f.md"), "x").unwrap();

        let path = ws.path().to_path_buf();
        ws.destroy();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn input_and_result_roundtrip_through_disk() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).await.unwrap();
        let name = SafeFilename::parse("paper.pdf").unwrap();

        let written = ws.write_input(&name, b"%PDF-1.7").await.unwrap();
        assert_eq!(written, ws.path().join("paper.pdf"));
        assert_eq!(std::fs::read(&written).unwrap(), b"%PDF-1.7");

        assert!(ws.read_result(&name).await.unwrap().is_none());

        std::fs::write(ws.path().join("paper_wikitext.txt"), "== Title ==").unwrap();
        assert_eq!(
            ws.read_result(&name).await.unwrap().as_deref(),
            Some("== Title ==")
        );
    }

    #[tokio::test]
    async fn missing_root_is_created() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("jobs/today");
        let ws = Workspace::create(&nested).await.unwrap();
        assert!(ws.path().starts_with(&nested));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn file_in_place_of_root_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();

        let err = Workspace::create(&file).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}
