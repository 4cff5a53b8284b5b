use std::collections::HashSet;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::fs;

/// Persistence for uploaded resume files, addressed by relative keys such as
/// `{job_id}/{application_id}/{freelancer_id}_{filename}`.
#[async_trait]
pub trait ArtifactStore: Send + Sync + 'static {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// `None` when nothing is stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn list(&self) -> Result<Vec<String>>;
}

pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            bail!("invalid artifact key {key:?}");
        }
        Ok(self.root.join(relative))
    }

    /// Stored keys missing from `referenced` whose files were last written
    /// before `cutoff`. Newer files may belong to a submission whose row is
    /// not inserted yet.
    pub async fn unreferenced(
        &self,
        referenced: &HashSet<String>,
        cutoff: SystemTime,
    ) -> Result<Vec<String>> {
        let mut orphans = Vec::new();
        for key in self.list().await? {
            if referenced.contains(&key) {
                continue;
            }
            let path = self.resolve(&key)?;
            let modified = match fs::metadata(&path).await.and_then(|meta| meta.modified()) {
                Ok(modified) => modified,
                Err(err) if err.kind() == IoErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to stat artifact {key}"))
                }
            };
            if modified < cutoff {
                orphans.push(key);
            }
        }
        Ok(orphans)
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write artifact {key}"))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read artifact {key}")),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to delete artifact {key}")),
        }
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == IoErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to list {}", dir.display()))
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_creates_directories_and_get_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().join("uploads"));

        store.put("job-1/user_cv.pdf", b"%PDF".to_vec()).await.unwrap();

        assert_eq!(
            store.get("job-1/user_cv.pdf").await.unwrap(),
            Some(b"%PDF".to_vec())
        );
        assert_eq!(store.list().await.unwrap(), vec!["job-1/user_cv.pdf"]);
    }

    #[tokio::test]
    async fn missing_artifacts_read_as_none_and_delete_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());

        assert_eq!(store.get("nope/cv.pdf").await.unwrap(), None);
        store.delete("nope/cv.pdf").await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_keys_escaping_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());

        assert!(store.put("../escape.txt", vec![1]).await.is_err());
        assert!(store.put("/etc/passwd", vec![1]).await.is_err());
        assert!(store.get("").await.is_err());
    }

    #[tokio::test]
    async fn unreferenced_skips_recent_and_referenced_files() {
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        store.put("job/app-1/kept.pdf", vec![1]).await.unwrap();
        store.put("job/app-2/orphan.pdf", vec![2]).await.unwrap();
        let referenced: HashSet<String> = ["job/app-1/kept.pdf".to_string()].into();

        let later = SystemTime::now() + Duration::from_secs(3600);
        assert_eq!(
            store.unreferenced(&referenced, later).await.unwrap(),
            vec!["job/app-2/orphan.pdf"]
        );

        let earlier = SystemTime::now() - Duration::from_secs(3600);
        assert!(store
            .unreferenced(&referenced, earlier)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn list_on_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().join("never-created"));
        assert!(store.list().await.unwrap().is_empty());
    }
}
