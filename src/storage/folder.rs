use super::{canonical_path, format_timestamp, Storage, CHUNK_SIZE};
use crate::core::staging::StagingArea;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncReadExt;
use walkdir::WalkDir;

/// 本地目录存储
pub struct FolderStorage {
    root: PathBuf,
    staging: StagingArea,
    name: String,
}

impl FolderStorage {
    pub fn new(path: &str, staging: StagingArea) -> Self {
        let root = PathBuf::from(path);
        let name = format!("folder:{}", path);
        Self {
            root,
            staging,
            name,
        }
    }

    fn resolve(&self, rel: &str) -> PathBuf {
        self.root.join(rel.trim_end_matches('/'))
    }
}

#[async_trait]
impl Storage for FolderStorage {
    async fn list(&self) -> Result<Vec<String>> {
        let root = self.root.clone();

        // walkdir 是同步库，放到 spawn_blocking 里执行
        let entries = tokio::task::spawn_blocking(move || {
            WalkDir::new(&root)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter_map(|entry| {
                    let rel = entry.path().strip_prefix(&root).ok()?.to_str()?.to_string();

                    // 跳过根目录本身
                    if rel.is_empty() {
                        return None;
                    }

                    let rel = canonical_path(&rel);
                    if entry.file_type().is_dir() {
                        Some(format!("{}/", rel))
                    } else {
                        Some(rel)
                    }
                })
                .collect::<Vec<_>>()
        })
        .await?;

        Ok(entries)
    }

    async fn hash_into(&self, path: &str, mut hasher: blake3::Hasher) -> Result<blake3::Hasher> {
        let mut file = fs::File::open(self.resolve(path)).await?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher)
    }

    async fn stage_in(&self, path: &str) -> Result<()> {
        if path.ends_with('/') {
            return self.staging.ensure_dir(path).await;
        }

        let dest = self.staging.resolve(path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(self.resolve(path), &dest).await?;
        Ok(())
    }

    async fn stage_out(&self, path: &str) -> Result<()> {
        if path.ends_with('/') {
            fs::create_dir_all(self.resolve(path)).await?;
            return Ok(());
        }

        let dest = self.resolve(path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(self.staging.resolve(path), &dest).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);

        if !full.exists() {
            return Ok(());
        }

        if full.is_dir() {
            fs::remove_dir_all(&full).await?;
        } else {
            fs::remove_file(&full).await?;
        }

        Ok(())
    }

    async fn last_modified(&self, path: &str) -> Result<String> {
        let metadata = fs::metadata(self.resolve(path)).await?;
        let epoch = metadata
            .modified()?
            .duration_since(std::time::UNIX_EPOCH)?
            .as_secs() as i64;
        Ok(format_timestamp(epoch))
    }

    async fn exists(&self) -> bool {
        self.root.is_dir()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
