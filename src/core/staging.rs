//! 暂存区 - 跨后端传输的本地中转目录

use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 暂存区。任意两个后端之间的文件交换都以这里为中转，
/// 源后端 stage_in 写入，目标后端 stage_out 读出。
/// 没有并发保护，同一暂存区同一时间只允许一次传输使用。
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// 创建暂存区，根目录不存在时自动创建
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 把规范化相对路径映射到暂存区下的绝对路径
    pub fn resolve(&self, rel: &str) -> PathBuf {
        self.root.join(rel.trim_end_matches('/'))
    }

    /// 在暂存区内创建目录，已存在时为空操作
    pub async fn ensure_dir(&self, rel: &str) -> Result<()> {
        fs::create_dir_all(self.resolve(rel)).await?;
        Ok(())
    }

    /// 清空暂存区，保留根目录本身
    pub async fn clear(&self) -> Result<()> {
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(entry.path()).await?;
            } else {
                fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_strips_trailing_slash() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path()).unwrap();

        assert_eq!(staging.resolve("sub/"), dir.path().join("sub"));
        assert_eq!(
            staging.resolve("sub/file.txt"),
            dir.path().join("sub/file.txt")
        );
    }

    #[tokio::test]
    async fn test_ensure_dir_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path().join("stage")).unwrap();

        staging.ensure_dir("a/b/").await.unwrap();
        tokio::fs::write(staging.resolve("a/b/f.txt"), b"x")
            .await
            .unwrap();
        assert!(staging.resolve("a/b/f.txt").exists());

        staging.clear().await.unwrap();
        assert!(staging.root().exists());
        assert!(!staging.resolve("a").exists());
    }
}
