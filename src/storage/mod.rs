pub mod archive;
pub mod folder;
pub mod remote;

use crate::core::location::LocationKind;
use crate::core::staging::StagingArea;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use archive::ArchiveStorage;
pub use folder::FolderStorage;
pub use remote::RemoteStorage;

// ============ 公共常量 ============

/// 内容读取块大小（字节）
pub const CHUNK_SIZE: usize = 4096;
/// 目录条目的摘要占位值（目录没有字节内容）
pub const DIRECTORY_DIGEST: &str = "directory";

/// 文件条目：规范化相对路径 + 内容摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub digest: String,
}

impl FileEntry {
    /// 是否为目录条目
    pub fn is_dir(&self) -> bool {
        self.digest == DIRECTORY_DIGEST
    }
}

/// 规范化相对路径：统一使用 / 分隔符，去掉开头的分隔符。
/// 已规范化的路径再次处理保持不变。
pub fn canonical_path(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

/// 把 Unix 时间戳格式化为本地时间 YYYY-MM-DD HH:MM:SS
pub fn format_timestamp(epoch_secs: i64) -> String {
    Local
        .timestamp_opt(epoch_secs, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// 存储抽象接口。
/// 三种后端都通过这一个契约对外，路径一律使用规范化相对路径，
/// 目录条目以 / 结尾。
#[async_trait]
pub trait Storage: Send + Sync {
    /// 递归列出所有条目的规范化相对路径
    async fn list(&self) -> Result<Vec<String>>;

    /// 按固定大小分块读取单个文件内容并送入哈希器，返回更新后的哈希器
    async fn hash_into(&self, path: &str, hasher: blake3::Hasher) -> Result<blake3::Hasher>;

    /// 计算单个文件的内容摘要
    async fn content_hash(&self, path: &str) -> Result<String> {
        let hasher = self.hash_into(path, blake3::Hasher::new()).await?;
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// 把存储中的条目复制到暂存区
    async fn stage_in(&self, path: &str) -> Result<()>;

    /// 把暂存区中的条目写入存储
    async fn stage_out(&self, path: &str) -> Result<()>;

    /// 删除文件或目录（目录递归删除）
    async fn delete(&self, path: &str) -> Result<()>;

    /// 条目的最后修改时间，格式 YYYY-MM-DD HH:MM:SS（本地时区）
    async fn last_modified(&self, path: &str) -> Result<String>;

    /// 检查位置本身是否存在/可达。
    /// 连接失败视为不存在，不作为硬错误。
    async fn exists(&self) -> bool;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 根据位置类型创建存储实例
pub fn open_storage(
    kind: LocationKind,
    path: &str,
    staging: StagingArea,
) -> Result<Arc<dyn Storage>> {
    match kind {
        LocationKind::Folder => {
            tracing::info!("初始化目录存储: {}", path);
            Ok(Arc::new(FolderStorage::new(path, staging)) as Arc<dyn Storage>)
        }
        LocationKind::Archive => {
            tracing::info!("初始化压缩包存储: {}", path);
            Ok(Arc::new(ArchiveStorage::new(path, staging)) as Arc<dyn Storage>)
        }
        LocationKind::Remote => {
            tracing::info!("初始化 FTP 存储");
            Ok(Arc::new(RemoteStorage::new(path, staging)?) as Arc<dyn Storage>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_path_idempotent() {
        let once = canonical_path("sub\\dir\\file.txt");
        let twice = canonical_path(&once);
        assert_eq!(once, "sub/dir/file.txt");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_canonical_path_separator_equivalence() {
        assert_eq!(
            canonical_path("sub\\dir\\file.txt"),
            canonical_path("sub/dir/file.txt")
        );
        assert_eq!(canonical_path("/leading/slash"), "leading/slash");
    }

    #[test]
    fn test_file_entry_is_dir() {
        let dir = FileEntry {
            path: "sub/".to_string(),
            digest: DIRECTORY_DIGEST.to_string(),
        };
        let file = FileEntry {
            path: "a.txt".to_string(),
            digest: "00".repeat(32),
        };
        assert!(dir.is_dir());
        assert!(!file.is_dir());
    }

    #[test]
    fn test_format_timestamp_shape() {
        let formatted = format_timestamp(1612706538);
        assert_eq!(formatted.len(), 19);
        assert_eq!(&formatted[4..5], "-");
        assert_eq!(&formatted[10..11], " ");
        assert_eq!(&formatted[13..14], ":");
    }
}
