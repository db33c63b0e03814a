//! 位置调度 - 把 type:path 形式的位置字符串绑定到具体后端

use crate::core::fingerprint;
use crate::core::staging::StagingArea;
use crate::error::Error;
use crate::storage::{open_storage, FileEntry, Storage};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// 位置类型，封闭集合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationKind {
    Folder,
    Archive,
    Remote,
}

impl LocationKind {
    /// 解析类型标签，大小写不敏感
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "folder" => Some(Self::Folder),
            "zip" => Some(Self::Archive),
            "ftp" => Some(Self::Remote),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Archive => "zip",
            Self::Remote => "ftp",
        }
    }
}

impl std::fmt::Display for LocationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 同步端点：位置类型 + 根路径，构造后不再变化。
/// 所有操作都是纯转发，逻辑全部在绑定的后端里。
pub struct Location {
    kind: LocationKind,
    path: String,
    storage: Arc<dyn Storage>,
}

impl std::fmt::Debug for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Location")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Location {
    /// 从 type:path 字符串构造位置。
    /// 依次检查类型标签、路径语法、可达性，任一失败返回错误。
    pub async fn parse(input: &str, staging: &StagingArea) -> Result<Self> {
        let (tag, path) = input
            .split_once(':')
            .ok_or_else(|| Error::InvalidLocation(input.to_string()))?;

        let kind = LocationKind::parse(tag)
            .ok_or_else(|| Error::InvalidLocation(format!("未知的位置类型: {}", tag)))?;

        if kind == LocationKind::Archive && !path.to_ascii_lowercase().ends_with(".zip") {
            return Err(
                Error::InvalidLocation(format!("压缩包路径必须以 .zip 结尾: {}", path)).into(),
            );
        }

        let storage = open_storage(kind, path, staging.clone())?;
        if !storage.exists().await {
            return Err(Error::LocationMissing(input.to_string()).into());
        }

        info!("位置就绪: {}", storage.name());
        Ok(Self {
            kind,
            path: path.to_string(),
            storage,
        })
    }

    pub fn kind(&self) -> LocationKind {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// 整棵树的指纹
    pub async fn fingerprint(&self) -> Result<String> {
        fingerprint::fingerprint(self.storage.as_ref()).await
    }

    /// 所有条目的规范化相对路径
    pub async fn files(&self) -> Result<Vec<String>> {
        self.storage.list().await
    }

    /// 所有条目及其内容摘要
    pub async fn files_with_digests(&self) -> Result<Vec<FileEntry>> {
        fingerprint::list_with_digests(self.storage.as_ref()).await
    }

    /// 把条目从该位置复制到暂存区
    pub async fn stage_in(&self, rel: &str) -> Result<()> {
        self.storage.stage_in(rel).await
    }

    /// 把条目从暂存区复制进该位置
    pub async fn stage_out(&self, rel: &str) -> Result<()> {
        self.storage.stage_out(rel).await
    }

    /// 删除条目（目录递归删除）
    pub async fn delete(&self, rel: &str) -> Result<()> {
        self.storage.delete(rel).await
    }

    /// 条目的最后修改时间
    pub async fn last_modified(&self, rel: &str) -> Result<String> {
        self.storage.last_modified(rel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staging_fixture(dir: &std::path::Path) -> StagingArea {
        StagingArea::new(dir.join("_staging")).unwrap()
    }

    #[test]
    fn test_kind_parse_case_insensitive() {
        assert_eq!(LocationKind::parse("Folder"), Some(LocationKind::Folder));
        assert_eq!(LocationKind::parse("ZIP"), Some(LocationKind::Archive));
        assert_eq!(LocationKind::parse("ftp"), Some(LocationKind::Remote));
        assert_eq!(LocationKind::parse("webdav"), None);
    }

    #[tokio::test]
    async fn test_parse_requires_type_tag() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_fixture(dir.path());

        assert!(Location::parse("no-colon-here", &staging).await.is_err());
        assert!(Location::parse("tape:/somewhere", &staging).await.is_err());
    }

    #[tokio::test]
    async fn test_parse_archive_requires_zip_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_fixture(dir.path());

        let err = Location::parse("zip:/data/backup.tar", &staging)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<Error>().is_some());
    }

    #[tokio::test]
    async fn test_parse_missing_folder_fails() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_fixture(dir.path());

        let input = format!("folder:{}", dir.path().join("absent").display());
        let err = Location::parse(&input, &staging).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::LocationMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_parse_existing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_fixture(dir.path());
        let tree = dir.path().join("tree");
        std::fs::create_dir_all(&tree).unwrap();

        let input = format!("folder:{}", tree.display());
        let location = Location::parse(&input, &staging).await.unwrap();
        assert_eq!(location.kind(), LocationKind::Folder);
        assert!(location.files().await.unwrap().is_empty());
    }
}
