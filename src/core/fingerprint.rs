//! 指纹引擎 - 为整棵目录树计算单一内容摘要

use crate::storage::{FileEntry, Storage, DIRECTORY_DIGEST};
use anyhow::Result;

/// 计算整个位置的指纹。
/// 第一遍把排好序的相对路径（含目录条目）送入哈希器，
/// 第二遍按同样顺序把每个文件的内容分块送入同一个哈希器。
/// 路径集合和字节内容都相同的两棵树无论后端为何、枚举顺序如何，
/// 都得到相同指纹；空位置得到空字节流的摘要。
pub async fn fingerprint(storage: &dyn Storage) -> Result<String> {
    let mut paths = storage.list().await?;
    paths.sort();

    let mut hasher = blake3::Hasher::new();
    for path in &paths {
        hasher.update(path.as_bytes());
    }
    // 目录没有字节内容，内容阶段只处理文件
    for path in paths.iter().filter(|p| !p.ends_with('/')) {
        hasher = storage.hash_into(path, hasher).await?;
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// 列出位置下的所有条目及其内容摘要。
/// 目录条目不做哈希，用占位值标记。
pub async fn list_with_digests(storage: &dyn Storage) -> Result<Vec<FileEntry>> {
    let paths = storage.list().await?;
    let mut entries = Vec::with_capacity(paths.len());
    for path in paths {
        let digest = if path.ends_with('/') {
            DIRECTORY_DIGEST.to_string()
        } else {
            storage.content_hash(&path).await?
        };
        entries.push(FileEntry { path, digest });
    }
    Ok(entries)
}
