use super::{Storage, CHUNK_SIZE};
use crate::core::staging::StagingArea;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// 打开压缩包的最大尝试次数
const OPEN_ATTEMPTS: u32 = 5;
/// 两次尝试之间的间隔
const OPEN_BACKOFF: Duration = Duration::from_millis(200);

/// ZIP 压缩包存储。
/// 压缩包格式只支持追加和整体重写，删除通过重建实现。
pub struct ArchiveStorage {
    archive_path: PathBuf,
    staging: StagingArea,
    name: String,
}

/// 打开压缩包读取中央目录。
/// 压缩包可能正被自身的重写短暂占用，带上限重试，
/// 超过次数后返回 ArchiveUnreadable。
fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let mut last_err = None;
    for attempt in 0..OPEN_ATTEMPTS {
        if attempt > 0 {
            std::thread::sleep(OPEN_BACKOFF);
        }
        let result = File::open(path)
            .map_err(anyhow::Error::from)
            .and_then(|file| ZipArchive::new(file).map_err(anyhow::Error::from));
        match result {
            Ok(archive) => return Ok(archive),
            Err(e) => last_err = Some(e),
        }
    }
    tracing::warn!(
        "压缩包打开失败 {} 次: {:?}, 最后错误: {}",
        OPEN_ATTEMPTS,
        path,
        last_err.unwrap_or_else(|| anyhow::anyhow!("unknown"))
    );
    Err(Error::ArchiveUnreadable(path.to_path_buf()).into())
}

impl ArchiveStorage {
    pub fn new(path: &str, staging: StagingArea) -> Self {
        let archive_path = PathBuf::from(path);
        let name = format!("zip:{}", path);
        Self {
            archive_path,
            staging,
            name,
        }
    }

    /// 压缩包内是否已有同名条目
    async fn contains(&self, path: &str) -> Result<bool> {
        let entries = self.list().await?;
        Ok(entries.iter().any(|p| p == path))
    }
}

#[async_trait]
impl Storage for ArchiveStorage {
    async fn list(&self) -> Result<Vec<String>> {
        let archive_path = self.archive_path.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let archive = open_archive(&archive_path)?;
            Ok(archive.file_names().map(|n| n.to_string()).collect())
        })
        .await?
    }

    async fn hash_into(&self, path: &str, mut hasher: blake3::Hasher) -> Result<blake3::Hasher> {
        let archive_path = self.archive_path.clone();
        let entry = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<blake3::Hasher> {
            let mut archive = open_archive(&archive_path)?;
            let mut file = archive.by_name(&entry)?;
            let mut buf = [0u8; CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(hasher)
        })
        .await?
    }

    async fn stage_in(&self, path: &str) -> Result<()> {
        if path.ends_with('/') {
            return self.staging.ensure_dir(path).await;
        }

        let archive_path = self.archive_path.clone();
        let entry = path.to_string();
        let dest = self.staging.resolve(path);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut archive = open_archive(&archive_path)?;
            let mut file = archive.by_name(&entry)?;
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&dest)?;
            std::io::copy(&mut file, &mut out)?;
            Ok(())
        })
        .await?
    }

    async fn stage_out(&self, path: &str) -> Result<()> {
        if path.ends_with('/') {
            // 目录在压缩包内通过条目名前缀隐式存在，不写显式目录条目
            return Ok(());
        }

        // 同名旧条目先删除，避免出现重复的逻辑条目
        if self.archive_path.exists() && self.contains(path).await? {
            self.delete(path).await?;
        }

        let archive_path = self.archive_path.clone();
        let entry = path.to_string();
        let source = self.staging.resolve(path);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut writer = if archive_path.exists() {
                let file = std::fs::OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&archive_path)?;
                ZipWriter::new_append(file)?
            } else {
                ZipWriter::new(File::create(&archive_path)?)
            };
            let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
            writer.start_file(entry, options)?;
            let mut input = File::open(&source)?;
            std::io::copy(&mut input, &mut writer)?;
            writer.finish()?;
            Ok(())
        })
        .await?
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let archive_path = self.archive_path.clone();
        let prefix = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut source = open_archive(&archive_path)?;

            // 重建进临时文件，完整写成后再替换原文件，
            // 中途失败时原压缩包保持原样
            let temp_path = archive_path.with_extension("rewrite");
            let rebuild = (|| -> Result<()> {
                let mut writer = ZipWriter::new(File::create(&temp_path)?);
                for index in 0..source.len() {
                    let entry = source.by_index_raw(index)?;
                    // 前缀匹配：精确文件名，或目录名下的全部条目
                    if entry.name().starts_with(&prefix) {
                        continue;
                    }
                    writer.raw_copy_file(entry)?;
                }
                writer.finish()?;
                Ok(())
            })();

            if let Err(e) = rebuild {
                let _ = std::fs::remove_file(&temp_path);
                return Err(e);
            }
            std::fs::rename(&temp_path, &archive_path)?;
            Ok(())
        })
        .await?
    }

    async fn last_modified(&self, path: &str) -> Result<String> {
        let archive_path = self.archive_path.clone();
        let entry = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<String> {
            let mut archive = open_archive(&archive_path)?;
            let file = archive.by_name(&entry)?;
            let t = file.last_modified();
            Ok(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                t.year(),
                t.month(),
                t.day(),
                t.hour(),
                t.minute(),
                t.second()
            ))
        })
        .await?
    }

    async fn exists(&self) -> bool {
        self.archive_path.is_file()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
