use super::{canonical_path, Storage, CHUNK_SIZE};
use crate::core::staging::StagingArea;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, TimeZone, Utc};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};

/// FTP 位置连接信息，解析自 username:password@host/remote/path 形式的 URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpLocation {
    pub host: String,
    pub username: String,
    pub password: String,
    /// 服务器上的根路径，始终以 / 开头，除根目录外不带结尾 /
    pub root: String,
}

impl FtpLocation {
    /// 解析 FTP 位置 URL。
    /// @ 之前是 username:password，@ 之后到第一个 / 是主机，
    /// 余下部分是服务器上的根路径；用户名密码允许百分号编码。
    pub fn parse(url: &str) -> Result<Self> {
        let (credentials, rest) = url
            .split_once('@')
            .ok_or_else(|| Error::InvalidLocation(format!("FTP 地址缺少 @: {}", url)))?;
        let (username, password) = credentials
            .split_once(':')
            .ok_or_else(|| Error::InvalidLocation(format!("FTP 地址缺少用户名或密码: {}", url)))?;
        let (host, path) = match rest.split_once('/') {
            Some((host, path)) => (host, format!("/{}", path)),
            None => (rest, "/".to_string()),
        };
        if host.is_empty() {
            return Err(Error::InvalidLocation(format!("FTP 地址缺少主机: {}", url)).into());
        }

        // 未写端口时默认 21
        let host = if host.contains(':') {
            host.to_string()
        } else {
            format!("{}:21", host)
        };
        let root = if path == "/" {
            path
        } else {
            path.trim_end_matches('/').to_string()
        };

        Ok(Self {
            host,
            username: urlencoding::decode(username)?.into_owned(),
            password: urlencoding::decode(password)?.into_owned(),
            root,
        })
    }

    /// 把规范化相对路径映射到服务器上的绝对路径
    pub fn remote_path(&self, rel: &str) -> String {
        let rel = rel.trim_end_matches('/');
        if self.root == "/" {
            format!("/{}", rel)
        } else {
            format!("{}/{}", self.root, rel)
        }
    }
}

/// FTP 远程存储。
/// 每个顶层操作新建一条连接，结束后显式关闭，不做连接复用。
pub struct RemoteStorage {
    location: FtpLocation,
    staging: StagingArea,
    name: String,
}

impl RemoteStorage {
    pub fn new(url: &str, staging: StagingArea) -> Result<Self> {
        let location = FtpLocation::parse(url)?;
        let name = format!("ftp://{}{}", location.host, location.root);
        Ok(Self {
            location,
            staging,
            name,
        })
    }
}

/// 建立并登录一条新连接，失败映射为 Connect 错误
fn connect(location: &FtpLocation) -> Result<FtpStream> {
    let mut ftp = FtpStream::connect(&location.host)
        .map_err(|e| Error::Connect(format!("{}: {}", location.host, e)))?;
    ftp.login(&location.username, &location.password)
        .map_err(|e| Error::Connect(format!("{}: {}", location.host, e)))?;
    ftp.transfer_type(FileType::Binary)?;
    Ok(ftp)
}

fn parse_list_line(line: &str) -> Result<suppaftp::list::File> {
    suppaftp::list::File::try_from(line)
        .map_err(|e| anyhow::anyhow!("无法解析 FTP 列表行 {:?}: {}", line, e))
}

/// 从 dir 开始递归走目录树，收集相对 base 的规范化路径
fn walk(ftp: &mut FtpStream, base: &str, dir: &str, out: &mut Vec<String>) -> Result<()> {
    let lines = ftp.list(Some(dir))?;
    for line in lines {
        let entry = parse_list_line(&line)?;
        let name = entry.name();
        if name == "." || name == ".." {
            continue;
        }
        let full = if dir == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", dir, name)
        };
        let rel = canonical_path(full.strip_prefix(base).unwrap_or(&full));
        if entry.is_directory() {
            out.push(format!("{}/", rel));
            walk(ftp, base, &full, out)?;
        } else {
            out.push(rel);
        }
    }
    Ok(())
}

/// 逐级创建远端目录链，已存在的层级直接忽略
fn make_remote_dirs(ftp: &mut FtpStream, path: &str) {
    let mut current = String::new();
    for part in path.split('/').filter(|p| !p.is_empty()) {
        current.push('/');
        current.push_str(part);
        let _ = ftp.mkdir(&current);
    }
}

/// 深度优先删除远端目录树
fn remove_remote_tree(ftp: &mut FtpStream, dir: &str) -> Result<()> {
    let lines = ftp.list(Some(dir))?;
    for line in lines {
        let entry = parse_list_line(&line)?;
        let name = entry.name();
        if name == "." || name == ".." {
            continue;
        }
        let full = format!("{}/{}", dir.trim_end_matches('/'), name);
        if entry.is_directory() {
            remove_remote_tree(ftp, &full)?;
        } else {
            ftp.rm(&full)?;
        }
    }
    ftp.rmdir(dir)?;
    Ok(())
}

#[async_trait]
impl Storage for RemoteStorage {
    async fn list(&self) -> Result<Vec<String>> {
        let location = self.location.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let mut ftp = connect(&location)?;
            let mut out = Vec::new();
            walk(&mut ftp, &location.root, &location.root, &mut out)?;
            let _ = ftp.quit();
            Ok(out)
        })
        .await?
    }

    async fn hash_into(&self, path: &str, mut hasher: blake3::Hasher) -> Result<blake3::Hasher> {
        let location = self.location.clone();
        let remote = self.location.remote_path(path);
        tokio::task::spawn_blocking(move || -> Result<blake3::Hasher> {
            let mut ftp = connect(&location)?;

            // 服务器不提供流式哈希，整体下载到一次性临时文件再分块读取
            let mut temp = tempfile::NamedTempFile::new()?;
            ftp.retr(&remote, |reader| {
                std::io::copy(reader, temp.as_file_mut()).map_err(FtpError::ConnectionError)?;
                Ok(())
            })?;
            let _ = ftp.quit();

            let file = temp.as_file_mut();
            file.seek(SeekFrom::Start(0))?;
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

        let location = self.location.clone();
        let remote = self.location.remote_path(path);
        let dest = self.staging.resolve(path);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut ftp = connect(&location)?;
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&dest)?;
            ftp.retr(&remote, |reader| {
                std::io::copy(reader, &mut out).map_err(FtpError::ConnectionError)?;
                Ok(())
            })?;
            let _ = ftp.quit();
            Ok(())
        })
        .await?
    }

    async fn stage_out(&self, path: &str) -> Result<()> {
        let location = self.location.clone();
        let remote = self.location.remote_path(path);
        let is_dir = path.ends_with('/');
        let source = self.staging.resolve(path);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut ftp = connect(&location)?;
            if is_dir {
                make_remote_dirs(&mut ftp, &remote);
            } else {
                // 先确保远端父目录链存在
                if let Some((parent, _)) = remote.rsplit_once('/') {
                    if !parent.is_empty() {
                        make_remote_dirs(&mut ftp, parent);
                    }
                }
                let mut input = File::open(&source)?;
                ftp.put_file(&remote, &mut input)?;
            }
            let _ = ftp.quit();
            Ok(())
        })
        .await?
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let location = self.location.clone();
        let remote = self.location.remote_path(path);
        let is_dir = path.ends_with('/');
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut ftp = connect(&location)?;
            if is_dir {
                remove_remote_tree(&mut ftp, &remote)?;
            } else {
                ftp.rm(&remote)?;
            }
            let _ = ftp.quit();
            Ok(())
        })
        .await?
    }

    async fn last_modified(&self, path: &str) -> Result<String> {
        let location = self.location.clone();
        let remote = self.location.remote_path(path);
        tokio::task::spawn_blocking(move || -> Result<String> {
            let mut ftp = connect(&location)?;
            let modified = ftp.mdtm(&remote)?;
            let _ = ftp.quit();

            // MDTM 返回 UTC，转成本地时间展示
            let local = Utc.from_utc_datetime(&modified).with_timezone(&Local);
            Ok(local.format("%Y-%m-%d %H:%M:%S").to_string())
        })
        .await?
    }

    async fn exists(&self) -> bool {
        let location = self.location.clone();
        // 连接或登录失败视为位置不存在
        tokio::task::spawn_blocking(move || match connect(&location) {
            Ok(mut ftp) => {
                let _ = ftp.quit();
                true
            }
            Err(_) => false,
        })
        .await
        .unwrap_or(false)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_url() {
        let location = FtpLocation::parse("alice:secret@files.example.com/pub/data").unwrap();
        assert_eq!(location.host, "files.example.com:21");
        assert_eq!(location.username, "alice");
        assert_eq!(location.password, "secret");
        assert_eq!(location.root, "/pub/data");
    }

    #[test]
    fn test_parse_keeps_explicit_port() {
        let location = FtpLocation::parse("u:p@host:2121/data").unwrap();
        assert_eq!(location.host, "host:2121");
    }

    #[test]
    fn test_parse_defaults_to_server_root() {
        let location = FtpLocation::parse("u:p@host").unwrap();
        assert_eq!(location.root, "/");
        assert_eq!(location.remote_path("f.txt"), "/f.txt");
    }

    #[test]
    fn test_parse_decodes_credentials() {
        let location = FtpLocation::parse("user%40mail:p%23ss@host/d").unwrap();
        assert_eq!(location.username, "user@mail");
        assert_eq!(location.password, "p#ss");
    }

    #[test]
    fn test_parse_rejects_malformed_urls() {
        assert!(FtpLocation::parse("no-credentials-here/path").is_err());
        assert!(FtpLocation::parse("user-without-password@host/path").is_err());
        assert!(FtpLocation::parse("u:p@/path").is_err());
    }

    #[test]
    fn test_remote_path_join() {
        let location = FtpLocation::parse("u:p@host/pub").unwrap();
        assert_eq!(location.remote_path("sub/f.txt"), "/pub/sub/f.txt");
        // 目录的结尾分隔符不进入服务器路径
        assert_eq!(location.remote_path("sub/"), "/pub/sub");
    }
}
