//! 错误类型定义

use std::path::PathBuf;
use thiserror::Error;

/// 需要调用方区分处理的错误。
/// 其余 I/O / 协议错误直接通过 anyhow 向上传播。
#[derive(Debug, Error)]
pub enum Error {
    /// 位置字符串不合法（类型标签未知或路径语法不对）
    #[error("无效的位置: {0}")]
    InvalidLocation(String),

    /// 位置本身不存在或不可达，属于正常的缺失状态
    #[error("位置不存在或不可达: {0}")]
    LocationMissing(String),

    /// 压缩包重试多次后仍然无法打开
    #[error("压缩包无法读取: {0:?}")]
    ArchiveUnreadable(PathBuf),

    /// FTP 连接或登录失败
    #[error("FTP 连接失败: {0}")]
    Connect(String),
}
