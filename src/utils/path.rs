//! 路径处理工具函数
//!
//! 提供跨平台的路径操作工具，包括路径规范化、`~` 展开和分片路径计算。

use crate::error::{Result, StoreError};
use std::path::{Path, PathBuf};

/// 规范化路径
///
/// 在 Windows 上使用 dunce 去除 UNC 前缀，在 Unix-like 系统上与标准规范化相同。
///
/// # 参数
///
/// - `path` - 需要规范化的路径（必须存在）
///
/// # 返回值
///
/// - `Ok(PathBuf)` - 规范化后的绝对路径
/// - `Err(StoreError)` - 路径不存在或无法解析
pub fn canonicalize_path(path: &Path) -> Result<PathBuf> {
    dunce::canonicalize(path).map_err(|e| {
        StoreError::io_error(
            format!("Path canonicalization failed: {}", e),
            Some(path.to_path_buf()),
        )
    })
}

/// 展开开头的 `~` 为 `$HOME`
///
/// 只处理 `~` 和 `~/...` 两种形式；`~user` 原样返回。
/// 未设置 `HOME` 时原样返回，由调用方的绝对路径检查报错。
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };

    match std::env::var_os("HOME") {
        Some(home) if rest.as_os_str().is_empty() => PathBuf::from(home),
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

/// 计算摘要对应的分片相对路径 `h[0:2]/h[2:4]/h`
///
/// 摘要为十六进制 SHA-512，长度恒为 128，调用方保证至少 4 个字符。
pub fn shard_path(digest: &str) -> PathBuf {
    let mut path = PathBuf::from(&digest[0..2]);
    path.push(&digest[2..4]);
    path.push(digest);
    path
}
