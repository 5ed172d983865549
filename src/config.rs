//! 配置模块
//!
//! 提供 assetstore 的配置定义，支持：
//! - TOML/JSON 配置文件加载
//! - 缺省值填充
//! - 基于 validator 的字段校验

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// 缓冲区下限 4 KiB
pub const MIN_BUFFER_SIZE: usize = 4 * 1024;
/// 缓冲区上限 16 MiB
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Assetstore 配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AssetstoreConfig {
    /// Assetstore 标识，缺省时随机生成
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    #[validate(length(min = 1, max = 255))]
    pub name: String,

    /// 根目录，支持 `~` 开头
    pub root: PathBuf,

    /// 追加与流式读取使用的块大小
    #[serde(default = "default_buffer_size")]
    #[validate(range(min = 4096, max = 16777216))]
    pub buffer_size: usize,

    /// 根目录下存放上传临时文件的子目录名
    #[serde(default = "default_temp_dir_name")]
    #[validate(custom(function = "validate_dir_name"))]
    pub temp_dir_name: String,

    #[serde(default)]
    #[validate(nested)]
    pub logging: LoggingConfig,
}

fn default_buffer_size() -> usize {
    64 * 1024
}

fn default_temp_dir_name() -> String {
    "temp".to_string()
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoggingConfig {
    /// `RUST_LOG` 未设置时使用的过滤级别
    #[serde(default = "default_log_level")]
    #[validate(custom(function = "validate_log_level"))]
    pub level: String,

    /// 输出 JSON 格式日志
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn validate_log_level(level: &str) -> std::result::Result<(), ValidationError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => Ok(()),
        _ => Err(ValidationError::new("unknown_log_level")),
    }
}

// 必须是单个目录名，不能包含分隔符或跳出根目录
fn validate_dir_name(name: &str) -> std::result::Result<(), ValidationError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ValidationError::new("invalid_dir_name"));
    }
    Ok(())
}

impl AssetstoreConfig {
    /// 使用缺省值创建配置
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            root: root.into(),
            buffer_size: default_buffer_size(),
            temp_dir_name: default_temp_dir_name(),
            logging: LoggingConfig::default(),
        }
    }

    /// 从 TOML 文件加载配置
    ///
    /// # Arguments
    /// * `path` - 配置文件路径
    ///
    /// # Errors
    /// 如果文件不存在、格式错误或校验失败，返回错误
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid assetstore config: {}", path.display()))?;

        tracing::info!("Loaded assetstore configuration from: {}", path.display());
        Ok(config)
    }

    /// 从 JSON 文件加载配置
    ///
    /// # Arguments
    /// * `path` - 配置文件路径
    ///
    /// # Errors
    /// 如果文件不存在、格式错误或校验失败，返回错误
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid assetstore config: {}", path.display()))?;

        tracing::info!("Loaded assetstore configuration from: {}", path.display());
        Ok(config)
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved assetstore configuration to: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: AssetstoreConfig =
            toml::from_str("name = \"primary\"\nroot = \"/srv/assets\"\n").unwrap();

        assert_eq!(config.buffer_size, 65536);
        assert_eq!(config.temp_dir_name, "temp");
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_buffer_size_out_of_range() {
        let mut config = AssetstoreConfig::new("a", "/srv/assets");
        config.buffer_size = 100;
        assert!(config.validate().is_err());

        config.buffer_size = MAX_BUFFER_SIZE + 1;
        assert!(config.validate().is_err());

        config.buffer_size = MIN_BUFFER_SIZE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_temp_dir_and_level() {
        let mut config = AssetstoreConfig::new("a", "/srv/assets");
        config.temp_dir_name = "../escape".to_string();
        assert!(config.validate().is_err());

        let mut config = AssetstoreConfig::new("a", "/srv/assets");
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("assetstore.toml");

        let config = AssetstoreConfig::new("primary", dir.path().join("root"));
        config.save_to_toml_file(&path).unwrap();

        let loaded = AssetstoreConfig::from_toml_file(&path).unwrap();
        assert_eq!(loaded.id, config.id);
        assert_eq!(loaded.root, config.root);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = AssetstoreConfig::from_json_file("/no/such/config.json").unwrap_err();
        assert!(format!("{:?}", err).contains("/no/such/config.json"));
    }
}
