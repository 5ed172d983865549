//! 日志初始化
//!
//! 基于 `tracing_subscriber::fmt`，`RUST_LOG` 优先于配置中的级别。

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// 安装全局 tracing subscriber
///
/// 返回 `false` 表示已有全局 subscriber（例如重复初始化或测试框架已安装），
/// 此时不做任何修改。
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::debug!(level = %config.level, json = config.json, "Tracing initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
