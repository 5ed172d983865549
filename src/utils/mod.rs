//! 通用工具函数模块
//!
//! 提供路径处理和序列化辅助等通用工具。

pub mod encoding;
pub mod path;

pub use path::*;
