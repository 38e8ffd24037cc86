//! vkrtx 工具集
//!
//! 提供日志初始化、资源路径管理、带索引的枚举表等通用工具。
//!
//! # VkrtxPath
//! 基于工作区根目录的统一路径管理，着色器二进制都从固定的相对位置读取。

pub mod init_log;
pub mod named_array;
pub mod resource;
