use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::PageRange;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 引擎相关错误
    #[error("引擎错误: {0}")]
    Engine(#[from] EngineError),
    /// 会话通道错误
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 引擎相关错误
///
/// 每个变体对应一种失败类别，恢复状态机依据类别决定降级、暂停还是兜底。
#[derive(Debug, Error)]
pub enum EngineError {
    /// 引擎加载/启动失败
    #[error("引擎初始化失败: {message}")]
    Initialization { message: String },

    /// 单张图片未能提交
    #[error("图片 {index} 提交失败: {message}")]
    Submission { index: usize, message: String },

    /// 区间处理失败（原因对调用方不透明）
    #[error("区间 {range} 处理失败: {message}")]
    Processing { range: PageRange, message: String },

    /// 引擎拒绝给出结果
    #[error("引擎未能返回{what}: {message}")]
    ResultFetch { what: &'static str, message: String },

    /// 引擎返回的数据无法解码
    #[error("无法解析引擎返回的{what}: {source}")]
    ResultParse {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// 计数查询失败
    #[error("引擎状态查询 {query} 失败: {message}")]
    State { query: &'static str, message: String },

    /// 引擎上报的进度违反协议
    #[error("引擎进度违反协议: processed={processed}, total={total}")]
    ProtocolViolation { processed: usize, total: usize },

    /// 同一会话内已处理数出现回退
    #[error("引擎进度出现回退: 之前 {previous}, 现在 {processed}")]
    ProgressRegressed { previous: usize, processed: usize },
}

impl EngineError {
    /// 错误类别（随事件一起发送给调用方）
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Initialization { .. } => ErrorKind::Initialization,
            EngineError::Submission { .. } => ErrorKind::Submission,
            EngineError::Processing { .. } => ErrorKind::Processing,
            EngineError::ResultFetch { .. } => ErrorKind::ResultFetch,
            EngineError::ResultParse { .. } => ErrorKind::ResultParse,
            EngineError::State { .. } => ErrorKind::State,
            EngineError::ProtocolViolation { .. } | EngineError::ProgressRegressed { .. } => {
                ErrorKind::Protocol
            }
        }
    }
}

/// 事件中携带的错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Initialization,
    Submission,
    Processing,
    ResultFetch,
    ResultParse,
    State,
    Protocol,
    /// 工作线程内部故障（例如引擎 panic）
    Internal,
}

/// 调用方与工作线程之间的通道错误
#[derive(Debug, Error)]
pub enum SessionError {
    /// 工作线程已退出
    #[error("会话工作线程已停止")]
    WorkerGone,

    /// 无法启动工作线程
    #[error("无法启动会话工作线程: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// 调用方设置的截止时间已到
    #[error("命令 {command} 超时 ({after:?})")]
    Timeout {
        command: &'static str,
        after: Duration,
    },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },

    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },

    /// 配置值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    Invalid { field: String, reason: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建配置值不合法错误
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Config(ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
