//! 警告写入服务 - 业务能力层
//!
//! 只负责"写 warn.txt"能力，不关心流程

use anyhow::{Context, Result};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::models::PageRange;

/// 警告写入服务
///
/// 职责：
/// - 将被跳过 / 放弃 / 提交失败的页写入 warn.txt
/// - 每次只写一页
/// - 不关心流程顺序
pub struct WarnWriter {
    warn_file_path: String,
}

impl WarnWriter {
    /// 创建新的警告写入服务
    pub fn new() -> Self {
        Self {
            warn_file_path: "warn.txt".to_string(),
        }
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            warn_file_path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.warn_file_path
    }

    /// 写入警告信息
    ///
    /// # 参数
    /// - `range`: 所属区间（提交失败时为 None）
    /// - `page_number`: 页码
    /// - `reason`: 原因
    pub async fn write(
        &self,
        range: Option<PageRange>,
        page_number: usize,
        reason: &str,
    ) -> Result<()> {
        debug!("写入警告: 页 {} | 原因长度: {}", page_number, reason.len());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.warn_file_path)
            .await
            .with_context(|| format!("无法打开警告文件: {}", self.warn_file_path))?;

        let range = range.map_or_else(|| "-".to_string(), |r| r.to_string());
        let warn_msg = format!(
            "区间 {} | 页 {} | 原因: {}\n",
            range,
            page_number,
            reason.replace('\n', " ")
        );

        file.write_all(warn_msg.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}

impl Default for WarnWriter {
    fn default() -> Self {
        Self::new()
    }
}
