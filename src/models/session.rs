//! 会话生命周期相关类型

use std::fmt;

use serde::{Deserialize, Serialize};

use super::PageRange;

/// 会话状态
///
/// `Empty → Populating → Ready → BulkProcessing → IndividualProcessing → PausedOnError → Completed`
///
/// 提交图片总是回到 `Populating`；处理命令被接受时从 `Populating` 或 `Completed` 进入 `Ready`。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Empty,
    Populating,
    Ready,
    BulkProcessing,
    IndividualProcessing,
    PausedOnError,
    Completed,
}

impl SessionState {
    /// 是否已有图片、可以开始处理
    pub fn accepts_processing(self) -> bool {
        matches!(
            self,
            SessionState::Populating | SessionState::Ready | SessionState::Completed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Empty => "Empty",
            SessionState::Populating => "Populating",
            SessionState::Ready => "Ready",
            SessionState::BulkProcessing => "BulkProcessing",
            SessionState::IndividualProcessing => "IndividualProcessing",
            SessionState::PausedOnError => "PausedOnError",
            SessionState::Completed => "Completed",
        };
        f.write_str(name)
    }
}

/// 处理模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcessingMode {
    /// 整个区间一次调用
    Bulk,
    /// 每页一次调用
    Individual,
}

/// 暂停点：逐页处理在哪个区间的哪一页失败
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausePoint {
    pub range: PageRange,
    pub failed_page: usize,
}

impl PausePoint {
    /// 尚未完成的子区间（从失败页开始）
    pub fn unfinished(&self) -> PageRange {
        self.range.tail_from(self.failed_page)
    }
}

/// 暂停后调用方给出的决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Decision {
    /// 从失败页重新开始
    Retry,
    /// 把失败页加入跳过列表后继续
    Skip,
    /// 放弃该区间剩余的页
    Abort,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Retry => f.write_str("retry"),
            Decision::Skip => f.write_str("skip"),
            Decision::Abort => f.write_str("abort"),
        }
    }
}
