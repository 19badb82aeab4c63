//! 调用方与会话工作线程之间的命令/事件协议
//!
//! 每条命令得到零个或多个进度事件，最后是一个终止事件。
//! 事件只携带普通数据，可直接序列化为带 `type` 字段的 JSON。

use serde::{Deserialize, Serialize};

use super::{
    Decision, ImageRecord, PageAssignment, PageRange, PartialResultBundle, ProcessingMode,
    ProgressRecord, SessionState, SkipList,
};
use crate::error::ErrorKind;

/// 调用方发出的命令
#[derive(Debug)]
pub enum Command {
    Initialize,
    SubmitImage(ImageRecord),
    ProcessBulk { range: PageRange },
    ProcessIndividual { range: PageRange, skip_list: SkipList },
    /// 暂停后给出的决定
    Resume(Decision),
    GetFinalResults,
    GetPartialResults,
    GetTotalImages,
    GetProcessedCount,
    ClearImages,
}

impl Command {
    /// 命令名（用于日志和事件）
    pub fn name(&self) -> &'static str {
        match self {
            Command::Initialize => "initialize",
            Command::SubmitImage(_) => "submitImage",
            Command::ProcessBulk { .. } => "processBulk",
            Command::ProcessIndividual { .. } => "processIndividual",
            Command::Resume(_) => "resume",
            Command::GetFinalResults => "getFinalResults",
            Command::GetPartialResults => "getPartialResults",
            Command::GetTotalImages => "getTotalImages",
            Command::GetProcessedCount => "getProcessedCount",
            Command::ClearImages => "clearImages",
        }
    }
}

/// 工作线程发出的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    Ready,
    Failed {
        operation: String,
        kind: ErrorKind,
        error: String,
    },
    Added {
        index: usize,
    },
    BatchComplete {
        current: usize,
        total: usize,
        range: PageRange,
    },
    #[serde(rename_all = "camelCase")]
    BatchFailed {
        error: String,
        kind: ErrorKind,
        range: PageRange,
        /// 建议调用方用逐页模式重试同一区间（系统不会自动切换）
        recommended_mode: ProcessingMode,
    },
    #[serde(rename_all = "camelCase")]
    PageSkipped {
        page_number: usize,
    },
    #[serde(rename_all = "camelCase")]
    PageComplete {
        page_number: usize,
        current: usize,
        total: usize,
        page_data: ProgressRecord,
    },
    #[serde(rename_all = "camelCase")]
    PageError {
        page_number: usize,
        error: String,
        kind: ErrorKind,
        range: PageRange,
    },
    IndividualBatchComplete {
        current: usize,
        total: usize,
        range: PageRange,
    },
    #[serde(rename_all = "camelCase")]
    Aborted {
        range: PageRange,
        failed_page: usize,
    },
    #[serde(rename_all = "camelCase")]
    ResultsReady {
        sorted_pages: Vec<PageAssignment>,
    },
    #[serde(rename_all = "camelCase")]
    PartialResults {
        partial_results: PartialResultBundle,
    },
    TotalImages {
        total: usize,
    },
    ProcessedCount {
        processed: usize,
        total: usize,
        percentage: u8,
    },
    Cleared,
    Rejected {
        command: String,
        state: SessionState,
        reason: String,
    },
}

impl Event {
    /// 是否为一条命令的最后一个事件
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Event::PageSkipped { .. } | Event::PageComplete { .. })
    }

    /// 事件涉及的页码（仅逐页事件）
    pub fn page_number(&self) -> Option<usize> {
        match self {
            Event::PageSkipped { page_number }
            | Event::PageComplete { page_number, .. }
            | Event::PageError { page_number, .. } => Some(*page_number),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_type_tagged() {
        let event = Event::PageComplete {
            page_number: 3,
            current: 1,
            total: 1,
            page_data: ProgressRecord::new(3, 3),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "pageComplete");
        assert_eq!(json["pageNumber"], 3);
        assert_eq!(json["pageData"]["processed"], 3);

        let event = Event::BatchFailed {
            error: "x".to_string(),
            kind: ErrorKind::Processing,
            range: PageRange::new(0, 3),
            recommended_mode: ProcessingMode::Individual,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "batchFailed");
        assert_eq!(json["recommendedMode"], "individual");
        assert_eq!(json["range"]["startIndex"], 0);
        assert_eq!(json["range"]["endIndex"], 3);
    }

    #[test]
    fn test_terminal_events() {
        assert!(!Event::PageSkipped { page_number: 1 }.is_terminal());
        assert!(Event::Cleared.is_terminal());
        assert!(Event::IndividualBatchComplete {
            current: 0,
            total: 0,
            range: PageRange::new(0, 0),
        }
        .is_terminal());
    }
}
