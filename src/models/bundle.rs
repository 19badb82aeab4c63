//! 部分结果包
//!
//! 无论引擎处于什么状态，结果检索链最终都会产出一个结构合法的包。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::ProgressRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialResultBundle {
    #[serde(default)]
    pub progress: BundleProgress,
    /// 文档标识 → 部分排序数据（原样保留引擎输出）
    #[serde(default)]
    pub results: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub metadata: BundleMetadata,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleProgress {
    #[serde(default)]
    pub processed_images: usize,
    #[serde(default)]
    pub total_images: usize,
    #[serde(default)]
    pub documents_found: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMetadata {
    /// Unix 毫秒时间戳
    pub timestamp: i64,
    pub processing_complete: bool,
    pub progress_percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_error: Option<String>,
}

impl BundleMetadata {
    /// 按进度计算元数据
    pub fn from_progress(progress: ProgressRecord, timestamp: i64) -> Self {
        Self {
            timestamp,
            processing_complete: progress.is_complete(),
            progress_percentage: progress.percentage(),
            ..Default::default()
        }
    }
}

impl PartialResultBundle {
    /// 只有计数、没有结果的包
    pub fn from_counts(progress: ProgressRecord) -> Self {
        Self {
            progress: BundleProgress {
                processed_images: progress.processed,
                total_images: progress.total,
                documents_found: 0,
            },
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, metadata: BundleMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_from_progress() {
        let meta = BundleMetadata::from_progress(ProgressRecord::new(10, 10), 42);
        assert!(meta.processing_complete);
        assert_eq!(meta.progress_percentage, 100);
        assert_eq!(meta.timestamp, 42);

        let meta = BundleMetadata::from_progress(ProgressRecord::new(0, 0), 1);
        assert_eq!(meta.progress_percentage, 0);
    }

    #[test]
    fn test_bundle_wire_shape() {
        let bundle = PartialResultBundle::from_counts(ProgressRecord::new(3, 4))
            .with_metadata(BundleMetadata::from_progress(ProgressRecord::new(3, 4), 7));
        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["progress"]["processedImages"], 3);
        assert_eq!(json["progress"]["totalImages"], 4);
        assert_eq!(json["metadata"]["progressPercentage"], 75);
        assert_eq!(json["metadata"]["processingComplete"], false);
        assert!(json["metadata"].get("error").is_none());
        assert!(json["results"].as_object().unwrap().is_empty());
    }
}
