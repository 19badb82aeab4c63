//! 结果检索服务 - 业务能力层
//!
//! 最终结果：一次引擎调用，成功后无条件重置引擎。
//! 部分结果：三级兜底，任何一级失败才进入下一级，整条链永不失败。

use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::infrastructure::{EngineAdapter, PageEngine};
use crate::models::{BundleMetadata, PageAssignment, PartialResultBundle, ProgressRecord};

/// 第二级兜底的说明
pub const BASIC_PROGRESS_MESSAGE: &str = "Partial results unavailable, showing basic progress";
/// 第三级兜底的说明
pub const NO_RESULTS_MESSAGE: &str = "Unable to retrieve any partial results";

/// 结果检索服务
///
/// 职责：
/// - 取最终结果并在成功后清空引擎
/// - 按降级链拼出部分结果包
/// - 不维护会话状态
pub struct ResultRetriever;

impl ResultRetriever {
    pub fn new() -> Self {
        Self
    }

    /// 取最终排序结果
    ///
    /// 失败时本次结果视为丢失，调用方应改取部分结果。
    pub fn final_results<E: PageEngine>(
        &self,
        adapter: &mut EngineAdapter<E>,
    ) -> Result<Vec<PageAssignment>, EngineError> {
        let pages = adapter.final_results()?;
        info!("✓ 最终结果共 {} 页", pages.len());

        if let Err(e) = adapter.reset() {
            warn!("⚠️ 取得最终结果后重置引擎失败: {}", e);
        }
        Ok(pages)
    }

    /// 取部分结果
    pub fn partial_results<E: PageEngine>(
        &self,
        adapter: &mut EngineAdapter<E>,
    ) -> PartialResultBundle {
        let original = match Self::enriched_bundle(adapter) {
            Ok(bundle) => return bundle,
            Err(e) => e,
        };
        warn!("⚠️ 引擎部分结果不可用，改用基础进度: {}", original);

        let fallback = match adapter.progress() {
            Ok(progress) => {
                debug!(
                    "基础进度: {}/{}",
                    progress.processed, progress.total
                );
                let metadata = BundleMetadata {
                    error: Some(BASIC_PROGRESS_MESSAGE.to_string()),
                    original_error: Some(original.to_string()),
                    ..BundleMetadata::from_progress(progress, now_millis())
                };
                return PartialResultBundle::from_counts(progress).with_metadata(metadata);
            }
            Err(e) => e,
        };
        error!("❌ 无法获取任何部分结果: {}", fallback);

        let metadata = BundleMetadata {
            timestamp: now_millis(),
            processing_complete: false,
            progress_percentage: 0,
            error: Some(NO_RESULTS_MESSAGE.to_string()),
            original_error: Some(original.to_string()),
            fallback_error: Some(fallback.to_string()),
        };
        PartialResultBundle::default().with_metadata(metadata)
    }

    fn enriched_bundle<E: PageEngine>(
        adapter: &mut EngineAdapter<E>,
    ) -> Result<PartialResultBundle, EngineError> {
        let bundle = adapter.partial_results()?;
        let progress: ProgressRecord = adapter.progress()?;
        Ok(bundle.with_metadata(BundleMetadata::from_progress(progress, now_millis())))
    }
}

impl Default for ResultRetriever {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{FaultPlan, InMemoryEngine, SEQUENTIAL_DOCUMENT};
    use crate::models::{ImageRecord, PageRange};

    fn adapter_with(faults: FaultPlan, count: usize, processed: usize) -> EngineAdapter<InMemoryEngine> {
        let mut adapter = EngineAdapter::new(InMemoryEngine::with_faults(faults));
        adapter.initialize().unwrap();
        for index in 0..count {
            adapter
                .submit_image(&ImageRecord::new(index, 1, 1, vec![0; 4]))
                .unwrap();
        }
        adapter.process_range(PageRange::new(0, processed)).unwrap();
        adapter
    }

    #[test]
    fn test_tier_one_enriches_engine_bundle() {
        let mut adapter = adapter_with(FaultPlan::default(), 10, 10);
        let bundle = ResultRetriever::new().partial_results(&mut adapter);
        assert!(bundle.metadata.processing_complete);
        assert_eq!(bundle.metadata.progress_percentage, 100);
        assert!(bundle.metadata.error.is_none());
        assert!(bundle.results.contains_key(SEQUENTIAL_DOCUMENT));
        assert_eq!(bundle.progress.documents_found, 1);
        assert!(bundle.metadata.timestamp > 0);
    }

    #[test]
    fn test_tier_two_uses_counts() {
        let faults = FaultPlan {
            fail_partial_results: true,
            ..Default::default()
        };
        let mut adapter = adapter_with(faults, 4, 1);
        let bundle = ResultRetriever::new().partial_results(&mut adapter);
        assert_eq!(bundle.progress.processed_images, 1);
        assert_eq!(bundle.progress.total_images, 4);
        assert!(bundle.results.is_empty());
        assert_eq!(bundle.metadata.progress_percentage, 25);
        assert_eq!(bundle.metadata.error.as_deref(), Some(BASIC_PROGRESS_MESSAGE));
        assert!(bundle.metadata.original_error.is_some());
        assert!(bundle.metadata.fallback_error.is_none());
    }

    #[test]
    fn test_tier_three_is_zeroed() {
        let faults = FaultPlan {
            fail_partial_results: true,
            fail_counts: true,
            ..Default::default()
        };
        let mut adapter = adapter_with(faults, 2, 2);
        let bundle = ResultRetriever::new().partial_results(&mut adapter);
        assert_eq!(bundle.progress.processed_images, 0);
        assert_eq!(bundle.progress.total_images, 0);
        assert!(!bundle.metadata.processing_complete);
        assert_eq!(bundle.metadata.progress_percentage, 0);
        assert_eq!(bundle.metadata.error.as_deref(), Some(NO_RESULTS_MESSAGE));
        assert!(bundle.metadata.original_error.is_some());
        assert!(bundle.metadata.fallback_error.is_some());
    }

    #[test]
    fn test_final_results_reset_engine() {
        let mut adapter = adapter_with(FaultPlan::default(), 3, 3);
        let pages = ResultRetriever::new().final_results(&mut adapter).unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(adapter.progress().unwrap(), ProgressRecord::new(0, 0));
    }

    #[test]
    fn test_failed_final_results_keep_engine_state() {
        let faults = FaultPlan {
            fail_final_results: true,
            ..Default::default()
        };
        let mut adapter = adapter_with(faults, 3, 2);
        assert!(ResultRetriever::new().final_results(&mut adapter).is_err());
        assert_eq!(adapter.progress().unwrap(), ProgressRecord::new(2, 3));
    }
}
