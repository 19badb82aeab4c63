//! 引擎适配器 - 基础设施层
//!
//! 持有唯一的引擎资源，只暴露"提交 / 处理 / 查询 / 取结果 / 重置"的能力

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use tracing::{debug, warn};

use super::engine::{PageEngine, StagedBuffer};
use crate::error::EngineError;
use crate::models::{ImageRecord, PageAssignment, PageRange, PartialResultBundle, ProgressRecord};

const UNINITIALIZED: &str = "引擎尚未初始化";

/// 引擎适配器
///
/// 职责：
/// - 持有唯一的引擎实例
/// - 把引擎原生文本转换为结构化数据
/// - 把引擎失败转换为带类别的错误
/// - 不认识会话状态 / 跳过列表
pub struct EngineAdapter<E: PageEngine> {
    engine: E,
    initialized: bool,
    submitted: BTreeSet<usize>,
    last_processed: usize,
}

/// 引擎最终结果中的一项
#[derive(Debug, Deserialize)]
struct RawPageEntry {
    foundpage: usize,
    pageno: usize,
    #[serde(rename = "type", default)]
    detection: String,
}

impl<E: PageEngine> EngineAdapter<E> {
    /// 创建新的引擎适配器（尚未初始化）
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            initialized: false,
            submitted: BTreeSet::new(),
            last_processed: 0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// 获取引擎的引用（用于检查引擎状态）
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// 启动引擎，重复调用无副作用
    pub fn initialize(&mut self) -> Result<(), EngineError> {
        if self.initialized {
            return Ok(());
        }
        self.engine
            .initialize()
            .map_err(|e| EngineError::Initialization {
                message: format!("{e:#}"),
            })?;
        self.initialized = true;
        Ok(())
    }

    /// 提交一张图片
    ///
    /// 暂存进引擎内存的缓冲区在返回前一定会被释放。
    pub fn submit_image(&mut self, record: &ImageRecord) -> Result<(), EngineError> {
        let index = record.index;
        let reject = |message: String| EngineError::Submission { index, message };

        if !self.initialized {
            return Err(reject(UNINITIALIZED.to_string()));
        }
        if self.submitted.contains(&index) {
            return Err(reject("该下标在本会话中已提交过".to_string()));
        }
        match record.expected_len() {
            Some(expected) if expected == record.pixels.len() && expected > 0 => {}
            expected => {
                return Err(reject(format!(
                    "像素缓冲区长度 {} 与 {}x{} RGBA 不符 (应为 {:?})",
                    record.pixels.len(),
                    record.width,
                    record.height,
                    expected
                )));
            }
        }

        let mut staged = StagedBuffer::stage(&mut self.engine, &record.pixels)
            .map_err(|e| reject(format!("暂存失败: {e:#}")))?;
        staged
            .add_image(record.width, record.height, index)
            .map_err(|e| reject(format!("{e:#}")))?;
        drop(staged);

        self.submitted.insert(index);
        debug!("图片 {} 已提交 ({}x{})", index, record.width, record.height);
        Ok(())
    }

    /// 处理一个区间，返回引擎上报的进度
    pub fn process_range(&mut self, range: PageRange) -> Result<ProgressRecord, EngineError> {
        let fail = |message: String| EngineError::Processing { range, message };

        if !self.initialized {
            return Err(fail(UNINITIALIZED.to_string()));
        }

        let raw = self
            .engine
            .process_range(range.start_index, range.end_index)
            .map_err(|e| fail(format!("{e:#}")))?;
        let progress: ProgressRecord =
            serde_json::from_str(&raw).map_err(|e| fail(format!("进度数据无法解析: {e}")))?;

        self.check_progress(progress)?;
        Ok(progress)
    }

    /// 最终排序结果：按文档、文档内页码、提交下标排序
    pub fn final_results(&mut self) -> Result<Vec<PageAssignment>, EngineError> {
        if !self.initialized {
            return Err(EngineError::ResultFetch {
                what: "最终结果",
                message: UNINITIALIZED.to_string(),
            });
        }
        let raw = self
            .engine
            .final_results()
            .map_err(|e| EngineError::ResultFetch {
                what: "最终结果",
                message: format!("{e:#}"),
            })?;

        let documents: BTreeMap<String, Vec<RawPageEntry>> = serde_json::from_str(&raw)
            .map_err(|source| EngineError::ResultParse {
                what: "最终结果",
                source,
            })?;

        let mut pages: Vec<PageAssignment> = documents
            .into_iter()
            .flat_map(|(document, entries)| {
                entries.into_iter().map(move |entry| PageAssignment {
                    document: document.clone(),
                    page_index: entry.foundpage,
                    page_number: entry.pageno,
                    detection: entry.detection,
                })
            })
            .collect();
        pages.sort_by(|a, b| {
            a.document
                .cmp(&b.document)
                .then(a.page_number.cmp(&b.page_number))
                .then(a.page_index.cmp(&b.page_index))
        });
        Ok(pages)
    }

    /// 引擎给出的部分结果（元数据留空，由结果检索服务补全）
    pub fn partial_results(&mut self) -> Result<PartialResultBundle, EngineError> {
        if !self.initialized {
            return Err(EngineError::ResultFetch {
                what: "部分结果",
                message: UNINITIALIZED.to_string(),
            });
        }
        let raw = self
            .engine
            .partial_results()
            .map_err(|e| EngineError::ResultFetch {
                what: "部分结果",
                message: format!("{e:#}"),
            })?;
        serde_json::from_str(&raw).map_err(|source| EngineError::ResultParse {
            what: "部分结果",
            source,
        })
    }

    pub fn processed_count(&self) -> Result<usize, EngineError> {
        self.ensure_initialized("processedCount")?;
        self.engine
            .processed_count()
            .map_err(|e| EngineError::State {
                query: "processedCount",
                message: format!("{e:#}"),
            })
    }

    pub fn total_images(&self) -> Result<usize, EngineError> {
        self.ensure_initialized("totalImages")?;
        self.engine.total_images().map_err(|e| EngineError::State {
            query: "totalImages",
            message: format!("{e:#}"),
        })
    }

    /// 已处理数与总数，校验 `processed <= total`
    pub fn progress(&self) -> Result<ProgressRecord, EngineError> {
        let progress = ProgressRecord::new(self.processed_count()?, self.total_images()?);
        if progress.processed > progress.total {
            return Err(EngineError::ProtocolViolation {
                processed: progress.processed,
                total: progress.total,
            });
        }
        Ok(progress)
    }

    /// 清空引擎中的图片，重复调用结果相同
    pub fn reset(&mut self) -> Result<(), EngineError> {
        self.ensure_initialized("clear")?;
        self.engine.clear().map_err(|e| EngineError::State {
            query: "clear",
            message: format!("{e:#}"),
        })?;
        self.submitted.clear();
        self.last_processed = 0;
        Ok(())
    }

    fn ensure_initialized(&self, query: &'static str) -> Result<(), EngineError> {
        if self.initialized {
            Ok(())
        } else {
            Err(EngineError::State {
                query,
                message: UNINITIALIZED.to_string(),
            })
        }
    }

    fn check_progress(&mut self, progress: ProgressRecord) -> Result<(), EngineError> {
        if progress.processed > progress.total {
            warn!(
                "引擎上报 processed={} 超过 total={}",
                progress.processed, progress.total
            );
            return Err(EngineError::ProtocolViolation {
                processed: progress.processed,
                total: progress.total,
            });
        }
        if progress.processed < self.last_processed {
            warn!(
                "引擎上报的已处理数回退: {} -> {}",
                self.last_processed, progress.processed
            );
            return Err(EngineError::ProgressRegressed {
                previous: self.last_processed,
                processed: progress.processed,
            });
        }
        self.last_processed = progress.processed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::infrastructure::{FaultPlan, InMemoryEngine};

    fn blank(index: usize) -> ImageRecord {
        ImageRecord::new(index, 2, 2, vec![255; 16])
    }

    fn ready_adapter(faults: FaultPlan) -> EngineAdapter<InMemoryEngine> {
        let mut adapter = EngineAdapter::new(InMemoryEngine::with_faults(faults));
        adapter.initialize().unwrap();
        adapter
    }

    #[test]
    fn test_submit_requires_initialization() {
        let mut adapter = EngineAdapter::new(InMemoryEngine::new());
        let err = adapter.submit_image(&blank(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Submission);
        assert_eq!(adapter.engine().staged_buffers(), 0);
    }

    #[test]
    fn test_every_operation_requires_initialization() {
        let mut adapter = EngineAdapter::new(InMemoryEngine::new());
        let err = adapter.final_results().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResultFetch);
        assert!(err.to_string().contains(UNINITIALIZED));
        assert_eq!(adapter.partial_results().unwrap_err().kind(), ErrorKind::ResultFetch);
        assert_eq!(adapter.processed_count().unwrap_err().kind(), ErrorKind::State);
        assert_eq!(adapter.total_images().unwrap_err().kind(), ErrorKind::State);
        assert_eq!(adapter.reset().unwrap_err().kind(), ErrorKind::State);
        let err = adapter.process_range(PageRange::new(0, 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Processing);

        adapter.initialize().unwrap();
        assert_eq!(adapter.total_images().unwrap(), 0);
        adapter.reset().unwrap();
    }

    #[test]
    fn test_progress_regression_is_protocol_violation() {
        let faults = FaultPlan {
            lose_progress_after: Some(1),
            ..Default::default()
        };
        let mut adapter = ready_adapter(faults);
        adapter.submit_image(&blank(0)).unwrap();
        adapter.submit_image(&blank(1)).unwrap();
        assert_eq!(
            adapter.process_range(PageRange::new(0, 1)).unwrap(),
            ProgressRecord::new(1, 2)
        );

        let err = adapter.process_range(PageRange::new(1, 2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(matches!(
            err,
            EngineError::ProgressRegressed {
                previous: 1,
                processed: 0
            }
        ));
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let mut adapter = ready_adapter(FaultPlan::default());
        adapter.submit_image(&blank(0)).unwrap();
        let err = adapter.submit_image(&blank(0)).unwrap_err();
        assert!(matches!(err, EngineError::Submission { index: 0, .. }));
        assert_eq!(adapter.total_images().unwrap(), 1);
    }

    #[test]
    fn test_buffer_length_must_match_dimensions() {
        let mut adapter = ready_adapter(FaultPlan::default());
        let record = ImageRecord::new(0, 2, 2, vec![0; 15]);
        assert!(adapter.submit_image(&record).is_err());
        assert_eq!(adapter.engine().staged_buffers(), 0);
    }

    #[test]
    fn test_staged_buffer_released_on_both_paths() {
        let faults = FaultPlan {
            rejected_images: [1].into_iter().collect(),
            ..Default::default()
        };
        let mut adapter = ready_adapter(faults);
        adapter.submit_image(&blank(0)).unwrap();
        assert_eq!(adapter.engine().staged_buffers(), 0);

        let err = adapter.submit_image(&blank(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Submission);
        assert_eq!(adapter.engine().staged_buffers(), 0);

        // 被引擎拒绝的下标不会被记为已提交
        let err = adapter.submit_image(&blank(1)).unwrap_err();
        assert!(!err.to_string().contains("已提交过"));
        assert_eq!(adapter.total_images().unwrap(), 1);
    }

    #[test]
    fn test_process_range_reports_progress() {
        let mut adapter = ready_adapter(FaultPlan::default());
        for i in 0..3 {
            adapter.submit_image(&blank(i)).unwrap();
        }
        let progress = adapter.process_range(PageRange::new(0, 2)).unwrap();
        assert_eq!(progress, ProgressRecord::new(2, 3));
        assert_eq!(adapter.progress().unwrap(), ProgressRecord::new(2, 3));
    }

    #[test]
    fn test_overreported_progress_is_protocol_violation() {
        let faults = FaultPlan {
            overreport_progress: true,
            ..Default::default()
        };
        let mut adapter = ready_adapter(faults);
        adapter.submit_image(&blank(0)).unwrap();
        let err = adapter.process_range(PageRange::new(0, 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(adapter.progress().is_err());
    }

    #[test]
    fn test_processing_failure_is_typed() {
        let faults = FaultPlan {
            failing_pages: [1].into_iter().collect(),
            ..Default::default()
        };
        let mut adapter = ready_adapter(faults);
        for i in 0..3 {
            adapter.submit_image(&blank(i)).unwrap();
        }
        let err = adapter.process_range(PageRange::new(0, 3)).unwrap_err();
        match err {
            EngineError::Processing { range, .. } => assert_eq!(range, PageRange::new(0, 3)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_final_results_are_parse_errors() {
        let faults = FaultPlan {
            corrupt_final_results: true,
            ..Default::default()
        };
        let mut adapter = ready_adapter(faults);
        adapter.submit_image(&blank(0)).unwrap();
        let err = adapter.final_results().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResultParse);

        let faults = FaultPlan {
            fail_final_results: true,
            ..Default::default()
        };
        let mut adapter = ready_adapter(faults);
        let err = adapter.final_results().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResultFetch);
    }

    #[test]
    fn test_final_results_are_ordered() {
        let mut adapter = ready_adapter(FaultPlan::default());
        for i in [2, 0, 1] {
            adapter.submit_image(&blank(i)).unwrap();
        }
        adapter.process_range(PageRange::new(0, 3)).unwrap();
        let pages = adapter.final_results().unwrap();
        let indices: Vec<usize> = pages.iter().map(|p| p.page_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(pages[2].page_number, 3);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut adapter = ready_adapter(FaultPlan::default());
        adapter.submit_image(&blank(0)).unwrap();
        adapter.reset().unwrap();
        adapter.reset().unwrap();
        assert_eq!(adapter.progress().unwrap(), ProgressRecord::new(0, 0));
        // 重置后同一下标可以重新提交
        adapter.submit_image(&blank(0)).unwrap();
    }
}
