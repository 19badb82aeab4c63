//! 区间处理流程 - 流程层
//!
//! 核心职责：定义"一个区间"的两种处理方式
//!
//! 1. 批量模式：整个区间一次引擎调用，失败不重试
//! 2. 逐页模式：按页码升序每页一次调用，遇到失败立即停止

use tracing::{debug, error, info, warn};

use super::event_sink::EventSink;
use super::page_ctx::PageCtx;
use crate::error::EngineError;
use crate::infrastructure::{EngineAdapter, PageEngine};
use crate::models::{Event, PageRange, ProcessingMode, ProgressRecord, SkipList};
use crate::utils::logging::truncate_text;

/// 逐页处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndividualOutcome {
    /// 区间内所有未跳过的页都已处理
    Complete { current: usize, total: usize },
    /// 在某一页失败后停止
    Halted { page_number: usize, error: String },
}

/// 区间处理流程
///
/// - 决定一次调用覆盖多少页
/// - 按顺序发出进度事件
/// - 不持有引擎，不维护会话状态
pub struct BatchCoordinator {
    verbose_logging: bool,
}

impl BatchCoordinator {
    pub fn new(verbose_logging: bool) -> Self {
        Self { verbose_logging }
    }

    /// 批量处理整个区间
    pub fn run_bulk<E: PageEngine>(
        &self,
        adapter: &mut EngineAdapter<E>,
        range: PageRange,
        sink: &mut impl EventSink,
    ) -> Result<ProgressRecord, EngineError> {
        info!("[区间 {}] 📦 批量处理 {} 页...", range, range.len());

        match adapter.process_range(range) {
            Ok(progress) => {
                info!(
                    "[区间 {}] ✓ 批量处理完成 ({}/{})",
                    range, progress.processed, progress.total
                );
                sink.emit(Event::BatchComplete {
                    current: progress.processed,
                    total: progress.total,
                    range,
                });
                Ok(progress)
            }
            Err(e) => {
                error!(
                    "[区间 {}] ❌ 批量处理失败: {}",
                    range,
                    truncate_text(&e.to_string(), 120)
                );
                warn!("[区间 {}] 💡 建议改用逐页模式重试该区间", range);
                sink.emit(Event::BatchFailed {
                    error: e.to_string(),
                    kind: e.kind(),
                    range,
                    recommended_mode: ProcessingMode::Individual,
                });
                Err(e)
            }
        }
    }

    /// 逐页处理区间
    ///
    /// 跳过列表中的页不接触引擎；任何一页失败后，后面的页都不会被尝试。
    pub fn run_individual<E: PageEngine>(
        &self,
        adapter: &mut EngineAdapter<E>,
        range: PageRange,
        skip_list: &SkipList,
        sink: &mut impl EventSink,
    ) -> IndividualOutcome {
        let total = skip_list.remaining_in(&range);
        let mut current = 0;

        info!(
            "[区间 {}] 🔍 逐页处理 {} 页 (跳过 {} 页)",
            range,
            total,
            range.len() - total
        );

        for page_number in range.page_numbers() {
            let ctx = PageCtx::new(range, page_number);

            if skip_list.contains(page_number) {
                debug!("{} ⏭ 在跳过列表中", ctx);
                sink.emit(Event::PageSkipped { page_number });
                continue;
            }

            match adapter.process_range(ctx.single_range()) {
                Ok(page_data) => {
                    current += 1;
                    if self.verbose_logging {
                        info!(
                            "{} ✓ 完成 ({}/{})，引擎进度 {}/{}",
                            ctx, current, total, page_data.processed, page_data.total
                        );
                    }
                    sink.emit(Event::PageComplete {
                        page_number,
                        current,
                        total,
                        page_data,
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    error!("{} ❌ 处理失败: {}", ctx, truncate_text(&message, 120));
                    sink.emit(Event::PageError {
                        page_number,
                        error: message.clone(),
                        kind: e.kind(),
                        range,
                    });
                    return IndividualOutcome::Halted {
                        page_number,
                        error: message,
                    };
                }
            }
        }

        info!("[区间 {}] ✓ 逐页处理完成 ({}/{})", range, current, total);
        sink.emit(Event::IndividualBatchComplete {
            current,
            total,
            range,
        });
        IndividualOutcome::Complete { current, total }
    }
}
