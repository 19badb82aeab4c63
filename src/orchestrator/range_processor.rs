//! 单个区间处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责把一个页面区间完整地推过引擎，是区间级别的编排器。
//!
//! ## 核心功能
//!
//! 1. **批量优先**：先用一次批量调用处理整个区间
//! 2. **降级**：批量失败（或超过截止时间）后改为逐页处理同一区间
//! 3. **失败页决策**：按配置的策略对每个 `pageError` 给出重试 / 跳过 / 放弃
//! 4. **警告记录**：被跳过或放弃的页写入 warn.txt
//! 5. **统计输出**：记录成功/跳过/重试数量

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};
use tracing::{error, info, warn};

use crate::config::{Config, PageErrorPolicy};
use crate::error::SessionError;
use crate::models::{Command, Decision, Event, PageRange, ProcessingMode, SkipList};
use crate::orchestrator::session_worker::SessionHandle;
use crate::services::WarnWriter;
use crate::utils::logging::truncate_text;

/// 区间处理统计
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeStats {
    pub range: PageRange,
    /// 最终完成该区间所用的模式
    pub mode: ProcessingMode,
    /// 区间内成功提交过的页数
    pub submitted: usize,
    /// 成功处理的页数（只计已提交的页）
    pub completed: usize,
    /// 被跳过的页码
    pub skipped: Vec<usize>,
    /// 放弃时失败的页码
    pub aborted_at: Option<usize>,
    /// 重试次数
    pub retries: usize,
}

impl RangeStats {
    fn new(range: PageRange, submitted: usize) -> Self {
        Self {
            range,
            mode: ProcessingMode::Bulk,
            submitted,
            completed: 0,
            skipped: Vec::new(),
            aborted_at: None,
            retries: 0,
        }
    }

    /// 未完成的页数（跳过 + 放弃）
    pub fn unfinished(&self) -> usize {
        self.submitted.saturating_sub(self.completed)
    }
}

/// 处理单个区间
///
/// # 参数
/// - `handle`: 会话句柄
/// - `range`: 页面区间
/// - `config`: 配置
/// - `warn_writer`: 警告写入服务
/// - `submitted`: 成功提交的图片下标（没有图片的页不计入统计）
pub async fn process_range(
    handle: &SessionHandle,
    range: PageRange,
    config: &Config,
    warn_writer: &WarnWriter,
    submitted: &BTreeSet<usize>,
) -> Result<RangeStats> {
    let in_range = submitted.range(range.start_index..range.end_index).count();
    let mut stats = RangeStats::new(range, in_range);

    if run_bulk(handle, range, config).await? {
        stats.completed = in_range;
        return Ok(stats);
    }

    info!("[区间 {}] 🔁 降级为逐页处理", range);
    stats.mode = ProcessingMode::Individual;
    run_individual(handle, range, config, warn_writer, submitted, &mut stats).await?;

    log_range_complete(&stats);
    Ok(stats)
}

/// 批量处理，返回是否成功
async fn run_bulk(handle: &SessionHandle, range: PageRange, config: &Config) -> Result<bool> {
    let command = Command::ProcessBulk { range };
    let reply = match config.bulk_timeout() {
        Some(deadline) => handle.request_with_deadline(command, deadline).await,
        None => handle.request(command).await,
    };

    let events = match reply {
        Ok(events) => events,
        Err(SessionError::Timeout { after, .. }) => {
            warn!("[区间 {}] ⏱ 批量处理超过 {:?}，视为失败", range, after);
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    match events.last() {
        Some(Event::BatchComplete { current, total, .. }) => {
            info!("[区间 {}] ✓ 批量处理成功 (引擎进度 {}/{})", range, current, total);
            Ok(true)
        }
        Some(Event::BatchFailed { error, .. }) => {
            warn!(
                "[区间 {}] ⚠️ 批量处理失败: {}",
                range,
                truncate_text(error, 120)
            );
            Ok(false)
        }
        Some(Event::Failed { error, kind, .. }) => {
            error!("[区间 {}] ❌ 批量处理内部错误 ({:?}): {}", range, kind, error);
            Ok(false)
        }
        other => bail!("区间 {} 批量处理收到意外响应: {:?}", range, other),
    }
}

/// 逐页处理，按策略处理每一个失败页
async fn run_individual(
    handle: &SessionHandle,
    range: PageRange,
    config: &Config,
    warn_writer: &WarnWriter,
    submitted: &BTreeSet<usize>,
    stats: &mut RangeStats,
) -> Result<()> {
    let mut attempts: BTreeMap<usize, u32> = BTreeMap::new();
    let mut command = Command::ProcessIndividual {
        range,
        skip_list: SkipList::new(),
    };

    loop {
        let events = handle.request(command).await?;
        stats.completed += events
            .iter()
            .filter(|e| match e {
                Event::PageComplete { page_number, .. } => submitted.contains(&(page_number - 1)),
                _ => false,
            })
            .count();

        let (page_number, error) = match events.last() {
            Some(Event::IndividualBatchComplete { .. }) => return Ok(()),
            Some(Event::PageError {
                page_number, error, ..
            }) => (*page_number, error.clone()),
            other => bail!("区间 {} 逐页处理收到意外响应: {:?}", range, other),
        };

        let failures = attempts.entry(page_number).or_insert(0);
        *failures += 1;
        let decision = decide(config, *failures);
        info!(
            "[区间 {} 页 #{}] 第 {} 次失败，决定: {}",
            range, page_number, failures, decision
        );

        match decision {
            Decision::Retry => stats.retries += 1,
            Decision::Skip => {
                stats.skipped.push(page_number);
                warn_writer
                    .write(Some(range), page_number, &format!("跳过: {error}"))
                    .await?;
            }
            Decision::Abort => {
                let events = handle.request(Command::Resume(Decision::Abort)).await?;
                if !matches!(events.last(), Some(Event::Aborted { .. })) {
                    bail!("区间 {} 放弃失败: {:?}", range, events.last());
                }
                stats.aborted_at = Some(page_number);
                let abandoned = range
                    .tail_from(page_number)
                    .page_numbers()
                    .filter(|page| *page == page_number || submitted.contains(&(page - 1)));
                for page in abandoned {
                    let reason = if page == page_number {
                        format!("放弃: {error}")
                    } else {
                        "放弃: 区间已放弃".to_string()
                    };
                    warn_writer.write(Some(range), page, &reason).await?;
                }
                warn!("[区间 {}] ⚠️ 从页 #{} 起放弃", range, page_number);
                return Ok(());
            }
        }
        command = Command::Resume(decision);
    }
}

/// 按策略决定失败页的处理方式
///
/// `failures` 为该页累计失败次数（从 1 开始）。
pub fn decide(config: &Config, failures: u32) -> Decision {
    match config.page_error_policy {
        PageErrorPolicy::Retry if failures <= config.max_page_retries => Decision::Retry,
        PageErrorPolicy::Retry | PageErrorPolicy::Skip => Decision::Skip,
        PageErrorPolicy::Abort => Decision::Abort,
    }
}

fn log_range_complete(stats: &RangeStats) {
    info!(
        "[区间 {}] 逐页统计: 成功 {}, 跳过 {:?}, 重试 {}, 放弃于 {:?}",
        stats.range, stats.completed, stats.skipped, stats.retries, stats.aborted_at
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_caps_attempts() {
        let config = Config {
            max_page_retries: 2,
            ..Default::default()
        };
        assert_eq!(decide(&config, 1), Decision::Retry);
        assert_eq!(decide(&config, 2), Decision::Retry);
        assert_eq!(decide(&config, 3), Decision::Skip);
    }

    #[test]
    fn test_skip_and_abort_policies() {
        let config = Config {
            page_error_policy: PageErrorPolicy::Skip,
            ..Default::default()
        };
        assert_eq!(decide(&config, 1), Decision::Skip);
        let config = Config {
            page_error_policy: PageErrorPolicy::Abort,
            ..Default::default()
        };
        assert_eq!(decide(&config, 1), Decision::Abort);
    }

    #[test]
    fn test_unfinished_pages() {
        let mut stats = RangeStats::new(PageRange::new(0, 5), 4);
        stats.completed = 3;
        assert_eq!(stats.unfinished(), 1);
    }
}
