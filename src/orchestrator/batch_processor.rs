//! 批量页面处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责页面的批量提交、分区间处理和结果输出。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：启动日志文件、启动引擎工作线程、初始化引擎
//! 2. **批量加载**：读取页面清单并逐张提交图片（`Vec<ImageRecord>`）
//! 3. **分区间处理**：按 `batch_size` 把页面切成连续区间，每个区间完成后再开始下一个
//! 4. **结果输出**：取最终结果，失败时改取部分结果，写入 JSON 文件
//! 5. **全局统计**：汇总所有区间的处理结果
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个区间的细节
//! - **不直接接触引擎**：只通过 `SessionHandle` 发送命令
//! - **向下委托**：委托 range_processor 处理单个区间

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::infrastructure::{FaultPlan, InMemoryEngine, PageEngine};
use crate::models::{
    load_image_records, Command, Event, PageAssignment, PageRange, PartialResultBundle,
};
use crate::orchestrator::range_processor::{self, RangeStats};
use crate::orchestrator::session_worker::{SessionHandle, SessionWorker};
use crate::services::WarnWriter;
use crate::utils::logging;

/// 应用主结构
pub struct App {
    config: Config,
    session: SessionHandle,
    warn_writer: WarnWriter,
}

/// 写入输出文件的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RunOutput {
    /// 最终排序结果
    #[serde(rename_all = "camelCase")]
    Final { sorted_pages: Vec<PageAssignment> },
    /// 最终结果不可用时的部分结果
    #[serde(rename_all = "camelCase")]
    Partial {
        final_error: String,
        partial_results: PartialResultBundle,
    },
}

/// 一次运行的统计
#[derive(Debug, Default)]
pub struct RunSummary {
    pub total_pages: usize,
    pub submitted: usize,
    pub failed_submissions: Vec<usize>,
    pub ranges: Vec<RangeStats>,
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        self.ranges.iter().map(|r| r.completed).sum()
    }

    pub fn unfinished(&self) -> usize {
        self.ranges.iter().map(RangeStats::unfinished).sum()
    }
}

impl App {
    /// 使用内存参考引擎初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        let faults = FaultPlan::failing(config.simulated_failing_pages.iter().copied());
        Self::with_engine(config, InMemoryEngine::with_faults(faults)).await
    }

    /// 使用指定引擎初始化应用
    pub async fn with_engine<E: PageEngine + 'static>(config: Config, engine: E) -> Result<Self> {
        if config.batch_size == 0 {
            bail!("batch_size 必须大于 0");
        }

        // 初始化日志文件
        logging::init_log_file(&config.output_log_file)
            .with_context(|| format!("无法创建日志文件: {}", config.output_log_file))?;

        logging::log_startup(&config);

        // 启动引擎工作线程
        let session = SessionWorker::new(engine, config.verbose_logging).spawn()?;

        let events = session.request(Command::Initialize).await?;
        match events.last() {
            Some(Event::Ready) => info!("✓ 引擎初始化完成"),
            Some(Event::Failed { error, .. }) => bail!("引擎初始化失败: {}", error),
            other => bail!("引擎初始化收到意外响应: {:?}", other),
        }

        let warn_writer = WarnWriter::with_path(config.warn_file.clone());
        Ok(Self {
            config,
            session,
            warn_writer,
        })
    }

    /// 会话句柄（可用于直接发送命令）
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        // 加载并提交所有页面
        let (page_count, submitted) = self.submit_pages(&mut summary).await?;
        if summary.submitted == 0 {
            warn!("⚠️ 没有成功提交任何页面，程序结束");
            return Ok(summary);
        }
        logging::log_pages_loaded(summary.submitted, summary.total_pages, self.config.batch_size);

        // 分区间处理
        self.process_all_ranges(page_count, &submitted, &mut summary)
            .await?;

        // 取结果并输出
        let output = self.collect_results().await?;
        self.write_output(&output).await?;

        logging::print_final_stats(
            summary.completed(),
            summary.unfinished(),
            summary.failed_submissions.len(),
            summary.total_pages,
            &self.config.output_log_file,
        );
        logging::append_log_line(
            &self.config.output_log_file,
            &format!(
                "完成 {}/{} 页, 跳过/放弃 {}, 提交失败 {:?}",
                summary.completed(),
                summary.total_pages,
                summary.unfinished(),
                summary.failed_submissions
            ),
        )?;

        Ok(summary)
    }

    /// 提交清单中的所有页面，返回需要处理的下标范围长度和成功提交的下标
    async fn submit_pages(&self, summary: &mut RunSummary) -> Result<(usize, BTreeSet<usize>)> {
        info!("\n📁 正在加载页面清单...");
        let records = load_image_records(Path::new(&self.config.manifest_path)).await?;
        summary.total_pages = records.len();

        let mut page_count = 0;
        let mut submitted = BTreeSet::new();
        for record in records {
            let index = record.index;
            page_count = page_count.max(index + 1);

            let events = self.session.request(Command::SubmitImage(record)).await?;
            match events.last() {
                Some(Event::Added { .. }) => {
                    summary.submitted += 1;
                    submitted.insert(index);
                }
                Some(Event::Failed { error, .. }) | Some(Event::Rejected { reason: error, .. }) => {
                    error!("[图片 {}] ❌ 提交失败: {}", index, error);
                    summary.failed_submissions.push(index);
                    self.warn_writer
                        .write(None, index + 1, &format!("提交失败: {error}"))
                        .await?;
                }
                other => bail!("图片 {} 提交收到意外响应: {:?}", index, other),
            }
        }
        Ok((page_count, submitted))
    }

    async fn process_all_ranges(
        &self,
        page_count: usize,
        submitted: &BTreeSet<usize>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let batch_size = self.config.batch_size;
        let total_batches = page_count.div_ceil(batch_size);

        for batch_start in (0..page_count).step_by(batch_size) {
            let batch_end = (batch_start + batch_size).min(page_count);
            let batch_num = batch_start / batch_size + 1;
            let range = PageRange::new(batch_start, batch_end);

            logging::log_batch_start(
                batch_num,
                total_batches,
                batch_start + 1,
                batch_end,
                page_count,
            );

            let stats = range_processor::process_range(
                &self.session,
                range,
                &self.config,
                &self.warn_writer,
                submitted,
            )
            .await?;

            logging::log_batch_complete(batch_num, stats.completed, stats.unfinished(), stats.submitted);
            summary.ranges.push(stats);
        }
        Ok(())
    }

    /// 取最终结果，失败时改取部分结果
    async fn collect_results(&self) -> Result<RunOutput> {
        info!("\n📤 正在获取最终排序结果...");
        let events = self.session.request(Command::GetFinalResults).await?;
        let final_error = match events.last() {
            Some(Event::ResultsReady { sorted_pages }) => {
                info!("✓ 最终结果: {} 页", sorted_pages.len());
                return Ok(RunOutput::Final {
                    sorted_pages: sorted_pages.clone(),
                });
            }
            Some(Event::Failed { error, .. }) | Some(Event::Rejected { reason: error, .. }) => {
                error.clone()
            }
            other => bail!("获取最终结果收到意外响应: {:?}", other),
        };

        warn!("⚠️ 最终结果不可用 ({})，改取部分结果", final_error);
        let events = self.session.request(Command::GetPartialResults).await?;
        match events.last() {
            Some(Event::PartialResults { partial_results }) => {
                if let Some(error) = &partial_results.metadata.error {
                    warn!("⚠️ 部分结果已降级: {}", error);
                }
                Ok(RunOutput::Partial {
                    final_error,
                    partial_results: partial_results.clone(),
                })
            }
            other => bail!("获取部分结果收到意外响应: {:?}", other),
        }
    }

    async fn write_output(&self, output: &RunOutput) -> Result<()> {
        let json = serde_json::to_string_pretty(output)?;
        tokio::fs::write(&self.config.output_file, json)
            .await
            .with_context(|| format!("无法写入结果文件: {}", self.config.output_file))?;
        info!("💾 结果已写入: {}", self.config.output_file);
        Ok(())
    }
}
