/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs::{self, OpenOptions};
use std::io::Write;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化 tracing 订阅者
///
/// `RUST_LOG` 优先；未设置时为 `info`，开启详细日志时为 `debug`。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n页面排序日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 向日志文件追加一行
pub fn append_log_line(log_file_path: &str, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 页面批量排序模式");
    info!("📊 每个区间页数: {}", config.batch_size);
    info!(
        "🛟 失败页策略: {} (最多重试 {} 次)",
        config.page_error_policy, config.max_page_retries
    );
    info!("{}", "=".repeat(60));
}

/// 记录页面加载信息
///
/// # 参数
/// - `submitted`: 成功提交的页数
/// - `total`: 清单中的页数
/// - `batch_size`: 每个区间的页数
pub fn log_pages_loaded(submitted: usize, total: usize, batch_size: usize) {
    info!("✓ 已提交 {}/{} 张页面图片", submitted, total);
    info!("📋 将以每个区间 {} 页的方式处理", batch_size);
    info!("💡 先批量处理，失败后改为逐页处理\n");
}

/// 记录区间开始信息
///
/// # 参数
/// - `batch_num`: 区间编号
/// - `total_batches`: 区间总数
/// - `start`: 起始页码
/// - `end`: 结束页码
/// - `total`: 总页数
pub fn log_batch_start(
    batch_num: usize,
    total_batches: usize,
    start: usize,
    end: usize,
    total: usize,
) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 个区间", batch_num, total_batches);
    info!("📄 本区间页码: {}-{} / 共 {} 页", start, end, total);
    info!("{}", "=".repeat(60));
}

/// 记录区间完成信息
pub fn log_batch_complete(batch_num: usize, completed: usize, skipped: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ 第 {} 个区间完成: 成功 {}/{}，跳过 {}",
        batch_num, completed, total, skipped
    );
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(
    completed: usize,
    skipped: usize,
    failed_submissions: usize,
    total: usize,
    log_file_path: &str,
) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", completed, total);
    info!("⏭ 跳过/放弃: {}", skipped);
    info!("❌ 提交失败: {}", failed_submissions);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
