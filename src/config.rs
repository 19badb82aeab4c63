use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, ConfigError, FileError};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "PAGE_SORTER_";

/// 逐页处理遇到失败页时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageErrorPolicy {
    /// 重试失败页，超过次数上限后跳过
    #[default]
    Retry,
    /// 直接跳过失败页
    Skip,
    /// 放弃区间剩余的页
    Abort,
}

impl FromStr for PageErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retry" => Ok(PageErrorPolicy::Retry),
            "skip" => Ok(PageErrorPolicy::Skip),
            "abort" => Ok(PageErrorPolicy::Abort),
            other => Err(format!("未知的策略: {other}")),
        }
    }
}

impl fmt::Display for PageErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageErrorPolicy::Retry => f.write_str("retry"),
            PageErrorPolicy::Skip => f.write_str("skip"),
            PageErrorPolicy::Abort => f.write_str("abort"),
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 页面清单（TOML）
    pub manifest_path: String,
    /// 每个区间包含的页数
    pub batch_size: usize,
    /// 失败页处理策略
    pub page_error_policy: PageErrorPolicy,
    /// 每页最多重试次数（策略为 retry 时）
    pub max_page_retries: u32,
    /// 批量处理的截止时间（秒），0 表示不限
    pub bulk_timeout_secs: u64,
    /// 结果输出文件（JSON）
    pub output_file: String,
    /// 警告文件
    pub warn_file: String,
    /// 输出日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- 参考引擎 ---
    /// 模拟处理失败的页码
    pub simulated_failing_pages: Vec<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest_path: "pages.toml".to_string(),
            batch_size: 50,
            page_error_policy: PageErrorPolicy::Retry,
            max_page_retries: 2,
            bulk_timeout_secs: 0,
            output_file: "sorted_pages.json".to_string(),
            warn_file: "warn.txt".to_string(),
            output_log_file: "output.txt".to_string(),
            verbose_logging: false,
            simulated_failing_pages: Vec::new(),
        }
    }
}

impl Config {
    /// 加载配置：可选的 TOML 文件，再用环境变量覆盖
    ///
    /// 配置文件路径取自 `PAGE_SORTER_CONFIG`，未设置时使用 `page_sorter.toml`（不存在则忽略）。
    pub fn load() -> AppResult<Self> {
        let path = std::env::var(format!("{ENV_PREFIX}CONFIG"))
            .unwrap_or_else(|_| "page_sorter.toml".to_string());
        let base = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        base.with_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// 从 TOML 文件读取
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        if !path.exists() {
            return Err(FileError::NotFound { path: display }.into());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::file_read_failed(display.clone(), e))?;
        let config: Config = toml::from_str(&content).map_err(|source| FileError::TomlParseFailed {
            path: display,
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 只使用环境变量（在默认值基础上覆盖）
    pub fn from_env() -> AppResult<Self> {
        Self::default().with_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// 用 `lookup` 提供的值覆盖配置，`lookup` 的参数是去掉前缀的变量名
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        if let Some(v) = lookup("MANIFEST_PATH") {
            self.manifest_path = v;
        }
        if let Some(v) = lookup("BATCH_SIZE") {
            self.batch_size = parse_var("BATCH_SIZE", &v, "usize")?;
        }
        if let Some(v) = lookup("PAGE_ERROR_POLICY") {
            self.page_error_policy = parse_var("PAGE_ERROR_POLICY", &v, "retry|skip|abort")?;
        }
        if let Some(v) = lookup("MAX_PAGE_RETRIES") {
            self.max_page_retries = parse_var("MAX_PAGE_RETRIES", &v, "u32")?;
        }
        if let Some(v) = lookup("BULK_TIMEOUT_SECS") {
            self.bulk_timeout_secs = parse_var("BULK_TIMEOUT_SECS", &v, "u64")?;
        }
        if let Some(v) = lookup("OUTPUT_FILE") {
            self.output_file = v;
        }
        if let Some(v) = lookup("WARN_FILE") {
            self.warn_file = v;
        }
        if let Some(v) = lookup("OUTPUT_LOG_FILE") {
            self.output_log_file = v;
        }
        if let Some(v) = lookup("VERBOSE_LOGGING") {
            self.verbose_logging = parse_var("VERBOSE_LOGGING", &v, "bool")?;
        }
        if let Some(v) = lookup("SIMULATED_FAILING_PAGES") {
            self.simulated_failing_pages = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_var("SIMULATED_FAILING_PAGES", s, "逗号分隔的页码"))
                .collect::<AppResult<_>>()?;
        }
        self.validate()?;
        Ok(self)
    }

    /// 批量处理的截止时间
    pub fn bulk_timeout(&self) -> Option<Duration> {
        (self.bulk_timeout_secs > 0).then(|| Duration::from_secs(self.bulk_timeout_secs))
    }

    fn validate(&self) -> AppResult<()> {
        if self.batch_size == 0 {
            return Err(AppError::invalid_config("batch_size", "必须大于 0"));
        }
        if self.simulated_failing_pages.contains(&0) {
            return Err(AppError::invalid_config(
                "simulated_failing_pages",
                "页码从 1 开始",
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str, expected_type: &str) -> AppResult<T> {
    value.trim().parse().map_err(|_| {
        ConfigError::EnvVarParseFailed {
            var_name: format!("{ENV_PREFIX}{key}"),
            value: value.to_string(),
            expected_type: expected_type.to_string(),
        }
        .into()
    })
}
