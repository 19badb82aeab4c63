//! # Page Sorter
//!
//! 驱动一个不透明的页面排序引擎批量处理扫描页，并在部分失败时恢复
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（引擎），只暴露能力
//! - `PageEngine` - 引擎能力接口，任何符合接口的后端都可以替换
//! - `EngineAdapter` - 唯一接触引擎的组件，把原生文本转换为结构化数据和带类别的错误
//! - `InMemoryEngine` - 内存参考引擎，可注入故障
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `ResultRetriever` - 最终结果 / 三级兜底的部分结果
//! - `WarnWriter` - 写 warn.txt 能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个区间"的处理流程和会话状态机
//! - `BatchCoordinator` - 批量 / 逐页处理，按顺序发出进度事件
//! - `RecoveryController` - 降级建议、失败暂停、重试 / 跳过 / 放弃
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/session_worker` - 专用引擎线程与调用方句柄
//! - `orchestrator/batch_processor` - 批量页面处理器，管理整个运行
//! - `orchestrator/range_processor` - 单个区间处理器，按策略处理失败页
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, PageErrorPolicy};
pub use error::{AppError, AppResult, EngineError, ErrorKind, SessionError};
pub use infrastructure::{EngineAdapter, FaultPlan, InMemoryEngine, PageEngine};
pub use models::{Command, Decision, Event, ImageRecord, PageRange, SessionState, SkipList};
pub use orchestrator::{App, SessionHandle, SessionWorker};
