//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责引擎线程的生命周期和区间调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `session_worker` - 会话工作线程
//! - 独占引擎（`EngineAdapter`），在专用线程上逐条处理命令
//! - 把每条命令的结果以事件流回传给调用方
//! - 提供可克隆的 `SessionHandle`（含截止时间）
//!
//! ### `batch_processor` - 批量页面处理器
//! - 管理应用生命周期（初始化、运行）
//! - 加载页面清单并提交图片（Vec<ImageRecord>）
//! - 把页面切成连续区间，逐个交给 range_processor
//! - 取最终结果或部分结果并输出
//!
//! ### `range_processor` - 单个区间处理器
//! - 批量优先，失败后降级为逐页
//! - 按策略对失败页做出重试 / 跳过 / 放弃决定
//! - 输出单个区间的统计信息
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理整个页面集合)
//!     ↓
//! range_processor (处理一个区间)
//!     ↓  命令 / 事件
//! session_worker (专用线程)
//!     ↓
//! workflow::RecoveryController → BatchCoordinator
//!     ↓
//! services (能力层：结果检索 / warn)
//!     ↓
//! infrastructure (基础设施：EngineAdapter)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管全局，range_processor 管单个区间
//! 2. **资源隔离**：只有工作线程持有引擎
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **无业务逻辑**：只做调度和统计，状态机判断都在 workflow 层

pub mod batch_processor;
pub mod range_processor;
pub mod session_worker;

// 重新导出主要类型
pub use batch_processor::{App, RunOutput, RunSummary};
pub use range_processor::{process_range, RangeStats};
pub use session_worker::{Request, SessionHandle, SessionWorker};
