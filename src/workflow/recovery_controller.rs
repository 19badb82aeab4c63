//! 恢复控制 - 流程层
//!
//! 持有会话状态机：批量失败后的降级建议、逐页失败后的暂停，以及暂停后的恢复。
//! 跳过列表和暂停点只在这里维护。

use tracing::{debug, info, warn};

use super::batch_coordinator::{BatchCoordinator, IndividualOutcome};
use super::event_sink::EventSink;
use crate::infrastructure::{EngineAdapter, PageEngine};
use crate::models::{Command, Decision, Event, PageRange, PausePoint, SessionState, SkipList};

/// 恢复控制器
pub struct RecoveryController {
    state: SessionState,
    skip_list: SkipList,
    pause: Option<PausePoint>,
    coordinator: BatchCoordinator,
}

impl RecoveryController {
    pub fn new(coordinator: BatchCoordinator) -> Self {
        Self {
            state: SessionState::Empty,
            skip_list: SkipList::new(),
            pause: None,
            coordinator,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn skip_list(&self) -> &SkipList {
        &self.skip_list
    }

    pub fn pause_point(&self) -> Option<PausePoint> {
        self.pause
    }

    /// 判断当前状态是否接受该命令，拒绝时返回原因
    pub fn admit(&self, command: &Command) -> Result<(), String> {
        let paused = self.state == SessionState::PausedOnError;
        match command {
            Command::Initialize
            | Command::ClearImages
            | Command::GetPartialResults
            | Command::GetTotalImages
            | Command::GetProcessedCount => Ok(()),
            Command::SubmitImage(_) if paused => {
                Err("会话因页面错误暂停，需先决定重试/跳过/放弃".to_string())
            }
            Command::SubmitImage(_) => Ok(()),
            Command::ProcessBulk { range } | Command::ProcessIndividual { range, .. }
                if !range.is_well_formed() =>
            {
                Err(format!("区间不合法: {range}"))
            }
            Command::ProcessBulk { .. } if paused => {
                Err("会话因页面错误暂停，批量处理被拒绝".to_string())
            }
            Command::ProcessIndividual { .. } if paused => Ok(()),
            Command::ProcessBulk { .. } | Command::ProcessIndividual { .. } => {
                if self.state.accepts_processing() {
                    Ok(())
                } else {
                    Err("会话中还没有图片".to_string())
                }
            }
            Command::Resume(_) if paused => Ok(()),
            Command::Resume(_) => Err("没有等待决定的暂停点".to_string()),
            Command::GetFinalResults if paused => {
                Err("会话因页面错误暂停，取最终结果会丢弃暂停的区间".to_string())
            }
            Command::GetFinalResults => Ok(()),
        }
    }

    /// 一张图片提交成功
    pub fn on_image_added(&mut self) {
        self.state = SessionState::Populating;
    }

    /// 处理命令已被接受：已有图片的会话进入 `Ready`
    pub fn begin_processing(&mut self) {
        if matches!(
            self.state,
            SessionState::Populating | SessionState::Completed
        ) {
            debug!("会话状态 {} → Ready", self.state);
            self.state = SessionState::Ready;
        }
    }

    /// 会话被清空或最终结果已取走
    pub fn reset(&mut self) {
        self.state = SessionState::Empty;
        self.skip_list = SkipList::new();
        self.pause = None;
    }

    /// 处理中途发生内部故障，回到可以重新下发处理的状态
    pub fn abandon_in_flight(&mut self) {
        if matches!(
            self.state,
            SessionState::BulkProcessing | SessionState::IndividualProcessing
        ) {
            self.state = SessionState::Ready;
        }
    }

    /// 批量处理一个区间
    ///
    /// 失败时回到 `Ready`，由调用方决定是否改用逐页模式。
    pub fn run_bulk<E: PageEngine>(
        &mut self,
        adapter: &mut EngineAdapter<E>,
        range: PageRange,
        sink: &mut impl EventSink,
    ) {
        self.state = SessionState::BulkProcessing;
        self.state = match self.coordinator.run_bulk(adapter, range, sink) {
            Ok(progress) if progress.total > 0 && progress.is_complete() => {
                SessionState::Completed
            }
            _ => SessionState::Ready,
        };
    }

    /// 逐页处理一个区间，调用方提供的跳过列表替换当前列表
    pub fn run_individual<E: PageEngine>(
        &mut self,
        adapter: &mut EngineAdapter<E>,
        range: PageRange,
        skip_list: SkipList,
        sink: &mut impl EventSink,
    ) {
        if let Some(pause) = self.pause.take() {
            info!(
                "[区间 {}] 调用方重新提交逐页处理，放弃暂停点 (页 #{})",
                pause.range, pause.failed_page
            );
        }
        self.skip_list = skip_list;
        self.drive(adapter, range, sink);
    }

    /// 处理暂停后的决定
    ///
    /// 只在 `PausedOnError` 下被接受（见 [`Self::admit`]）。
    pub fn resume<E: PageEngine>(
        &mut self,
        adapter: &mut EngineAdapter<E>,
        decision: Decision,
        sink: &mut impl EventSink,
    ) {
        let Some(pause) = self.pause.take() else {
            warn!("没有暂停点，忽略决定 {}", decision);
            return;
        };
        info!(
            "[区间 {}] 收到决定: {} (失败页 #{})",
            pause.range, decision, pause.failed_page
        );

        match decision {
            Decision::Retry => self.drive(adapter, pause.unfinished(), sink),
            Decision::Skip => {
                self.skip_list.insert(pause.failed_page);
                self.drive(adapter, pause.unfinished(), sink);
            }
            Decision::Abort => {
                warn!(
                    "[区间 {}] ⚠️ 放弃剩余页 (从页 #{} 起)，已完成的页仍可通过部分结果获取",
                    pause.range, pause.failed_page
                );
                self.state = SessionState::Completed;
                sink.emit(Event::Aborted {
                    range: pause.range,
                    failed_page: pause.failed_page,
                });
            }
        }
    }

    fn drive<E: PageEngine>(
        &mut self,
        adapter: &mut EngineAdapter<E>,
        range: PageRange,
        sink: &mut impl EventSink,
    ) {
        self.state = SessionState::IndividualProcessing;
        match self
            .coordinator
            .run_individual(adapter, range, &self.skip_list, sink)
        {
            IndividualOutcome::Complete { .. } => {
                self.state = SessionState::Completed;
            }
            IndividualOutcome::Halted { page_number, .. } => {
                warn!("[区间 {}] ⏸ 在页 #{} 暂停，等待决定", range, page_number);
                self.state = SessionState::PausedOnError;
                self.pause = Some(PausePoint {
                    range,
                    failed_page: page_number,
                });
            }
        }
    }
}
