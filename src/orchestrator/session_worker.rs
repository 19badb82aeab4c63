//! 会话工作线程 - 编排层
//!
//! ## 职责
//!
//! 引擎调用都是同步且昂贵的，因此所有引擎交互都放在一个专用线程里：
//!
//! 1. **唯一所有者**：工作线程独占 `EngineAdapter`，引擎不会被并发调用
//! 2. **顺序处理**：命令按到达顺序逐条处理（单一 FIFO 队列）
//! 3. **事件回传**：每条命令得到零个或多个进度事件，最后是一个终止事件
//! 4. **故障隔离**：引擎 panic 被转换为 `failed` 事件，不会越过线程边界
//!
//! 调用方只持有 [`SessionHandle`]，可以随意克隆。

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, ErrorKind, SessionError};
use crate::infrastructure::{EngineAdapter, PageEngine};
use crate::models::{Command, Event, SessionState};
use crate::services::ResultRetriever;
use crate::workflow::{BatchCoordinator, EventSink, RecoveryController};

/// 发给工作线程的一条请求
pub struct Request {
    pub command: Command,
    pub reply: UnboundedSender<Event>,
}

/// 一个会话：引擎适配器 + 状态机 + 结果检索
///
/// 只在工作线程内使用，也可以在测试里直接同步驱动。
pub struct SessionWorker<E: PageEngine> {
    adapter: EngineAdapter<E>,
    controller: RecoveryController,
    retriever: ResultRetriever,
}

impl<E: PageEngine> SessionWorker<E> {
    pub fn new(engine: E, verbose_logging: bool) -> Self {
        Self {
            adapter: EngineAdapter::new(engine),
            controller: RecoveryController::new(BatchCoordinator::new(verbose_logging)),
            retriever: ResultRetriever::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.controller.state()
    }

    /// 处理一条命令
    pub fn handle(&mut self, command: Command, sink: &mut impl EventSink) {
        let name = command.name();
        if let Err(reason) = self.controller.admit(&command) {
            warn!("⚠️ 命令 {} 在状态 {} 下被拒绝: {}", name, self.state(), reason);
            sink.emit(Event::Rejected {
                command: name.to_string(),
                state: self.state(),
                reason,
            });
            return;
        }
        debug!("处理命令 {} (状态 {})", name, self.state());

        match command {
            Command::Initialize => match self.adapter.initialize() {
                Ok(()) => {
                    info!("✓ 引擎已就绪");
                    sink.emit(Event::Ready);
                }
                Err(e) => emit_failure(sink, name, &e),
            },
            Command::SubmitImage(record) => match self.adapter.submit_image(&record) {
                Ok(()) => {
                    self.controller.on_image_added();
                    sink.emit(Event::Added {
                        index: record.index,
                    });
                }
                Err(e) => emit_failure(sink, name, &e),
            },
            Command::ProcessBulk { range } => {
                self.controller.begin_processing();
                self.controller.run_bulk(&mut self.adapter, range, sink);
            }
            Command::ProcessIndividual { range, skip_list } => {
                self.controller.begin_processing();
                self.controller
                    .run_individual(&mut self.adapter, range, skip_list, sink);
            }
            Command::Resume(decision) => {
                self.controller.resume(&mut self.adapter, decision, sink);
            }
            Command::GetFinalResults => match self.retriever.final_results(&mut self.adapter) {
                Ok(sorted_pages) => {
                    self.controller.reset();
                    sink.emit(Event::ResultsReady { sorted_pages });
                }
                Err(e) => emit_failure(sink, name, &e),
            },
            Command::GetPartialResults => {
                let partial_results = self.retriever.partial_results(&mut self.adapter);
                sink.emit(Event::PartialResults { partial_results });
            }
            Command::GetTotalImages => match self.adapter.total_images() {
                Ok(total) => sink.emit(Event::TotalImages { total }),
                Err(e) => emit_failure(sink, name, &e),
            },
            Command::GetProcessedCount => match self.adapter.progress() {
                Ok(progress) => sink.emit(Event::ProcessedCount {
                    processed: progress.processed,
                    total: progress.total,
                    percentage: progress.percentage(),
                }),
                Err(e) => emit_failure(sink, name, &e),
            },
            Command::ClearImages => match self.adapter.reset() {
                Ok(()) => {
                    self.controller.reset();
                    sink.emit(Event::Cleared);
                }
                Err(e) => emit_failure(sink, name, &e),
            },
        }
    }

    /// 在专用线程上启动会话，返回调用方句柄
    pub fn spawn(self) -> Result<SessionHandle, SessionError>
    where
        E: 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("page-engine".to_string())
            .spawn(move || self.serve(rx))
            .map_err(SessionError::SpawnFailed)?;
        Ok(SessionHandle { tx })
    }

    fn serve(mut self, mut rx: UnboundedReceiver<Request>) {
        info!("🧵 引擎工作线程已启动");
        while let Some(Request { command, mut reply }) = rx.blocking_recv() {
            let name = command.name();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.handle(command, &mut reply);
            }));
            if let Err(payload) = outcome {
                let message = panic_message(payload.as_ref());
                error!("❌ 命令 {} 处理时引擎崩溃: {}", name, message);
                self.controller.abandon_in_flight();
                reply.emit(Event::Failed {
                    operation: name.to_string(),
                    kind: ErrorKind::Internal,
                    error: message,
                });
            }
        }
        info!("🧵 所有句柄已释放，引擎工作线程退出");
    }
}

/// 调用方句柄
#[derive(Clone)]
pub struct SessionHandle {
    tx: UnboundedSender<Request>,
}

impl SessionHandle {
    /// 发送命令，返回该命令的事件流
    pub fn submit(&self, command: Command) -> Result<UnboundedReceiver<Event>, SessionError> {
        let (reply, events) = mpsc::unbounded_channel();
        self.tx
            .send(Request { command, reply })
            .map_err(|_| SessionError::WorkerGone)?;
        Ok(events)
    }

    /// 发送命令并收集全部事件（最后一个为终止事件）
    pub async fn request(&self, command: Command) -> Result<Vec<Event>, SessionError> {
        let mut events = self.submit(command)?;
        let mut collected = Vec::new();
        while let Some(event) = events.recv().await {
            let terminal = event.is_terminal();
            collected.push(event);
            if terminal {
                return Ok(collected);
            }
        }
        Err(SessionError::WorkerGone)
    }

    /// 与 [`Self::request`] 相同，但超过截止时间后放弃等待
    ///
    /// 工作线程中正在进行的引擎调用仍会完成，它产生的事件被丢弃。
    pub async fn request_with_deadline(
        &self,
        command: Command,
        deadline: Duration,
    ) -> Result<Vec<Event>, SessionError> {
        let name = command.name();
        tokio::time::timeout(deadline, self.request(command))
            .await
            .map_err(|_| SessionError::Timeout {
                command: name,
                after: deadline,
            })?
    }
}

fn emit_failure(sink: &mut impl EventSink, operation: &str, error: &EngineError) {
    error!("❌ {} 失败: {}", operation, error);
    sink.emit(Event::Failed {
        operation: operation.to_string(),
        kind: error.kind(),
        error: error.to_string(),
    });
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "engine panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{FaultPlan, InMemoryEngine};
    use crate::models::{ImageRecord, PageRange};

    fn run(worker: &mut SessionWorker<InMemoryEngine>, command: Command) -> Vec<Event> {
        let mut events = Vec::new();
        worker.handle(command, &mut events);
        events
    }

    fn image(index: usize) -> Command {
        Command::SubmitImage(ImageRecord::new(index, 1, 1, vec![0; 4]))
    }

    #[test]
    fn test_rejected_command_reports_state() {
        let mut worker = SessionWorker::new(InMemoryEngine::new(), false);
        let events = run(
            &mut worker,
            Command::ProcessBulk {
                range: PageRange::new(0, 1),
            },
        );
        match &events[..] {
            [Event::Rejected { command, state, .. }] => {
                assert_eq!(command, "processBulk");
                assert_eq!(*state, SessionState::Empty);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_initialization_failure_is_reported_once() {
        let faults = FaultPlan {
            fail_initialize: true,
            ..Default::default()
        };
        let mut worker = SessionWorker::new(InMemoryEngine::with_faults(faults), false);
        let events = run(&mut worker, Command::Initialize);
        assert!(matches!(
            events[..],
            [Event::Failed {
                kind: ErrorKind::Initialization,
                ..
            }]
        ));
        let events = run(&mut worker, image(0));
        assert!(matches!(
            events[..],
            [Event::Failed {
                kind: ErrorKind::Submission,
                ..
            }]
        ));
        assert_eq!(worker.state(), SessionState::Empty);
    }

    #[test]
    fn test_commands_before_initialize_fail() {
        let mut worker = SessionWorker::new(InMemoryEngine::new(), false);

        for command in [
            Command::GetFinalResults,
            Command::GetTotalImages,
            Command::GetProcessedCount,
            Command::ClearImages,
        ] {
            let name = command.name();
            match &run(&mut worker, command)[..] {
                [Event::Failed { operation, error, .. }] => {
                    assert_eq!(operation, name);
                    assert!(error.contains("引擎尚未初始化"));
                }
                other => panic!("{name}: unexpected events: {other:?}"),
            }
        }
        assert!(matches!(
            run(&mut worker, image(0))[..],
            [Event::Failed {
                kind: ErrorKind::Submission,
                ..
            }]
        ));

        // 部分结果退到最后一级
        match &run(&mut worker, Command::GetPartialResults)[..] {
            [Event::PartialResults { partial_results }] => {
                assert_eq!(
                    partial_results.metadata.error.as_deref(),
                    Some(crate::services::NO_RESULTS_MESSAGE)
                );
                assert!(partial_results.metadata.fallback_error.is_some());
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert_eq!(worker.state(), SessionState::Empty);
    }

    #[test]
    fn test_empty_range_at_index_limit() {
        let mut worker = SessionWorker::new(InMemoryEngine::new(), false);
        run(&mut worker, Command::Initialize);
        run(&mut worker, image(0));

        let range = PageRange::new(usize::MAX, usize::MAX);
        let events = run(
            &mut worker,
            Command::ProcessIndividual {
                range,
                skip_list: Default::default(),
            },
        );
        assert_eq!(
            events,
            vec![Event::IndividualBatchComplete {
                current: 0,
                total: 0,
                range,
            }]
        );
    }

    #[test]
    fn test_final_results_destroy_session() {
        let mut worker = SessionWorker::new(InMemoryEngine::new(), false);
        run(&mut worker, Command::Initialize);
        run(&mut worker, image(0));
        assert_eq!(worker.state(), SessionState::Populating);
        run(
            &mut worker,
            Command::ProcessBulk {
                range: PageRange::new(0, 1),
            },
        );
        assert_eq!(worker.state(), SessionState::Completed);

        let events = run(&mut worker, Command::GetFinalResults);
        assert!(matches!(events[..], [Event::ResultsReady { .. }]));
        assert_eq!(worker.state(), SessionState::Empty);
        assert_eq!(
            run(&mut worker, Command::GetProcessedCount),
            vec![Event::ProcessedCount {
                processed: 0,
                total: 0,
                percentage: 0,
            }]
        );
    }

    #[tokio::test]
    async fn test_panicking_engine_is_contained() {
        let faults = FaultPlan {
            panic_on_page: Some(1),
            ..Default::default()
        };
        let handle = SessionWorker::new(InMemoryEngine::with_faults(faults), false)
            .spawn()
            .unwrap();
        handle.request(Command::Initialize).await.unwrap();
        handle.request(image(0)).await.unwrap();

        let events = handle
            .request(Command::ProcessBulk {
                range: PageRange::new(0, 1),
            })
            .await
            .unwrap();
        assert!(matches!(
            events.last(),
            Some(Event::Failed {
                kind: ErrorKind::Internal,
                ..
            })
        ));

        // 工作线程仍然可用，会话可以重新下发处理
        let events = handle.request(Command::GetTotalImages).await.unwrap();
        assert_eq!(events, vec![Event::TotalImages { total: 1 }]);
        let events = handle
            .request(Command::ProcessBulk {
                range: PageRange::new(1, 1),
            })
            .await
            .unwrap();
        assert!(matches!(events[..], [Event::BatchComplete { .. }]));
    }
}
