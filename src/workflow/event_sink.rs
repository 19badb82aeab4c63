//! 事件出口
//!
//! 流程层只管按顺序发出事件，不关心事件最终送到哪里。

use tokio::sync::mpsc::UnboundedSender;

use crate::models::Event;

pub trait EventSink {
    fn emit(&mut self, event: Event);
}

/// 收集到内存（单元测试、同步调用）
impl EventSink for Vec<Event> {
    fn emit(&mut self, event: Event) {
        self.push(event);
    }
}

/// 送回调用方
///
/// 调用方已经放弃等待（例如截止时间已到）时，事件直接丢弃。
impl EventSink for UnboundedSender<Event> {
    fn emit(&mut self, event: Event) {
        if self.send(event).is_err() {
            tracing::debug!("调用方已不再接收事件，丢弃");
        }
    }
}
