pub mod batch_coordinator;
pub mod event_sink;
pub mod page_ctx;
pub mod recovery_controller;

pub use batch_coordinator::{BatchCoordinator, IndividualOutcome};
pub use event_sink::EventSink;
pub use page_ctx::PageCtx;
pub use recovery_controller::RecoveryController;
