pub mod engine;
pub mod engine_adapter;
pub mod memory_engine;

pub use engine::{BufferHandle, PageEngine};
pub use engine_adapter::EngineAdapter;
pub use memory_engine::{FaultPlan, InMemoryEngine, SEQUENTIAL_DOCUMENT};
