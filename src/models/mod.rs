pub mod bundle;
pub mod loaders;
pub mod page;
pub mod protocol;
pub mod session;

pub use bundle::{BundleMetadata, BundleProgress, PartialResultBundle};
pub use loaders::{load_image_records, load_manifest, ManifestEntry, PageManifest};
pub use page::{
    progress_percentage, ImageRecord, PageAssignment, PageRange, ProgressRecord, SkipList,
};
pub use protocol::{Command, Event};
pub use session::{Decision, PausePoint, ProcessingMode, SessionState};
