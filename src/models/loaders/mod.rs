pub mod toml_loader;

pub use toml_loader::{load_image_records, load_manifest, ManifestEntry, PageManifest};
