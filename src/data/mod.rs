mod extraction;
mod manifest;
mod migration;
mod summary;

pub use extraction::{ExtractionStrategy, ManifestLike, RawExtraction};
pub use manifest::{is_directory_path, Manifest};
pub use migration::MigrationAnalysisResult;
pub use summary::FileTypeSummary;
