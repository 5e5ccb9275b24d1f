mod assistant_runner;
mod code_migration_extractor;
mod file_materializer;
mod manifest_normalizer;
pub mod manifest_validator;
mod migration_session;
mod response_extractor;

pub use assistant_runner::{
    replace_placeholders, AssistantRunner, AssistantRunnerError, ExecutionError, ExecutionResult,
    PopulateError, PopulatedPrompt, PromptRegistry, PromptTemplate,
};
pub use code_migration_extractor::{
    apply_replacements, extract_migrated_code, is_structurally_complete, replace_instructions,
    structure_profile, CodeMigrationExtractor, MigrationExtraction, MigrationExtractorOptions,
    MigrationStrategy, StructureProfile,
};
pub use file_materializer::{safe_relative_path, FileMaterializer, MaterializeError, MaterializeReport};
pub use manifest_normalizer::{normalize, normalize_with, NormalizerOptions};
pub use manifest_validator::summarize;
pub use migration_session::{
    AnalysisRequest, ApplyReport, MigrationAnalyzer, MigrationError, MigrationOptions,
    MigrationSession, MigrationState, PlannedChange, ScanProgress, ScanSummary, BACKUP_DIR_PREFIX,
};
pub use response_extractor::{extract_parsed, extract_response};
