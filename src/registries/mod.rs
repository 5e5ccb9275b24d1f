mod prompt_registry;

pub use prompt_registry::FilePromptRegistry;
