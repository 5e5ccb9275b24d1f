/// End-to-end tests for the reply-to-filesystem pipeline
///
/// The offline tests drive extraction, normalization, validation and
/// materialization with canned replies. `live_generate` talks to the
/// configured Azure OpenAI deployment.
///
/// Run the live test with: cargo test live_generate --test pipeline_test -- --nocapture --ignored
use chef_ai::client::AzureOpenAiClient;
use chef_ai::contexts::{
    extract_migrated_code, extract_response, normalize, summarize, AssistantRunner,
    FileMaterializer, MigrationOptions, MigrationSession, MigrationState,
};
use chef_ai::contexts::{AnalysisRequest, AssistantRunnerError};
use chef_ai::credentials::CredentialSet;
use chef_ai::registries::FilePromptRegistry;
use chef_ai::settings::{Config, Settings};
use serde::Serialize;
use std::fs;
use tempfile::TempDir;

#[test]
fn generate_reply_with_leading_prose() {
    let reply = "I'll create X.\n\n{\"metadata.rb\": \"name 'x'\", \"recipes/\": \"\", \"recipes/default.rb\": \"package 'nginx'\"}";

    let extraction = extract_response(reply);
    assert_eq!(extraction.explanation, "I'll create X.");
    let manifest = normalize(extraction.manifest.as_ref().expect("manifest found"));
    assert_eq!(manifest.len(), 3);
    assert!(summarize(&manifest).has_real_files);

    let temp = TempDir::new().unwrap();
    let out = temp.path().join("out");
    let report = FileMaterializer::new(&out).materialize(&manifest).unwrap();

    assert!(report.is_complete());
    assert_eq!(fs::read_to_string(out.join("metadata.rb")).unwrap(), "name 'x'");
    assert!(out.join("recipes").is_dir());
    assert_eq!(
        fs::read_to_string(out.join("recipes/default.rb")).unwrap(),
        "package 'nginx'"
    );
}

#[test]
fn directory_only_manifest_has_no_real_files() {
    let reply = "```json\n{\"cookbook/\": \"\", \"cookbook/recipes/\": \"\"}\n```";
    let manifest = normalize(extract_response(reply).manifest.as_ref().unwrap());

    assert_eq!(manifest.len(), 2);
    assert_eq!(manifest.file_count(), 0);
    assert!(!summarize(&manifest).has_real_files);
}

#[test]
fn nested_reply_is_flattened_before_writing() {
    let reply = r#"Here you go:

```json
{
  "content": {
    "webserver": {
      "metadata.rb": "name 'webserver'\n",
      "recipes": {
        "default.rb": "include_recipe 'nginx'\n"
      }
    }
  }
}
```
"#;
    let manifest = normalize(extract_response(reply).manifest.as_ref().unwrap());
    assert!(manifest.contains("webserver/metadata.rb"));
    assert!(manifest.contains("webserver/recipes/default.rb"));

    let temp = TempDir::new().unwrap();
    FileMaterializer::new(temp.path()).materialize(&manifest).unwrap();
    assert_eq!(
        fs::read_to_string(temp.path().join("webserver/recipes/default.rb")).unwrap(),
        "include_recipe 'nginx'\n"
    );
}

#[test]
fn escaping_entries_fail_without_stopping_the_rest() {
    let reply = "```json\n{\"../evil.rb\": \"x\", \"ok/recipe.rb\": \"package 'git'\"}\n```";
    let manifest = normalize(extract_response(reply).manifest.as_ref().unwrap());

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("out");
    let report = FileMaterializer::new(&root).materialize(&manifest).unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(root.join("ok/recipe.rb").is_file());
    assert!(!temp.path().join("evil.rb").exists());
}

#[test]
fn compatible_file_is_left_byte_for_byte() {
    let original: String = (1..=50)
        .map(|i| format!("package 'pkg{}' do\n  action :install\nend\n", i))
        .collect::<Vec<_>>()
        .join("");
    let analysis = "This file is already compatible with the target version.";

    assert_eq!(extract_migrated_code(analysis, &original), original);
}

#[test]
fn migration_session_rewrites_and_backs_up() {
    let temp = TempDir::new().unwrap();
    let recipe = temp.path().join("default.rb");
    let original = "node.set['app']['port'] = 8080\nservice 'app'\n";
    fs::write(&recipe, original).unwrap();

    let mut analyzer = |_: &AnalysisRequest<'_>| -> Result<String, AssistantRunnerError> {
        Ok("ISSUE: node.set is gone.\n```ruby\nnode.default['app']['port'] = 8080\nservice 'app'\n```".to_string())
    };
    let options = MigrationOptions::from_settings("12", "18", &Settings::default());
    let mut session = MigrationSession::new(temp.path(), options);
    let summary = session.scan(&mut analyzer, |_| {}).unwrap();
    assert_eq!(summary.issues, 1);

    let report = session.apply(None).unwrap();
    assert_eq!(report.written, 1);
    assert!(matches!(
        session.state(),
        MigrationState::FilesWritten { written: 1, total: 1 }
    ));
    assert_eq!(
        fs::read_to_string(&recipe).unwrap(),
        "node.default['app']['port'] = 8080\nservice 'app'\n"
    );

    let backup_dir = report.backup_dir.unwrap();
    assert_eq!(fs::read_to_string(backup_dir.join("default.rb")).unwrap(), original);
    assert!(report.ledger_path.unwrap().is_file());
}

#[derive(Serialize)]
struct DescriptionInput {
    description: String,
}

#[test]
#[ignore] // Needs Azure OpenAI credentials and network access
fn live_generate() {
    let path = CredentialSet::default_path().expect("credentials path");
    let credentials = CredentialSet::resolve(&path).expect("credentials configured");
    let config = Config::default();
    let client = AzureOpenAiClient::new(&credentials, &config.settings).expect("client");
    let runner = AssistantRunner::new("generate", FilePromptRegistry::default(), client, &config);

    let result = runner
        .run(&DescriptionInput {
            description: "a minimal cookbook named hello that installs the tree package".to_string(),
        })
        .expect("assistant reply");
    println!("{}", result.output);

    let extraction = extract_response(&result.output);
    let manifest = normalize(extraction.manifest.as_ref().expect("manifest in reply"));
    assert!(summarize(&manifest).has_real_files);

    let temp = TempDir::new().unwrap();
    let report = FileMaterializer::new(temp.path()).materialize(&manifest).unwrap();
    println!("✓ Created {}/{} entries", report.created, report.total);
    assert!(report.created > 0);
}
