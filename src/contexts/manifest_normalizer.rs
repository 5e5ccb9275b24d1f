//! Flattens a parsed manifest candidate into a strict path -> content map.

use crate::data::{Manifest, ManifestLike};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Keys that sit beside the files in a `{"content": ...}` wrapper without
/// changing what gets written.
const WRAPPER_METADATA_KEYS: &[&str] = &["type", "encoding", "description", "mode", "language"];

/// Tunables for normalization
#[derive(Debug, Clone)]
pub struct NormalizerOptions {
    /// Top-level keys describing the response rather than a file. Only
    /// stripped when their value is not a mapping, so a real `cookbook/`
    /// directory tree survives.
    pub metadata_keys: Vec<String>,
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        Self {
            metadata_keys: [
                "cookbook_name",
                "cookbook",
                "name",
                "directories",
                "directory_structure",
                "structure",
                "explanation",
                "description",
                "summary",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl NormalizerOptions {
    fn is_metadata_key(&self, key: &str) -> bool {
        self.metadata_keys.iter().any(|k| k == key)
    }
}

/// Normalizes with default options
pub fn normalize(candidate: &ManifestLike) -> Manifest {
    normalize_with(candidate, &NormalizerOptions::default())
}

/// Normalizes a manifest candidate
///
/// Every value in the result is a string, and directory entries are marked
/// solely by a trailing `/` with empty content.
pub fn normalize_with(candidate: &ManifestLike, options: &NormalizerOptions) -> Manifest {
    let mut manifest = Manifest::new();

    let root = match single_content_value(candidate) {
        Some(Value::Object(inner)) => {
            debug!("unwrapping top-level content wrapper");
            inner
        }
        Some(other) => {
            warn!(
                "top-level content wrapper holds a {} rather than a file map; nothing to write",
                value_kind(other)
            );
            return manifest;
        }
        None => candidate,
    };

    flatten_into(&mut manifest, "", root, options, true);
    manifest
}

fn flatten_into(
    manifest: &mut Manifest,
    prefix: &str,
    map: &Map<String, Value>,
    options: &NormalizerOptions,
    top_level: bool,
) {
    for (key, value) in map {
        if key.starts_with('_') {
            debug!("skipping annotation key {}{}", prefix, key);
            continue;
        }
        if top_level && options.is_metadata_key(key) && !value.is_object() {
            debug!("stripping metadata key {}", key);
            continue;
        }
        // Only a top-level `files` is an indirection; below that it is a
        // cookbook's own files/ directory.
        if top_level && key == "files" {
            if let Value::Object(children) = value {
                flatten_into(manifest, prefix, children, options, true);
                continue;
            }
        }

        let path = format!("{}{}", prefix, key);
        match value {
            Value::Object(inner) => {
                if let Some(content) = content_wrapper_value(inner) {
                    insert_checked(manifest, path, coerce_to_text(content));
                } else if looks_like_directory(key) {
                    let dir = format!("{}/", path.trim_end_matches('/'));
                    manifest.insert(dir.clone(), "");
                    flatten_into(manifest, &dir, inner, options, false);
                } else {
                    warn!(
                        "{} looks like a file but holds a nested mapping; writing it as text",
                        path
                    );
                    insert_checked(manifest, path, render_mapping(inner));
                }
            }
            other => insert_checked(manifest, path, coerce_to_text(other)),
        }
    }
}

fn insert_checked(manifest: &mut Manifest, path: String, content: String) {
    if manifest.insert(path.clone(), content) {
        warn!("discarded content supplied for directory entry {}", path);
    }
}

fn single_content_value(map: &Map<String, Value>) -> Option<&Value> {
    if map.len() == 1 {
        map.get("content")
    } else {
        None
    }
}

/// `{"content": X}`, optionally with descriptive siblings such as `type`
fn content_wrapper_value(map: &Map<String, Value>) -> Option<&Value> {
    let content = map.get("content")?;
    let only_metadata_besides = map
        .keys()
        .filter(|k| k.as_str() != "content")
        .all(|k| WRAPPER_METADATA_KEYS.contains(&k.as_str()));
    only_metadata_besides.then_some(content)
}

/// A key names a directory when it ends with `/` or its last segment has no
/// extension-like dot.
fn looks_like_directory(key: &str) -> bool {
    if key.ends_with('/') {
        return true;
    }
    let last = key.rsplit('/').next().unwrap_or(key);
    !last.contains('.')
}

fn coerce_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
    }
}

// Lossy by design of the format: a file-shaped key whose value is a
// structure with no content field has no canonical text form.
fn render_mapping(map: &Map<String, Value>) -> String {
    serde_json::to_string_pretty(map).unwrap_or_else(|_| format!("{:?}", map))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::is_directory_path;
    use serde_json::json;

    fn object(value: Value) -> ManifestLike {
        match value {
            Value::Object(map) => map,
            _ => panic!("test input must be an object"),
        }
    }

    fn entries(manifest: &Manifest) -> Vec<(String, String)> {
        manifest
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn test_flat_manifest_is_unchanged() {
        let input = object(json!({
            "metadata.rb": "name 'web'",
            "recipes/": "",
            "recipes/default.rb": "package 'nginx'",
            "files/default/empty.conf": ""
        }));
        let manifest = normalize(&input);
        assert_eq!(
            entries(&manifest),
            vec![
                ("metadata.rb".to_string(), "name 'web'".to_string()),
                ("recipes/".to_string(), String::new()),
                ("recipes/default.rb".to_string(), "package 'nginx'".to_string()),
                ("files/default/empty.conf".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_nested_directories_are_flattened_with_markers() {
        let input = object(json!({
            "web": {
                "recipes": {"default.rb": "package 'nginx'"},
                "attributes/": {},
                "metadata.rb": "name 'web'"
            }
        }));
        let manifest = normalize(&input);
        assert_eq!(
            entries(&manifest),
            vec![
                ("web/".to_string(), String::new()),
                ("web/recipes/".to_string(), String::new()),
                ("web/recipes/default.rb".to_string(), "package 'nginx'".to_string()),
                ("web/attributes/".to_string(), String::new()),
                ("web/metadata.rb".to_string(), "name 'web'".to_string()),
            ]
        );
    }

    #[test]
    fn test_files_indirection_is_spliced() {
        let input = object(json!({
            "cookbook_name": "web",
            "files": {"recipes/default.rb": "package 'nginx'", "README.md": "# web"}
        }));
        let manifest = normalize(&input);
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.get("recipes/default.rb"), Some("package 'nginx'"));
        assert!(!manifest.contains("files/"));
        assert!(!manifest.contains("cookbook_name"));
    }

    #[test]
    fn test_nested_files_directory_is_kept() {
        let input = object(json!({
            "web": {
                "metadata.rb": "name 'web'",
                "files": {"default": {"app.conf": "listen 80"}}
            }
        }));
        let manifest = normalize(&input);
        let paths: Vec<&str> = manifest.paths().collect();
        assert_eq!(
            paths,
            vec![
                "web/",
                "web/metadata.rb",
                "web/files/",
                "web/files/default/",
                "web/files/default/app.conf"
            ]
        );
        assert_eq!(manifest.get("web/files/default/app.conf"), Some("listen 80"));
    }

    #[test]
    fn test_top_level_content_wrapper_is_unwrapped() {
        let input = object(json!({"content": {"recipes/default.rb": "log 'hi'"}}));
        let manifest = normalize(&input);
        assert_eq!(manifest.get("recipes/default.rb"), Some("log 'hi'"));
    }

    #[test]
    fn test_per_file_content_wrappers() {
        let input = object(json!({
            "recipes/default.rb": {"content": "package 'git'"},
            "templates/motd.erb": {"content": "Welcome", "type": "template"}
        }));
        let manifest = normalize(&input);
        assert_eq!(manifest.get("recipes/default.rb"), Some("package 'git'"));
        assert_eq!(manifest.get("templates/motd.erb"), Some("Welcome"));
    }

    #[test]
    fn test_metadata_and_annotation_keys_are_stripped() {
        let input = object(json!({
            "cookbook_name": "web",
            "directories": ["recipes", "attributes"],
            "_note": "generated",
            "cookbook": {"recipes": {"_internal": "x", "default.rb": "log 'x'"}}
        }));
        let manifest = normalize(&input);
        assert_eq!(
            manifest.paths().collect::<Vec<_>>(),
            vec!["cookbook/", "cookbook/recipes/", "cookbook/recipes/default.rb"]
        );
    }

    #[test]
    fn test_scalars_are_coerced_to_text() {
        let input = object(json!({
            "VERSION": 3,
            "enabled.flag": true,
            "empty.txt": null,
            "lines.txt": ["a", "b"]
        }));
        let manifest = normalize(&input);
        assert_eq!(manifest.get("VERSION"), Some("3"));
        assert_eq!(manifest.get("enabled.flag"), Some("true"));
        assert_eq!(manifest.get("empty.txt"), Some(""));
        assert_eq!(manifest.get("lines.txt"), Some("a\nb"));
    }

    #[test]
    fn test_file_key_with_structured_value_is_rendered() {
        let input = object(json!({"config.json": {"port": 80, "hosts": ["a"]}}));
        let manifest = normalize(&input);
        let rendered = manifest.get("config.json").unwrap();
        let reparsed: Value = serde_json::from_str(rendered).unwrap();
        assert_eq!(reparsed, json!({"port": 80, "hosts": ["a"]}));
    }

    #[test]
    fn test_directory_entries_have_empty_content() {
        let input = object(json!({
            "recipes/": "should not be here",
            "nested": {"deeper": {"file.rb": "x"}}
        }));
        let manifest = normalize(&input);
        for (path, content) in manifest.iter() {
            if is_directory_path(path) {
                assert_eq!(content, "", "{} must be empty", path);
            }
        }
        assert!(manifest.iter().all(|(p, _)| !p.contains("//")));
    }

    #[test]
    fn test_flattened_keys_renest_to_original_structure() {
        let original = json!({
            "site": {
                "recipes": {"default.rb": "a", "install.rb": "b"},
                "templates": {"default": {"nginx.conf.erb": "c"}},
                "files": {"default": {"app.conf": "f"}},
                "metadata.rb": "d"
            },
            "README.md": "e"
        });
        let manifest = normalize(&object(original.clone()));

        let mut rebuilt = Map::new();
        for (path, content) in manifest.iter() {
            let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();
            let mut cursor = &mut rebuilt;
            for seg in &segments[..segments.len() - 1] {
                cursor = cursor
                    .entry(seg.to_string())
                    .or_insert_with(|| Value::Object(Map::new()))
                    .as_object_mut()
                    .unwrap();
            }
            let leaf = segments[segments.len() - 1].to_string();
            if is_directory_path(path) {
                cursor.entry(leaf).or_insert_with(|| Value::Object(Map::new()));
            } else {
                cursor.insert(leaf, Value::String(content.to_string()));
            }
        }

        assert_eq!(Value::Object(rebuilt), original);
    }
}
