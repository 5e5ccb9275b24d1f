/// Returns true when a manifest path denotes a directory-creation entry.
pub fn is_directory_path(path: &str) -> bool {
    path.ends_with('/')
}

/// An ordered mapping from relative path to file content.
///
/// Paths ending in `/` are directory entries and always carry empty content;
/// `insert` enforces this so the invariant cannot be broken by callers.
/// Iteration follows insertion order, which is the order the model emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<(String, String)>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entry
    ///
    /// # Arguments
    /// * `path` - Relative path; a trailing `/` marks a directory
    /// * `content` - File content; discarded for directory entries
    ///
    /// # Returns
    /// `true` if content was discarded because the path is a directory
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) -> bool {
        let path = path.into();
        let mut content = content.into();
        let mut dropped = false;
        if is_directory_path(&path) && !content.is_empty() {
            content.clear();
            dropped = true;
        }

        if let Some(existing) = self.entries.iter_mut().find(|(p, _)| *p == path) {
            existing.1 = content;
        } else {
            self.entries.push((path, content));
        }
        dropped
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, c)| c.as_str())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|(p, _)| p == path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }

    /// Number of entries that are files rather than directories
    pub fn file_count(&self) -> usize {
        self.paths().filter(|p| !is_directory_path(p)).count()
    }
}

impl<K, V> FromIterator<(K, V)> for Manifest
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut manifest = Manifest::new();
        for (k, v) in iter {
            manifest.insert(k, v);
        }
        manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_preserves_order_and_replaces() {
        let mut manifest = Manifest::new();
        manifest.insert("b.rb", "1");
        manifest.insert("a.rb", "2");
        manifest.insert("b.rb", "3");

        let paths: Vec<&str> = manifest.paths().collect();
        assert_eq!(paths, vec!["b.rb", "a.rb"]);
        assert_eq!(manifest.get("b.rb"), Some("3"));
    }

    #[test]
    fn test_directory_entries_never_hold_content() {
        let mut manifest = Manifest::new();
        let dropped = manifest.insert("recipes/", "oops");
        assert!(dropped);
        assert_eq!(manifest.get("recipes/"), Some(""));
        assert_eq!(manifest.file_count(), 0);
    }
}
