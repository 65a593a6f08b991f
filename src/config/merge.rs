//! Deep merge of YAML configuration documents.
//!
//! The essential document supplies defaults and the override document wins at
//! every nesting level. Merged trees are written world-readable because the
//! gateway that consumes them may run as a different, unprivileged user.

use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{MergeError, Result};

/// Permission bits for rendered configuration files.
pub(crate) const CONFIG_FILE_MODE: u32 = 0o644;

/// An untyped, arbitrarily nested configuration tree.
pub type ConfigTree = Mapping;

/// Merges YAML documents and persists the result.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigMerger;

impl ConfigMerger {
    /// Creates a new merger.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Parses both documents and merges them, override taking precedence.
    ///
    /// A missing or empty document is treated as an empty tree.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::Override`] or [`MergeError::Essential`]
    /// depending on which document could not be parsed.
    pub fn merge(
        &self,
        override_doc: Option<&[u8]>,
        essential_doc: Option<&[u8]>,
    ) -> std::result::Result<ConfigTree, MergeError> {
        let overrides = parse_tree(override_doc)
            .map_err(|message| MergeError::Override { message })?;
        let mut merged = parse_tree(essential_doc)
            .map_err(|message| MergeError::Essential { message })?;

        debug!(
            override_keys = overrides.len(),
            essential_keys = merged.len(),
            "Merging configuration trees"
        );

        merge_mapping(&mut merged, overrides);
        Ok(merged)
    }

    /// Serializes a tree to YAML bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be serialized.
    pub fn render(&self, tree: &ConfigTree) -> std::result::Result<Vec<u8>, MergeError> {
        serde_yaml::to_string(tree)
            .map(String::into_bytes)
            .map_err(|e| MergeError::Serialize {
                message: e.to_string(),
            })
    }

    /// Writes a tree to `path` as world-readable YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_to_file(&self, tree: &ConfigTree, path: &Path) -> Result<()> {
        let content = self.render(tree)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        set_mode(path, CONFIG_FILE_MODE)?;

        debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Writes a tree to a new temporary file named after `prefix` and
    /// returns its path. The file outlives this process.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_to_temp_file(&self, tree: &ConfigTree, prefix: &str) -> Result<PathBuf> {
        let content = self.render(tree)?;

        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(".yaml")
            .tempfile()?;
        std::fs::write(file.path(), content)?;

        let (_, path) = file.keep().map_err(|e| e.error)?;
        set_mode(&path, CONFIG_FILE_MODE)?;

        debug!("Saved configuration to temporary file {}", path.display());
        Ok(path)
    }
}

/// Parses a document into a mapping; empty input yields an empty mapping.
fn parse_tree(doc: Option<&[u8]>) -> std::result::Result<Mapping, String> {
    let Some(bytes) = doc.filter(|b| !b.iter().all(u8::is_ascii_whitespace)) else {
        return Ok(Mapping::new());
    };

    match serde_yaml::from_slice::<Value>(bytes).map_err(|e| e.to_string())? {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        other => Err(format!(
            "expected a mapping at the document root, found {}",
            kind_of(&other)
        )),
    }
}

/// Recursively merges `overrides` into `base`.
///
/// Nested mappings merge; any other override value replaces the base value.
fn merge_mapping(base: &mut Mapping, overrides: Mapping) {
    for (key, value) in overrides {
        match (base.get_mut(&key), value) {
            (Some(Value::Mapping(existing)), Value::Mapping(incoming)) => {
                merge_mapping(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(text: &str) -> Option<&[u8]> {
        Some(text.as_bytes())
    }

    fn get<'a>(tree: &'a Mapping, path: &[&str]) -> Option<&'a Value> {
        let (last, parents) = path.split_last()?;
        let mut current = tree;
        for key in parents {
            current = current.get(*key)?.as_mapping()?;
        }
        current.get(*last)
    }

    #[test]
    fn test_override_wins_recursively() {
        let merger = ConfigMerger::new();
        let tree = merger
            .merge(
                doc("a:\n  x: 1\n  y: 2\n"),
                doc("a:\n  y: 9\n  z: 3\n"),
            )
            .expect("merge should succeed");

        assert_eq!(get(&tree, &["a", "x"]).and_then(Value::as_i64), Some(1));
        assert_eq!(get(&tree, &["a", "y"]).and_then(Value::as_i64), Some(2));
        assert_eq!(get(&tree, &["a", "z"]).and_then(Value::as_i64), Some(3));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_non_mapping_override_replaces() {
        let merger = ConfigMerger::new();
        let tree = merger
            .merge(
                doc("plugins: [limit-count]\nnginx: false\n"),
                doc("plugins: [cors, ip-restriction]\nnginx:\n  workers: 4\n"),
            )
            .expect("merge should succeed");

        let plugins = get(&tree, &["plugins"])
            .and_then(Value::as_sequence)
            .expect("plugins should be a sequence");
        assert_eq!(plugins.len(), 1);
        assert_eq!(get(&tree, &["nginx"]), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_missing_side_is_empty_tree() {
        let merger = ConfigMerger::new();
        let essential = "deployment:\n  role: data_plane\n";

        let only_essential = merger.merge(None, doc(essential)).expect("merge");
        let parsed: Mapping = serde_yaml::from_str(essential).expect("parse");
        assert_eq!(only_essential, parsed);

        let only_override = merger.merge(doc(essential), None).expect("merge");
        assert_eq!(only_override, parsed);

        let blank_essential = merger.merge(doc(essential), doc("")).expect("merge");
        assert_eq!(blank_essential, parsed);

        assert!(merger.merge(None, None).expect("merge").is_empty());
    }

    #[test]
    fn test_parse_failures_identify_side() {
        let merger = ConfigMerger::new();

        let err = merger
            .merge(doc("a: [unclosed"), doc("b: 1"))
            .expect_err("override is invalid");
        assert!(matches!(err, MergeError::Override { .. }));
        assert!(err.to_string().contains("override configuration"));

        let err = merger
            .merge(doc("b: 1"), doc("a: [unclosed"))
            .expect_err("essential is invalid");
        assert!(matches!(err, MergeError::Essential { .. }));
        assert!(err.to_string().contains("essential configuration"));
    }

    #[test]
    fn test_scalar_root_is_rejected() {
        let merger = ConfigMerger::new();
        let err = merger
            .merge(doc("just a string"), None)
            .expect_err("scalar root is invalid");
        assert!(err.to_string().contains("expected a mapping"));
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_files_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let merger = ConfigMerger::new();
        let tree = merger.merge(doc("a: 1"), None).expect("merge");
        let dir = TempDir::new().expect("tempdir");

        let path = dir.path().join("nested").join("config.yaml");
        merger.save_to_file(&tree, &path).expect("save");
        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o644);

        let temp = merger
            .save_to_temp_file(&tree, "apisix-config-")
            .expect("save temp");
        let mode = std::fs::metadata(&temp).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
        let content = std::fs::read_to_string(&temp).expect("read");
        assert!(content.contains("a: 1"));
        std::fs::remove_file(temp).expect("cleanup");
    }
}
