//! Order intake: turns an order manifest or a folder of STL files into the
//! ordered item requests a packing session consumes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::ItemRequest;

/// One order: which files to print and how many copies of each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderManifest {
    pub order_id: String,
    pub items: Vec<OrderLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub file: PathBuf,
    pub quantity: u32,
}

impl OrderManifest {
    /// Loads a JSON manifest. Relative item paths resolve against the
    /// manifest's own directory.
    ///
    /// Items are identified by file name in batch contents, so two lines with
    /// the same file name are rejected.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read order manifest '{}'", path.display()))?;
        let mut manifest: OrderManifest = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid order manifest '{}'", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for line in &mut manifest.items {
            if line.file.is_relative() {
                line.file = base.join(&line.file);
            }
        }

        let mut seen = HashSet::new();
        for line in &manifest.items {
            let item = ItemRequest::from_file(line.file.clone(), line.quantity);
            if !seen.insert(item.identity().to_string()) {
                bail!(
                    "Order manifest '{}' lists '{}' more than once",
                    path.display(),
                    item.identity()
                );
            }
        }
        Ok(manifest)
    }

    /// Every `.stl` file in `dir`, sorted by name, each wanted `quantity` times.
    pub fn from_folder(order_id: &str, dir: &Path, quantity: u32) -> Result<Self> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to list order folder '{}'", dir.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && is_stl(&path) {
                files.push(path);
            }
        }
        files.sort();

        Ok(OrderManifest {
            order_id: order_id.to_string(),
            items: files
                .into_iter()
                .map(|file| OrderLine { file, quantity })
                .collect(),
        })
    }

    pub fn total_units(&self) -> u32 {
        self.items.iter().map(|line| line.quantity).sum()
    }

    pub fn into_items(self) -> Vec<ItemRequest> {
        self.items
            .into_iter()
            .map(|line| ItemRequest::from_file(line.file, line.quantity))
            .collect()
    }
}

fn is_stl(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("stl"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_folder_picks_stl_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_lower.stl", "a_upper.STL", "notes.txt", "c.stl.bak"] {
            std::fs::write(dir.path().join(name), b"solid").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.stl")).unwrap();

        let manifest = OrderManifest::from_folder("1000385", dir.path(), 2).unwrap();
        let names: Vec<String> = manifest
            .items
            .iter()
            .map(|l| l.file.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a_upper.STL", "b_lower.stl"]);
        assert!(manifest.items.iter().all(|l| l.quantity == 2));
        assert_eq!(manifest.total_units(), 4);
    }

    #[test]
    fn test_from_folder_missing_dir_is_an_error() {
        let err = OrderManifest::from_folder("1", Path::new("/nonexistent/order"), 1).unwrap_err();
        assert!(err.to_string().contains("Failed to list order folder"));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("order.json");
        std::fs::write(
            &manifest_path,
            r#"{"order_id":"42","items":[{"file":"crown.stl","quantity":3},{"file":"/abs/base.stl","quantity":0}]}"#,
        )
        .unwrap();

        let manifest = OrderManifest::load(&manifest_path).unwrap();
        assert_eq!(manifest.order_id, "42");
        assert_eq!(manifest.items[0].file, dir.path().join("crown.stl"));
        assert_eq!(manifest.items[1].file, PathBuf::from("/abs/base.stl"));

        let items = manifest.into_items();
        assert_eq!(items[0].identity(), "crown.stl");
        assert_eq!(items[0].total_quantity(), 3);
        assert_eq!(items[1].total_quantity(), 0);
    }

    #[test]
    fn test_load_rejects_duplicate_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("order.json");
        std::fs::write(
            &manifest_path,
            r#"{"order_id":"42","items":[{"file":"a/crown.stl","quantity":1},{"file":"b/crown.stl","quantity":2}]}"#,
        )
        .unwrap();

        let err = OrderManifest::load(&manifest_path).unwrap_err();
        assert!(err.to_string().contains("lists 'crown.stl' more than once"));
    }

    #[test]
    fn test_load_rejects_repeated_file() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("order.json");
        std::fs::write(
            &manifest_path,
            r#"{"order_id":"42","items":[{"file":"crown.stl","quantity":1},{"file":"crown.stl","quantity":1}]}"#,
        )
        .unwrap();

        assert!(OrderManifest::load(&manifest_path).is_err());
    }

    #[test]
    fn test_load_rejects_malformed_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("order.json");
        std::fs::write(&manifest_path, r#"{"order_id": 42}"#).unwrap();

        let err = OrderManifest::load(&manifest_path).unwrap_err();
        assert!(err.to_string().contains("Invalid order manifest"));
    }
}
