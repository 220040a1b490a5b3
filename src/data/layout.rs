use std::path::{Path, PathBuf};

use crate::error::Result;

/// On-disk arrangement of a collection: one directory per group, named
/// `<prefix><id:02>`, holding recordings with a fixed extension.
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
    prefix: String,
    extension: String,
}

impl DatasetLayout {
    pub fn new(
        root: impl Into<PathBuf>,
        prefix: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Textual identifier of a group, e.g. `chb07`.
    pub fn group_name(&self, group: u32) -> String {
        format!("{}{group:02}", self.prefix)
    }

    /// Recordings of one group in lexicographic order.
    ///
    /// A missing group directory yields an empty list.
    pub fn group_files(&self, group: u32) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(self.group_name(group));
        let pattern = format!(
            "{}/*.{}",
            glob::Pattern::escape(&dir.to_string_lossy()),
            self.extension
        );

        let mut files: Vec<PathBuf> = glob::glob(&pattern)?
            .filter_map(|entry| match entry {
                Ok(path) if path.is_file() => Some(path),
                Ok(_) => None,
                Err(e) => {
                    log::warn!("skipping unreadable entry {}: {e}", e.path().display());
                    None
                }
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Row identifier for one recording: `<group>/<file name>`.
    pub fn file_id(&self, group: u32, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}/{name}", self.group_name(group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_matching_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let group = dir.path().join("chb03");
        std::fs::create_dir(&group).unwrap();
        for name in ["chb03_10.edf", "chb03_02.edf", "notes.txt", "chb03_01.edf"] {
            std::fs::write(group.join(name), b"").unwrap();
        }
        std::fs::create_dir(group.join("nested.edf")).unwrap();

        let layout = DatasetLayout::new(dir.path(), "chb", "edf");
        let files = layout.group_files(3).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["chb03_01.edf", "chb03_02.edf", "chb03_10.edf"]);
        assert_eq!(layout.file_id(3, &files[0]), "chb03/chb03_01.edf");
    }

    #[test]
    fn missing_group_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DatasetLayout::new(dir.path(), "chb", ".edf");
        assert!(layout.group_files(42).unwrap().is_empty());
        assert_eq!(layout.group_name(42), "chb42");
    }

    #[test]
    fn root_with_glob_characters_is_escaped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data [v1]");
        std::fs::create_dir_all(root.join("chb01")).unwrap();
        std::fs::write(root.join("chb01").join("a.edf"), b"").unwrap();

        let layout = DatasetLayout::new(&root, "chb", "edf");
        assert_eq!(layout.group_files(1).unwrap().len(), 1);
    }
}
