//! Folder presets and the repository folder tree.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::commit::{parent_folder, ROOT_FOLDER};

/// How a folder takes part in ownership attribution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FolderKind {
    /// Owners are derived from contributor statistics.
    #[default]
    Regular,
    /// The folder and its subfolders are skipped.
    Ignore,
    /// The folder has a fixed set of owners.
    ClosedOwners,
    /// The folder has preset owners and more can be added.
    OpenOwners,
}

impl FolderKind {
    /// Whether attribution may add owners to a folder of this kind.
    pub fn accepts_owners(self) -> bool {
        matches!(self, Self::Regular | Self::OpenOwners)
    }
}

/// Settings of one folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderSettings {
    /// Folder kind.
    pub kind: FolderKind,
    /// Owner logins, without the `@` prefix.
    pub owners: BTreeSet<String>,
    /// Names of the immediate children present in the tree.
    pub children: Vec<String>,
}

impl FolderSettings {
    fn with_kind(kind: FolderKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }
}

/// Folder preset errors.
#[derive(Error, Debug)]
pub enum FolderError {
    /// A preset key is not a usable folder path.
    #[error("Invalid preset folder path: {0:?}")]
    InvalidPresetPath(String),

    /// A folder marked as ignored also lists owners.
    #[error("Ignored preset folder {0} cannot have owners")]
    OwnersOnIgnoredFolder(String),
}

#[derive(Deserialize)]
struct PresetRecord {
    #[serde(rename = "type")]
    kind: FolderKind,
    #[serde(default)]
    owners: Vec<String>,
}

/// Operator-supplied folder settings.
///
/// Folders below a preset folder that are not presets themselves are
/// ignored; every other folder is regular.
#[derive(Debug, Clone, Default)]
pub struct FolderPresets {
    presets: BTreeMap<String, FolderSettings>,
}

impl FolderPresets {
    /// Creates an empty preset set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a preset.
    pub fn insert<I, S>(&mut self, folder: &str, kind: FolderKind, owners: I) -> Result<(), FolderError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let folder = normalize_folder(folder)?;
        let owners: BTreeSet<String> = owners
            .into_iter()
            .map(|o| o.as_ref().trim().trim_start_matches('@').to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if kind == FolderKind::Ignore && !owners.is_empty() {
            return Err(FolderError::OwnersOnIgnoredFolder(folder));
        }

        self.presets.insert(
            folder,
            FolderSettings {
                kind,
                owners,
                children: Vec::new(),
            },
        );
        Ok(())
    }

    /// Parses presets from YAML: a mapping from folder path to
    /// `{type: IGNORE|REGULAR|CLOSED_OWNERS|OPEN_OWNERS, owners: [..]}`.
    ///
    /// Entries may carry a `!FolderSettings` tag.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let mut presets = Self::new();
        if content.trim().is_empty() {
            return Ok(presets);
        }

        let raw: BTreeMap<String, serde_yaml::Value> =
            serde_yaml::from_str(content).context("Failed to parse folder presets")?;
        for (folder, value) in raw {
            let record: PresetRecord = serde_yaml::from_value(untag(value))
                .with_context(|| format!("Invalid preset for folder {folder}"))?;
            presets.insert(&folder, record.kind, record.owners)?;
        }
        Ok(presets)
    }

    /// Reads presets from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read folder presets: {}", path.display()))?;
        let presets = Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to load folder presets: {}", path.display()))?;
        debug!(path = %path.display(), presets = presets.len(), "Loaded folder presets");
        Ok(presets)
    }

    /// The preset for exactly `folder`, if any.
    pub fn get(&self, folder: &str) -> Option<&FolderSettings> {
        self.presets.get(folder)
    }

    /// Whether `folder` itself is preset as ignored.
    pub fn is_ignored_preset(&self, folder: &str) -> bool {
        self.get(folder)
            .is_some_and(|settings| settings.kind == FolderKind::Ignore)
    }

    /// Effective settings of `folder`.
    pub fn settings_for(&self, folder: &str) -> FolderSettings {
        if let Some(preset) = self.get(folder) {
            return preset.clone();
        }
        if self.presets.keys().any(|prefix| is_subfolder(prefix, folder)) {
            return FolderSettings::with_kind(FolderKind::Ignore);
        }
        FolderSettings::with_kind(FolderKind::Regular)
    }

    /// Number of presets.
    pub fn len(&self) -> usize {
        self.presets.len()
    }

    /// Whether there are no presets.
    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

/// The repository's folders with their effective settings.
///
/// Ignored folders are absent, and every folder other than the root has its
/// parent in the tree listing it as a child.
#[derive(Debug, Clone, Default)]
pub struct FolderTree {
    folders: BTreeMap<String, FolderSettings>,
}

impl FolderTree {
    /// Builds the tree from the repository's folders. The root is always
    /// included. Folders whose parent is not part of the tree are skipped.
    pub fn build<I, S>(presets: &FolderPresets, folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut all: BTreeSet<String> = folders
            .into_iter()
            .filter_map(|f| normalize_folder(f.as_ref()).ok())
            .collect();
        all.insert(ROOT_FOLDER.to_string());

        let mut tree = Self::default();
        // parents sort before their children
        for folder in all {
            let settings = presets.settings_for(&folder);
            if settings.kind == FolderKind::Ignore {
                continue;
            }

            if let Some(parent) = parent_folder(&folder) {
                let Some(parent_settings) = tree.folders.get_mut(parent) else {
                    warn!(folder = %folder, "Parent folder is not tracked, skipping");
                    continue;
                };
                parent_settings.children.push(basename(&folder).to_string());
            }
            tree.folders.insert(folder, settings);
        }
        tree
    }

    /// Settings of `folder`.
    pub fn get(&self, folder: &str) -> Option<&FolderSettings> {
        self.folders.get(folder)
    }

    /// Mutable settings of `folder`.
    pub fn get_mut(&mut self, folder: &str) -> Option<&mut FolderSettings> {
        self.folders.get_mut(folder)
    }

    /// Whether `folder` is part of the tree.
    pub fn contains(&self, folder: &str) -> bool {
        self.folders.contains_key(folder)
    }

    /// Folders in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FolderSettings)> {
        self.folders.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of folders.
    pub fn len(&self) -> usize {
        self.folders.len()
    }

    /// Whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }
}

/// Normalizes a folder path to the absolute form used throughout the
/// crate: leading `/`, no trailing `/` except for the root.
pub fn normalize_folder(folder: &str) -> Result<String, FolderError> {
    let trimmed = folder.trim().trim_matches('/');
    if trimmed.is_empty() {
        return if folder.trim().starts_with('/') {
            Ok(ROOT_FOLDER.to_string())
        } else {
            Err(FolderError::InvalidPresetPath(folder.to_string()))
        };
    }
    if trimmed
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(FolderError::InvalidPresetPath(folder.to_string()));
    }
    Ok(format!("/{trimmed}"))
}

/// Whether `folder` lies strictly below `prefix`. A root preset only
/// covers the root itself.
fn is_subfolder(prefix: &str, folder: &str) -> bool {
    if prefix == ROOT_FOLDER {
        return false;
    }
    folder
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}

fn basename(folder: &str) -> &str {
    folder.rsplit('/').next().unwrap_or(folder)
}

fn untag(value: serde_yaml::Value) -> serde_yaml::Value {
    match value {
        serde_yaml::Value::Tagged(tagged) => untag(tagged.value),
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const PRESETS: &str = r#"
/vendor:
  type: IGNORE
/docs: !FolderSettings
  type: CLOSED_OWNERS
  owners: ["@writer"]
/src/core:
  type: OPEN_OWNERS
  owners: [lead]
"#;

    fn folders() -> Vec<&'static str> {
        vec![
            "/docs",
            "/docs/api",
            "/src",
            "/src/core",
            "/src/core/io",
            "/src/util",
            "/vendor",
            "/vendor/lib",
        ]
    }

    #[test]
    fn parses_presets_with_and_without_tags() {
        let presets = FolderPresets::from_yaml_str(PRESETS).unwrap();
        assert_eq!(presets.len(), 3);
        assert!(presets.is_ignored_preset("/vendor"));
        let docs = presets.get("/docs").unwrap();
        assert_eq!(docs.kind, FolderKind::ClosedOwners);
        assert!(docs.owners.contains("writer"));
    }

    #[test]
    fn unlisted_folders_under_a_preset_are_ignored() {
        let presets = FolderPresets::from_yaml_str(PRESETS).unwrap();
        assert_eq!(presets.settings_for("/src/core/io").kind, FolderKind::Ignore);
        assert_eq!(presets.settings_for("/docs/api").kind, FolderKind::Ignore);
        assert_eq!(presets.settings_for("/src/util").kind, FolderKind::Regular);
        assert_eq!(presets.settings_for("/src").kind, FolderKind::Regular);
        // only the exact preset halts attribution walks
        assert!(!presets.is_ignored_preset("/vendor/lib"));
    }

    #[test]
    fn builds_tree_without_ignored_folders() {
        let presets = FolderPresets::from_yaml_str(PRESETS).unwrap();
        let tree = FolderTree::build(&presets, folders());

        let names: Vec<&str> = tree.iter().map(|(f, _)| f).collect();
        assert_eq!(names, vec!["/", "/docs", "/src", "/src/core", "/src/util"]);
        assert_eq!(tree.get("/").unwrap().children, vec!["docs", "src"]);
        assert_eq!(tree.get("/src").unwrap().children, vec!["core", "util"]);
        assert!(tree.get("/src/core").unwrap().children.is_empty());
    }

    #[test]
    fn every_folder_has_its_parent_in_the_tree() {
        let mut presets = FolderPresets::new();
        presets.insert("/a", FolderKind::Ignore, Vec::<String>::new()).unwrap();
        presets.insert("/a/b", FolderKind::Regular, Vec::<String>::new()).unwrap();
        let tree = FolderTree::build(&presets, ["/a", "/a/b", "/c"]);

        assert!(!tree.contains("/a/b"));
        for (folder, _) in tree.iter() {
            if let Some(parent) = parent_folder(folder) {
                let parent = tree.get(parent).unwrap();
                assert!(parent.children.iter().any(|c| folder.ends_with(c.as_str())));
            }
        }
    }

    #[test]
    fn root_preset_keeps_unlisted_folders_regular() {
        let mut presets = FolderPresets::new();
        presets
            .insert("/", FolderKind::OpenOwners, ["@lead"])
            .unwrap();
        assert_eq!(presets.settings_for("/src").kind, FolderKind::Regular);

        let tree = FolderTree::build(&presets, ["/src", "/src/core"]);
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.get("/src").unwrap().kind, FolderKind::Regular);
        assert!(tree.get("/src").unwrap().owners.is_empty());
        assert!(tree.get("/").unwrap().owners.contains("lead"));
        assert_eq!(tree.get("/").unwrap().children, vec!["src"]);
    }

    #[test]
    fn normalizes_paths() {
        assert_eq!(normalize_folder("src/core/").unwrap(), "/src/core");
        assert_eq!(normalize_folder("/").unwrap(), "/");
        assert!(normalize_folder("").is_err());
        assert!(normalize_folder("/a//b").is_err());
        assert!(normalize_folder("/a/../b").is_err());
    }

    #[test]
    fn ignored_folder_with_owners_is_rejected() {
        let err = FolderPresets::from_yaml_str("/x:\n  type: IGNORE\n  owners: [a]\n").unwrap_err();
        assert!(err.downcast_ref::<FolderError>().is_some());
    }
}
