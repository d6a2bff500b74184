//! Commit records and per-folder change weights.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};

/// Repository root folder.
pub const ROOT_FOLDER: &str = "/";

/// Line counts for one changed file in a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// Path relative to the repository root.
    pub path: String,
    /// Added lines, `None` for binary or otherwise non-numeric changes.
    pub added: Option<u64>,
    /// Removed lines, `None` for binary or otherwise non-numeric changes.
    pub removed: Option<u64>,
}

impl FileStat {
    /// Creates a stat for a text change.
    pub fn text(path: impl Into<String>, added: u64, removed: u64) -> Self {
        Self {
            path: path.into(),
            added: Some(added),
            removed: Some(removed),
        }
    }

    /// Creates a stat for a binary change.
    pub fn binary(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            added: None,
            removed: None,
        }
    }

    /// Change weight of this file: added plus removed lines, where each
    /// non-numeric side counts as one line.
    pub fn weight(&self) -> u64 {
        self.added.unwrap_or(1) + self.removed.unwrap_or(1)
    }
}

/// One commit from the local history.
///
/// Immutable once built. The change statistics are kept per directory that
/// directly contains a changed file; [`CommitRecord::folder_weights`]
/// expands them to every ancestor folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// Full commit hash.
    pub hash: String,
    /// Author display name.
    pub author_name: String,
    /// Author e-mail, lower-cased.
    pub email: String,
    /// Author timestamp with the original offset.
    pub timestamp: DateTime<FixedOffset>,
    changes: BTreeMap<String, u64>,
}

impl CommitRecord {
    /// Builds a record from the per-file statistics of a commit.
    pub fn new(
        hash: impl Into<String>,
        author_name: impl Into<String>,
        email: &str,
        timestamp: DateTime<FixedOffset>,
        files: &[FileStat],
    ) -> Self {
        let mut changes = BTreeMap::new();
        for file in files {
            let folder = folder_of_file(&resolve_rename(&file.path));
            *changes.entry(folder).or_insert(0) += file.weight();
        }

        Self {
            hash: hash.into(),
            author_name: author_name.into(),
            email: email.to_lowercase(),
            timestamp,
            changes,
        }
    }

    /// Change weight per directory directly containing a changed file.
    pub fn changes(&self) -> &BTreeMap<String, u64> {
        &self.changes
    }

    /// Change weight attributed to every ancestor folder of each changed
    /// file, the root included.
    pub fn folder_weights(&self) -> BTreeMap<String, u64> {
        let mut weights = BTreeMap::new();
        for (folder, weight) in &self.changes {
            for ancestor in ancestors(folder) {
                *weights.entry(ancestor.to_string()).or_insert(0) += weight;
            }
        }
        weights
    }

    /// Total change weight of the commit.
    pub fn total_weight(&self) -> u64 {
        self.changes.values().sum()
    }
}

/// Returns the parent of an absolute folder path, `None` for the root.
pub fn parent_folder(folder: &str) -> Option<&str> {
    if folder == ROOT_FOLDER {
        return None;
    }
    match folder.rfind('/') {
        Some(0) => Some(ROOT_FOLDER),
        Some(idx) => Some(&folder[..idx]),
        None => None,
    }
}

/// Iterates a folder and all of its ancestors up to the root.
pub fn ancestors(folder: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(folder), |&f| parent_folder(f))
}

/// Joins an absolute folder path and a child name.
pub fn join_folder(folder: &str, child: &str) -> String {
    if folder == ROOT_FOLDER {
        format!("/{child}")
    } else {
        format!("{folder}/{child}")
    }
}

/// Absolute folder containing a repository-relative file path.
pub fn folder_of_file(path: &str) -> String {
    let path = path.trim_start_matches('/');
    match path.rfind('/') {
        Some(idx) => format!("/{}", &path[..idx]),
        None => ROOT_FOLDER.to_string(),
    }
}

/// Resolves git's rename notation to the destination path.
///
/// Handles both `old => new` and `dir/{old => new}/file`.
fn resolve_rename(path: &str) -> String {
    if !path.contains(" => ") {
        return path.to_string();
    }

    if let (Some(open), Some(close)) = (path.find('{'), path.rfind('}')) {
        if open < close {
            let inner = &path[open + 1..close];
            let target = inner.split(" => ").nth(1).unwrap_or(inner);
            let joined = format!("{}{}{}", &path[..open], target, &path[close + 1..]);
            return joined.replace("//", "/");
        }
    }

    path.split(" => ").nth(1).unwrap_or(path).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn ts() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-05-01T10:00:00+02:00").unwrap()
    }

    #[test]
    fn weight_propagates_to_every_ancestor_but_not_the_file() {
        let commit = CommitRecord::new(
            "abc",
            "Dev",
            "dev@example.com",
            ts(),
            &[FileStat::text("a/b/c.py", 10, 2)],
        );

        let weights = commit.folder_weights();
        assert_eq!(weights.get("/a/b"), Some(&12));
        assert_eq!(weights.get("/a"), Some(&12));
        assert_eq!(weights.get("/"), Some(&12));
        assert!(!weights.contains_key("/a/b/c.py"));
    }

    #[test]
    fn sibling_files_accumulate_in_shared_ancestors() {
        let commit = CommitRecord::new(
            "abc",
            "Dev",
            "dev@example.com",
            ts(),
            &[
                FileStat::text("a/b/c.py", 1, 1),
                FileStat::text("a/d/e.py", 3, 0),
                FileStat::text("README.md", 5, 5),
            ],
        );

        let weights = commit.folder_weights();
        assert_eq!(weights.get("/a/b"), Some(&2));
        assert_eq!(weights.get("/a/d"), Some(&3));
        assert_eq!(weights.get("/a"), Some(&5));
        assert_eq!(weights.get("/"), Some(&15));
        assert_eq!(commit.total_weight(), 15);
    }

    #[test]
    fn binary_changes_count_one_per_side() {
        let commit = CommitRecord::new(
            "abc",
            "Dev",
            "dev@example.com",
            ts(),
            &[FileStat::binary("img/logo.png")],
        );
        assert_eq!(commit.changes().get("/img"), Some(&2));
    }

    #[test]
    fn email_is_lower_cased() {
        let commit = CommitRecord::new("abc", "Dev", "Dev@Example.COM", ts(), &[]);
        assert_eq!(commit.email, "dev@example.com");
        assert!(commit.changes().is_empty());
    }

    #[test]
    fn renames_resolve_to_destination() {
        assert_eq!(resolve_rename("src/{old => new}/lib.rs"), "src/new/lib.rs");
        assert_eq!(resolve_rename("src/{ => nested}/lib.rs"), "src/nested/lib.rs");
        assert_eq!(resolve_rename("old.rs => new/place.rs"), "new/place.rs");
        assert_eq!(resolve_rename("plain/path.rs"), "plain/path.rs");
    }

    #[test]
    fn parent_chain_ends_at_root() {
        assert_eq!(parent_folder("/a/b"), Some("/a"));
        assert_eq!(parent_folder("/a"), Some("/"));
        assert_eq!(parent_folder("/"), None);
        let chain: Vec<_> = ancestors("/a/b/c").collect();
        assert_eq!(chain, vec!["/a/b/c", "/a/b", "/a", "/"]);
    }

    #[test]
    fn join_folder_handles_root() {
        assert_eq!(join_folder("/", "src"), "/src");
        assert_eq!(join_folder("/src", "git"), "/src/git");
    }
}
