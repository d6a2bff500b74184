//! Folder ownership attribution.

pub mod collapse;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::commit::ancestors;
use crate::contributor::Contributor;
use crate::folders::{FolderKind, FolderPresets, FolderTree};

pub use collapse::{collapse, render, OwnerLine};

/// Attribution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributionConfig {
    /// Contributors whose last commit is older than this are not owners.
    pub active_after: DateTime<Utc>,
    /// Owners per folder, preset owners included.
    pub max_owners: usize,
}

/// A contributor's accumulated change weight in one folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerScore {
    /// GitHub login.
    pub login: String,
    /// Summed change weight.
    pub score: u64,
}

#[derive(Default)]
struct FolderTally {
    by_login: HashMap<String, (usize, u64)>,
}

impl FolderTally {
    fn credit(&mut self, login: &str, weight: u64) {
        let next = self.by_login.len();
        let entry = self
            .by_login
            .entry(login.to_string())
            .or_insert((next, 0));
        entry.1 += weight;
    }

    /// Scores ranked by weight, ties broken by who was credited first.
    fn ranked(self) -> Vec<OwnerScore> {
        let mut entries: Vec<(String, usize, u64)> = self
            .by_login
            .into_iter()
            .map(|(login, (order, score))| (login, order, score))
            .collect();
        entries.sort_by(|a, b| b.2.cmp(&a.2).then(a.1.cmp(&b.1)));
        entries
            .into_iter()
            .map(|(login, _, score)| OwnerScore { login, score })
            .collect()
    }
}

/// Credits active contributors' changes to folders and fills owner lists.
///
/// Each changed directory is walked up to the root. The walk stops at the
/// first folder preset as ignored. Folders in the tree that are not
/// closed-owner folders receive the change weight. Regular and open-owner
/// folders then take the highest-ranked logins until they hold
/// `max_owners` owners.
///
/// The bundle of unmapped authors is never credited, even when active: its
/// `non-github-bundle` login is not a real account and cannot own a folder.
///
/// Returns the ranked scores per folder.
pub fn attribute(
    contributors: &[Contributor],
    tree: &mut FolderTree,
    presets: &FolderPresets,
    config: &AttributionConfig,
) -> BTreeMap<String, Vec<OwnerScore>> {
    let mut tallies: BTreeMap<String, FolderTally> = BTreeMap::new();

    let active = contributors
        .iter()
        .filter(|c| !c.is_bundle() && c.is_active_since(config.active_after));
    for contributor in active {
        for commit in &contributor.commits {
            for (directory, weight) in commit.changes() {
                for folder in ancestors(directory) {
                    if presets.is_ignored_preset(folder) {
                        break;
                    }
                    let Some(settings) = tree.get(folder) else {
                        continue;
                    };
                    if settings.kind != FolderKind::ClosedOwners {
                        tallies
                            .entry(folder.to_string())
                            .or_default()
                            .credit(&contributor.github_login, *weight);
                    }
                }
            }
        }
    }

    let mut scores = BTreeMap::new();
    for (folder, tally) in tallies {
        let ranked = tally.ranked();
        if let Some(settings) = tree.get_mut(&folder) {
            if settings.kind.accepts_owners() {
                for candidate in &ranked {
                    if settings.owners.len() >= config.max_owners {
                        break;
                    }
                    settings.owners.insert(candidate.login.clone());
                }
            }
        }
        scores.insert(folder, ranked);
    }

    debug!(folders = scores.len(), "Attributed folder ownership");
    scores
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use chrono::{DateTime, FixedOffset, TimeZone};

    use super::*;
    use crate::commit::{CommitRecord, FileStat};
    use crate::contributor::{Organization, BUNDLE_ID};

    fn ts(year: i32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(year, 6, 1, 12, 0, 0)
            .unwrap()
    }

    fn person(login: &str, id: i64, year: i32, files: &[FileStat]) -> Contributor {
        let mut contributor = Contributor::new(
            login,
            [format!("{login}@example.com")],
            Organization::OTHER,
            login,
            id,
        );
        let commit = CommitRecord::new(
            format!("{login}-1"),
            login,
            &format!("{login}@example.com"),
            ts(year),
            files,
        );
        contributor.record_commit(Arc::new(commit));
        contributor
    }

    fn config(max_owners: usize) -> AttributionConfig {
        AttributionConfig {
            active_after: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            max_owners,
        }
    }

    fn owners(tree: &FolderTree, folder: &str) -> BTreeSet<String> {
        tree.get(folder).unwrap().owners.clone()
    }

    fn set(logins: &[&str]) -> BTreeSet<String> {
        logins.iter().map(ToString::to_string).collect()
    }

    fn tree(presets: &FolderPresets) -> FolderTree {
        FolderTree::build(
            presets,
            ["/src", "/src/core", "/src/ui", "/vendor", "/vendor/lib", "/docs"],
        )
    }

    #[test]
    fn ranks_by_weight_and_respects_the_cap() {
        let contributors = vec![
            person("alice", 1, 2024, &[FileStat::text("src/core/a.rs", 50, 0)]),
            person("bob", 2, 2024, &[FileStat::text("src/ui/b.rs", 10, 0)]),
            person("carol", 3, 2024, &[FileStat::text("src/core/c.rs", 20, 0)]),
        ];
        let presets = FolderPresets::new();
        let mut tree = tree(&presets);

        let scores = attribute(&contributors, &mut tree, &presets, &config(2));

        assert_eq!(owners(&tree, "/src"), set(&["alice", "carol"]));
        assert_eq!(owners(&tree, "/src/ui"), set(&["bob"]));
        assert_eq!(
            scores["/"].iter().map(|s| s.score).collect::<Vec<_>>(),
            vec![50, 20, 10]
        );
    }

    #[test]
    fn ties_keep_first_credit_order() {
        let contributors = vec![
            person("zed", 1, 2024, &[FileStat::text("src/x.rs", 5, 0)]),
            person("amy", 2, 2024, &[FileStat::text("src/y.rs", 5, 0)]),
        ];
        let presets = FolderPresets::new();
        let mut tree = tree(&presets);

        let scores = attribute(&contributors, &mut tree, &presets, &config(1));
        assert_eq!(scores["/src"][0].login, "zed");
        assert_eq!(owners(&tree, "/src"), set(&["zed"]));
    }

    #[test]
    fn inactive_and_bundle_contributors_are_not_owners() {
        let contributors = vec![
            person("old", 1, 2020, &[FileStat::text("src/a.rs", 100, 0)]),
            person("bundle", BUNDLE_ID, 2024, &[FileStat::text("src/a.rs", 100, 0)]),
            person("new", 2, 2024, &[FileStat::text("src/a.rs", 1, 0)]),
        ];
        let presets = FolderPresets::new();
        let mut tree = tree(&presets);

        attribute(&contributors, &mut tree, &presets, &config(3));
        assert_eq!(owners(&tree, "/src"), set(&["new"]));
    }

    #[test]
    fn ignore_preset_halts_the_walk() {
        let mut presets = FolderPresets::new();
        presets
            .insert("/vendor", FolderKind::Ignore, Vec::<String>::new())
            .unwrap();
        let contributors = vec![person(
            "alice",
            1,
            2024,
            &[FileStat::text("vendor/lib/x.c", 10, 0)],
        )];
        let mut tree = tree(&presets);

        let scores = attribute(&contributors, &mut tree, &presets, &config(3));
        assert!(scores.is_empty());
        assert!(owners(&tree, "/").is_empty());
    }

    #[test]
    fn closed_owners_are_untouched_and_not_credited() {
        let mut presets = FolderPresets::new();
        presets
            .insert("/docs", FolderKind::ClosedOwners, ["writer"])
            .unwrap();
        let contributors = vec![person("alice", 1, 2024, &[FileStat::text("docs/a.md", 10, 0)])];
        let mut tree = tree(&presets);

        let scores = attribute(&contributors, &mut tree, &presets, &config(3));
        assert_eq!(owners(&tree, "/docs"), set(&["writer"]));
        assert!(!scores.contains_key("/docs"));
        // ancestors above the closed folder still get credit
        assert_eq!(owners(&tree, "/"), set(&["alice"]));
    }

    #[test]
    fn open_owners_keep_presets_within_the_cap() {
        let mut presets = FolderPresets::new();
        presets
            .insert("/src", FolderKind::OpenOwners, ["lead"])
            .unwrap();
        presets
            .insert("/src/core", FolderKind::Regular, Vec::<String>::new())
            .unwrap();
        let contributors = vec![
            person("alice", 1, 2024, &[FileStat::text("src/core/a.rs", 30, 0)]),
            person("bob", 2, 2024, &[FileStat::text("src/core/b.rs", 20, 0)]),
        ];
        let mut tree = tree(&presets);

        attribute(&contributors, &mut tree, &presets, &config(2));
        assert_eq!(owners(&tree, "/src"), set(&["lead", "alice"]));
        assert!(!tree.contains("/src/ui"));
    }
}
