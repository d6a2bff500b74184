//! Contributors and their durable registry.

pub mod organization;
pub mod registry;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};

use crate::commit::CommitRecord;

pub use organization::Organization;
pub use registry::{ContributorId, ContributorRegistry, RegistryError};

/// GitHub id reserved for the bundle of authors that could not be mapped
/// to a GitHub account.
pub const BUNDLE_ID: i64 = -1;

/// Login of the bundle contributor.
pub const BUNDLE_LOGIN: &str = "non-github-bundle";

/// Display name of the bundle contributor.
pub const BUNDLE_NAME: &str = "Non-found emails bundle";

/// A person (or the bundle pseudo-person) credited with commits.
#[derive(Debug, Clone)]
pub struct Contributor {
    /// Display name.
    pub name: String,
    /// Every known e-mail address, lower-cased.
    pub emails: BTreeSet<String>,
    /// Corporate affiliation.
    pub organization: Organization,
    /// GitHub login.
    pub github_login: String,
    /// GitHub numeric id, [`BUNDLE_ID`] for the bundle.
    pub github_id: i64,
    /// Most recent author timestamp among the recorded commits.
    pub last_commit_ts: Option<DateTime<FixedOffset>>,
    /// Number of commits recorded in this run.
    pub commit_count: u64,
    /// Commits recorded in this run.
    pub commits: Vec<Arc<CommitRecord>>,
}

impl Contributor {
    /// Creates a contributor with no recorded commits.
    pub fn new(
        name: impl Into<String>,
        emails: impl IntoIterator<Item = String>,
        organization: Organization,
        github_login: impl Into<String>,
        github_id: i64,
    ) -> Self {
        Self {
            name: name.into(),
            emails: emails.into_iter().map(|e| e.to_lowercase()).collect(),
            organization,
            github_login: github_login.into(),
            github_id,
            last_commit_ts: None,
            commit_count: 0,
            commits: Vec::new(),
        }
    }

    /// Whether this is the bundle of unmapped authors.
    pub fn is_bundle(&self) -> bool {
        self.github_id == BUNDLE_ID
    }

    /// Records a commit, keeping `last_commit_ts` at the maximum seen.
    pub fn record_commit(&mut self, commit: Arc<CommitRecord>) {
        if self.last_commit_ts.is_none_or(|ts| ts < commit.timestamp) {
            self.last_commit_ts = Some(commit.timestamp);
        }
        self.commit_count += 1;
        self.commits.push(commit);
    }

    /// Whether the last commit is at or after `cutoff`.
    pub fn is_active_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_commit_ts
            .is_some_and(|ts| ts.with_timezone(&Utc) >= cutoff)
    }
}
