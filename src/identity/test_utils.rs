//! Shared test utilities for the `identity` module.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::{IdentityInfo, IdentityLookup};
use crate::contributor::BUNDLE_ID;

/// In-memory identity service.
///
/// Commits without a configured author resolve to [`BUNDLE_ID`]; commits
/// listed as failing return an error. Every lookup yields to the runtime
/// first so concurrent callers complete out of order.
#[derive(Default)]
pub(crate) struct StaticIdentities {
    users: HashMap<i64, IdentityInfo>,
    commit_authors: HashMap<String, i64>,
    failing_commits: HashSet<String>,
    calls: Arc<AtomicUsize>,
}

impl StaticIdentities {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_user(mut self, info: IdentityInfo) -> Self {
        self.users.insert(info.id, info);
        self
    }

    pub(crate) fn with_commit_author(mut self, commit_hash: &str, github_id: i64) -> Self {
        self.commit_authors.insert(commit_hash.to_string(), github_id);
        self
    }

    pub(crate) fn with_failing_commit(mut self, commit_hash: &str) -> Self {
        self.failing_commits.insert(commit_hash.to_string());
        self
    }

    /// Returns a counter of lookups served, readable after the mock has
    /// been moved into a pipeline.
    pub(crate) fn call_handle(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Shorthand for a user without optional fields.
pub(crate) fn user(id: i64, login: &str) -> IdentityInfo {
    IdentityInfo {
        login: login.to_string(),
        id,
        name: Some(login.to_string()),
        email: None,
        company: None,
    }
}

impl IdentityLookup for StaticIdentities {
    fn lookup_by_id(
        &self,
        github_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<IdentityInfo>>> + Send + '_>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.count();
            if github_id == BUNDLE_ID {
                return Ok(Some(IdentityInfo::bundle()));
            }
            Ok(self.users.get(&github_id).cloned())
        })
    }

    fn lookup_by_login<'a>(
        &'a self,
        login: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<IdentityInfo>>> + Send + 'a>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.count();
            Ok(self
                .users
                .values()
                .find(|u| u.login.eq_ignore_ascii_case(login))
                .cloned())
        })
    }

    fn lookup_commit_author<'a>(
        &'a self,
        commit_hash: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + 'a>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.count();
            if self.failing_commits.contains(commit_hash) {
                return Err(anyhow!("lookup failed for {commit_hash}"));
            }
            Ok(self
                .commit_authors
                .get(commit_hash)
                .copied()
                .unwrap_or(BUNDLE_ID))
        })
    }
}
