//! The contributor registry: e-mail and GitHub id indices over the
//! contributor list, with YAML persistence.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::{Contributor, Organization};
use crate::commit::CommitRecord;
use crate::data::yaml;

/// Registry integrity errors.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// An e-mail is already registered to another contributor.
    #[error("Duplicate email {email}: already registered to {existing_login}")]
    DuplicateEmail {
        /// The conflicting address.
        email: String,
        /// Login of the contributor that owns the address.
        existing_login: String,
    },

    /// A stored record has no GitHub id.
    #[error("Missing GitHub id in stored contributor record for {name}")]
    MissingExternalId {
        /// Name of the offending record.
        name: String,
    },
}

/// Stable handle to a contributor inside a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContributorId(usize);

/// Persisted form of a contributor.
#[derive(Debug, Serialize, Deserialize)]
struct ContributorRecord {
    name: String,
    emails: Vec<String>,
    #[serde(default)]
    organization: Organization,
    github_login: String,
    github_id: Option<i64>,
    #[serde(default)]
    last_commit_ts: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    commit_count: u64,
}

impl From<&Contributor> for ContributorRecord {
    fn from(contributor: &Contributor) -> Self {
        Self {
            name: contributor.name.clone(),
            emails: contributor.emails.iter().cloned().collect(),
            organization: contributor.organization,
            github_login: contributor.github_login.clone(),
            github_id: Some(contributor.github_id),
            last_commit_ts: contributor.last_commit_ts,
            commit_count: contributor.commit_count,
        }
    }
}

impl TryFrom<ContributorRecord> for Contributor {
    type Error = RegistryError;

    // Commit history is replayed on every run, so the stored activity
    // fields are informational only and start from scratch here.
    fn try_from(record: ContributorRecord) -> Result<Self, Self::Error> {
        let github_id = record
            .github_id
            .ok_or_else(|| RegistryError::MissingExternalId {
                name: record.name.clone(),
            })?;
        Ok(Self::new(
            record.name,
            record.emails,
            record.organization,
            record.github_login,
            github_id,
        ))
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    contributors: Vec<Contributor>,
    by_email: HashMap<String, ContributorId>,
    by_id: HashMap<i64, ContributorId>,
}

impl RegistryState {
    fn upsert(&mut self, candidate: Contributor) -> Result<ContributorId, RegistryError> {
        let existing = self.by_id.get(&candidate.github_id).copied();
        self.check_emails(&candidate, existing)?;

        match existing {
            Some(id) => {
                let contributor = &mut self.contributors[id.0];
                contributor.name = candidate.name;
                contributor.organization = candidate.organization;
                contributor.github_login = candidate.github_login;
                for email in candidate.emails {
                    if contributor.emails.insert(email.clone()) {
                        self.by_email.insert(email, id);
                    }
                }
                Ok(id)
            }
            None => {
                let id = ContributorId(self.contributors.len());
                self.by_id.insert(candidate.github_id, id);
                for email in &candidate.emails {
                    self.by_email.insert(email.clone(), id);
                }
                self.contributors.push(candidate);
                Ok(id)
            }
        }
    }

    /// Fails if any candidate e-mail belongs to a contributor other than
    /// `owner`. Runs before any mutation so a failed upsert changes nothing.
    fn check_emails(
        &self,
        candidate: &Contributor,
        owner: Option<ContributorId>,
    ) -> Result<(), RegistryError> {
        for email in &candidate.emails {
            if let Some(&holder) = self.by_email.get(email) {
                if Some(holder) != owner {
                    return Err(RegistryError::DuplicateEmail {
                        email: email.clone(),
                        existing_login: self.contributors[holder.0].github_login.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Registry of contributors indexed by e-mail and GitHub id.
///
/// All mutation goes through [`upsert`](Self::upsert) and
/// [`record_commit`](Self::record_commit), each performed under a single
/// write guard, so the indices always agree with the contributor list.
#[derive(Debug)]
pub struct ContributorRegistry {
    state: RwLock<RegistryState>,
    store_path: Option<PathBuf>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl ContributorRegistry {
    /// Creates an empty registry with no durable store.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            store_path: None,
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Creates an empty registry persisting to `path`.
    pub fn with_store(path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: Some(path.into()),
            ..Self::in_memory()
        }
    }

    /// Loads the registry from `path`, treating a missing file as empty.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let registry = Self::with_store(path);

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No contributor store yet, starting empty");
                return Ok(registry);
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read contributor store: {}", path.display())
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(registry);
        }

        let records: Vec<ContributorRecord> = yaml::from_yaml(&content)
            .with_context(|| format!("Failed to parse contributor store: {}", path.display()))?;
        let count = records.len();
        for record in records {
            registry.upsert(Contributor::try_from(record)?)?;
        }

        info!(path = %path.display(), contributors = count, "Loaded contributor store");
        Ok(registry)
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Path of the durable store, if any.
    pub fn store_path(&self) -> Option<&Path> {
        self.store_path.as_deref()
    }

    /// Finds the contributor owning an e-mail address.
    pub fn find_by_email(&self, email: &str) -> Option<ContributorId> {
        self.read().by_email.get(email).copied()
    }

    /// Finds the contributor with a GitHub id.
    pub fn find_by_external_id(&self, github_id: i64) -> Option<ContributorId> {
        self.read().by_id.get(&github_id).copied()
    }

    /// Merges `candidate` into the contributor with the same GitHub id, or
    /// registers it as a new contributor.
    pub fn upsert(&self, candidate: Contributor) -> Result<ContributorId, RegistryError> {
        self.write().upsert(candidate)
    }

    /// Records a commit against a contributor.
    pub fn record_commit(&self, id: ContributorId, commit: Arc<CommitRecord>) {
        if let Some(contributor) = self.write().contributors.get_mut(id.0) {
            contributor.record_commit(commit);
        }
    }

    /// Returns a copy of a contributor.
    pub fn get(&self, id: ContributorId) -> Option<Contributor> {
        self.read().contributors.get(id.0).cloned()
    }

    /// Returns a copy of every contributor in registration order.
    pub fn snapshot(&self) -> Vec<Contributor> {
        self.read().contributors.clone()
    }

    /// Number of registered contributors.
    pub fn len(&self) -> usize {
        self.read().contributors.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.read().contributors.is_empty()
    }

    /// E-mail index as `email -> github_id`.
    pub fn email_index(&self) -> BTreeMap<String, i64> {
        let state = self.read();
        state
            .by_email
            .iter()
            .map(|(email, id)| (email.clone(), state.contributors[id.0].github_id))
            .collect()
    }

    /// Id index as `github_id -> login`.
    pub fn id_index(&self) -> BTreeMap<i64, String> {
        let state = self.read();
        state
            .by_id
            .iter()
            .map(|(github_id, id)| (*github_id, state.contributors[id.0].github_login.clone()))
            .collect()
    }

    /// Serializes every contributor to the store file.
    ///
    /// The YAML is rendered from one consistent view of the registry and
    /// replaces the store by rename, so readers of the file never see a
    /// partial write. Does nothing for in-memory registries.
    pub async fn persist(&self) -> Result<()> {
        let Some(path) = self.store_path.clone() else {
            return Ok(());
        };
        let _guard = self.persist_lock.lock().await;

        let (content, count) = {
            let state = self.read();
            let records: Vec<ContributorRecord> =
                state.contributors.iter().map(ContributorRecord::from).collect();
            (yaml::to_yaml(&records)?, records.len())
        };

        let target = path.clone();
        tokio::task::spawn_blocking(move || yaml::write_file_atomically(&target, &content))
            .await
            .context("Contributor store writer panicked")??;

        debug!(path = %path.display(), contributors = count, "Persisted contributor store");
        Ok(())
    }
}
