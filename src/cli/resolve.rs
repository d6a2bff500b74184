//! Resolve command: looks up a single GitHub identity.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;

use crate::contributor::ContributorRegistry;
use crate::git::GitRepository;
use crate::identity::{
    lookup_by_noreply_email, GitHubResolver, IdentityInfo, IdentityLookup, ResolverConfig,
    DEFAULT_API_URL,
};
use crate::utils::Settings;

/// Resolve command options.
#[derive(Parser)]
pub struct ResolveCommand {
    /// GitHub id, login, e-mail address, or commit hash with `--commit`.
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Treat the query as a commit hash of the repository at `--repo`.
    #[arg(long)]
    pub commit: bool,

    /// Repository checkout used for commit lookups.
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Contributor store consulted for e-mail addresses.
    #[arg(long, default_value = "contributors.yaml")]
    pub contributors_file: PathBuf,

    /// GitHub API base URL.
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,
}

/// What a query names.
#[derive(Debug, PartialEq, Eq)]
enum Query<'a> {
    Id(i64),
    Email(&'a str),
    Login(&'a str),
    Commit(&'a str),
}

impl<'a> Query<'a> {
    fn classify(raw: &'a str, commit: bool) -> Self {
        let raw = raw.trim();
        if commit {
            Self::Commit(raw)
        } else if let Ok(id) = raw.parse::<i64>() {
            Self::Id(id)
        } else if raw.contains('@') {
            Self::Email(raw)
        } else {
            Self::Login(raw.trim_start_matches('@'))
        }
    }
}

impl ResolveCommand {
    /// Executes the resolve command.
    pub async fn execute(self) -> Result<()> {
        let settings = Settings::load().context("Failed to load settings")?;

        let repo = if self.commit {
            let repo = GitRepository::open_at(&self.repo)?;
            Some(repo.github_repo()?)
        } else {
            None
        };
        let resolver = GitHubResolver::new(
            ResolverConfig {
                api_url: self.api_url.clone(),
                tokens: settings.github_tokens(),
                max_concurrent_requests: 1,
                ..ResolverConfig::default()
            },
            repo,
        )?;

        match self.resolve(&resolver).await? {
            Some(info) => {
                let json = serde_json::to_string_pretty(&info)
                    .context("Failed to serialize identity")?;
                println!("{json}");
            }
            None => anyhow::bail!("No GitHub account found for '{}'", self.query),
        }
        Ok(())
    }

    async fn resolve(&self, lookup: &dyn IdentityLookup) -> Result<Option<IdentityInfo>> {
        match Query::classify(&self.query, self.commit) {
            Query::Id(id) => lookup.lookup_by_id(id).await,
            Query::Login(login) => lookup.lookup_by_login(login).await,
            Query::Commit(hash) => {
                let id = lookup.lookup_commit_author(hash).await?;
                lookup.lookup_by_id(id).await
            }
            Query::Email(email) => {
                let email = email.to_lowercase();
                let registry = ContributorRegistry::load(&self.contributors_file).await?;
                if let Some(id) = registry.find_by_email(&email) {
                    if let Some(known) = registry.get(id) {
                        debug!(email = %email, login = %known.github_login, "Found in contributor store");
                        return lookup.lookup_by_id(known.github_id).await;
                    }
                }
                lookup_by_noreply_email(lookup, &email).await
            }
        }
    }
}
