//! GitHub repository coordinates derived from remote URLs.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;

/// Owner and name of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GitHubRepo {
    /// User or organization owning the repository.
    pub owner: String,
    /// Repository name.
    pub name: String,
}

impl GitHubRepo {
    /// Extracts the repository from a GitHub remote URL.
    ///
    /// Accepts the SSH (`git@github.com:owner/repo.git`), `ssh://` and
    /// HTTPS forms, with or without the `.git` suffix.
    pub fn from_url(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        let path = if let Some(rest) = uri.strip_prefix("git@github.com:") {
            rest
        } else if let Some((_, rest)) = uri.split_once("github.com/") {
            rest
        } else if let Some((_, rest)) = uri.split_once("github.com:") {
            rest
        } else {
            anyhow::bail!("Not a GitHub URI: {}", uri);
        };

        let path = path.trim_end_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        path.parse()
    }

    /// `owner/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl FromStr for GitHubRepo {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => anyhow::bail!("Invalid GitHub repository format: {}", s),
        }
    }
}

impl fmt::Display for GitHubRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
