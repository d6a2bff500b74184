//! GitHub identity lookups: the resolver trait, typed results, and the
//! caching, rate-limited GitHub implementation.

pub mod backoff;
pub mod error;
pub mod github;
pub mod noreply;
#[cfg(test)]
pub(crate) mod test_utils;

use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::contributor::{BUNDLE_ID, BUNDLE_LOGIN, BUNDLE_NAME};

pub use backoff::{Backoff, BackoffPolicy, RateLimitHeaders};
pub use error::IdentityError;
pub use github::{GitHubResolver, ResolverConfig, DEFAULT_API_URL};
pub use noreply::NoreplyAddress;

/// A GitHub user as returned by the users API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityInfo {
    /// Login name.
    pub login: String,
    /// Numeric user id.
    pub id: i64,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Public e-mail.
    #[serde(default)]
    pub email: Option<String>,
    /// Free-text company field.
    #[serde(default)]
    pub company: Option<String>,
}

impl IdentityInfo {
    /// Identity standing in for every author that could not be mapped.
    pub fn bundle() -> Self {
        Self {
            login: BUNDLE_LOGIN.to_string(),
            id: BUNDLE_ID,
            name: Some(BUNDLE_NAME.to_string()),
            email: None,
            company: None,
        }
    }
}

/// Identity lookups against the source-control hosting service.
///
/// `Ok(None)` is a definitive miss; errors are hard failures.
pub trait IdentityLookup: Send + Sync {
    /// Looks up a user by numeric id. [`BUNDLE_ID`] resolves to
    /// [`IdentityInfo::bundle`] without a request.
    fn lookup_by_id(
        &self,
        github_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<IdentityInfo>>> + Send + '_>>;

    /// Looks up a user by login.
    fn lookup_by_login<'a>(
        &'a self,
        login: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<IdentityInfo>>> + Send + 'a>>;

    /// Returns the GitHub id linked to a commit's author, or [`BUNDLE_ID`]
    /// when the commit has no linked account.
    fn lookup_commit_author<'a>(
        &'a self,
        commit_hash: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + 'a>>;
}

/// Resolves an identity from a GitHub `noreply` e-mail address.
///
/// Returns `Ok(None)` for any other address.
pub async fn lookup_by_noreply_email(
    lookup: &dyn IdentityLookup,
    email: &str,
) -> Result<Option<IdentityInfo>> {
    match NoreplyAddress::parse(email) {
        Some(NoreplyAddress::IdAndLogin { id, login }) => {
            match lookup.lookup_by_id(id).await? {
                Some(info) => Ok(Some(info)),
                None => lookup.lookup_by_login(&login).await,
            }
        }
        Some(NoreplyAddress::Login(login)) => lookup.lookup_by_login(&login).await,
        None => Ok(None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::test_utils::StaticIdentities;
    use super::*;

    #[tokio::test]
    async fn noreply_with_id_resolves_by_id() {
        let identities = StaticIdentities::new().with_user(IdentityInfo {
            login: "octo".to_string(),
            id: 583,
            name: None,
            email: None,
            company: None,
        });

        let info = lookup_by_noreply_email(&identities, "583+octo@users.noreply.github.com")
            .await
            .unwrap();
        assert_eq!(info.map(|i| i.login), Some("octo".to_string()));
    }

    #[tokio::test]
    async fn noreply_falls_back_to_login_when_id_is_unknown() {
        let identities = StaticIdentities::new().with_user(IdentityInfo {
            login: "octo".to_string(),
            id: 583,
            name: None,
            email: None,
            company: None,
        });

        let info = lookup_by_noreply_email(&identities, "999+octo@users.noreply.github.com")
            .await
            .unwrap();
        assert_eq!(info.map(|i| i.id), Some(583));
    }

    #[tokio::test]
    async fn regular_address_is_a_miss() {
        let identities = StaticIdentities::new();
        let info = lookup_by_noreply_email(&identities, "dev@example.com")
            .await
            .unwrap();
        assert!(info.is_none());
    }
}
