//! GitHub REST API identity resolver.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use rand::seq::IndexedRandom;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use super::backoff::{rate_limit_delay, Backoff, BackoffPolicy, RateLimitHeaders};
use super::error::IdentityError;
use super::{IdentityInfo, IdentityLookup};
use crate::contributor::BUNDLE_ID;
use crate::git::remote::GitHubRepo;

/// Public GitHub API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com/";

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("repo-owners/", env!("CARGO_PKG_VERSION"));

/// Settings for [`GitHubResolver`].
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// API base URL.
    pub api_url: String,
    /// Tokens to spread requests over. May be empty for anonymous access.
    pub tokens: Vec<String>,
    /// Maximum requests on the wire at once. Sleeping requests do not count.
    pub max_concurrent_requests: usize,
    /// Rate-limit backoff tuning.
    pub backoff: BackoffPolicy,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Attempts per request before a transport error is fatal.
    pub connect_attempts: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            tokens: Vec::new(),
            max_concurrent_requests: 1000,
            backoff: BackoffPolicy::default(),
            request_timeout: Duration::from_secs(30),
            connect_attempts: 3,
        }
    }
}

#[derive(Deserialize)]
struct CommitResponse {
    author: Option<CommitAuthor>,
}

#[derive(Deserialize)]
struct CommitAuthor {
    id: i64,
}

/// Caching GitHub identity resolver.
///
/// Lookups by id and by login are memoized for the lifetime of the
/// resolver, definitive misses included. All requests share one limiter
/// and one [`Backoff`].
pub struct GitHubResolver {
    client: Client,
    api_url: Url,
    repo: Option<GitHubRepo>,
    tokens: Vec<String>,
    limiter: Semaphore,
    backoff: Mutex<Backoff>,
    connect_attempts: u32,
    by_id: RwLock<HashMap<i64, Option<IdentityInfo>>>,
    by_login: RwLock<HashMap<String, Option<IdentityInfo>>>,
}

impl GitHubResolver {
    /// Creates a resolver. `repo` is required for commit author lookups.
    pub fn new(config: ResolverConfig, repo: Option<GitHubRepo>) -> Result<Self> {
        let mut api_url = config.api_url.clone();
        if !api_url.ends_with('/') {
            api_url.push('/');
        }
        let api_url = Url::parse(&api_url)
            .with_context(|| format!("Invalid GitHub API URL: {}", config.api_url))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        if config.tokens.is_empty() {
            warn!("No GitHub API tokens configured, using anonymous rate limits");
        }

        Ok(Self {
            client,
            api_url,
            repo,
            tokens: config.tokens,
            limiter: Semaphore::new(config.max_concurrent_requests.max(1)),
            backoff: Mutex::new(Backoff::new(config.backoff)),
            connect_attempts: config.connect_attempts.max(1),
            by_id: RwLock::new(HashMap::new()),
            by_login: RwLock::new(HashMap::new()),
        })
    }

    /// Looks up a user by numeric id, consulting the cache first.
    pub async fn user_by_id(&self, github_id: i64) -> Result<Option<IdentityInfo>> {
        if github_id == BUNDLE_ID {
            return Ok(Some(IdentityInfo::bundle()));
        }

        let cached = self
            .by_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&github_id)
            .cloned();
        if let Some(hit) = cached {
            return Ok(hit);
        }

        let url = self.endpoint(&["user", &github_id.to_string()])?;
        let info: Option<IdentityInfo> = self.get_json(url).await?;
        self.remember(Some(github_id), None, &info);
        Ok(info)
    }

    /// Looks up a user by login, consulting the cache first.
    pub async fn user_by_login(&self, login: &str) -> Result<Option<IdentityInfo>> {
        let key = login.to_lowercase();
        let cached = self
            .by_login
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(hit) = cached {
            return Ok(hit);
        }

        let url = self.endpoint(&["users", login])?;
        let info: Option<IdentityInfo> = self.get_json(url).await?;
        self.remember(None, Some(key), &info);
        Ok(info)
    }

    /// Returns the id of the account linked to a commit's author, or
    /// [`BUNDLE_ID`] when there is none.
    pub async fn commit_author(&self, commit_hash: &str) -> Result<i64> {
        let repo = self
            .repo
            .as_ref()
            .ok_or_else(|| anyhow!("Commit lookups need a GitHub repository"))?;
        let url = self.endpoint(&["repos", &repo.owner, &repo.name, "commits", commit_hash])?;

        let response: Option<CommitResponse> = self.get_json(url).await?;
        match response.and_then(|r| r.author) {
            Some(author) => Ok(author.id),
            None => {
                debug!(commit = commit_hash, "Commit has no linked GitHub account");
                Ok(BUNDLE_ID)
            }
        }
    }

    fn remember(&self, id: Option<i64>, login: Option<String>, info: &Option<IdentityInfo>) {
        let id = id.or_else(|| info.as_ref().map(|i| i.id));
        let login = login.or_else(|| info.as_ref().map(|i| i.login.to_lowercase()));

        if let Some(id) = id {
            self.by_id
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id, info.clone());
        }
        if let Some(login) = login {
            self.by_login
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(login, info.clone());
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("GitHub API URL cannot be a base: {}", self.api_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, url: &Url) -> RequestBuilder {
        let mut request = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = self.tokens.choose(&mut rand::rng()) {
            request = request.header(AUTHORIZATION, format!("token {token}"));
        }
        request
    }

    fn escalate_backoff(&self) -> Duration {
        self.backoff
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .escalate(Instant::now())
    }

    fn current_backoff(&self) -> Duration {
        self.backoff
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current()
    }

    fn reset_backoff(&self) {
        self.backoff
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }

    /// Issues a GET, sleeping through rate limits and retrying transport
    /// errors. 404 and 422 are definitive misses.
    ///
    /// A limiter permit is held only while a request is on the wire, so
    /// sleeping requests leave room for others.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        let mut failures = 0;
        loop {
            let permit = self
                .limiter
                .acquire()
                .await
                .map_err(|e| anyhow!("GitHub request limiter closed: {e}"))?;

            debug!(url = %url, "Sending GitHub API request");
            let response = match self.request(&url).send().await {
                Ok(response) => response,
                Err(e) => {
                    drop(permit);
                    failures += 1;
                    if failures >= self.connect_attempts {
                        return Err(IdentityError::Network {
                            attempts: failures,
                            message: e.to_string(),
                        }
                        .into());
                    }
                    warn!(url = %url, attempt = failures, "GitHub API request failed: {e}");
                    tokio::time::sleep(self.current_backoff()).await;
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
                let headers = RateLimitHeaders::from_headers(response.headers());
                // the backoff term is additive, so the wait is computed bare
                // and the shared backoff only grows once a sleep is certain
                match rate_limit_delay(status.as_u16(), &headers, Duration::ZERO, now_epoch())? {
                    Some(wait) => {
                        drop(permit);
                        let delay = wait + self.escalate_backoff();
                        warn!(
                            url = %url,
                            status = status.as_u16(),
                            delay_secs = delay.as_secs_f64(),
                            "GitHub API rate limit hit, sleeping"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    None => return Err(unexpected_status(&url, response).await),
                }
            }

            if status == StatusCode::NOT_FOUND || status == StatusCode::UNPROCESSABLE_ENTITY {
                debug!(url = %url, status = status.as_u16(), "GitHub API lookup miss");
                return Ok(None);
            }

            if !status.is_success() {
                return Err(unexpected_status(&url, response).await);
            }

            self.reset_backoff();
            let body = response
                .json::<T>()
                .await
                .map_err(|e| IdentityError::InvalidResponseFormat(e.to_string()))?;
            return Ok(Some(body));
        }
    }
}

impl IdentityLookup for GitHubResolver {
    fn lookup_by_id(
        &self,
        github_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<IdentityInfo>>> + Send + '_>> {
        Box::pin(self.user_by_id(github_id))
    }

    fn lookup_by_login<'a>(
        &'a self,
        login: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<IdentityInfo>>> + Send + 'a>> {
        Box::pin(self.user_by_login(login))
    }

    fn lookup_commit_author<'a>(
        &'a self,
        commit_hash: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + 'a>> {
        Box::pin(self.commit_author(commit_hash))
    }
}

async fn unexpected_status(url: &Url, response: Response) -> anyhow::Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_else(|e| {
        debug!("Failed to read error response body: {e}");
        String::new()
    });
    IdentityError::UnexpectedStatus {
        status,
        url: url.to_string(),
        body,
    }
    .into()
}

fn now_epoch() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}
