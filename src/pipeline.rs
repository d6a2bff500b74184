//! Concurrent commit resolution.
//!
//! A coordinator reads commits from a source and feeds a bounded dispatch
//! queue shared by a pool of workers. Each worker maps the commit's author
//! to a contributor (registry first, then the identity service) and
//! reports the result on an unbounded queue. The coordinator drains those
//! results between reads, logs progress and checkpoints the registry.
//!
//! Commits complete in no particular order. Every commit read is resolved
//! exactly once, and the run fails if the counts disagree.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Context, Result};
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::commit::CommitRecord;
use crate::contributor::{
    organization, Contributor, ContributorId, ContributorRegistry, Organization, BUNDLE_ID,
};
use crate::identity::{lookup_by_noreply_email, IdentityInfo, IdentityLookup};

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of resolution workers.
    pub workers: usize,
    /// Capacity of the dispatch queue.
    pub queue_capacity: usize,
    /// Persist the registry after this many resolved commits.
    pub checkpoint_every: usize,
    /// Log progress after this many resolved commits.
    pub progress_every: usize,
    /// Organization forced for a login, keyed by lower-cased login.
    pub organization_overrides: HashMap<String, Organization>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 64,
            queue_capacity: 1000,
            checkpoint_every: 1000,
            progress_every: 100,
            organization_overrides: HashMap::new(),
        }
    }
}

/// Counters of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Commits read from the source and dispatched.
    pub read: usize,
    /// Commits resolved to a contributor.
    pub resolved: usize,
    /// Registry persists, the final one included.
    pub checkpoints: usize,
}

/// Pipeline integrity errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The number of resolved commits differs from the number read.
    #[error("Resolved {resolved} commits but read {read}")]
    CountMismatch {
        /// Commits read.
        read: usize,
        /// Commits resolved.
        resolved: usize,
    },

    /// A worker task panicked or was cancelled.
    #[error("Resolution worker {worker} terminated abnormally: {message}")]
    WorkerTerminated {
        /// Worker index.
        worker: usize,
        /// Join error.
        message: String,
    },
}

/// Lifecycle of one commit, reported in trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    /// Read from the source, not yet queued.
    Unseen,
    /// Waiting in the dispatch queue.
    Dispatched,
    /// Picked up by a worker.
    Resolving,
    /// Attributed to a contributor and counted by the coordinator.
    Resolved,
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unseen => "unseen",
            Self::Dispatched => "dispatched",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
enum Dispatch {
    Commit(Arc<CommitRecord>),
    Stop,
}

type Resolved = (Arc<CommitRecord>, ContributorId);

/// Fail-fast flag shared by the coordinator and the workers.
#[derive(Default)]
struct AbortSignal {
    tripped: AtomicBool,
    first_error: Mutex<Option<anyhow::Error>>,
}

impl AbortSignal {
    fn trip(&self, error: anyhow::Error) {
        let mut first = self
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if first.is_none() {
            *first = Some(error);
        }
        self.tripped.store(true, Ordering::SeqCst);
    }

    fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    fn take(&self) -> Option<anyhow::Error> {
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Resolves the authors of a stream of commits into the registry.
pub struct CommitPipeline {
    registry: Arc<ContributorRegistry>,
    identity: Arc<dyn IdentityLookup>,
    config: PipelineConfig,
}

impl CommitPipeline {
    /// Creates a pipeline over a registry and an identity service.
    pub fn new(
        registry: Arc<ContributorRegistry>,
        identity: Arc<dyn IdentityLookup>,
        mut config: PipelineConfig,
    ) -> Self {
        config.organization_overrides = config
            .organization_overrides
            .into_iter()
            .map(|(login, org)| (login.to_lowercase(), org))
            .collect();
        Self {
            registry,
            identity,
            config,
        }
    }

    /// Registry the pipeline writes to.
    pub fn registry(&self) -> &Arc<ContributorRegistry> {
        &self.registry
    }

    /// Resolves every commit of `source`. `total` is only used for progress
    /// messages.
    ///
    /// On the first failure, from the source or from a worker, the
    /// coordinator stops reading, winds the workers down and returns that
    /// error. Checkpoints written before the failure stay on disk.
    pub async fn run<S>(&self, source: S, total: Option<usize>) -> Result<PipelineStats>
    where
        S: Stream<Item = Result<CommitRecord>>,
    {
        let workers = self.config.workers.max(1);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let dispatch_rx = Arc::new(tokio::sync::Mutex::new(dispatch_rx));
        let (resolved_tx, mut resolved_rx) = mpsc::unbounded_channel();
        let abort = Arc::new(AbortSignal::default());
        let overrides = Arc::new(self.config.organization_overrides.clone());

        info!(workers, queue_capacity = self.config.queue_capacity, "Starting commit resolution");

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let worker = Worker {
                index,
                registry: Arc::clone(&self.registry),
                identity: Arc::clone(&self.identity),
                overrides: Arc::clone(&overrides),
                dispatch: Arc::clone(&dispatch_rx),
                resolved: resolved_tx.clone(),
                abort: Arc::clone(&abort),
            };
            handles.push(tokio::spawn(worker.run()));
        }
        // Only workers hold the receiving side, so sends fail once all of
        // them are gone.
        drop(dispatch_rx);
        drop(resolved_tx);

        let mut stats = PipelineStats::default();
        let mut source = std::pin::pin!(source);
        while let Some(item) = source.next().await {
            if abort.is_tripped() {
                break;
            }
            let commit = match item {
                Ok(commit) => {
                    trace!(commit = %commit.hash, state = %CommitState::Unseen, "Read commit");
                    Arc::new(commit)
                }
                Err(e) => {
                    abort.trip(e.context("Failed to read commit from source"));
                    break;
                }
            };

            if let Err(e) = self.drain(&mut resolved_rx, &mut stats, total).await {
                abort.trip(e);
                break;
            }

            trace!(commit = %commit.hash, state = %CommitState::Dispatched, "Dispatching commit");
            if dispatch_tx.send(Dispatch::Commit(commit)).await.is_err() {
                warn!("All resolution workers stopped before the source was exhausted");
                break;
            }
            stats.read += 1;
        }

        for _ in 0..workers {
            if dispatch_tx.send(Dispatch::Stop).await.is_err() {
                break;
            }
        }
        drop(dispatch_tx);

        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(()) => {}
                Err(e) => abort.trip(
                    PipelineError::WorkerTerminated {
                        worker: index,
                        message: e.to_string(),
                    }
                    .into(),
                ),
            }
        }

        if abort.is_tripped() {
            let error = abort
                .take()
                .unwrap_or_else(|| anyhow!("Commit resolution aborted"));
            return Err(error);
        }

        self.drain(&mut resolved_rx, &mut stats, total).await?;
        self.registry
            .persist()
            .await
            .context("Failed to write final contributor checkpoint")?;
        stats.checkpoints += 1;

        if stats.resolved != stats.read {
            return Err(PipelineError::CountMismatch {
                read: stats.read,
                resolved: stats.resolved,
            }
            .into());
        }

        info!(
            read = stats.read,
            resolved = stats.resolved,
            checkpoints = stats.checkpoints,
            contributors = self.registry.len(),
            "Commit resolution complete"
        );
        Ok(stats)
    }

    /// Counts every result currently queued, logging progress and
    /// checkpointing the registry at the configured intervals.
    async fn drain(
        &self,
        resolved_rx: &mut mpsc::UnboundedReceiver<Resolved>,
        stats: &mut PipelineStats,
        total: Option<usize>,
    ) -> Result<()> {
        let progress_every = self.config.progress_every.max(1);
        let checkpoint_every = self.config.checkpoint_every.max(1);

        while let Ok((commit, contributor)) = resolved_rx.try_recv() {
            stats.resolved += 1;
            trace!(
                commit = %commit.hash,
                contributor = ?contributor,
                state = %CommitState::Resolved,
                "Commit resolved"
            );

            if stats.resolved % progress_every == 0 {
                match total {
                    Some(total) => info!("Processed {} of {} commits", stats.resolved, total),
                    None => info!("Processed {} commits", stats.resolved),
                }
            }
            if stats.resolved % checkpoint_every == 0 {
                self.registry
                    .persist()
                    .await
                    .context("Failed to write contributor checkpoint")?;
                stats.checkpoints += 1;
                debug!(
                    resolved = stats.resolved,
                    path = ?self.registry.store_path(),
                    "Checkpointed contributor registry"
                );
            }
        }
        Ok(())
    }
}

struct Worker {
    index: usize,
    registry: Arc<ContributorRegistry>,
    identity: Arc<dyn IdentityLookup>,
    overrides: Arc<HashMap<String, Organization>>,
    dispatch: Arc<tokio::sync::Mutex<mpsc::Receiver<Dispatch>>>,
    resolved: mpsc::UnboundedSender<Resolved>,
    abort: Arc<AbortSignal>,
}

impl Worker {
    async fn run(self) {
        loop {
            let message = self.dispatch.lock().await.recv().await;
            let commit = match message {
                Some(Dispatch::Commit(commit)) => commit,
                Some(Dispatch::Stop) | None => return,
            };
            // Keep pulling after an abort so the coordinator never blocks
            // on a full queue.
            if self.abort.is_tripped() {
                continue;
            }

            trace!(
                worker = self.index,
                commit = %commit.hash,
                state = %CommitState::Resolving,
                "Resolving commit"
            );
            match self.resolve(&commit).await {
                Ok(contributor) => {
                    self.registry.record_commit(contributor, Arc::clone(&commit));
                    if self.resolved.send((commit, contributor)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let e = e.context(format!("Failed to resolve commit {}", commit.hash));
                    warn!(worker = self.index, "{e:#}");
                    self.abort.trip(e);
                    return;
                }
            }
        }
    }

    async fn resolve(&self, commit: &CommitRecord) -> Result<ContributorId> {
        if let Some(id) = self.registry.find_by_email(&commit.email) {
            return Ok(id);
        }

        let author_id = self.identity.lookup_commit_author(&commit.hash).await?;
        let info = if author_id == BUNDLE_ID {
            lookup_by_noreply_email(self.identity.as_ref(), &commit.email).await?
        } else {
            self.identity.lookup_by_id(author_id).await?
        };
        let info = info.unwrap_or_else(|| {
            warn!(
                commit = %commit.hash,
                name = %commit.author_name,
                email = %commit.email,
                "Unable to determine the author's GitHub account, adding to the bundle"
            );
            IdentityInfo::bundle()
        });

        let mut emails = vec![commit.email.clone()];
        if let Some(email) = info.email.as_deref().filter(|e| !e.is_empty()) {
            emails.push(email.to_lowercase());
        }

        let organization = if info.id == BUNDLE_ID {
            Organization::OTHER
        } else {
            organization::derive(
                self.overrides.get(&info.login.to_lowercase()).copied(),
                emails.iter().map(String::as_str),
                info.company.as_deref(),
                Some(&info.login),
            )
        };
        let name = info
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| commit.author_name.clone());

        let candidate = Contributor::new(name, emails, organization, info.login, info.id);
        Ok(self.registry.upsert(candidate)?)
    }
}
