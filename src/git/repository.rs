//! Git repository operations

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use futures::Stream;
use git2::{
    Commit, DiffFindOptions, Mailmap, ObjectType, Patch, Repository, Sort, TreeWalkMode,
    TreeWalkResult,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::commit::{CommitRecord, FileStat, ROOT_FOLDER};
use crate::git::remote::GitHubRepo;

/// Git repository wrapper
pub struct GitRepository {
    repo: Repository,
}

impl GitRepository {
    /// Open repository at specified path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path)
            .with_context(|| format!("Failed to open git repository: {}", path.display()))?;

        Ok(Self { repo })
    }

    /// URL of the `origin` remote
    pub fn origin_url(&self) -> Result<String> {
        let remote = self
            .repo
            .find_remote("origin")
            .context("Repository has no origin remote")?;
        remote
            .url()
            .map(ToString::to_string)
            .context("Origin remote URL is not valid UTF-8")
    }

    /// GitHub repository of the `origin` remote
    pub fn github_repo(&self) -> Result<GitHubRepo> {
        GitHubRepo::from_url(&self.origin_url()?)
    }

    /// Number of commits reachable from HEAD
    pub fn commit_count(&self) -> Result<usize> {
        if self.repo.is_empty().context("Failed to inspect repository")? {
            return Ok(0);
        }
        let mut walker = self.repo.revwalk().context("Failed to create revwalk")?;
        walker.push_head().context("Failed to push HEAD")?;
        Ok(walker.count())
    }

    /// Every directory of the HEAD tree, as absolute folder paths, plus the
    /// root.
    pub fn tracked_folders(&self) -> Result<Vec<String>> {
        let mut folders = vec![ROOT_FOLDER.to_string()];
        if self.repo.is_empty().context("Failed to inspect repository")? {
            return Ok(folders);
        }

        let tree = self
            .repo
            .head()
            .context("Failed to get HEAD reference")?
            .peel_to_tree()
            .context("Failed to get HEAD tree")?;
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Tree) {
                if let Some(name) = entry.name() {
                    folders.push(format!("/{root}{name}"));
                }
            }
            TreeWalkResult::Ok
        })
        .context("Failed to walk HEAD tree")?;

        debug!(folders = folders.len(), "Enumerated repository folders");
        Ok(folders)
    }

    /// Streams the commits reachable from HEAD, newest first.
    ///
    /// The history is walked on a blocking thread that stays at most
    /// `buffer` commits ahead of the consumer.
    pub fn commit_stream(&self, buffer: usize) -> impl Stream<Item = Result<CommitRecord>> + Send {
        let git_dir = self.repo.path().to_path_buf();
        let (tx, mut rx) = mpsc::channel(buffer.max(1));

        tokio::task::spawn_blocking(move || {
            let result = walk_commits(&git_dir, |record| tx.blocking_send(Ok(record)).is_ok());
            if let Err(e) = result {
                // nobody is listening if this fails
                let _ = tx.blocking_send(Err(e));
            }
        });

        futures::stream::poll_fn(move |cx| rx.poll_recv(cx))
    }

    /// Reads every commit reachable from HEAD, newest first.
    pub fn commits(&self) -> Result<Vec<CommitRecord>> {
        let mut commits = Vec::new();
        walk_commits(self.repo.path(), |record| {
            commits.push(record);
            true
        })?;
        Ok(commits)
    }
}

/// Walks HEAD in time order, handing each record to `emit` until it
/// returns `false`.
fn walk_commits(git_dir: &Path, mut emit: impl FnMut(CommitRecord) -> bool) -> Result<()> {
    let repo = Repository::open(git_dir)
        .with_context(|| format!("Failed to open git repository: {}", git_dir.display()))?;
    if repo.is_empty().context("Failed to inspect repository")? {
        return Ok(());
    }

    let mailmap = match repo.mailmap() {
        Ok(mailmap) => Some(mailmap),
        Err(e) => {
            warn!("Failed to load mailmap, using raw author identities: {e}");
            None
        }
    };

    let mut walker = repo.revwalk().context("Failed to create revwalk")?;
    walker.push_head().context("Failed to push HEAD")?;
    walker
        .set_sorting(Sort::TIME)
        .context("Failed to set revwalk sorting")?;

    for oid in walker {
        let oid = oid.context("Failed to get commit OID from walker")?;
        let commit = repo.find_commit(oid).context("Failed to find commit")?;
        let record = commit_record(&repo, mailmap.as_ref(), &commit)
            .with_context(|| format!("Failed to read commit {oid}"))?;
        if !emit(record) {
            break;
        }
    }
    Ok(())
}

fn commit_record(
    repo: &Repository,
    mailmap: Option<&Mailmap>,
    commit: &Commit,
) -> Result<CommitRecord> {
    let author = match mailmap {
        Some(mailmap) => commit
            .author_with_mailmap(mailmap)
            .context("Failed to apply mailmap")?,
        None => commit.author().to_owned(),
    };

    let when = author.when();
    let offset = FixedOffset::east_opt(when.offset_minutes() * 60)
        .context("Invalid commit timezone offset")?;
    let timestamp: DateTime<FixedOffset> = DateTime::from_timestamp(when.seconds(), 0)
        .context("Invalid commit timestamp")?
        .with_timezone(&offset);

    let files = file_stats(repo, commit)?;
    Ok(CommitRecord::new(
        commit.id().to_string(),
        author.name().unwrap_or("Unknown"),
        author.email().unwrap_or(""),
        timestamp,
        &files,
    ))
}

/// Per-file line counts against the first parent. Merge commits have none.
fn file_stats(repo: &Repository, commit: &Commit) -> Result<Vec<FileStat>> {
    if commit.parent_count() > 1 {
        return Ok(Vec::new());
    }

    let commit_tree = commit.tree().context("Failed to get commit tree")?;
    let parent_tree = if commit.parent_count() == 1 {
        Some(
            commit
                .parent(0)
                .context("Failed to get parent commit")?
                .tree()
                .context("Failed to get parent tree")?,
        )
    } else {
        None
    };

    let mut diff = repo
        .diff_tree_to_tree(parent_tree.as_ref(), Some(&commit_tree), None)
        .context("Failed to create diff")?;
    diff.find_similar(Some(DiffFindOptions::new().renames(true)))
        .context("Failed to detect renames")?;

    let mut stats = Vec::new();
    for (idx, delta) in diff.deltas().enumerate() {
        let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) else {
            continue;
        };
        let path = path.to_string_lossy().replace('\\', "/");

        if delta.old_file().id() == delta.new_file().id() {
            stats.push(FileStat::text(path, 0, 0));
            continue;
        }

        match Patch::from_diff(&diff, idx).context("Failed to create patch")? {
            Some(patch) if !patch.delta().flags().is_binary() => {
                let (_, added, removed) = patch.line_stats().context("Failed to count lines")?;
                stats.push(FileStat::text(path, added as u64, removed as u64));
            }
            _ => stats.push(FileStat::binary(path)),
        }
    }
    Ok(stats)
}
