//! Generate command: resolves the history of a repository and writes
//! CODEOWNERS lines.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Days, NaiveDate, Utc};
use clap::Parser;
use tracing::{info, warn};

use crate::attribution::{attribute, collapse, render, AttributionConfig};
use crate::commit::CommitRecord;
use crate::contributor::ContributorRegistry;
use crate::folders::{FolderPresets, FolderTree};
use crate::git::{read_log_file, GitRepository};
use crate::identity::{GitHubResolver, ResolverConfig, DEFAULT_API_URL};
use crate::pipeline::{CommitPipeline, PipelineConfig, PipelineStats};
use crate::utils::Settings;

/// Contributors without a commit in this many days are not owners.
const DEFAULT_ACTIVE_DAYS: u64 = 730;

/// Generate command options.
#[derive(Parser)]
pub struct GenerateCommand {
    /// Path to the repository checkout.
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Only contributors with a commit on or after this date become owners
    /// (YYYY-MM-DD, defaults to two years ago).
    #[arg(long, value_name = "DATE")]
    pub active_after: Option<NaiveDate>,

    /// Contributor store, read at start and checkpointed during the run.
    #[arg(long, default_value = "contributors.yaml")]
    pub contributors_file: PathBuf,

    /// YAML file with folder presets.
    #[arg(long)]
    pub folder_presets_file: Option<PathBuf>,

    /// Maximum owners per folder, preset owners included.
    #[arg(long, default_value_t = 3)]
    pub max_owners: usize,

    /// Concurrent resolution workers.
    #[arg(long, default_value_t = 64)]
    pub workers: usize,

    /// Commits buffered between the history reader and the workers.
    #[arg(long, default_value_t = 1000)]
    pub queue_capacity: usize,

    /// Resolved commits between contributor store checkpoints.
    #[arg(long, default_value_t = 1000)]
    pub checkpoint_every: usize,

    /// GitHub API base URL.
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Read commits from a captured `git log` instead of the checkout.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Write CODEOWNERS lines here instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl GenerateCommand {
    /// Executes the generate command.
    pub async fn execute(self) -> Result<()> {
        let settings = Settings::load().context("Failed to load settings")?;
        let owners = self.generate(&settings).await?;

        match &self.output {
            Some(path) => {
                std::fs::write(path, &owners)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(path = %path.display(), "Wrote owners file");
            }
            None => print!("{owners}"),
        }
        Ok(())
    }

    /// Runs resolution and attribution, returning the rendered lines.
    pub async fn generate(&self, settings: &Settings) -> Result<String> {
        let repo = GitRepository::open_at(&self.repo).context(
            "Failed to open git repository. Make sure --repo points at a checkout.",
        )?;
        let github_repo = repo
            .github_repo()
            .context("Failed to determine the GitHub repository from the origin remote")?;
        info!(repository = %github_repo, "Generating owners");

        let resolver = GitHubResolver::new(
            ResolverConfig {
                api_url: self.api_url.clone(),
                tokens: settings.github_tokens(),
                ..ResolverConfig::default()
            },
            Some(github_repo),
        )?;

        let registry = ContributorRegistry::load(&self.contributors_file).await?;

        let pipeline = CommitPipeline::new(
            Arc::new(registry),
            Arc::new(resolver),
            PipelineConfig {
                workers: self.workers,
                queue_capacity: self.queue_capacity,
                checkpoint_every: self.checkpoint_every,
                organization_overrides: settings.organization_overrides.clone(),
                ..PipelineConfig::default()
            },
        );
        let stats = self.resolve_history(&pipeline, &repo).await?;
        info!(commits = stats.read, "Resolved commit history");

        let presets = match &self.folder_presets_file {
            Some(path) => FolderPresets::load(path)?,
            None => FolderPresets::new(),
        };
        let mut tree = FolderTree::build(&presets, repo.tracked_folders()?);

        let config = AttributionConfig {
            active_after: self.active_after_cutoff()?,
            max_owners: self.max_owners,
        };
        let scores = attribute(&pipeline.registry().snapshot(), &mut tree, &presets, &config);
        let owned = tree.iter().filter(|(_, s)| !s.owners.is_empty()).count();
        info!(
            folders = tree.len(),
            owned,
            scored = scores.len(),
            "Attributed folder ownership"
        );

        let lines = collapse(&tree);
        if lines.is_empty() {
            warn!("No folder has owners; the output is empty");
        }
        Ok(render(&lines))
    }

    async fn resolve_history(
        &self,
        pipeline: &CommitPipeline,
        repo: &GitRepository,
    ) -> Result<PipelineStats> {
        match &self.log_file {
            Some(path) => {
                let commits = load_log(path)?;
                let total = commits.len();
                let source = futures::stream::iter(commits.into_iter().map(Ok));
                pipeline.run(source, Some(total)).await
            }
            None => {
                let total = repo.commit_count().ok();
                pipeline
                    .run(repo.commit_stream(self.queue_capacity), total)
                    .await
            }
        }
    }

    fn active_after_cutoff(&self) -> Result<DateTime<Utc>> {
        let date = match self.active_after {
            Some(date) => date,
            None => Utc::now()
                .date_naive()
                .checked_sub_days(Days::new(DEFAULT_ACTIVE_DAYS))
                .context("Default activity cutoff is out of range")?,
        };
        date.and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .context("Invalid activity cutoff")
    }
}

fn load_log(path: &Path) -> Result<Vec<CommitRecord>> {
    let commits = read_log_file(path)?;
    info!(commits = commits.len(), path = %path.display(), "Read captured git log");
    Ok(commits)
}
