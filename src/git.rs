//! Git operations: commit sources, folder enumeration and remotes.

pub mod log;
pub mod remote;
pub mod repository;

pub use log::{parse_log, read_log_file, LogParseError, LOG_FORMAT};
pub use remote::GitHubRepo;
pub use repository::GitRepository;
