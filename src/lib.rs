//! # repo-owners
//!
//! Derives per-folder code owners for a repository from its Git history.
//!
//! Commits are streamed from the local checkout into a pool of workers
//! that resolve each author to a GitHub account, a contributor registry
//! accumulates per-contributor history and is checkpointed to YAML, and
//! the attribution reducer turns the weighted history into CODEOWNERS
//! lines.
//!
//! ## Quick Start
//!
//! ```rust
//! use repo_owners::attribution::{collapse, render};
//! use repo_owners::folders::{FolderPresets, FolderTree};
//!
//! let presets = FolderPresets::new();
//! let tree = FolderTree::build(&presets, ["/", "/src"]);
//! assert_eq!(render(&collapse(&tree)), "");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod attribution;
pub mod cli;
pub mod commit;
pub mod contributor;
pub mod data;
pub mod folders;
pub mod git;
pub mod identity;
pub mod pipeline;
pub mod utils;

pub use crate::cli::Cli;

/// The current version of repo-owners.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
