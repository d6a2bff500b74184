//! Top-down reduction of the annotated folder tree to CODEOWNERS lines.

use std::collections::BTreeSet;
use std::fmt;

use crate::commit::{join_folder, ROOT_FOLDER};
use crate::folders::FolderTree;

/// One CODEOWNERS rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerLine {
    /// Path pattern.
    pub pattern: String,
    /// Owner logins, without the `@` prefix.
    pub owners: BTreeSet<String>,
    /// Whether the rule covers the whole subtree.
    pub terminal: bool,
}

impl fmt::Display for OwnerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)?;
        for owner in &self.owners {
            write!(f, " @{owner}")?;
        }
        Ok(())
    }
}

/// Visits the tree from the root and emits one line per folder decision.
///
/// Folders without owners are skipped together with their subtree. A
/// folder whose children's owners are all subsets of its own ends the
/// descent with a terminal line; otherwise a non-terminal line is emitted
/// and every child is visited, in sorted order.
pub fn collapse(tree: &FolderTree) -> Vec<OwnerLine> {
    let mut lines = Vec::new();
    let mut stack = vec![ROOT_FOLDER.to_string()];

    while let Some(folder) = stack.pop() {
        let Some(settings) = tree.get(&folder) else {
            continue;
        };
        if settings.owners.is_empty() {
            continue;
        }

        let mut children: Vec<String> = settings
            .children
            .iter()
            .map(|child| join_folder(&folder, child))
            .filter(|child| tree.contains(child))
            .collect();
        children.sort();

        let terminal = children.iter().all(|child| {
            tree.get(child)
                .is_none_or(|c| c.owners.is_subset(&settings.owners))
        });
        lines.push(OwnerLine {
            pattern: pattern(&folder, terminal),
            owners: settings.owners.clone(),
            terminal,
        });

        if !terminal {
            // reversed so the smallest child is popped first
            stack.extend(children.into_iter().rev());
        }
    }

    lines
}

fn pattern(folder: &str, terminal: bool) -> String {
    match (folder == ROOT_FOLDER, terminal) {
        (true, true) => "*".to_string(),
        (true, false) => "/*".to_string(),
        (false, true) => format!("{folder}/**"),
        (false, false) => format!("{folder}/*"),
    }
}

/// Renders lines as CODEOWNERS file content.
pub fn render(lines: &[OwnerLine]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&line.to_string());
        out.push('\n');
    }
    out
}
