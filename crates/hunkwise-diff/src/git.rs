//! Diff text extraction via git2.
//!
//! Produces `git diff`-compatible patch text for a ref range, the staged
//! index, or the working tree, then feeds it through the parser and the
//! heuristic analyzer.

use std::path::{Path, PathBuf};

use git2::{BranchType, Diff, DiffFindOptions, DiffFormat, DiffOptions, Repository, Tree};
use hunkwise_core::{ChangeSet, HunkwiseError, Result};
use tracing::{debug, warn};

use crate::parser::parse_diff;
use crate::risk::analyze;

/// Default number of context lines around each change.
pub const DEFAULT_CONTEXT_LINES: u32 = 3;

/// Which two sides of the repository to compare.
///
/// # Examples
///
/// ```
/// use hunkwise_diff::git::DiffTarget;
///
/// let target = DiffTarget::Staged;
/// assert_eq!(target.refs(), ("staged".to_string(), "index".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffTarget {
    /// Changes on `head` since its merge base with `base` (`base...head`).
    Range {
        /// Base revision.
        base: String,
        /// Head revision.
        head: String,
    },
    /// HEAD tree against the index.
    Staged,
    /// Index against the working tree.
    Unstaged,
}

impl DiffTarget {
    /// The `(base_ref, head_ref)` labels recorded on the resulting change set.
    pub fn refs(&self) -> (String, String) {
        match self {
            DiffTarget::Range { base, head } => (base.clone(), head.clone()),
            DiffTarget::Staged => ("staged".into(), "index".into()),
            DiffTarget::Unstaged => ("index".into(), "working tree".into()),
        }
    }
}

/// A repository path plus what to compare in it.
#[derive(Debug, Clone)]
pub struct DiffRequest {
    /// Repository root or any directory inside it.
    pub repo: PathBuf,
    /// Sides to compare.
    pub target: DiffTarget,
    /// Context lines around each change.
    pub context_lines: u32,
}

impl DiffRequest {
    /// Compare `head` against its merge base with `base`.
    pub fn range(repo: impl Into<PathBuf>, base: impl Into<String>, head: impl Into<String>) -> Self {
        Self::new(
            repo,
            DiffTarget::Range {
                base: base.into(),
                head: head.into(),
            },
        )
    }

    /// Compare with an explicit target and default context.
    pub fn new(repo: impl Into<PathBuf>, target: DiffTarget) -> Self {
        Self {
            repo: repo.into(),
            target,
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }

    /// Override the number of context lines.
    pub fn with_context_lines(mut self, lines: u32) -> Self {
        self.context_lines = lines;
        self
    }
}

/// Open the repository containing `path`.
///
/// # Errors
///
/// Returns [`HunkwiseError::Git`] if no repository is found.
pub fn open_repo(path: &Path) -> Result<Repository> {
    Repository::discover(path)
        .map_err(|e| HunkwiseError::Git(format!("failed to open repository: {e}")))
}

/// Render the unified diff for `target` as text.
///
/// # Errors
///
/// Returns [`HunkwiseError::Git`] if a revision cannot be resolved or the
/// diff cannot be computed.
pub fn diff_text(repo: &Repository, target: &DiffTarget, context_lines: u32) -> Result<String> {
    let mut opts = DiffOptions::new();
    opts.context_lines(context_lines);

    let mut diff = match target {
        DiffTarget::Range { base, head } => {
            let (base_tree, head_tree) = merge_base_trees(repo, base, head)?;
            repo.diff_tree_to_tree(Some(&base_tree), Some(&head_tree), Some(&mut opts))
        }
        DiffTarget::Staged => {
            let head_tree = repo.head().ok().and_then(|h| h.peel_to_tree().ok());
            repo.diff_tree_to_index(head_tree.as_ref(), None, Some(&mut opts))
        }
        DiffTarget::Unstaged => repo.diff_index_to_workdir(None, Some(&mut opts)),
    }
    .map_err(|e| HunkwiseError::Git(format!("failed to compute diff: {e}")))?;

    let mut find = DiffFindOptions::new();
    find.renames(true);
    diff.find_similar(Some(&mut find))
        .map_err(|e| HunkwiseError::Git(format!("rename detection failed: {e}")))?;

    render_patch(&diff)
}

fn merge_base_trees<'r>(repo: &'r Repository, base: &str, head: &str) -> Result<(Tree<'r>, Tree<'r>)> {
    let resolve = |spec: &str| {
        repo.revparse_single(spec)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|e| HunkwiseError::Git(format!("cannot resolve '{spec}': {e}")))
    };
    let base_commit = resolve(base)?;
    let head_commit = resolve(head)?;

    let merge_base = repo
        .merge_base(base_commit.id(), head_commit.id())
        .and_then(|oid| repo.find_commit(oid))
        .map_err(|e| HunkwiseError::Git(format!("no merge base for {base}...{head}: {e}")))?;

    let base_tree = merge_base
        .tree()
        .map_err(|e| HunkwiseError::Git(format!("failed to read tree: {e}")))?;
    let head_tree = head_commit
        .tree()
        .map_err(|e| HunkwiseError::Git(format!("failed to read tree: {e}")))?;
    Ok((base_tree, head_tree))
}

fn render_patch(diff: &Diff<'_>) -> Result<String> {
    let mut out = String::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        if matches!(line.origin(), '+' | '-' | ' ') {
            out.push(line.origin());
        }
        out.push_str(&String::from_utf8_lossy(line.content()));
        true
    })
    .map_err(|e| HunkwiseError::Git(format!("failed to render diff: {e}")))?;
    Ok(out)
}

/// Pick a sensible base branch: `main`, then `master` (local, then
/// `origin/`), then the current branch, else `HEAD`.
pub fn resolve_default_base_ref(repo: &Repository) -> String {
    for name in ["main", "master"] {
        if repo.find_branch(name, BranchType::Local).is_ok() {
            return name.to_string();
        }
        let remote = format!("origin/{name}");
        if repo.find_branch(&remote, BranchType::Remote).is_ok() {
            return remote;
        }
    }

    if let Ok(head) = repo.head() {
        if head.is_branch() {
            if let Some(name) = head.shorthand() {
                return name.to_string();
            }
        }
    }
    "HEAD".to_string()
}

/// Produce, parse and heuristically analyze the diff described by `request`.
///
/// A failed range diff is retried once with the default base against `HEAD`;
/// the returned change set then carries the refs actually used.
///
/// # Errors
///
/// Returns [`HunkwiseError::Git`] if the repository cannot be opened or both
/// attempts fail.
pub fn ingest(request: &DiffRequest) -> Result<ChangeSet> {
    let repo = open_repo(&request.repo)?;

    let (target, text) = match diff_text(&repo, &request.target, request.context_lines) {
        Ok(text) => (request.target.clone(), text),
        Err(err) if matches!(request.target, DiffTarget::Range { .. }) => {
            let fallback = DiffTarget::Range {
                base: resolve_default_base_ref(&repo),
                head: "HEAD".into(),
            };
            warn!(error = %err, fallback = ?fallback, "range diff failed, retrying with default base");
            let text = diff_text(&repo, &fallback, request.context_lines)?;
            (fallback, text)
        }
        Err(err) => return Err(err),
    };

    let (base_ref, head_ref) = target.refs();
    let mut change_set = ChangeSet::new(base_ref, head_ref, parse_diff(&text));
    analyze(&mut change_set);
    debug!(
        files = change_set.files.len(),
        bytes = text.len(),
        "ingested diff"
    );
    Ok(change_set)
}
