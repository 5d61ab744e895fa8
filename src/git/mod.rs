//! Repository isolation manager.
//!
//! Drives an existing git checkout through branch and worktree
//! operations so that concurrently-executing tasks never share a working
//! directory. Worktree subcommands have no stable library surface, so
//! everything shells out to `git` via `tokio::process`.
//!
//! Invariants:
//! - `create_branch` / `create_worktree` are idempotent.
//! - one worktree per ticket branch, under `.worktrees/{branch}`.
//! - a failed merge is always aborted before it is reported, leaving the
//!   target branch at its pre-merge tree.
//! - operations against the same branch name are serialized through a
//!   per-branch lock registry.

use chrono::Utc;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::errors::{OrchestratorError, Result};
use crate::state::ConflictInfo;

/// Outcome of merging one branch into another.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeResult {
    Merged,
    Conflict(ConflictInfo),
}

pub struct RepoManager {
    repo_path: PathBuf,
    worktrees_dir: PathBuf,
    base_branch: String,
    branch_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RepoManager {
    pub fn new(repo_path: impl Into<PathBuf>, base_branch: impl Into<String>) -> Self {
        let repo_path = repo_path.into();
        let worktrees_dir = repo_path.join(".worktrees");
        Self {
            repo_path,
            worktrees_dir,
            base_branch: base_branch.into(),
            branch_locks: DashMap::new(),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn base_branch(&self) -> &str {
        &self.base_branch
    }

    /// Canonical worktree location for a branch.
    pub fn worktree_path(&self, branch: &str) -> PathBuf {
        self.worktrees_dir.join(branch)
    }

    fn lock_for(&self, branch: &str) -> Arc<Mutex<()>> {
        self.branch_locks
            .entry(branch.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .await
            .map_err(|e| OrchestratorError::git(args.join(" "), e.to_string()))?;
        if !output.status.success() {
            return Err(OrchestratorError::git(
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub async fn branch_exists(&self, name: &str) -> bool {
        self.git(&["show-ref", "--verify", "--quiet", &format!("refs/heads/{name}")])
            .await
            .is_ok()
    }

    /// Create `name` off `base`. A no-op success when the branch already
    /// exists.
    pub async fn create_branch(&self, name: &str, base: &str) -> Result<()> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        self.create_branch_locked(name, base).await
    }

    async fn create_branch_locked(&self, name: &str, base: &str) -> Result<()> {
        if self.branch_exists(name).await {
            debug!(branch = name, "branch already exists");
            return Ok(());
        }
        self.git(&["branch", name, base]).await?;
        info!(branch = name, base, "created branch");
        Ok(())
    }

    /// Create an isolated checkout for `branch`, creating the branch off
    /// the base branch first when it is missing. Idempotent by path
    /// existence.
    pub async fn create_worktree(&self, branch: &str) -> Result<PathBuf> {
        let lock = self.lock_for(branch);
        let _guard = lock.lock().await;

        let path = self.worktree_path(branch);
        if path.exists() {
            debug!(branch, path = %path.display(), "worktree already exists");
            return Ok(path);
        }

        self.ensure_worktrees_dir().await?;
        self.create_branch_locked(branch, &self.base_branch).await?;

        // Branch names with slashes nest under the worktrees dir.
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| OrchestratorError::io("create worktree parent dir", e))?;
        }

        self.git(&["worktree", "add", &path.to_string_lossy(), branch])
            .await?;
        info!(branch, path = %path.display(), "created worktree");
        Ok(path)
    }

    async fn ensure_worktrees_dir(&self) -> Result<()> {
        if self.worktrees_dir.exists() {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.worktrees_dir)
            .await
            .map_err(|e| OrchestratorError::io("create worktrees dir", e))?;

        // Keep worktree checkouts out of the repository's own index.
        let gitignore = self.repo_path.join(".gitignore");
        let current = tokio::fs::read_to_string(&gitignore).await.unwrap_or_default();
        if !current.contains(".worktrees/") {
            let updated = format!("{}\n.worktrees/\n", current.trim_end());
            if let Err(e) = tokio::fs::write(&gitignore, updated).await {
                warn!(err = %e, "could not update .gitignore for worktrees dir");
            }
        }
        Ok(())
    }

    /// Remove a branch's worktree. Best-effort: a failed `git worktree
    /// remove` falls back to deleting the directory and pruning.
    pub async fn remove_worktree(&self, branch: &str) {
        let lock = self.lock_for(branch);
        let _guard = lock.lock().await;

        let path = self.worktree_path(branch);
        if !path.exists() {
            return;
        }
        match self
            .git(&["worktree", "remove", "--force", &path.to_string_lossy()])
            .await
        {
            Ok(_) => debug!(branch, "removed worktree"),
            Err(err) => {
                warn!(branch, %err, "git worktree remove failed, cleaning up directory");
                let _ = tokio::fs::remove_dir_all(&path).await;
                let _ = self.git(&["worktree", "prune"]).await;
            }
        }
    }

    /// Merge `source` into `target`.
    ///
    /// Checks out the target, attempts the merge and, on any failure,
    /// aborts it (restoring the target to its pre-merge state) before
    /// reporting the conflicting files. The repository is never left
    /// mid-merge.
    pub async fn merge(&self, source: &str, target: &str) -> Result<MergeResult> {
        // Both branch names are locked, in name order so two merges with
        // swapped arguments cannot deadlock each other.
        let (first, second) = if source <= target {
            (source, target)
        } else {
            (target, source)
        };
        let first_lock = self.lock_for(first);
        let second_lock = self.lock_for(second);
        let _first = first_lock.lock().await;
        let _second = if first == second {
            None
        } else {
            Some(second_lock.lock().await)
        };

        self.git(&["checkout", target]).await?;
        match self.git(&["merge", "--no-edit", source]).await {
            Ok(_) => {
                info!(source, target, "merged");
                Ok(MergeResult::Merged)
            }
            Err(err) => {
                let files: Vec<String> = self
                    .git(&["diff", "--name-only", "--diff-filter=U"])
                    .await
                    .map(|out| out.lines().map(str::to_string).collect())
                    .unwrap_or_default();
                if let Err(abort_err) = self.git(&["merge", "--abort"]).await {
                    // No merge in progress when the failure happened
                    // before the merge started (e.g. unknown branch).
                    debug!(%abort_err, "merge abort skipped");
                }
                warn!(source, target, %err, ?files, "merge conflict recorded");
                Ok(MergeResult::Conflict(ConflictInfo {
                    branch: source.to_string(),
                    files,
                    timestamp: Utc::now(),
                }))
            }
        }
    }

    pub async fn list_branches(&self) -> Result<Vec<String>> {
        let out = self
            .git(&["for-each-ref", "--format=%(refname:short)", "refs/heads"])
            .await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Commit id a branch currently points at. Used by callers (and
    /// tests) to verify the no-partial-merge invariant.
    pub async fn rev_parse(&self, rev: &str) -> Result<String> {
        self.git(&["rev-parse", rev]).await
    }
}
