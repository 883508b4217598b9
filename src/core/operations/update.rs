//! Update strategy: bringing a head branch up to date with its base.
//!
//! Whether an update is needed comes from branch protection (strict
//! status checks) or a policy override. How to update depends on the
//! shape of the PR's history: a commit range that already contains merge
//! commits is merged (rebasing would lose the merge structure), a linear
//! range is rebased.

use anyhow::{Context, Result, bail};

use crate::api::traits::PlatformOperations;
use crate::config::RepoPolicy;
use crate::git::{CloneManager, GitCommand, REMOTE_ORIGIN, Workspace};
use crate::models::{PullRequest, RepoId};

/// How a head branch gets synchronized with its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    /// Rebase the head onto the base; history is rewritten, so the push
    /// is forced (with lease).
    Rebase,
    /// Merge the base into the head; a plain push suffices.
    Merge,
}

/// Picks the update mechanism from the merge-commit log of the PR range.
///
/// A non-empty log means the PR already contains merge commits.
pub fn choose_update_action(merge_log: &str) -> UpdateAction {
    if merge_log.trim().is_empty() {
        UpdateAction::Rebase
    } else {
        UpdateAction::Merge
    }
}

/// Whether this repository requires PRs to be up to date before merging.
///
/// With `check_need_up_to_date` the requirement is read from the base
/// branch's protection (strict status checks); otherwise the
/// `force_need_up_to_date` override decides.
pub async fn needs_update(
    repo_ops: &dyn PlatformOperations,
    repo: &RepoId,
    base_ref: &str,
    policy: &RepoPolicy,
) -> Result<bool> {
    if policy.check_need_up_to_date {
        let checks = repo_ops
            .required_status_checks(repo, base_ref)
            .await
            .context("unable to get status checks")?;
        return Ok(checks.strict);
    }

    Ok(policy.force_need_up_to_date)
}

/// Performs the clone/update/push sequence for one pull request.
pub struct BranchUpdater<'a> {
    platform: &'a dyn PlatformOperations,
    git: &'a dyn GitCommand,
    clones: &'a CloneManager,
    dry_run: bool,
}

impl<'a> BranchUpdater<'a> {
    /// Creates an updater over the injected platform and VCS seams.
    pub fn new(
        platform: &'a dyn PlatformOperations,
        git: &'a dyn GitCommand,
        clones: &'a CloneManager,
        dry_run: bool,
    ) -> Self {
        Self {
            platform,
            git,
            clones,
            dry_run,
        }
    }

    /// Synchronizes the PR's head branch with its base and pushes it.
    pub async fn update(&self, repo: &RepoId, pr: &PullRequest) -> Result<()> {
        tracing::info!(
            pr = pr.number,
            base = %pr.base.ref_name,
            head = %pr.head.ref_name,
            "updating branch"
        );

        if pr.is_on_main_repository() && pr.head.ref_name == pr.base.repo.default_branch {
            bail!("the default branch of the main repository cannot be rebased");
        }

        let dir = tempfile::Builder::new()
            .prefix("mergeq-")
            .tempdir()
            .context("failed to create a working directory")?;
        let workspace = Workspace::new(self.git, dir.path());

        let remote = self
            .clones
            .clone_for_update(&workspace, pr)
            .context("failed to clone")?;

        let first_commit = self
            .platform
            .first_commit_sha(repo, pr.number)
            .await
            .context("unable to find the first commit")?;

        let merge_log = workspace.merge_commits_since(&first_commit)?;
        let action = choose_update_action(&merge_log);
        let base_ref = format!("{remote}/{}", pr.base.ref_name);

        match action {
            UpdateAction::Rebase => {
                tracing::info!(pr = pr.number, onto = %base_ref, "rebasing");
                workspace
                    .rebase_onto(&base_ref)
                    .map_err(|err| anyhow::anyhow!("failed to rebase:\n {err}"))?;
            }
            UpdateAction::Merge => {
                tracing::info!(pr = pr.number, from = %base_ref, "merging base into head");
                workspace
                    .merge(&base_ref, false)
                    .map_err(|err| anyhow::anyhow!("failed to merge base HEAD:\n {err}"))?;
            }
        }

        workspace.push(
            REMOTE_ORIGIN,
            &pr.head.ref_name,
            action == UpdateAction::Rebase,
            self.dry_run,
        )?;

        Ok(())
    }
}
