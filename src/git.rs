//! Git subprocess execution.
//!
//! All version-control work is delegated to the `git` binary. The
//! [`GitCommand`] trait is the seam the decision engine depends on, so the
//! update and merge paths are testable without spawning processes;
//! [`SystemGit`] is the real implementation.

use std::path::Path;
use std::process::Command;

use secrecy::{ExposeSecret, SecretString};

use crate::config::Git as GitSettings;
use crate::error::GitError;
use crate::models::{PullRequest, RepoSummary};

/// Remote name for the repository that gets pushed.
pub const REMOTE_ORIGIN: &str = "origin";

/// Remote name for the other side of a cross-repository pull request.
pub const REMOTE_UPSTREAM: &str = "upstream";

/// Executes a git command in a working directory and returns its stdout.
pub trait GitCommand: Send + Sync {
    /// Runs `git <args>` in `dir`.
    fn run(&self, dir: &Path, args: &[&str]) -> Result<String, GitError>;
}

/// Runs the real `git` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemGit;

impl GitCommand for SystemGit {
    fn run(&self, dir: &Path, args: &[&str]) -> Result<String, GitError> {
        let output = Command::new("git")
            .current_dir(dir)
            .args(args)
            .output()
            .map_err(|err| GitError::SpawnFailed {
                message: err.to_string(),
            })?;

        if !output.status.success() {
            let mut message = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if message.is_empty() {
                message = String::from_utf8_lossy(&output.stdout).trim().to_string();
            }
            return Err(GitError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                message,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// A checkout directory plus the executor operating on it.
pub struct Workspace<'a> {
    git: &'a dyn GitCommand,
    dir: &'a Path,
}

impl<'a> Workspace<'a> {
    /// Creates a workspace rooted at `dir`.
    pub fn new(git: &'a dyn GitCommand, dir: &'a Path) -> Self {
        Self { git, dir }
    }

    /// Clones a repository into the workspace directory, optionally
    /// restricted to one branch.
    pub fn clone_repository(&self, url: &str, branch: Option<&str>) -> Result<(), GitError> {
        let mut args = vec!["clone"];
        if let Some(branch) = branch {
            args.extend(["--branch", branch]);
        }
        args.extend([url, "."]);

        self.git
            .run(self.dir, &args)
            .map_err(|err| GitError::CloneFailed {
                message: err.to_string(),
            })?;
        Ok(())
    }

    /// Checks out a branch.
    pub fn checkout(&self, branch: &str) -> Result<(), GitError> {
        self.git.run(self.dir, &["checkout", branch])?;
        Ok(())
    }

    /// Sets a repository-local configuration entry.
    pub fn set_config(&self, key: &str, value: &str) -> Result<(), GitError> {
        self.git.run(self.dir, &["config", key, value])?;
        Ok(())
    }

    /// Adds a named remote.
    pub fn add_remote(&self, name: &str, url: &str) -> Result<(), GitError> {
        self.git.run(self.dir, &["remote", "add", name, url])?;
        Ok(())
    }

    /// Fetches one ref from a remote, without tags.
    pub fn fetch_no_tags(&self, remote: &str, refspec: &str) -> Result<(), GitError> {
        self.git
            .run(self.dir, &["fetch", "--no-tags", remote, refspec])
            .map_err(|err| GitError::FetchFailed {
                refspec: format!("{remote}/{refspec}"),
                message: err.to_string(),
            })?;
        Ok(())
    }

    /// Merges a reference into the current branch.
    pub fn merge(&self, reference: &str, ff_only: bool) -> Result<String, GitError> {
        if ff_only {
            self.git.run(self.dir, &["merge", "--ff-only", reference])
        } else {
            self.git.run(self.dir, &["merge", reference])
        }
    }

    /// Rebases the current branch onto a reference, recreating merge
    /// commits instead of flattening them.
    pub fn rebase_onto(&self, reference: &str) -> Result<String, GitError> {
        self.git
            .run(self.dir, &["rebase", "--rebase-merges", reference])
    }

    /// Pushes a refspec to a remote.
    pub fn push(
        &self,
        remote: &str,
        refspec: &str,
        force_with_lease: bool,
        dry_run: bool,
    ) -> Result<(), GitError> {
        let mut args = vec!["push"];
        if dry_run {
            args.push("--dry-run");
        }
        if force_with_lease {
            args.push("--force-with-lease");
        }
        args.extend([remote, refspec]);

        self.git
            .run(self.dir, &args)
            .map_err(|err| GitError::PushFailed {
                branch: refspec.to_string(),
                message: err.to_string(),
            })?;
        Ok(())
    }

    /// Lists the merge commits between the parent of `first_sha` and HEAD.
    /// An empty result means the range is linear.
    pub fn merge_commits_since(&self, first_sha: &str) -> Result<String, GitError> {
        self.git.run(
            self.dir,
            &[
                "log",
                "--oneline",
                "--merges",
                &format!("{first_sha}^..HEAD"),
            ],
        )
    }
}

/// Builds a clone URL for a repository, embedding the token for HTTPS
/// access when one is provided.
pub fn remote_url(repo: &RepoSummary, ssh: bool, token: Option<&str>) -> String {
    if ssh {
        return repo.ssh_url.clone();
    }

    match token {
        Some(token) if !token.is_empty() => repo
            .clone_url
            .replacen("https://", &format!("https://{token}@"), 1),
        _ => repo.clone_url.clone(),
    }
}

/// Lays out working clones for pull-request updates and fast-forward
/// merges: which repository becomes `origin`, which remote carries the
/// other side, and where the token is required.
pub struct CloneManager {
    settings: GitSettings,
    token: SecretString,
}

impl CloneManager {
    /// Creates a clone manager from the git settings and the API token.
    pub fn new(settings: GitSettings, token: SecretString) -> Self {
        Self { settings, token }
    }

    /// Clones a PR so its head branch can be rewritten and pushed.
    ///
    /// Returns the remote name holding the base branch.
    pub fn clone_for_update(
        &self,
        workspace: &Workspace<'_>,
        pr: &PullRequest,
    ) -> Result<&'static str, GitError> {
        let token = self.token.expose_secret();

        // The head is pushed, so its remote always carries credentials. The
        // base is only read; it needs credentials only on private repos.
        let head_url = remote_url(&pr.head.repo, self.settings.ssh, Some(token));
        let base_token = pr.base.repo.private.then_some(token);
        let base_url = remote_url(&pr.base.repo, self.settings.ssh, base_token);

        if pr.is_on_main_repository() {
            workspace.clone_repository(&head_url, None)?;
            self.configure(workspace)?;
            workspace.checkout(&pr.head.ref_name)?;
            return Ok(REMOTE_ORIGIN);
        }

        workspace.clone_repository(&head_url, Some(&pr.head.ref_name))?;
        self.configure(workspace)?;
        workspace.add_remote(REMOTE_UPSTREAM, &base_url)?;
        workspace.fetch_no_tags(REMOTE_UPSTREAM, &pr.base.ref_name)?;
        Ok(REMOTE_UPSTREAM)
    }

    /// Clones a PR so its base branch can be fast-forwarded and pushed.
    ///
    /// Returns the remote name holding the head branch.
    pub fn clone_for_merge(
        &self,
        workspace: &Workspace<'_>,
        pr: &PullRequest,
    ) -> Result<&'static str, GitError> {
        let token = self.token.expose_secret();

        let base_url = remote_url(&pr.base.repo, self.settings.ssh, Some(token));
        let head_token = pr.base.repo.private.then_some(token);
        let head_url = remote_url(&pr.head.repo, self.settings.ssh, head_token);

        if pr.is_on_main_repository() {
            workspace.clone_repository(&base_url, None)?;
            self.configure(workspace)?;
            workspace.checkout(&pr.base.ref_name)?;
            return Ok(REMOTE_ORIGIN);
        }

        workspace.clone_repository(&base_url, Some(&pr.base.ref_name))?;
        self.configure(workspace)?;
        workspace.add_remote(REMOTE_UPSTREAM, &head_url)?;
        workspace.fetch_no_tags(REMOTE_UPSTREAM, &pr.head.ref_name)?;
        Ok(REMOTE_UPSTREAM)
    }

    fn configure(&self, workspace: &Workspace<'_>) -> Result<(), GitError> {
        workspace.set_config("rebase.autoSquash", "true")?;
        workspace.set_config("push.default", "current")?;

        if !self.settings.email.is_empty() {
            workspace.set_config("user.email", &self.settings.email)?;
        }
        if !self.settings.user_name.is_empty() {
            workspace.set_config("user.name", &self.settings.user_name)?;
        }
        Ok(())
    }
}
