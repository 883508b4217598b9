//! Wire models for the GitHub REST payloads the engine reads.
//!
//! Only the fields the decision engine actually consumes are modeled;
//! everything else in the API responses is ignored by serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ApiError;

/// A repository identity, `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    /// Repository owner (user or organization login).
    pub owner: String,
    /// Repository name.
    pub name: String,
}

impl RepoId {
    /// Creates a repo identity from owner and name.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parses an `owner/name` string.
    pub fn parse(full_name: &str) -> Result<Self, ApiError> {
        match full_name.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {
                Ok(Self::new(owner, name))
            }
            _ => Err(ApiError::ParseError {
                message: format!("invalid repository full name: {full_name}"),
            }),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A GitHub user reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    /// Login name.
    pub login: String,
}

/// A label attached to an issue or pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    /// Label name.
    pub name: String,
}

impl Label {
    /// Convenience constructor used by tests and mocks.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A milestone reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    /// Milestone number (used when attaching it to issues).
    pub number: u64,
    /// Milestone title.
    pub title: String,
}

/// The repository summary embedded in branch references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoSummary {
    /// Repository name.
    pub name: String,
    /// `owner/name`.
    pub full_name: String,
    /// Whether the repository is private.
    #[serde(default)]
    pub private: bool,
    /// Whether the repository is itself a fork.
    #[serde(default)]
    pub fork: bool,
    /// HTTPS clone URL.
    #[serde(default)]
    pub clone_url: String,
    /// SSH clone URL.
    #[serde(default)]
    pub ssh_url: String,
    /// Default branch name.
    #[serde(default)]
    pub default_branch: String,
    /// Repository owner.
    #[serde(default)]
    pub owner: User,
}

/// One side (base or head) of a pull request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchRef {
    /// Branch name.
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// Commit SHA the branch points at.
    pub sha: String,
    /// The user owning the branch.
    #[serde(default)]
    pub user: User,
    /// The repository holding the branch.
    #[serde(default)]
    pub repo: RepoSummary,
}

/// Platform-computed merge blocker state of a pull request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeableState {
    /// Head is behind the base branch.
    Behind,
    /// Merging is blocked by branch protection.
    Blocked,
    /// Mergeable and passing checks.
    Clean,
    /// Merge conflicts.
    Dirty,
    /// The PR is a draft.
    Draft,
    /// Mergeable with pre-receive hooks pending.
    HasHooks,
    /// Mergeable with failing or pending checks.
    Unstable,
    /// The platform has not computed the state yet.
    #[serde(other)]
    #[default]
    Unknown,
}

impl MergeableState {
    /// Lowercase wire representation, used in operator-facing messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Behind => "behind",
            Self::Blocked => "blocked",
            Self::Clean => "clean",
            Self::Dirty => "dirty",
            Self::Draft => "draft",
            Self::HasHooks => "has_hooks",
            Self::Unstable => "unstable",
            Self::Unknown => "unknown",
        }
    }
}

/// A pull request as fetched from `GET /repos/{owner}/{repo}/pulls/{number}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// PR number.
    pub number: u64,
    /// PR title.
    pub title: String,
    /// Free-text description.
    #[serde(default)]
    pub body: Option<String>,
    /// Whether the PR has already been merged.
    #[serde(default)]
    pub merged: bool,
    /// Whether the platform considers the PR mergeable. `None` while the
    /// mergeability computation is still running.
    #[serde(default)]
    pub mergeable: Option<bool>,
    /// Platform-computed merge blocker state.
    #[serde(default)]
    pub mergeable_state: MergeableState,
    /// Whether the contributor granted maintainers push access to the head.
    #[serde(default)]
    pub maintainer_can_modify: bool,
    /// Milestone attached to the PR, if any.
    #[serde(default)]
    pub milestone: Option<Milestone>,
    /// Current label set.
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Target side of the PR.
    pub base: BranchRef,
    /// Source side of the PR.
    pub head: BranchRef,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl PullRequest {
    /// Whether the head branch lives on the same repository as the base.
    pub fn is_on_main_repository(&self) -> bool {
        self.base.repo.clone_url == self.head.repo.clone_url
    }

    /// The label names currently attached to the PR.
    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.clone()).collect()
    }
}

/// A pull request review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    /// The reviewer.
    pub user: User,
    /// Review state (`APPROVED`, `CHANGES_REQUESTED`, `COMMENTED`, `DISMISSED`, ...).
    pub state: String,
}

/// A single commit status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitStatus {
    /// Status state (`success`, `pending`, `failure`, `error`).
    pub state: String,
    /// Human description of the status.
    #[serde(default)]
    pub description: Option<String>,
    /// Status context name.
    #[serde(default)]
    pub context: Option<String>,
}

/// Combined commit status for a ref.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CombinedStatus {
    /// Aggregated state across all contexts.
    pub state: String,
    /// Number of individual statuses.
    #[serde(default)]
    pub total_count: u64,
    /// The individual statuses.
    #[serde(default)]
    pub statuses: Vec<CommitStatus>,
}

/// The integration that owns a check suite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct App {
    /// App display name.
    pub name: String,
}

/// A grouped CI result from one integration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckSuite {
    /// Suite status (`queued`, `in_progress`, `completed`).
    #[serde(default)]
    pub status: Option<String>,
    /// Suite conclusion once completed (`success`, `neutral`, `failure`, ...).
    #[serde(default)]
    pub conclusion: Option<String>,
    /// The integration that produced the suite.
    #[serde(default)]
    pub app: Option<App>,
}

/// Response of `GET /repos/{owner}/{repo}/commits/{ref}/check-suites`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckSuiteList {
    /// Total number of suites for the ref.
    #[serde(default)]
    pub total_count: u64,
    /// The suites.
    #[serde(default)]
    pub check_suites: Vec<CheckSuite>,
}

/// Branch-protection required status checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequiredStatusChecks {
    /// Whether branches must be up to date before merging.
    #[serde(default)]
    pub strict: bool,
}

/// Result of comparing two refs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Comparison {
    /// Commits the head is ahead of the base by.
    #[serde(default)]
    pub ahead_by: i64,
    /// Commits the head is behind the base by; `0` means up to date.
    #[serde(default)]
    pub behind_by: i64,
}

/// A commit reference from `GET /repos/{owner}/{repo}/pulls/{number}/commits`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRef {
    /// Commit SHA.
    pub sha: String,
}

/// The search-result view of an issue or pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueSummary {
    /// Issue/PR number.
    pub number: u64,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Current label set.
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// API URL of the repository the issue belongs to.
    #[serde(default)]
    pub repository_url: String,
}

impl IssueSummary {
    /// Extracts `owner/name` from the repository API URL.
    pub fn repository_full_name(&self) -> String {
        let mut segments = self.repository_url.rsplit('/');
        let name = segments.next().unwrap_or_default();
        let owner = segments.next().unwrap_or_default();
        format!("{owner}/{name}")
    }

    /// Whether the issue carries the given label (case-insensitive).
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.name.eq_ignore_ascii_case(label))
    }

    /// Finds the first label starting with the given prefix.
    pub fn find_label_with_prefix(&self, prefix: &str) -> Option<&str> {
        self.labels
            .iter()
            .map(|l| l.name.as_str())
            .find(|name| name.starts_with(prefix))
    }
}

/// Response of `GET /search/issues`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    /// Total matches for the query.
    #[serde(default)]
    pub total_count: u64,
    /// The page of matches.
    #[serde(default)]
    pub items: Vec<IssueSummary>,
}

/// A fresh issue fetch, used to compute label-replacement sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Issue number.
    pub number: u64,
    /// Current label set.
    #[serde(default)]
    pub labels: Vec<Label>,
}

/// Request body of the native merge call.
#[derive(Debug, Clone, Serialize)]
pub struct MergeRequest {
    /// Title of the merge/squash commit.
    pub commit_title: String,
    /// Body of the merge/squash commit. Omitted to let the platform build
    /// its default message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    /// Merge method (`squash`, `merge`, `rebase`).
    pub merge_method: String,
}

/// Response of the native merge call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeResponse {
    /// Whether the merge was performed.
    #[serde(default)]
    pub merged: bool,
    /// Platform message describing the result.
    #[serde(default)]
    pub message: String,
}

/// Patch body for editing an issue after a merge.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IssueEdit {
    /// New issue state (`closed`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Milestone number to attach.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<u64>,
}
