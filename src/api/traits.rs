//! Traits for GitHub API operations.
//!
//! These traits abstract the hosting-platform operations to enable:
//! - Mocking for unit tests
//! - Alternative implementations
//! - Easier testing of async code

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    CheckSuiteList, CombinedStatus, CommitStatus, Comparison, Issue, IssueEdit, IssueSummary,
    MergeRequest, MergeResponse, PullRequest, RepoId, RepoSummary, RequiredStatusChecks, Review,
};

/// Trait for issue-level operations.
///
/// Pull requests are issues on the platform, so labels, comments and state
/// edits all go through this interface.
#[async_trait]
pub trait IssueOperations: Send + Sync {
    /// Searches issues/PRs with a query string, following pagination until
    /// exhausted.
    async fn search_issues(&self, query: &str) -> Result<Vec<IssueSummary>>;

    /// Fetches a fresh issue, primarily for its current label set.
    async fn get_issue(&self, repo: &RepoId, number: u64) -> Result<Issue>;

    /// Adds labels to an issue in one batch call.
    async fn add_labels(&self, repo: &RepoId, number: u64, labels: &[String]) -> Result<()>;

    /// Removes a single label. Removing an absent label is a no-op.
    async fn remove_label(&self, repo: &RepoId, number: u64, label: &str) -> Result<()>;

    /// Replaces the whole label set of an issue.
    async fn replace_labels(&self, repo: &RepoId, number: u64, labels: &[String]) -> Result<()>;

    /// Creates a comment on an issue.
    async fn create_comment(&self, repo: &RepoId, number: u64, body: &str) -> Result<()>;

    /// Edits issue state and/or milestone.
    async fn edit_issue(&self, repo: &RepoId, number: u64, edit: &IssueEdit) -> Result<()>;
}

/// Trait for pull request operations.
#[async_trait]
pub trait PullRequestOperations: Send + Sync {
    /// Fetches a single pull request by number.
    async fn get_pull_request(&self, repo: &RepoId, number: u64) -> Result<PullRequest>;

    /// Lists all reviews of a pull request, following pagination.
    async fn list_reviews(&self, repo: &RepoId, number: u64) -> Result<Vec<Review>>;

    /// Returns the SHA of the first commit of a pull request.
    async fn first_commit_sha(&self, repo: &RepoId, number: u64) -> Result<String>;

    /// Performs the platform-native merge of a pull request.
    async fn merge_pull_request(
        &self,
        repo: &RepoId,
        number: u64,
        request: &MergeRequest,
    ) -> Result<MergeResponse>;
}

/// Trait for repository-level operations.
#[async_trait]
pub trait RepositoryOperations: Send + Sync {
    /// Fetches repository details (fork flag, default branch, clone URLs).
    async fn get_repository(&self, repo: &RepoId) -> Result<RepoSummary>;

    /// Gets the combined commit status for a ref.
    async fn combined_status(&self, repo: &RepoId, sha: &str) -> Result<CombinedStatus>;

    /// Lists the individual commit statuses for a ref.
    async fn list_statuses(&self, repo: &RepoId, sha: &str) -> Result<Vec<CommitStatus>>;

    /// Lists the check suites for a ref.
    async fn list_check_suites(&self, repo: &RepoId, sha: &str) -> Result<CheckSuiteList>;

    /// Gets the branch-protection required status checks of a branch.
    async fn required_status_checks(
        &self,
        repo: &RepoId,
        branch: &str,
    ) -> Result<RequiredStatusChecks>;

    /// Compares two refs; `head` may be in `owner:ref` form.
    async fn compare(&self, repo: &RepoId, base: &str, head: &str) -> Result<Comparison>;
}

/// Combined trait for everything the decision engine needs from the
/// hosting platform.
pub trait PlatformOperations:
    IssueOperations + PullRequestOperations + RepositoryOperations + Send + Sync
{
}

// Blanket implementation for the combined trait
impl<T> PlatformOperations for T where
    T: IssueOperations + PullRequestOperations + RepositoryOperations + Send + Sync
{
}
