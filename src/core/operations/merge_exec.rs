//! Merge execution: method resolution, commit messages and the merge
//! itself.
//!
//! The merge method is a closed enum resolved from override labels at the
//! boundary. Three methods go through the platform-native merge call; the
//! fast-forward method advances the base branch locally and pushes it,
//! since the platform has no native fast-forward merge.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::api::traits::PlatformOperations;
use crate::config::RepoPolicy;
use crate::core::operations::labels::LabelSet;
use crate::error::MergeError;
use crate::git::{CloneManager, GitCommand, REMOTE_ORIGIN, Workspace};
use crate::models::{MergeRequest, MergeResponse, PullRequest, RepoId};

static CO_AUTHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^Co-authored-by:\s+(.+)\s+<(.+)>$").expect("co-author pattern")
});

/// The closed set of merge methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMethod {
    /// Squash every commit into one.
    Squash,
    /// Create a merge commit.
    Merge,
    /// Rebase the commits onto the base.
    Rebase,
    /// Advance the base branch pointer; no merge commit. Performed
    /// locally, requires the head to be a superset of the base.
    FastForward,
}

impl MergeMethod {
    /// Parses a policy/label value (`squash`, `merge`, `rebase`, `ff`).
    pub fn from_policy(value: &str) -> Option<Self> {
        match value {
            "squash" => Some(Self::Squash),
            "merge" => Some(Self::Merge),
            "rebase" => Some(Self::Rebase),
            "ff" => Some(Self::FastForward),
            _ => None,
        }
    }

    /// The label suffix and policy spelling of this method.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Squash => "squash",
            Self::Merge => "merge",
            Self::Rebase => "rebase",
            Self::FastForward => "ff",
        }
    }
}

impl std::fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolves the merge method from override labels, falling back to the
/// repository default.
///
/// Zero override labels picks the default; exactly one picks that method
/// (an unknown suffix falls back to the default); more than one is a
/// hard error, never an arbitrary pick.
pub fn resolve_merge_method(
    labels: &LabelSet,
    method_prefix: &str,
    default_method: &str,
) -> Result<MergeMethod, MergeError> {
    let default = MergeMethod::from_policy(default_method).ok_or(MergeError::UnknownMethod {
        method: default_method.to_string(),
    })?;

    if method_prefix.is_empty() {
        return Ok(default);
    }

    let overrides = labels.all_with_prefix(method_prefix);
    match overrides.as_slice() {
        [] => Ok(default),
        [single] => {
            let suffix = single.strip_prefix(method_prefix).unwrap_or(single);
            Ok(MergeMethod::from_policy(suffix).unwrap_or(default))
        }
        many => Err(MergeError::AmbiguousMergeMethod {
            labels: many.iter().map(|label| label.to_string()).collect(),
        }),
    }
}

/// How the body of a squash commit is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMessageStrategy {
    /// Force an empty body.
    Empty,
    /// Let the platform build its default body.
    PlatformDefault,
    /// Use the PR description verbatim.
    Description,
    /// Use the `Co-authored-by:` trailers extracted from the description.
    CoAuthors,
}

impl CommitMessageStrategy {
    /// Parses the `commit_message` policy value.
    pub fn from_policy(value: &str) -> Option<Self> {
        match value {
            "empty" => Some(Self::Empty),
            "github" => Some(Self::PlatformDefault),
            "description" => Some(Self::Description),
            "co-authors" => Some(Self::CoAuthors),
            _ => None,
        }
    }
}

/// Extracts `Co-authored-by:` trailers from a PR description.
///
/// The match is case-insensitive but strict about placement: a trailer
/// must occupy its own line with no leading or trailing whitespace, which
/// preserves the formatting git expects of trailers.
pub fn extract_co_authors(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| CO_AUTHOR.captures(line))
        .map(|captures| format!("Co-authored-by: {} <{}>", &captures[1], &captures[2]))
        .collect()
}

/// Builds the squash commit body for a strategy.
///
/// `None` omits the field so the platform applies its default; a literal
/// `"\n"` forces an empty body.
pub fn squash_commit_message(strategy: CommitMessageStrategy, body: &str) -> Option<String> {
    match strategy {
        CommitMessageStrategy::Empty => Some("\n".to_string()),
        CommitMessageStrategy::PlatformDefault => None,
        CommitMessageStrategy::Description => Some(body.to_string()),
        CommitMessageStrategy::CoAuthors => {
            let co_authors = extract_co_authors(body);
            if co_authors.is_empty() {
                Some("\n".to_string())
            } else {
                Some(co_authors.join("\n"))
            }
        }
    }
}

/// Executes merges through the platform or locally.
pub struct MergeExecutor<'a> {
    platform: &'a dyn PlatformOperations,
    git: &'a dyn GitCommand,
    clones: &'a CloneManager,
    dry_run: bool,
}

impl<'a> MergeExecutor<'a> {
    /// Creates an executor over the injected platform and VCS seams.
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

    /// Merges a pull request with the given method.
    ///
    /// A refusal by the platform or a failed local fast-forward comes back
    /// as a `merged: false` response carrying the failure message, so the
    /// caller escalates instead of treating it as a transport error.
    pub async fn merge(
        &self,
        repo: &RepoId,
        pr: &PullRequest,
        method: MergeMethod,
        policy: &RepoPolicy,
    ) -> Result<MergeResponse> {
        if self.dry_run {
            return Ok(MergeResponse {
                merged: true,
                message: "Fake merge: dry run".to_string(),
            });
        }

        match method {
            MergeMethod::FastForward => Ok(self.fast_forward(pr)),
            _ => self.native_merge(repo, pr, method, policy).await,
        }
    }

    async fn native_merge(
        &self,
        repo: &RepoId,
        pr: &PullRequest,
        method: MergeMethod,
        policy: &RepoPolicy,
    ) -> Result<MergeResponse> {
        let commit_message = if method == MergeMethod::Squash {
            let strategy = CommitMessageStrategy::from_policy(&policy.commit_message)
                .unwrap_or(CommitMessageStrategy::Empty);
            squash_commit_message(strategy, pr.body.as_deref().unwrap_or(""))
        } else {
            None
        };

        let request = MergeRequest {
            commit_title: pr.title.clone(),
            commit_message,
            merge_method: method.as_str().to_string(),
        };

        match self.platform.merge_pull_request(repo, pr.number, &request).await {
            Ok(response) => Ok(response),
            Err(err) => Ok(MergeResponse {
                merged: false,
                message: err.to_string(),
            }),
        }
    }

    fn fast_forward(&self, pr: &PullRequest) -> MergeResponse {
        match self.try_fast_forward(pr) {
            Ok(()) => MergeResponse {
                merged: true,
                message: "Merged".to_string(),
            },
            Err(err) => MergeResponse {
                merged: false,
                message: err.to_string(),
            },
        }
    }

    fn try_fast_forward(&self, pr: &PullRequest) -> Result<()> {
        let dir = tempfile::Builder::new()
            .prefix("mergeq-")
            .tempdir()
            .context("failed to create a working directory")?;
        let workspace = Workspace::new(self.git, dir.path());

        let remote = self.clones.clone_for_merge(&workspace, pr)?;
        let head_ref = format!("{remote}/{}", pr.head.ref_name);

        workspace.merge(&head_ref, true)?;
        workspace.push(REMOTE_ORIGIN, &pr.base.ref_name, false, self.dry_run)?;
        Ok(())
    }
}
