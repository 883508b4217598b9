//! Closing issues referenced by a merged pull request.
//!
//! PR descriptions reference issues with closing keywords
//! (`Closes #13, #14`). After a merge, every referenced issue is closed,
//! inherits the PR's milestone, and gets a `Closed by #N.` comment unless
//! the PR targeted the default branch (where the platform closes them on
//! its own).

use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::api::traits::PlatformOperations;
use crate::models::{IssueEdit, PullRequest, RepoId};

static FIXES_ISSUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:close|closes|closed|fix|fixes|fixed|resolve|resolves|resolved)((?:[\s]+#[\d]+)(?:[\s,]+#[\d]+)*(?:[\n\r\s,]|$))",
    )
    .expect("issue reference pattern")
});

static ISSUE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s,]+#").expect("issue separator pattern"));

static NUMBER_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\n\r\s,]").expect("number noise pattern"));

/// Parses the issue numbers referenced by closing keywords in a text.
///
/// Numbers must be `#`-prefixed and separated by whitespace or commas; a
/// missing separator (`#13#14`) invalidates the whole reference list.
/// Colons after the keyword are tolerated.
pub fn parse_issue_references(text: &str) -> Vec<u64> {
    let cleaned = text.replace(':', "");

    let Some(captures) = FIXES_ISSUES.captures(&cleaned) else {
        return Vec::new();
    };

    ISSUE_SEPARATOR
        .split(&captures[1])
        .filter_map(|raw| {
            let number = NUMBER_NOISE.replace_all(raw, "");
            if number.is_empty() {
                None
            } else {
                number.parse().ok()
            }
        })
        .collect()
}

/// Closes the issues referenced by a merged pull request.
///
/// Each closed issue inherits the PR's milestone. Failures here are the
/// caller's to log; the merge itself is already committed.
pub async fn close_related_issues(
    issue_ops: &dyn PlatformOperations,
    repo: &RepoId,
    pr: &PullRequest,
    dry_run: bool,
) -> Result<()> {
    let body = pr.body.as_deref().unwrap_or("");

    for number in parse_issue_references(body) {
        tracing::info!(
            issue = number,
            milestone = pr.milestone.as_ref().map(|m| m.title.as_str()),
            "closing related issue"
        );

        if !dry_run {
            let edit = IssueEdit {
                state: Some("closed".to_string()),
                milestone: pr.milestone.as_ref().map(|m| m.number),
            };
            issue_ops
                .edit_issue(repo, number, &edit)
                .await
                .with_context(|| format!("unable to close issue #{number}"))?;
        }

        // The platform already cross-links merges into the default branch.
        if pr.base.ref_name == pr.base.repo.default_branch {
            continue;
        }

        let message = format!("Closed by #{}.", pr.number);
        if !dry_run {
            issue_ops
                .create_comment(repo, number, &message)
                .await
                .with_context(|| format!("unable to add comment on issue #{number}"))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::traits::mocks::MockPlatform;
    use crate::models::{BranchRef, MergeableState, Milestone, RepoSummary, User};
    use chrono::Utc;

    #[test]
    fn test_parse_only_letters() {
        assert!(parse_issue_references("\n\tFixes dlsqj\n").is_empty());
    }

    #[test]
    fn test_parse_comma_separated() {
        assert_eq!(
            parse_issue_references("Fixes #13 #14, #15,#16,"),
            vec![13, 14, 15, 16]
        );
    }

    #[test]
    fn test_parse_space_separated() {
        assert_eq!(
            parse_issue_references("\n\tFixes #13 #14 #15 #16\n"),
            vec![13, 14, 15, 16]
        );
    }

    #[test]
    fn test_parse_missing_separator_invalidates() {
        assert!(parse_issue_references("Fixes #13#14,#15,#16,").is_empty());
    }

    #[test]
    fn test_parse_tolerates_colon() {
        assert_eq!(parse_issue_references("Fixes: #13,#14"), vec![13, 14]);
    }

    #[test]
    fn test_parse_keyword_variants() {
        assert_eq!(parse_issue_references("closes #7"), vec![7]);
        assert_eq!(parse_issue_references("Resolved #8"), vec![8]);
        assert_eq!(parse_issue_references("FIX #9"), vec![9]);
    }

    fn merged_pr(base_ref: &str, default_branch: &str, body: &str) -> PullRequest {
        let base_repo = RepoSummary {
            name: "webapp".to_string(),
            full_name: "acme/webapp".to_string(),
            clone_url: "https://github.com/acme/webapp.git".to_string(),
            default_branch: default_branch.to_string(),
            ..RepoSummary::default()
        };

        PullRequest {
            number: 42,
            title: "Add widget".to_string(),
            body: Some(body.to_string()),
            merged: true,
            mergeable: None,
            mergeable_state: MergeableState::Unknown,
            maintainer_can_modify: false,
            milestone: Some(Milestone {
                number: 5,
                title: "v2.1".to_string(),
            }),
            labels: vec![],
            base: BranchRef {
                ref_name: base_ref.to_string(),
                sha: "base-sha".to_string(),
                user: User::default(),
                repo: base_repo.clone(),
            },
            head: BranchRef {
                ref_name: "feature".to_string(),
                sha: "head-sha".to_string(),
                user: User::default(),
                repo: base_repo,
            },
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_close_related_issues_attaches_milestone_and_comments() {
        let platform = MockPlatform::new();
        let repo = RepoId::new("acme", "webapp");
        let pr = merged_pr("v2", "master", "Fixes #13, #14");

        close_related_issues(&platform, &repo, &pr, false)
            .await
            .unwrap();

        let state = platform.state.lock().unwrap();
        assert_eq!(state.edits.len(), 2);
        assert_eq!(state.edits[0].number, 13);
        assert_eq!(state.edits[0].state.as_deref(), Some("closed"));
        assert_eq!(state.edits[0].milestone, Some(5));

        assert_eq!(state.comments.len(), 2);
        assert_eq!(state.comments[0], (13, "Closed by #42.".to_string()));
        assert_eq!(state.comments[1], (14, "Closed by #42.".to_string()));
    }

    #[tokio::test]
    async fn test_no_comment_when_targeting_the_default_branch() {
        let platform = MockPlatform::new();
        let repo = RepoId::new("acme", "webapp");
        let pr = merged_pr("master", "master", "Closes #7");

        close_related_issues(&platform, &repo, &pr, false)
            .await
            .unwrap();

        let state = platform.state.lock().unwrap();
        assert_eq!(state.edits.len(), 1);
        assert!(state.comments.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let platform = MockPlatform::new();
        let repo = RepoId::new("acme", "webapp");
        let pr = merged_pr("v2", "master", "Fixes #13");

        close_related_issues(&platform, &repo, &pr, true)
            .await
            .unwrap();

        let state = platform.state.lock().unwrap();
        assert!(state.edits.is_empty());
        assert!(state.comments.is_empty());
    }

    #[tokio::test]
    async fn test_body_without_references_is_a_no_op() {
        let platform = MockPlatform::new();
        let repo = RepoId::new("acme", "webapp");
        let pr = merged_pr("v2", "master", "No issues here.");

        close_related_issues(&platform, &repo, &pr, false)
            .await
            .unwrap();

        let state = platform.state.lock().unwrap();
        assert!(state.edits.is_empty());
        assert!(state.comments.is_empty());
    }
}
