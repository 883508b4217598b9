//! Readiness evaluation: reviews, CI aggregation and mergeability.
//!
//! Each gate is a pure function over fetched data, so the pipeline in the
//! runner stays a sequence of decisions rather than side effects. CI state
//! is aggregated from two sources: the combined commit status and the
//! check suites; both must be green before a merge is attempted.

use std::collections::BTreeMap;

use crate::api::traits::PlatformOperations;
use crate::config::{Markers, RepoPolicy};
use crate::core::operations::labels::LabelSet;
use crate::models::{CheckSuiteList, MergeableState, RepoId, Review};

/// Review state: approving.
pub const APPROVED: &str = "APPROVED";
/// Review state: a plain comment, carries no vote.
pub const COMMENTED: &str = "COMMENTED";
/// Review state: the vote was dismissed and no longer counts.
pub const DISMISSED: &str = "DISMISSED";

const STATUS_SUCCESS: &str = "success";
const STATUS_PENDING: &str = "pending";
const SUITE_COMPLETED: &str = "completed";

/// Check-suite conclusions treated as success.
const SUCCESS_CONCLUSIONS: [&str; 3] = ["success", "neutral", "skipped"];

/// Aggregated CI state for a head commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckState {
    /// Everything green.
    Success,
    /// Something is still running; check again later.
    Pending,
    /// At least one check ended badly; the message concatenates the
    /// non-success descriptions.
    Failure(String),
}

/// The number of approvals this PR needs.
///
/// The light-review threshold applies when it is configured (non-zero)
/// and the PR carries the light-review label.
pub fn required_reviews(labels: &LabelSet, markers: &Markers, policy: &RepoPolicy) -> u32 {
    if policy.min_light_review != 0 && labels.has(&markers.light_review) {
        policy.min_light_review
    } else {
        policy.min_review
    }
}

/// Reduces a review history to each reviewer's effective vote.
///
/// Later reviews supersede earlier ones. A `COMMENTED` review carries no
/// vote and is skipped; a `DISMISSED` review erases the reviewer's vote
/// entirely.
pub fn latest_review_states(reviews: &[Review]) -> BTreeMap<String, String> {
    let mut states = BTreeMap::new();
    for review in reviews {
        match review.state.as_str() {
            DISMISSED => {
                states.remove(&review.user.login);
            }
            COMMENTED => {}
            _ => {
                states.insert(review.user.login.clone(), review.state.clone());
            }
        }
    }
    states
}

/// Checks that a PR carries the required number of approving reviews.
///
/// On failure the message names the shortfall (`need more review [1/2]`)
/// or the offending vote (`CHANGES_REQUESTED by jdoe`).
pub fn check_reviews(reviews: &[Review], required: u32) -> Result<(), String> {
    if required == 0 {
        return Ok(());
    }

    let states = latest_review_states(reviews);

    if (states.len() as u32) < required {
        return Err(format!("need more review [{}/{}]", states.len(), required));
    }

    for (login, state) in &states {
        if state != APPROVED {
            return Err(format!("{state} by {login}"));
        }
    }

    Ok(())
}

/// Aggregates the check suites of a head commit.
///
/// Suites produced by ignored apps (dependency-update bots) do not count.
/// Any incomplete suite yields [`CheckState::Pending`]; a completed suite
/// concluding in neither success, neutral nor skipped fails the gate.
pub fn suites_state(list: &CheckSuiteList, ignored_apps: &[String]) -> CheckState {
    if list.total_count == 0 {
        return CheckState::Success;
    }

    let mut failures = Vec::new();
    for suite in &list.check_suites {
        let app_name = suite.app.as_ref().map(|app| app.name.as_str()).unwrap_or("");
        if ignored_apps
            .iter()
            .any(|ignored| ignored.eq_ignore_ascii_case(app_name))
        {
            continue;
        }

        let status = suite.status.as_deref().unwrap_or("");
        if status != SUITE_COMPLETED {
            return CheckState::Pending;
        }

        let conclusion = suite.conclusion.as_deref().unwrap_or("");
        if !SUCCESS_CONCLUSIONS.contains(&conclusion) {
            failures.push(format!("{app_name} {status} {conclusion}"));
        }
    }

    if failures.is_empty() {
        CheckState::Success
    } else {
        CheckState::Failure(failures.join(", "))
    }
}

/// Aggregates the combined commit status of a head commit.
///
/// A `pending` combined state with zero statuses means nothing reported
/// at all, which counts as success. On failure, the individual statuses
/// are fetched and the non-success descriptions become the message.
pub async fn status_state(
    repo_ops: &dyn PlatformOperations,
    repo: &RepoId,
    sha: &str,
) -> anyhow::Result<CheckState> {
    let combined = repo_ops.combined_status(repo, sha).await?;

    if combined.state == STATUS_SUCCESS {
        return Ok(CheckState::Success);
    }

    if combined.state == STATUS_PENDING {
        if combined.total_count == 0 {
            return Ok(CheckState::Success);
        }
        return Ok(CheckState::Pending);
    }

    let statuses = repo_ops.list_statuses(repo, sha).await?;
    let summary: Vec<String> = statuses
        .iter()
        .filter(|status| status.state != STATUS_SUCCESS)
        .map(|status| {
            status
                .description
                .clone()
                .or_else(|| status.context.clone())
                .unwrap_or_else(|| status.state.clone())
        })
        .collect();

    Ok(CheckState::Failure(summary.join("\n")))
}

/// The full CI gate: combined status first, then check suites.
pub async fn aggregated_state(
    repo_ops: &dyn PlatformOperations,
    repo: &RepoId,
    sha: &str,
    ignored_apps: &[String],
) -> anyhow::Result<CheckState> {
    match status_state(repo_ops, repo, sha).await? {
        CheckState::Success => {}
        other => return Ok(other),
    }

    let suites = repo_ops.list_check_suites(repo, sha).await?;
    Ok(suites_state(&suites, ignored_apps))
}

/// Whether a mergeable state requires a human rather than a retry.
pub fn needs_human_attention(state: MergeableState) -> bool {
    matches!(
        state,
        MergeableState::Draft | MergeableState::Blocked | MergeableState::Unknown
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::traits::mocks::{MockPlatform, green_status, review, suite};
    use crate::models::{CheckSuite, CombinedStatus, CommitStatus};

    #[test]
    fn test_required_reviews_light_label() {
        let markers = Markers::default();
        let policy = RepoPolicy {
            min_review: 3,
            min_light_review: 1,
            ..policy_defaults()
        };

        let plain = LabelSet::from_names(["status/3-needs-merge"]);
        assert_eq!(required_reviews(&plain, &markers, &policy), 3);

        let light = LabelSet::from_names(["status/3-needs-merge", "bot/light-review"]);
        assert_eq!(required_reviews(&light, &markers, &policy), 1);
    }

    #[test]
    fn test_required_reviews_light_disabled() {
        let markers = Markers::default();
        let policy = RepoPolicy {
            min_review: 2,
            min_light_review: 0,
            ..policy_defaults()
        };

        let light = LabelSet::from_names(["bot/light-review"]);
        assert_eq!(required_reviews(&light, &markers, &policy), 2);
    }

    fn policy_defaults() -> RepoPolicy {
        RepoPolicy {
            merge_method: "squash".to_string(),
            min_light_review: 0,
            min_review: 1,
            need_milestone: true,
            check_need_up_to_date: false,
            force_need_up_to_date: true,
            add_error_in_comment: false,
            commit_message: "empty".to_string(),
        }
    }

    #[test]
    fn test_latest_review_state_supersedes() {
        let reviews = vec![
            review("alice", "CHANGES_REQUESTED"),
            review("alice", APPROVED),
            review("bob", APPROVED),
            review("bob", COMMENTED),
        ];
        let states = latest_review_states(&reviews);
        assert_eq!(states["alice"], APPROVED);
        assert_eq!(states["bob"], APPROVED);
    }

    #[test]
    fn test_dismissed_review_discards_the_reviewer() {
        let reviews = vec![review("alice", APPROVED), review("alice", DISMISSED)];
        let states = latest_review_states(&reviews);
        assert!(states.is_empty());
    }

    #[test]
    fn test_check_reviews_shortfall() {
        let reviews = vec![review("alice", APPROVED)];
        let err = check_reviews(&reviews, 2).unwrap_err();
        assert_eq!(err, "need more review [1/2]");
    }

    #[test]
    fn test_check_reviews_non_approving_vote() {
        let reviews = vec![
            review("alice", APPROVED),
            review("bob", "CHANGES_REQUESTED"),
        ];
        let err = check_reviews(&reviews, 1).unwrap_err();
        assert_eq!(err, "CHANGES_REQUESTED by bob");
    }

    #[test]
    fn test_check_reviews_zero_required_always_passes() {
        assert!(check_reviews(&[], 0).is_ok());
    }

    #[test]
    fn test_suites_state_ignores_configured_apps() {
        let list = CheckSuiteList {
            total_count: 2,
            check_suites: vec![
                suite("Dependabot", "in_progress", None),
                suite("CI", SUITE_COMPLETED, Some("success")),
            ],
        };
        let state = suites_state(&list, &["dependabot".to_string()]);
        assert_eq!(state, CheckState::Success);
    }

    #[test]
    fn test_suites_state_pending_when_incomplete() {
        let list = CheckSuiteList {
            total_count: 1,
            check_suites: vec![suite("CI", "queued", None)],
        };
        assert_eq!(suites_state(&list, &[]), CheckState::Pending);
    }

    #[test]
    fn test_suites_state_neutral_counts_as_success() {
        let list = CheckSuiteList {
            total_count: 2,
            check_suites: vec![
                suite("CI", SUITE_COMPLETED, Some("neutral")),
                suite("Lint", SUITE_COMPLETED, Some("skipped")),
            ],
        };
        assert_eq!(suites_state(&list, &[]), CheckState::Success);
    }

    #[test]
    fn test_suites_state_reports_failing_suites() {
        let list = CheckSuiteList {
            total_count: 2,
            check_suites: vec![
                suite("CI", SUITE_COMPLETED, Some("failure")),
                suite("Lint", SUITE_COMPLETED, Some("success")),
            ],
        };
        match suites_state(&list, &[]) {
            CheckState::Failure(message) => {
                assert_eq!(message, "CI completed failure");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_suites_state_empty_list_is_success() {
        let list = CheckSuiteList::default();
        assert_eq!(suites_state(&list, &[]), CheckState::Success);

        // Every suite ignored counts as success too.
        let list = CheckSuiteList {
            total_count: 1,
            check_suites: vec![suite("Dependabot", "queued", None)],
        };
        assert_eq!(
            suites_state(&list, &["dependabot".to_string()]),
            CheckState::Success
        );
    }

    #[tokio::test]
    async fn test_status_state_no_statuses_is_success() {
        let platform = MockPlatform::new();
        platform.state.lock().unwrap().combined = CombinedStatus {
            state: "pending".to_string(),
            total_count: 0,
            statuses: vec![],
        };

        let repo = RepoId::new("acme", "webapp");
        let state = status_state(&platform, &repo, "sha").await.unwrap();
        assert_eq!(state, CheckState::Success);
    }

    #[tokio::test]
    async fn test_status_state_failure_collects_descriptions() {
        let platform = MockPlatform::new();
        {
            let mut state = platform.state.lock().unwrap();
            state.combined = CombinedStatus {
                state: "failure".to_string(),
                total_count: 2,
                statuses: vec![],
            };
            state.statuses = vec![
                CommitStatus {
                    state: "failure".to_string(),
                    description: Some("unit tests failed".to_string()),
                    context: Some("ci/test".to_string()),
                },
                CommitStatus {
                    state: "success".to_string(),
                    description: Some("build passed".to_string()),
                    context: Some("ci/build".to_string()),
                },
            ];
        }

        let repo = RepoId::new("acme", "webapp");
        let state = status_state(&platform, &repo, "sha").await.unwrap();
        assert_eq!(state, CheckState::Failure("unit tests failed".to_string()));
    }

    #[tokio::test]
    async fn test_aggregated_state_checks_suites_after_statuses() {
        let platform = MockPlatform::new();
        {
            let mut state = platform.state.lock().unwrap();
            state.combined = green_status();
            state.suites = CheckSuiteList {
                total_count: 1,
                check_suites: vec![CheckSuite {
                    status: Some("in_progress".to_string()),
                    conclusion: None,
                    app: None,
                }],
            };
        }

        let repo = RepoId::new("acme", "webapp");
        let state = aggregated_state(&platform, &repo, "sha", &[]).await.unwrap();
        assert_eq!(state, CheckState::Pending);
    }

    #[test]
    fn test_needs_human_attention() {
        assert!(needs_human_attention(MergeableState::Draft));
        assert!(needs_human_attention(MergeableState::Blocked));
        assert!(needs_human_attention(MergeableState::Unknown));
        assert!(!needs_human_attention(MergeableState::Clean));
        assert!(!needs_human_attention(MergeableState::Behind));
    }
}
