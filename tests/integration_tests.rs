//! Integration tests for the mergeq library
//!
//! These tests exercise the public API surface: configuration loading,
//! the selection and retry decisions, and the parsing helpers of the
//! merge executor.

use std::io::Write;

use chrono::{Duration, Utc};
use mergeq::api::search::QueryBuilder;
use mergeq::config::{Config, Markers, Retry};
use mergeq::core::operations::issues::parse_issue_references;
use mergeq::core::operations::labels::LabelSet;
use mergeq::core::operations::merge_exec::{
    MergeMethod, extract_co_authors, resolve_merge_method,
};
use mergeq::core::operations::retry::{RetryDecision, decide};
use mergeq::core::operations::selection::select_candidate;
use mergeq::models::{IssueSummary, Label};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_config_loading_and_repo_policies() {
    let file = write_config(
        r#"
[github]
user = "acme"
token = "t"

[git]
email = "bot@example.com"
user_name = "mergeq-bot"

[retry]
interval = 90
number = 2
on_mergeable = true

[default]
min_review = 2

[repositories."acme/gateway"]
merge_method = "ff"
"#,
    );

    let cfg = Config::load(file.path()).unwrap();
    assert_eq!(cfg.retry.interval, 90);
    assert_eq!(cfg.retry.number, 2);
    assert!(cfg.retry.on_mergeable);
    assert!(!cfg.retry.on_statuses);

    let policy = cfg.repo_policy("acme/gateway");
    assert_eq!(policy.merge_method, "ff");
    assert_eq!(policy.min_review, 2);

    let fallback = cfg.repo_policy("acme/other");
    assert_eq!(fallback.merge_method, "squash");
    assert_eq!(fallback.min_review, 2);
}

#[test]
fn test_search_query_shape() {
    let query = QueryBuilder::for_user("acme")
        .with_label("status/3-needs-merge")
        .without_labels(["bot/need-human-merge", "bot/no-merge"])
        .review_approved(true)
        .build();

    assert!(query.starts_with("user:acme type:pr state:open"));
    assert!(query.contains("label:\"status/3-needs-merge\""));
    assert!(query.contains("-label:\"bot/no-merge\""));
    assert!(query.ends_with("review:approved"));
}

fn issue(number: u64, labels: &[&str], updated_secs_ago: i64) -> IssueSummary {
    IssueSummary {
        number,
        title: format!("PR #{number}"),
        labels: labels.iter().map(|l| Label::new(*l)).collect(),
        updated_at: Utc::now() - Duration::seconds(updated_secs_ago),
        repository_url: "https://api.github.com/repos/acme/webapp".to_string(),
    }
}

#[test]
fn test_selector_scenarios() {
    let markers = Markers::default();
    let retry = Retry {
        interval: 60,
        number: 0,
        on_mergeable: false,
        on_statuses: false,
    };
    let now = Utc::now();

    // In-progress wins over a plain candidate.
    let issues = vec![
        issue(1, &["status/3-needs-merge"], 10),
        issue(2, &["status/3-needs-merge", "status/4-merge-in-progress"], 5),
    ];
    let selected = select_candidate(&issues, &markers, &retry, now).unwrap().unwrap();
    assert_eq!(selected.number, 2);

    // The fast-forward override wins over in-progress.
    let issues = vec![
        issue(1, &["status/3-needs-merge", "bot/merge-method-ff"], 10),
        issue(2, &["status/3-needs-merge", "status/4-merge-in-progress"], 5),
    ];
    let selected = select_candidate(&issues, &markers, &retry, now).unwrap().unwrap();
    assert_eq!(selected.number, 1);

    // With no in-progress PR, the oldest update wins.
    let issues = vec![
        issue(1, &["status/3-needs-merge"], 30),
        issue(2, &["status/3-needs-merge"], 300),
        issue(3, &["status/3-needs-merge"], 120),
    ];
    let selected = select_candidate(&issues, &markers, &retry, now).unwrap().unwrap();
    assert_eq!(selected.number, 2);
}

#[test]
fn test_retry_decision_round_trip() {
    let markers = Markers::default();
    let retry = Retry {
        interval: 60,
        number: 2,
        on_mergeable: true,
        on_statuses: true,
    };

    let mut names: Vec<String> = Vec::new();
    for expected in 1..=2u32 {
        match decide(&LabelSet::from_names(names.clone()), true, &retry, &markers) {
            RetryDecision::Scheduled { remove, add } => {
                if let Some(remove) = remove {
                    names.retain(|name| name != &remove);
                }
                assert!(add.contains(&format!("bot/merge-retry-{expected}")));
                names.extend(add);
            }
            other => panic!("expected a scheduled retry, got {other:?}"),
        }
    }

    match decide(&LabelSet::from_names(names), true, &retry, &markers) {
        RetryDecision::Escalate { attempts, remove } => {
            assert_eq!(attempts, Some(2));
            assert_eq!(remove.as_deref(), Some("bot/merge-retry-2"));
        }
        other => panic!("expected an escalation, got {other:?}"),
    }
}

#[test]
fn test_merge_method_resolution() {
    let prefix = "bot/merge-method-";

    let labels = LabelSet::from_names(["status/3-needs-merge"]);
    assert_eq!(
        resolve_merge_method(&labels, prefix, "squash").unwrap(),
        MergeMethod::Squash
    );

    let labels = LabelSet::from_names(["bot/merge-method-rebase"]);
    assert_eq!(
        resolve_merge_method(&labels, prefix, "squash").unwrap(),
        MergeMethod::Rebase
    );

    let labels = LabelSet::from_names(["bot/merge-method-rebase", "bot/merge-method-ff"]);
    assert!(resolve_merge_method(&labels, prefix, "squash").is_err());
}

#[test]
fn test_issue_reference_parsing() {
    assert_eq!(
        parse_issue_references("Fixes #13 #14, #15,#16,"),
        vec![13, 14, 15, 16]
    );
    assert!(parse_issue_references("Fixes #13#14,#15,#16,").is_empty());
    assert_eq!(parse_issue_references("Fixes: #13,#14"), vec![13, 14]);
}

#[test]
fn test_co_author_extraction_is_strict_about_whitespace() {
    assert_eq!(
        extract_co_authors("Co-authored-by: test <test@test.com>"),
        vec!["Co-authored-by: test <test@test.com>"]
    );
    assert!(extract_co_authors("   Co-authored-by: test <test@test.com>").is_empty());
    assert!(extract_co_authors("Co-authored-by: test <test@test.com>   ").is_empty());
}

#[test]
fn test_library_version() {
    assert!(!mergeq::VERSION.is_empty());
    assert!(mergeq::VERSION.contains('.'));
}
