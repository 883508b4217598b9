//! Retry/escalation policy.
//!
//! The retry counter lives in a label (`<prefix><N>`), so this module
//! only decides; the runner applies the returned label mutations. The
//! counter records attempts already consumed: escalation fires when the
//! existing label has reached the configured maximum, before any
//! increment.

use crate::config::{Markers, Retry};
use crate::core::operations::labels::{LabelSet, format_retry_label, parse_retry_number};

/// The decision for one transient failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hand the PR to a human: apply the escalation label and release the
    /// in-progress mutex. `attempts` is the consumed retry count when the
    /// cap was hit, `None` when retries were never an option.
    Escalate {
        /// Consumed attempts, reported in the escalation message.
        attempts: Option<u32>,
        /// Retry label to clear, if one is present.
        remove: Option<String>,
    },
    /// Keep the PR in flight: swap the retry label and keep the mutex.
    Scheduled {
        /// Retry label to clear, if one is present.
        remove: Option<String>,
        /// Labels to apply.
        add: Vec<String>,
    },
}

/// Decides between retrying and escalating a transient failure.
///
/// `retryable` says whether this failure kind is retried at all (per the
/// `[retry]` on_mergeable/on_statuses switches).
pub fn decide(
    labels: &LabelSet,
    retryable: bool,
    retry: &Retry,
    markers: &Markers,
) -> RetryDecision {
    let current = labels
        .find_with_prefix(&markers.merge_retry_prefix)
        .map(str::to_string);

    if !retryable || retry.number == 0 {
        return RetryDecision::Escalate {
            attempts: None,
            remove: current,
        };
    }

    let Some(current) = current else {
        // First attempt: start the counter and arm the mutex so the next
        // cycles recognize this PR as in flight.
        return RetryDecision::Scheduled {
            remove: None,
            add: vec![
                format_retry_label(&markers.merge_retry_prefix, 1),
                markers.merge_in_progress.clone(),
            ],
        };
    };

    let attempts =
        parse_retry_number(&current, &markers.merge_retry_prefix).unwrap_or_else(|| {
            tracing::warn!(label = %current, "unreadable retry label, counting as zero");
            0
        });

    if attempts >= retry.number {
        return RetryDecision::Escalate {
            attempts: Some(attempts),
            remove: Some(current),
        };
    }

    RetryDecision::Scheduled {
        remove: Some(current),
        add: vec![format_retry_label(
            &markers.merge_retry_prefix,
            attempts + 1,
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Markers {
        Markers::default()
    }

    fn retry(number: u32) -> Retry {
        Retry {
            interval: 60,
            number,
            on_mergeable: true,
            on_statuses: true,
        }
    }

    #[test]
    fn test_disabled_retry_escalates() {
        let labels = LabelSet::from_names(["status/3-needs-merge"]);
        let decision = decide(&labels, false, &retry(3), &markers());
        assert_eq!(
            decision,
            RetryDecision::Escalate {
                attempts: None,
                remove: None
            }
        );
    }

    #[test]
    fn test_zero_budget_escalates_and_clears_stale_label() {
        let labels = LabelSet::from_names(["bot/merge-retry-2"]);
        let decision = decide(&labels, true, &retry(0), &markers());
        assert_eq!(
            decision,
            RetryDecision::Escalate {
                attempts: None,
                remove: Some("bot/merge-retry-2".to_string())
            }
        );
    }

    #[test]
    fn test_first_attempt_arms_the_mutex() {
        let labels = LabelSet::from_names(["status/3-needs-merge"]);
        let decision = decide(&labels, true, &retry(3), &markers());
        assert_eq!(
            decision,
            RetryDecision::Scheduled {
                remove: None,
                add: vec![
                    "bot/merge-retry-1".to_string(),
                    "status/4-merge-in-progress".to_string(),
                ],
            }
        );
    }

    #[test]
    fn test_counter_increments_then_escalates_at_the_cap() {
        // Simulate repeated failures by feeding each decision's labels back.
        let markers = markers();
        let retry = retry(3);
        let mut names: Vec<String> = vec!["status/3-needs-merge".to_string()];

        for expected in 1..=3u32 {
            let decision = decide(
                &LabelSet::from_names(names.clone()),
                true,
                &retry,
                &markers,
            );
            match decision {
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

        // The fourth failure finds the counter at the cap and escalates.
        let decision = decide(&LabelSet::from_names(names), true, &retry, &markers);
        assert_eq!(
            decision,
            RetryDecision::Escalate {
                attempts: Some(3),
                remove: Some("bot/merge-retry-3".to_string()),
            }
        );
    }

    #[test]
    fn test_unreadable_counter_restarts_from_one() {
        let labels = LabelSet::from_names(["bot/merge-retry-zzz"]);
        let decision = decide(&labels, true, &retry(3), &markers());
        assert_eq!(
            decision,
            RetryDecision::Scheduled {
                remove: Some("bot/merge-retry-zzz".to_string()),
                add: vec!["bot/merge-retry-1".to_string()],
            }
        );
    }
}
