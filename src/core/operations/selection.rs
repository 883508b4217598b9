//! Candidate selection: exactly one PR per cycle.
//!
//! The selector works on search results (issue summaries) rather than
//! full pull requests; only labels and update timestamps matter here.
//!
//! Priority order:
//!
//! 1. A PR carrying the fast-forward merge-method override label. At most
//!    one may exist; more than one is a hard error.
//! 2. A PR holding the in-progress mutex. The label behaves as a mutex, so
//!    more than two holders is a hard error. When retries are enabled and a
//!    holder carries a retry label, it is only eligible once its retry
//!    interval has elapsed; an in-flight retry that has not rested long
//!    enough blocks the whole cycle so two cycles cannot race the same PR.
//! 3. The least-recently-updated PR, for fairness.

use chrono::{DateTime, Duration, Utc};

use crate::config::{Markers, Retry};
use crate::error::SelectionError;
use crate::models::IssueSummary;

/// Selects at most one PR to process this cycle.
///
/// `issues` is the set of open PRs carrying the queue-entry label, minus
/// the exempted ones (the search already excludes those).
pub fn select_candidate<'a>(
    issues: &'a [IssueSummary],
    markers: &Markers,
    retry: &Retry,
    now: DateTime<Utc>,
) -> Result<Option<&'a IssueSummary>, SelectionError> {
    if issues.is_empty() {
        return Ok(None);
    }

    let ff_label = format!("{}ff", markers.merge_method_prefix);
    let fast_forward: Vec<&IssueSummary> = issues
        .iter()
        .filter(|issue| issue.has_label(&ff_label))
        .collect();

    if fast_forward.len() > 1 {
        return Err(SelectionError::MultipleExclusiveLabels {
            numbers: fast_forward.iter().map(|issue| issue.number).collect(),
        });
    }
    if let Some(issue) = fast_forward.first() {
        return Ok(Some(issue));
    }

    let in_progress: Vec<&IssueSummary> = issues
        .iter()
        .filter(|issue| issue.has_label(&markers.merge_in_progress))
        .collect();

    if in_progress.len() > 2 {
        return Err(SelectionError::TooManyInProgress {
            label: markers.merge_in_progress.clone(),
        });
    }

    if !in_progress.is_empty() {
        if retry.number > 0 {
            let retrying: Vec<&&IssueSummary> = in_progress
                .iter()
                .filter(|issue| {
                    issue
                        .find_label_with_prefix(&markers.merge_retry_prefix)
                        .is_some()
                })
                .collect();

            if !retrying.is_empty() {
                let interval = Duration::seconds(retry.interval as i64);
                for issue in retrying {
                    if now - issue.updated_at > interval {
                        return Ok(Some(issue));
                    }
                }
                // An in-flight retry is resting; do not start anything else.
                return Ok(None);
            }
        }

        return Ok(Some(in_progress[0]));
    }

    Ok(issues.iter().min_by_key(|issue| issue.updated_at))
}
