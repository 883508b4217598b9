//! Label state codec.
//!
//! Labels are the only persisted state of the queue, so their string
//! forms are parsed and formatted here, at the boundary, and nowhere
//! else. A [`LabelSet`] is a snapshot of one PR's labels taken at the
//! start of a processing pass; it is never cached beyond that pass since
//! another actor may mutate the labels concurrently.

use crate::config::Markers;
use crate::models::Label;

/// Merge-method label suffixes, in a fixed order.
pub const METHOD_SUFFIXES: [&str; 4] = ["squash", "merge", "rebase", "ff"];

/// A snapshot of a PR's label names.
#[derive(Debug, Clone, Default)]
pub struct LabelSet {
    names: Vec<String>,
}

impl LabelSet {
    /// Builds a snapshot from wire labels.
    pub fn from_labels(labels: &[Label]) -> Self {
        Self {
            names: labels.iter().map(|l| l.name.clone()).collect(),
        }
    }

    /// Builds a snapshot from plain names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the set contains a label.
    pub fn has(&self, label: &str) -> bool {
        self.names.iter().any(|name| name == label)
    }

    /// Finds the first label starting with the given prefix.
    pub fn find_with_prefix(&self, prefix: &str) -> Option<&str> {
        self.names
            .iter()
            .map(String::as_str)
            .find(|name| name.starts_with(prefix))
    }

    /// All labels starting with the given prefix.
    pub fn all_with_prefix(&self, prefix: &str) -> Vec<&str> {
        self.names
            .iter()
            .map(String::as_str)
            .filter(|name| name.starts_with(prefix))
            .collect()
    }

    /// The label names in this set.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Formats a retry label carrying the given attempt count.
pub fn format_retry_label(prefix: &str, attempts: u32) -> String {
    format!("{prefix}{attempts}")
}

/// Extracts the attempt count from a retry label.
///
/// A suffix that is not a number yields `None`; callers treat that as
/// zero attempts so a mangled label cannot block escalation forever.
pub fn parse_retry_number(label: &str, prefix: &str) -> Option<u32> {
    label.strip_prefix(prefix)?.parse().ok()
}

/// The full set of merge-method override labels for a prefix.
pub fn method_labels(prefix: &str) -> Vec<String> {
    METHOD_SUFFIXES
        .iter()
        .map(|suffix| format!("{prefix}{suffix}"))
        .collect()
}

/// Labels to clear once a PR is merged: everything that marked it as
/// queue state.
pub fn merged_cleanup_labels(markers: &Markers) -> Vec<String> {
    let mut labels = vec![
        markers.merge_in_progress.clone(),
        markers.need_merge.clone(),
        markers.light_review.clone(),
    ];
    labels.extend(method_labels(&markers.merge_method_prefix));
    labels.push(markers.merge_no_rebase.clone());
    labels
}

/// Labels to clear after a successful merge call.
pub fn post_merge_cleanup_labels(markers: &Markers) -> Vec<String> {
    let mut labels = vec![markers.need_merge.clone(), markers.light_review.clone()];
    labels.extend(method_labels(&markers.merge_method_prefix));
    labels
}

/// Computes the label set that remains after removing `to_remove` from
/// `current`.
///
/// Returns `None` when nothing would change, so callers can skip the
/// replacement call entirely; removal is idempotent either way.
pub fn removal_result(current: &[String], to_remove: &[String]) -> Option<Vec<String>> {
    let remaining: Vec<String> = current
        .iter()
        .filter(|name| !to_remove.contains(name))
        .cloned()
        .collect();

    if remaining.len() == current.len() {
        None
    } else {
        Some(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_set_lookup() {
        let labels = LabelSet::from_names(["status/3-needs-merge", "bot/merge-retry-2"]);
        assert!(labels.has("status/3-needs-merge"));
        assert!(!labels.has("status/3-needs"));
        assert_eq!(
            labels.find_with_prefix("bot/merge-retry-"),
            Some("bot/merge-retry-2")
        );
        assert_eq!(labels.find_with_prefix("bot/merge-method-"), None);
    }

    #[test]
    fn test_retry_label_round_trip() {
        let label = format_retry_label("bot/merge-retry-", 3);
        assert_eq!(label, "bot/merge-retry-3");
        assert_eq!(parse_retry_number(&label, "bot/merge-retry-"), Some(3));
    }

    #[test]
    fn test_parse_retry_number_rejects_garbage() {
        assert_eq!(parse_retry_number("bot/merge-retry-x", "bot/merge-retry-"), None);
        assert_eq!(parse_retry_number("unrelated", "bot/merge-retry-"), None);
        assert_eq!(parse_retry_number("bot/merge-retry-", "bot/merge-retry-"), None);
    }

    #[test]
    fn test_method_labels() {
        let labels = method_labels("bot/merge-method-");
        assert_eq!(
            labels,
            vec![
                "bot/merge-method-squash",
                "bot/merge-method-merge",
                "bot/merge-method-rebase",
                "bot/merge-method-ff",
            ]
        );
    }

    #[test]
    fn test_removal_result_is_idempotent() {
        let current = vec![
            "status/3-needs-merge".to_string(),
            "kind/bug".to_string(),
        ];

        // Removing an absent label is a no-op.
        assert_eq!(
            removal_result(&current, &["bot/no-merge".to_string()]),
            None
        );

        // Removing a present label leaves the rest untouched.
        let remaining =
            removal_result(&current, &["status/3-needs-merge".to_string()]).unwrap();
        assert_eq!(remaining, vec!["kind/bug".to_string()]);

        // Removing it again changes nothing.
        assert_eq!(
            removal_result(&remaining, &["status/3-needs-merge".to_string()]),
            None
        );
    }

    #[test]
    fn test_merged_cleanup_covers_every_marker() {
        let markers = Markers::default();
        let labels = merged_cleanup_labels(&markers);
        assert!(labels.contains(&markers.merge_in_progress));
        assert!(labels.contains(&markers.need_merge));
        assert!(labels.contains(&markers.light_review));
        assert!(labels.contains(&markers.merge_no_rebase));
        assert!(labels.contains(&"bot/merge-method-ff".to_string()));
        assert_eq!(labels.len(), 8);
    }
}
