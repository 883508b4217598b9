//! Search-query building for the issue search endpoint.
//!
//! Queries are assembled from label include/exclude filters on top of the
//! fixed `type:pr state:open` scope, and results are grouped by repository
//! so the orchestrator can walk one repository at a time.

use std::collections::BTreeMap;

use crate::models::IssueSummary;

/// Builder for issue search queries.
///
/// # Example
///
/// ```
/// use mergeq::api::search::QueryBuilder;
///
/// let query = QueryBuilder::for_user("acme")
///     .with_label("status/3-needs-merge")
///     .without_label("bot/no-merge")
///     .review_approved(true)
///     .build();
/// assert_eq!(
///     query,
///     "user:acme type:pr state:open label:\"status/3-needs-merge\" -label:\"bot/no-merge\" review:approved"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    parts: Vec<String>,
}

impl QueryBuilder {
    /// Starts a query over every repository of a user or organization.
    pub fn for_user(user: &str) -> Self {
        Self {
            parts: vec![format!("user:{user}"), "type:pr".to_string(), "state:open".to_string()],
        }
    }

    /// Adds a label filter.
    #[must_use]
    pub fn with_label(mut self, label: &str) -> Self {
        self.parts.push(format!("label:\"{label}\""));
        self
    }

    /// Adds an excluded-label filter.
    #[must_use]
    pub fn without_label(mut self, label: &str) -> Self {
        self.parts.push(format!("-label:\"{label}\""));
        self
    }

    /// Adds excluded-label filters for several labels.
    #[must_use]
    pub fn without_labels<'a>(mut self, labels: impl IntoIterator<Item = &'a str>) -> Self {
        for label in labels {
            self = self.without_label(label);
        }
        self
    }

    /// Restricts to PRs with at least one approving review.
    #[must_use]
    pub fn review_approved(mut self, apply: bool) -> Self {
        if apply {
            self.parts.push("review:approved".to_string());
        }
        self
    }

    /// Renders the query string.
    #[must_use]
    pub fn build(self) -> String {
        self.parts.join(" ")
    }
}

/// Groups search results by `owner/name`.
///
/// A `BTreeMap` keeps the iteration order stable across invocations so runs
/// are reproducible in logs.
pub fn group_by_repository(issues: Vec<IssueSummary>) -> BTreeMap<String, Vec<IssueSummary>> {
    let mut grouped: BTreeMap<String, Vec<IssueSummary>> = BTreeMap::new();
    for issue in issues {
        grouped
            .entry(issue.repository_full_name())
            .or_default()
            .push(issue);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Label;
    use chrono::Utc;

    #[test]
    fn test_query_builder_composes_filters() {
        let query = QueryBuilder::for_user("acme")
            .with_label("status/3-needs-merge")
            .without_labels(["bot/need-human-merge", "bot/no-merge"])
            .review_approved(false)
            .build();
        assert_eq!(
            query,
            "user:acme type:pr state:open label:\"status/3-needs-merge\" \
             -label:\"bot/need-human-merge\" -label:\"bot/no-merge\""
        );
    }

    #[test]
    fn test_query_builder_review_filter() {
        let query = QueryBuilder::for_user("acme").review_approved(true).build();
        assert!(query.ends_with("review:approved"));
    }

    fn issue(number: u64, repo: &str) -> IssueSummary {
        IssueSummary {
            number,
            title: String::new(),
            labels: vec![Label::new("status/3-needs-merge")],
            updated_at: Utc::now(),
            repository_url: format!("https://api.github.com/repos/{repo}"),
        }
    }

    #[test]
    fn test_group_by_repository() {
        let grouped = group_by_repository(vec![
            issue(1, "acme/webapp"),
            issue(2, "acme/gateway"),
            issue(3, "acme/webapp"),
        ]);

        assert_eq!(grouped.len(), 2);
        let numbers: Vec<u64> = grouped["acme/webapp"].iter().map(|i| i.number).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert_eq!(grouped["acme/gateway"].len(), 1);
    }
}
