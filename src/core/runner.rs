//! The single-PR-per-cycle processing pipeline.
//!
//! [`run_once`] performs one pass: search the queue, group by repository,
//! select at most one candidate per repository, and run it through the
//! gate pipeline. [`Processor`] holds the per-repository wiring (platform
//! client, git executor, markers, retry policy and repository policy).
//!
//! Failures are scoped: an illegal queue state or a processing error in
//! one repository never aborts the whole pass.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};

use crate::api::GitHubClient;
use crate::api::search::{QueryBuilder, group_by_repository};
use crate::api::traits::PlatformOperations;
use crate::config::{Checks, Config, Markers, RepoPolicy, Retry};
use crate::core::Outcome;
use crate::core::operations::issues::close_related_issues;
use crate::core::operations::labels::{self, LabelSet};
use crate::core::operations::merge_exec::{MergeExecutor, MergeMethod, resolve_merge_method};
use crate::core::operations::readiness::{self, CheckState};
use crate::core::operations::retry::{RetryDecision, decide};
use crate::core::operations::selection::select_candidate;
use crate::core::operations::update::{self, BranchUpdater};
use crate::error::MergeError;
use crate::git::{CloneManager, GitCommand, SystemGit};
use crate::models::{PullRequest, RepoId};

/// Runs one full pass with the real GitHub client and git binary.
pub async fn run_once(cfg: &Config) -> Result<()> {
    let client = GitHubClient::new(&cfg.github)?;
    run_with(cfg, Arc::new(client), Arc::new(SystemGit)).await
}

/// Runs one full pass over injected platform and VCS implementations.
pub async fn run_with(
    cfg: &Config,
    platform: Arc<dyn PlatformOperations>,
    git: Arc<dyn GitCommand>,
) -> Result<()> {
    let query = QueryBuilder::for_user(&cfg.github.user)
        .with_label(&cfg.markers.need_merge)
        .without_labels([
            cfg.markers.need_human_merge.as_str(),
            cfg.markers.no_merge.as_str(),
        ])
        .review_approved(cfg.default.min_review > 0)
        .build();

    let issues = platform.search_issues(&query).await?;
    let grouped = group_by_repository(issues);

    for (full_name, repo_issues) in grouped {
        tracing::info!(
            repository = %full_name,
            candidates = repo_issues.len(),
            "processing repository"
        );

        let repo = match RepoId::parse(&full_name) {
            Ok(repo) => repo,
            Err(err) => {
                tracing::warn!(repository = %full_name, error = %err, "skipping repository");
                continue;
            }
        };

        let candidate =
            match select_candidate(&repo_issues, &cfg.markers, &cfg.retry, Utc::now()) {
                Ok(Some(issue)) => issue.clone(),
                Ok(None) => {
                    tracing::debug!(repository = %full_name, "nothing to merge");
                    continue;
                }
                Err(err) => {
                    // Ambiguous recovery: surfaced to the operator, never
                    // auto-corrected.
                    tracing::error!(repository = %full_name, error = %err, "illegal queue state");
                    continue;
                }
            };

        let policy = cfg.repo_policy(&full_name);
        let processor = Processor::new(Arc::clone(&platform), Arc::clone(&git), repo, cfg, policy);

        match processor.process(candidate.number).await {
            Ok(outcome) => {
                tracing::info!(
                    repository = %full_name,
                    pr = candidate.number,
                    outcome = %outcome,
                    "cycle finished"
                );
            }
            Err(err) => {
                tracing::error!(
                    repository = %full_name,
                    pr = candidate.number,
                    error = %err,
                    "processing failed"
                );
            }
        }
    }

    Ok(())
}

/// The per-repository decision engine.
pub struct Processor {
    platform: Arc<dyn PlatformOperations>,
    git: Arc<dyn GitCommand>,
    repo: RepoId,
    markers: Markers,
    retry: Retry,
    checks: Checks,
    policy: RepoPolicy,
    clones: CloneManager,
    token: SecretString,
    dry_run: bool,
}

impl Processor {
    /// Wires a processor for one repository.
    pub fn new(
        platform: Arc<dyn PlatformOperations>,
        git: Arc<dyn GitCommand>,
        repo: RepoId,
        cfg: &Config,
        policy: RepoPolicy,
    ) -> Self {
        Self {
            platform,
            git,
            repo,
            markers: cfg.markers.clone(),
            retry: cfg.retry.clone(),
            checks: cfg.checks.clone(),
            policy,
            clones: CloneManager::new(cfg.git.clone(), cfg.github.token.clone()),
            token: cfg.github.token.clone(),
            dry_run: cfg.extra.dry_run,
        }
    }

    /// Runs one processing cycle for one pull request.
    pub async fn process(&self, number: u64) -> Result<Outcome> {
        let pr = self
            .platform
            .get_pull_request(&self.repo, number)
            .await
            .context("failed to get pull request")?;

        self.evaluate(&pr).await
    }

    /// The gate pipeline. Gates run in order; the first failure decides
    /// the outcome of the cycle.
    async fn evaluate(&self, pr: &PullRequest) -> Result<Outcome> {
        let labels = LabelSet::from_labels(&pr.labels);

        // Milestone gate. Not transient, so no retry attempt is consumed.
        if self.policy.need_milestone && pr.milestone.is_none() {
            return self.escalate(pr, "the milestone is missing").await;
        }

        // Review gate.
        let required = readiness::required_reviews(&labels, &self.markers, &self.policy);
        if required > 0 {
            let reviews = self.platform.list_reviews(&self.repo, pr.number).await?;
            if let Err(message) = readiness::check_reviews(&reviews, required) {
                return self
                    .escalate(pr, &format!("error related to review: {message}"))
                    .await;
            }
        }

        // CI gate. Transport errors count as failures here: the checks
        // could not be confirmed green.
        let ci_state = readiness::aggregated_state(
            self.platform.as_ref(),
            &self.repo,
            &pr.head.sha,
            &self.checks.ignored_apps,
        )
        .await;
        match ci_state {
            Ok(CheckState::Success) => {}
            Ok(CheckState::Pending) => {
                tracing::info!(pr = pr.number, "state pending, waiting for the CI");
                return Ok(Outcome::Waiting);
            }
            Ok(CheckState::Failure(message)) => {
                return self
                    .apply_retry(
                        pr,
                        &labels,
                        self.retry.on_statuses,
                        &format!("checks status: {message}"),
                    )
                    .await;
            }
            Err(err) => {
                return self
                    .apply_retry(
                        pr,
                        &labels,
                        self.retry.on_statuses,
                        &format!("checks status: {err}"),
                    )
                    .await;
            }
        }

        // Terminal success: someone else already merged it. Clear every
        // queue marker and leave.
        if pr.merged {
            tracing::info!(pr = pr.number, "the pull request is already merged");
            self.log_ignored(
                self.remove_label_set(pr.number, &labels::merged_cleanup_labels(&self.markers))
                    .await,
            );
            return Ok(Outcome::Skipped);
        }

        // Conflict gate.
        if pr.mergeable == Some(false) {
            return self
                .apply_retry(
                    pr,
                    &labels,
                    self.retry.on_mergeable,
                    "conflicts must be resolved in the pull request",
                )
                .await;
        }

        if readiness::needs_human_attention(pr.mergeable_state) {
            return self
                .escalate(
                    pr,
                    &format!("the mergeable state is \"{}\"", pr.mergeable_state.as_str()),
                )
                .await;
        }

        // Every retryable gate passed: the incident is over, clear the
        // counter.
        if self.retry.on_mergeable || self.retry.on_statuses {
            if let Some(retry_label) = labels.find_with_prefix(&self.markers.merge_retry_prefix) {
                self.log_ignored(self.remove_label(pr.number, retry_label).await);
            }
        }

        let needs_update = update::needs_update(
            self.platform.as_ref(),
            &self.repo,
            &pr.base.ref_name,
            &self.policy,
        )
        .await?;

        let method = match resolve_merge_method(
            &labels,
            &self.markers.merge_method_prefix,
            &self.policy.merge_method,
        ) {
            Ok(method) => method,
            Err(err) => return self.escalate(pr, &err.to_string()).await,
        };

        let head = format!("{}:{}", pr.head.user.login, pr.head.ref_name);
        let comparison = self
            .platform
            .compare(&self.repo, &pr.base.ref_name, &head)
            .await?;
        let up_to_date = comparison.behind_by == 0;

        if !up_to_date && method == MergeMethod::FastForward {
            return self
                .escalate(pr, &MergeError::FastForwardOutOfDate.to_string())
                .await;
        }

        if needs_update && !up_to_date && !labels.has(&self.markers.merge_no_rebase) {
            if let Some(outcome) = self.check_maintainer_access(pr).await? {
                return Ok(outcome);
            }
            return self.update(pr).await;
        }

        self.merge(pr, method).await
    }

    /// The update path can only push to a head the bot may write to: the
    /// main repository itself, a head with maintainer edits granted, or
    /// an accessible fork.
    async fn check_maintainer_access(&self, pr: &PullRequest) -> Result<Option<Outcome>> {
        if pr.maintainer_can_modify || pr.is_on_main_repository() {
            return Ok(None);
        }

        let head_repo = RepoId::parse(&pr.head.repo.full_name)?;
        let repository = self.platform.get_repository(&head_repo).await?;
        if repository.fork {
            return Ok(None);
        }

        let outcome = self
            .escalate(
                pr,
                "the contributor doesn't allow maintainer modification (GitHub option)",
            )
            .await?;
        Ok(Some(outcome))
    }

    async fn update(&self, pr: &PullRequest) -> Result<Outcome> {
        self.log_ignored(
            self.add_labels(pr.number, &[self.markers.merge_in_progress.clone()])
                .await,
        );

        let updater = BranchUpdater::new(
            self.platform.as_ref(),
            self.git.as_ref(),
            &self.clones,
            self.dry_run,
        );

        match updater.update(&self.repo, pr).await {
            Ok(()) => Ok(Outcome::Updated),
            Err(err) => self.escalate(pr, &format!("failed to update: {err}")).await,
        }
    }

    async fn merge(&self, pr: &PullRequest, method: MergeMethod) -> Result<Outcome> {
        tracing::info!(pr = pr.number, method = %method, "merging");

        self.log_ignored(
            self.remove_label(pr.number, &self.markers.merge_in_progress)
                .await,
        );

        let executor = MergeExecutor::new(
            self.platform.as_ref(),
            self.git.as_ref(),
            &self.clones,
            self.dry_run,
        );
        let result = executor.merge(&self.repo, pr, method, &self.policy).await?;
        tracing::info!(pr = pr.number, "{}", result.message);

        if !result.merged {
            return self
                .escalate(pr, &format!("failed to merge the pull request: {}", result.message))
                .await;
        }

        if !self.dry_run {
            self.log_ignored(
                self.remove_label_set(
                    pr.number,
                    &labels::post_merge_cleanup_labels(&self.markers),
                )
                .await,
            );
        }

        // The merge is already committed; a failure to close referenced
        // issues must not fail the cycle.
        if let Err(err) =
            close_related_issues(self.platform.as_ref(), &self.repo, pr, self.dry_run).await
        {
            tracing::warn!(pr = pr.number, error = %err, "failed to close related issues");
        }

        Ok(Outcome::Merged)
    }

    /// Applies the retry policy to a transient failure.
    async fn apply_retry(
        &self,
        pr: &PullRequest,
        labels: &LabelSet,
        retryable: bool,
        message: &str,
    ) -> Result<Outcome> {
        tracing::warn!(pr = pr.number, "{message}");

        match decide(labels, retryable, &self.retry, &self.markers) {
            RetryDecision::Escalate { attempts, remove } => {
                if let Some(label) = remove {
                    self.log_ignored(self.remove_label(pr.number, &label).await);
                }
                let message = match attempts {
                    Some(attempts) => {
                        format!("Too many retry: {attempts}/{}", self.retry.number)
                    }
                    None => message.to_string(),
                };
                self.escalate(pr, &message).await
            }
            RetryDecision::Scheduled { remove, add } => {
                if let Some(label) = remove {
                    self.log_ignored(self.remove_label(pr.number, &label).await);
                }
                self.log_ignored(self.add_labels(pr.number, &add).await);
                Ok(Outcome::Retried)
            }
        }
    }

    /// Hands the PR to a human: escalation label on, mutex off, optional
    /// comment.
    async fn escalate(&self, pr: &PullRequest, message: &str) -> Result<Outcome> {
        tracing::warn!(pr = pr.number, "{message}");

        self.log_ignored(
            self.add_comment(pr, &format!(":no_entry_sign: {message}"))
                .await,
        );
        self.log_ignored(
            self.add_labels(pr.number, &[self.markers.need_human_merge.clone()])
                .await,
        );
        self.log_ignored(
            self.remove_label(pr.number, &self.markers.merge_in_progress)
                .await,
        );

        Ok(Outcome::Escalated)
    }

    async fn add_comment(&self, pr: &PullRequest, message: &str) -> Result<()> {
        if !self.policy.add_error_in_comment && !pr.base.repo.private {
            return Ok(());
        }

        // Never leak the token into a public comment.
        let token = self.token.expose_secret();
        let message = if token.is_empty() {
            message.to_string()
        } else {
            message.replace(token, "xxx")
        };

        if self.dry_run {
            tracing::debug!(pr = pr.number, comment = %message, "dry run: skipping comment");
            return Ok(());
        }

        self.platform
            .create_comment(&self.repo, pr.number, &message)
            .await
    }

    async fn add_labels(&self, number: u64, labels_to_add: &[String]) -> Result<()> {
        tracing::debug!(
            pr = number,
            labels = ?labels_to_add,
            dry_run = self.dry_run,
            "adding labels"
        );
        if self.dry_run {
            return Ok(());
        }
        self.platform
            .add_labels(&self.repo, number, labels_to_add)
            .await
    }

    async fn remove_label(&self, number: u64, label: &str) -> Result<()> {
        tracing::debug!(pr = number, label = %label, dry_run = self.dry_run, "removing label");
        if self.dry_run {
            return Ok(());
        }
        self.platform.remove_label(&self.repo, number, label).await
    }

    /// Removes a set of labels through one replacement call, computed
    /// against a fresh label snapshot.
    async fn remove_label_set(&self, number: u64, to_remove: &[String]) -> Result<()> {
        if self.dry_run {
            tracing::debug!(pr = number, labels = ?to_remove, "dry run: skipping label removal");
            return Ok(());
        }

        let issue = self.platform.get_issue(&self.repo, number).await?;
        let current: Vec<String> = issue.labels.iter().map(|l| l.name.clone()).collect();

        match labels::removal_result(&current, to_remove) {
            Some(remaining) => {
                self.platform
                    .replace_labels(&self.repo, number, &remaining)
                    .await
            }
            None => Ok(()),
        }
    }

    /// Label reconciliation is best-effort: one failed mutation must not
    /// prevent the others.
    fn log_ignored(&self, result: Result<()>) {
        if let Err(err) = result {
            tracing::debug!(error = %err, "ignored error");
        }
    }
}
