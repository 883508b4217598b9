//! GitHub REST API client.
//!
//! `GitHubClient` implements the operation traits with plain REST calls
//! over reqwest. The base URL is configurable so the client also works
//! against GitHub Enterprise instances.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::Github;
use crate::error::ApiError;
use crate::models::{
    CheckSuiteList, CombinedStatus, CommitRef, CommitStatus, Comparison, Issue, IssueEdit,
    IssueSummary, MergeRequest, MergeResponse, PullRequest, RepoId, RepoSummary,
    RequiredStatusChecks, Review, SearchResults,
};

use super::traits::{IssueOperations, PullRequestOperations, RepositoryOperations};

/// Page size used for every paginated endpoint.
const PER_PAGE: usize = 100;

/// Upper bound on page requests per listing, as a runaway guard.
const MAX_PAGE_REQUESTS: usize = 50;

/// A REST client for the GitHub API.
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: Url,
    token: SecretString,
}

impl GitHubClient {
    /// Creates a new client from the GitHub configuration section.
    pub fn new(github: &Github) -> Result<Self, ApiError> {
        let base_url = Url::parse(&github.base_url).map_err(|err| ApiError::ParseError {
            message: format!("invalid API base URL {}: {err}", github.base_url),
        })?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("mergeq/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            token: github.token.clone(),
        })
    }

    /// Builds an API URL from path segments, percent-encoding each segment.
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| ApiError::ParseError {
                message: format!("API base URL cannot be a base: {}", self.base_url),
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn check(&self, response: Response, resource: &str) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound {
                resource: resource.to_string(),
            }),
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(ApiError::RequestFailed {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        resource: &str,
    ) -> Result<T, ApiError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;
        let response = self.check(response, resource).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        url: Url,
        body: &B,
        resource: &str,
    ) -> Result<Response, ApiError> {
        let response = self
            .http
            .request(method, url)
            .bearer_auth(self.token.expose_secret())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .json(body)
            .send()
            .await?;
        self.check(response, resource).await
    }

    /// Fetches every page of a paginated listing.
    async fn paginate<T, F>(&self, mut page_url: F, resource: &str) -> Result<Vec<T>, ApiError>
    where
        T: DeserializeOwned,
        F: FnMut(usize) -> Result<Url, ApiError>,
    {
        let mut collected = Vec::new();

        for page in 1..=MAX_PAGE_REQUESTS {
            let url = page_url(page)?;
            let mut items: Vec<T> = self.get_json(url, resource).await?;
            let full_page = items.len() == PER_PAGE;
            collected.append(&mut items);
            if !full_page {
                return Ok(collected);
            }
        }

        Err(ApiError::PaginationLimitExceeded {
            max: MAX_PAGE_REQUESTS,
            retrieved: collected.len(),
        })
    }
}

#[async_trait]
impl IssueOperations for GitHubClient {
    async fn search_issues(&self, query: &str) -> Result<Vec<IssueSummary>> {
        let mut collected = Vec::new();

        for page in 1..=MAX_PAGE_REQUESTS {
            let mut url = self.url(&["search", "issues"])?;
            url.query_pairs_mut()
                .append_pair("q", query)
                .append_pair("sort", "updated")
                .append_pair("order", "asc")
                .append_pair("per_page", &PER_PAGE.to_string())
                .append_pair("page", &page.to_string());

            let results: SearchResults = self.get_json(url, "issue search").await?;
            let total = results.total_count as usize;
            let full_page = results.items.len() == PER_PAGE;
            collected.extend(results.items);

            if !full_page || collected.len() >= total {
                return Ok(collected);
            }
        }

        Err(ApiError::PaginationLimitExceeded {
            max: MAX_PAGE_REQUESTS,
            retrieved: collected.len(),
        }
        .into())
    }

    async fn get_issue(&self, repo: &RepoId, number: u64) -> Result<Issue> {
        let url = self.url(&[
            "repos",
            &repo.owner,
            &repo.name,
            "issues",
            &number.to_string(),
        ])?;
        Ok(self.get_json(url, &format!("issue #{number}")).await?)
    }

    async fn add_labels(&self, repo: &RepoId, number: u64, labels: &[String]) -> Result<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            labels: &'a [String],
        }

        let url = self.url(&[
            "repos",
            &repo.owner,
            &repo.name,
            "issues",
            &number.to_string(),
            "labels",
        ])?;
        self.send_json(
            reqwest::Method::POST,
            url,
            &Body { labels },
            &format!("labels of issue #{number}"),
        )
        .await?;
        Ok(())
    }

    async fn remove_label(&self, repo: &RepoId, number: u64, label: &str) -> Result<()> {
        let url = self.url(&[
            "repos",
            &repo.owner,
            &repo.name,
            "issues",
            &number.to_string(),
            "labels",
            label,
        ])?;
        let response = self
            .http
            .delete(url)
            .bearer_auth(self.token.expose_secret())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(ApiError::from)?;

        // Removing an absent label must stay a no-op.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        self.check(response, &format!("label {label} of issue #{number}"))
            .await?;
        Ok(())
    }

    async fn replace_labels(&self, repo: &RepoId, number: u64, labels: &[String]) -> Result<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            labels: &'a [String],
        }

        let url = self.url(&[
            "repos",
            &repo.owner,
            &repo.name,
            "issues",
            &number.to_string(),
            "labels",
        ])?;
        self.send_json(
            reqwest::Method::PUT,
            url,
            &Body { labels },
            &format!("labels of issue #{number}"),
        )
        .await?;
        Ok(())
    }

    async fn create_comment(&self, repo: &RepoId, number: u64, body: &str) -> Result<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            body: &'a str,
        }

        let url = self.url(&[
            "repos",
            &repo.owner,
            &repo.name,
            "issues",
            &number.to_string(),
            "comments",
        ])?;
        self.send_json(
            reqwest::Method::POST,
            url,
            &Body { body },
            &format!("comments of issue #{number}"),
        )
        .await?;
        Ok(())
    }

    async fn edit_issue(&self, repo: &RepoId, number: u64, edit: &IssueEdit) -> Result<()> {
        let url = self.url(&[
            "repos",
            &repo.owner,
            &repo.name,
            "issues",
            &number.to_string(),
        ])?;
        self.send_json(
            reqwest::Method::PATCH,
            url,
            edit,
            &format!("issue #{number}"),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PullRequestOperations for GitHubClient {
    async fn get_pull_request(&self, repo: &RepoId, number: u64) -> Result<PullRequest> {
        let url = self.url(&[
            "repos",
            &repo.owner,
            &repo.name,
            "pulls",
            &number.to_string(),
        ])?;
        Ok(self
            .get_json(url, &format!("pull request #{number}"))
            .await?)
    }

    async fn list_reviews(&self, repo: &RepoId, number: u64) -> Result<Vec<Review>> {
        let reviews: Vec<Review> = self
            .paginate(
                |page| {
                    let mut url = self.url(&[
                        "repos",
                        &repo.owner,
                        &repo.name,
                        "pulls",
                        &number.to_string(),
                        "reviews",
                    ])?;
                    url.query_pairs_mut()
                        .append_pair("per_page", &PER_PAGE.to_string())
                        .append_pair("page", &page.to_string());
                    Ok(url)
                },
                &format!("reviews of pull request #{number}"),
            )
            .await?;
        Ok(reviews)
    }

    async fn first_commit_sha(&self, repo: &RepoId, number: u64) -> Result<String> {
        let mut url = self.url(&[
            "repos",
            &repo.owner,
            &repo.name,
            "pulls",
            &number.to_string(),
            "commits",
        ])?;
        url.query_pairs_mut().append_pair("per_page", "1");

        let commits: Vec<CommitRef> = self
            .get_json(url, &format!("commits of pull request #{number}"))
            .await?;
        commits
            .into_iter()
            .next()
            .map(|commit| commit.sha)
            .ok_or_else(|| {
                ApiError::NotFound {
                    resource: format!("first commit of pull request #{number}"),
                }
                .into()
            })
    }

    async fn merge_pull_request(
        &self,
        repo: &RepoId,
        number: u64,
        request: &MergeRequest,
    ) -> Result<MergeResponse> {
        let url = self.url(&[
            "repos",
            &repo.owner,
            &repo.name,
            "pulls",
            &number.to_string(),
            "merge",
        ])?;
        let response = self
            .http
            .put(url)
            .bearer_auth(self.token.expose_secret())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .json(request)
            .send()
            .await
            .map_err(ApiError::from)?;

        // The platform reports merge refusals (405: not mergeable, 409: head
        // changed) with a message body; surface those as a not-merged result
        // rather than a transport error so the caller can escalate.
        let status = response.status();
        if status == StatusCode::METHOD_NOT_ALLOWED || status == StatusCode::CONFLICT {
            let body: MergeResponse = response.json().await.map_err(ApiError::from)?;
            return Ok(MergeResponse {
                merged: false,
                message: body.message,
            });
        }

        let response = self
            .check(response, &format!("merge of pull request #{number}"))
            .await?;
        Ok(response.json::<MergeResponse>().await.map_err(ApiError::from)?)
    }
}

#[async_trait]
impl RepositoryOperations for GitHubClient {
    async fn get_repository(&self, repo: &RepoId) -> Result<RepoSummary> {
        let url = self.url(&["repos", &repo.owner, &repo.name])?;
        Ok(self.get_json(url, &format!("repository {repo}")).await?)
    }

    async fn combined_status(&self, repo: &RepoId, sha: &str) -> Result<CombinedStatus> {
        let url = self.url(&["repos", &repo.owner, &repo.name, "commits", sha, "status"])?;
        Ok(self.get_json(url, &format!("combined status of {sha}")).await?)
    }

    async fn list_statuses(&self, repo: &RepoId, sha: &str) -> Result<Vec<CommitStatus>> {
        let statuses: Vec<CommitStatus> = self
            .paginate(
                |page| {
                    let mut url = self.url(&[
                        "repos",
                        &repo.owner,
                        &repo.name,
                        "commits",
                        sha,
                        "statuses",
                    ])?;
                    url.query_pairs_mut()
                        .append_pair("per_page", &PER_PAGE.to_string())
                        .append_pair("page", &page.to_string());
                    Ok(url)
                },
                &format!("statuses of {sha}"),
            )
            .await?;
        Ok(statuses)
    }

    async fn list_check_suites(&self, repo: &RepoId, sha: &str) -> Result<CheckSuiteList> {
        let url = self.url(&[
            "repos",
            &repo.owner,
            &repo.name,
            "commits",
            sha,
            "check-suites",
        ])?;
        Ok(self
            .get_json(url, &format!("check suites of {sha}"))
            .await?)
    }

    async fn required_status_checks(
        &self,
        repo: &RepoId,
        branch: &str,
    ) -> Result<RequiredStatusChecks> {
        let url = self.url(&[
            "repos",
            &repo.owner,
            &repo.name,
            "branches",
            branch,
            "protection",
            "required_status_checks",
        ])?;
        match self
            .get_json(url, &format!("required status checks of {branch}"))
            .await
        {
            // An unprotected branch has no required checks.
            Err(ApiError::NotFound { .. }) => Ok(RequiredStatusChecks { strict: false }),
            other => Ok(other?),
        }
    }

    async fn compare(&self, repo: &RepoId, base: &str, head: &str) -> Result<Comparison> {
        let url = self.url(&[
            "repos",
            &repo.owner,
            &repo.name,
            "compare",
            &format!("{base}...{head}"),
        ])?;
        Ok(self
            .get_json(url, &format!("comparison {base}...{head}"))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> GitHubClient {
        GitHubClient::new(&Github {
            user: "acme".to_string(),
            token: SecretString::from("test-token".to_string()),
            base_url: "https://api.github.com".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_client_rejects_invalid_base_url() {
        let result = GitHubClient::new(&Github {
            user: "acme".to_string(),
            token: SecretString::from("t".to_string()),
            base_url: "not a url".to_string(),
        });
        assert!(matches!(result, Err(ApiError::ParseError { .. })));
    }

    #[test]
    fn test_url_percent_encodes_segments() {
        let client = test_client();
        let url = client
            .url(&["repos", "acme", "webapp", "issues", "1", "labels", "bot/no-merge"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/acme/webapp/issues/1/labels/bot%2Fno-merge"
        );
    }

    #[test]
    fn test_compare_ref_is_single_segment() {
        let client = test_client();
        let url = client
            .url(&["repos", "acme", "webapp", "compare", "master...user:feature"])
            .unwrap();
        assert!(url.path().ends_with("/compare/master...user:feature"));
    }
}
