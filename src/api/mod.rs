//! GitHub API client module.
//!
//! This module provides the hosting-platform interface the decision engine
//! consumes: operation traits, a search-query builder and the REST client
//! implementation.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mergeq::api::{GitHubClient, search::QueryBuilder};
//! use mergeq::api::traits::IssueOperations;
//! use mergeq::config::Github;
//! use secrecy::SecretString;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GitHubClient::new(&Github {
//!     user: "acme".to_string(),
//!     token: SecretString::from("token".to_string()),
//!     base_url: "https://api.github.com".to_string(),
//! })?;
//!
//! let query = QueryBuilder::for_user("acme")
//!     .with_label("status/3-needs-merge")
//!     .build();
//! let issues = client.search_issues(&query).await?;
//! println!("Found {} pull requests", issues.len());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod search;
pub mod traits;

pub use client::GitHubClient;
