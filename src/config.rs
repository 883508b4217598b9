//! Configuration management for mergeq.
//!
//! This module handles loading the TOML configuration file, applying
//! per-repository defaults and validating required fields. The GitHub
//! token may come from the file or from the `GITHUB_TOKEN` environment
//! variable.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mergeq::config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("mergeq.toml")).unwrap();
//! println!("processing as {}", config.github.user);
//! ```

use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Known merge method policy values.
const MERGE_METHODS: [&str; 4] = ["squash", "merge", "rebase", "ff"];

/// Known squash commit-message policy values.
const COMMIT_MESSAGES: [&str; 4] = ["empty", "github", "description", "co-authors"];

/// GitHub connection settings.
#[derive(Debug, Clone)]
pub struct Github {
    /// The user or organization whose pull requests are searched.
    pub user: String,
    /// Access token used for API calls and HTTPS clones.
    pub token: SecretString,
    /// API base URL, overridable for GitHub Enterprise.
    pub base_url: String,
}

/// Git identity and transport settings for local operations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Git {
    /// Committer email configured in working clones.
    pub email: String,
    /// Committer name configured in working clones.
    pub user_name: String,
    /// Clone over SSH instead of HTTPS.
    pub ssh: bool,
}

/// HTTP trigger server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Server {
    /// Listen port.
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self { port: 80 }
    }
}

/// The marker-label vocabulary encoding queue state on the platform.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Markers {
    /// Reduced-approval-threshold flag.
    pub light_review: String,
    /// Queue-entry label.
    pub need_merge: String,
    /// Cooperative mutex marking the PR currently being advanced.
    pub merge_in_progress: String,
    /// Prefix of merge-method override labels.
    pub merge_method_prefix: String,
    /// Prefix of retry-counter labels.
    pub merge_retry_prefix: String,
    /// Human-escalation flag.
    pub need_human_merge: String,
    /// Exemption flag: never touch this PR.
    pub no_merge: String,
    /// Exemption flag: never rewrite this branch.
    pub merge_no_rebase: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            light_review: "bot/light-review".to_string(),
            need_merge: "status/3-needs-merge".to_string(),
            merge_in_progress: "status/4-merge-in-progress".to_string(),
            merge_method_prefix: "bot/merge-method-".to_string(),
            merge_retry_prefix: "bot/merge-retry-".to_string(),
            need_human_merge: "bot/need-human-merge".to_string(),
            no_merge: "bot/no-merge".to_string(),
            merge_no_rebase: "bot/merge-no-rebase".to_string(),
        }
    }
}

/// Retry policy for transient failures.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Retry {
    /// Seconds a retry-labeled PR must rest before re-attempting.
    pub interval: u64,
    /// Maximum retry attempts before escalating; `0` disables retries.
    pub number: u32,
    /// Whether merge-conflict failures are retried.
    pub on_mergeable: bool,
    /// Whether CI failures are retried.
    pub on_statuses: bool,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            interval: 60,
            number: 0,
            on_mergeable: false,
            on_statuses: false,
        }
    }
}

/// CI aggregation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Checks {
    /// Check-suite apps ignored during aggregation (case-insensitive).
    pub ignored_apps: Vec<String>,
}

impl Default for Checks {
    fn default() -> Self {
        Self {
            ignored_apps: vec!["dependabot".to_string()],
        }
    }
}

/// Miscellaneous runtime settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Extra {
    /// Log and skip every mutation.
    pub dry_run: bool,
    /// Log level (`trace`..`error`).
    pub log_level: String,
    /// Log format (`text` or `json`).
    pub log_format: String,
    /// Optional log file path; stderr when absent.
    pub log_file: Option<PathBuf>,
}

impl Default for Extra {
    fn default() -> Self {
        Self {
            dry_run: true,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            log_file: None,
        }
    }
}

/// Resolved per-repository policy.
///
/// Every field has a value: repository sections only carry overrides and
/// fall back to the `[default]` table at load time.
#[derive(Debug, Clone)]
pub struct RepoPolicy {
    /// Default merge method (`squash`, `merge`, `rebase`, `ff`).
    pub merge_method: String,
    /// Required approvals under the light-review label; `0` disables the
    /// light path.
    pub min_light_review: u32,
    /// Required approvals.
    pub min_review: u32,
    /// Whether a milestone is mandatory.
    pub need_milestone: bool,
    /// Derive the up-to-date requirement from branch protection.
    pub check_need_up_to_date: bool,
    /// Force the up-to-date requirement regardless of branch protection.
    pub force_need_up_to_date: bool,
    /// Surface failures as PR comments even on public repositories.
    pub add_error_in_comment: bool,
    /// Squash commit-message strategy
    /// (`empty`, `github`, `description`, `co-authors`).
    pub commit_message: String,
}

/// Raw per-repository overrides as they appear in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepoOverrides {
    merge_method: Option<String>,
    min_light_review: Option<u32>,
    min_review: Option<u32>,
    need_milestone: Option<bool>,
    check_need_up_to_date: Option<bool>,
    force_need_up_to_date: Option<bool>,
    add_error_in_comment: Option<bool>,
    commit_message: Option<String>,
}

impl RepoOverrides {
    /// Resolves the overrides against the global default policy.
    fn resolve(&self, default: &RepoPolicy) -> RepoPolicy {
        RepoPolicy {
            merge_method: self
                .merge_method
                .clone()
                .unwrap_or_else(|| default.merge_method.clone()),
            min_light_review: self.min_light_review.unwrap_or(default.min_light_review),
            min_review: self.min_review.unwrap_or(default.min_review),
            need_milestone: self.need_milestone.unwrap_or(default.need_milestone),
            check_need_up_to_date: self
                .check_need_up_to_date
                .unwrap_or(default.check_need_up_to_date),
            force_need_up_to_date: self
                .force_need_up_to_date
                .unwrap_or(default.force_need_up_to_date),
            add_error_in_comment: self
                .add_error_in_comment
                .unwrap_or(default.add_error_in_comment),
            commit_message: self
                .commit_message
                .clone()
                .unwrap_or_else(|| default.commit_message.clone()),
        }
    }
}

/// Shape of the configuration file before resolution.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    github: GithubFile,
    git: Git,
    server: Server,
    markers: Markers,
    retry: Retry,
    checks: Checks,
    extra: Extra,
    default: RepoOverrides,
    repositories: HashMap<String, RepoOverrides>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct GithubFile {
    user: String,
    token: Option<String>,
    base_url: Option<String>,
}

/// The resolved application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// GitHub connection settings.
    pub github: Github,
    /// Git identity and transport settings.
    pub git: Git,
    /// HTTP trigger server settings.
    pub server: Server,
    /// Marker-label vocabulary.
    pub markers: Markers,
    /// Retry policy.
    pub retry: Retry,
    /// CI aggregation settings.
    pub checks: Checks,
    /// Miscellaneous runtime settings.
    pub extra: Extra,
    /// Global default repository policy.
    pub default: RepoPolicy,
    /// Per-repository overrides, keyed by `owner/name`, already resolved
    /// against the default policy.
    pub repositories: HashMap<String, RepoPolicy>,
}

impl Config {
    /// Loads and validates the configuration from a TOML file.
    ///
    /// The GitHub token falls back to the `GITHUB_TOKEN` environment
    /// variable when absent from the file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|err| ConfigError::FileReadError {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

        let file: ConfigFile = toml::from_str(&raw).map_err(|err| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

        Self::from_file(file)
    }

    /// Returns the default configuration path under the user config
    /// directory (`$XDG_CONFIG_HOME/mergeq/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mergeq").join("config.toml"))
    }

    /// Resolves the policy for a repository, falling back to the global
    /// default when the repository has no section of its own.
    pub fn repo_policy(&self, full_name: &str) -> RepoPolicy {
        self.repositories
            .get(full_name)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let token = match file.github.token {
            Some(token) if !token.is_empty() => token,
            _ => std::env::var("GITHUB_TOKEN").unwrap_or_default(),
        };

        let default_policy = file.default.resolve(&RepoPolicy::builtin_default());

        let repositories = file
            .repositories
            .iter()
            .map(|(name, overrides)| (name.clone(), overrides.resolve(&default_policy)))
            .collect();

        let config = Self {
            github: Github {
                user: file.github.user,
                token: SecretString::from(token),
                base_url: file
                    .github
                    .base_url
                    .unwrap_or_else(|| "https://api.github.com".to_string()),
            },
            git: file.git,
            server: file.server,
            markers: file.markers,
            retry: file.retry,
            checks: file.checks,
            extra: file.extra,
            default: default_policy,
            repositories,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("github.user", &self.github.user),
            ("git.email", &self.git.email),
            ("git.user_name", &self.git.user_name),
            ("markers.need_merge", &self.markers.need_merge),
            ("markers.merge_in_progress", &self.markers.merge_in_progress),
            ("markers.light_review", &self.markers.light_review),
            (
                "markers.merge_method_prefix",
                &self.markers.merge_method_prefix,
            ),
            (
                "markers.merge_retry_prefix",
                &self.markers.merge_retry_prefix,
            ),
            ("markers.need_human_merge", &self.markers.need_human_merge),
            ("markers.no_merge", &self.markers.no_merge),
            ("markers.merge_no_rebase", &self.markers.merge_no_rebase),
        ];

        for (field, value) in required {
            if value.is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: field.to_string(),
                });
            }
        }

        Self::validate_policy("default", &self.default)?;
        for (name, policy) in &self.repositories {
            Self::validate_policy(&format!("repositories.\"{name}\""), policy)?;
        }

        Ok(())
    }

    fn validate_policy(section: &str, policy: &RepoPolicy) -> Result<(), ConfigError> {
        if !MERGE_METHODS.contains(&policy.merge_method.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: format!("{section}.merge_method"),
                message: format!(
                    "{} is not one of {}",
                    policy.merge_method,
                    MERGE_METHODS.join(", ")
                ),
            });
        }

        if !COMMIT_MESSAGES.contains(&policy.commit_message.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: format!("{section}.commit_message"),
                message: format!(
                    "{} is not one of {}",
                    policy.commit_message,
                    COMMIT_MESSAGES.join(", ")
                ),
            });
        }

        Ok(())
    }
}

impl RepoPolicy {
    /// The built-in policy applied when the `[default]` table is absent.
    fn builtin_default() -> Self {
        Self {
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
}
