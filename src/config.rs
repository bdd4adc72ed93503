//! Runtime configuration.
//!
//! Values come from `ISPDESK_*` environment variables; command-line flags override them.
//! Only the backend URL is mandatory. The identity and document endpoints default to the
//! public hosted services.

use crate::error::{AppError, AppResult};

pub const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";
pub const DEFAULT_DOCUMENTS_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_ROLE_COLLECTION: &str = "users";

/// (flag, environment variable) pairs, in the order printed by `--help`.
pub const SETTINGS: &[(&str, &str)] = &[
    ("--api-url", "ISPDESK_API_URL"),
    ("--api-key", "ISPDESK_API_KEY"),
    ("--identity-url", "ISPDESK_IDENTITY_URL"),
    ("--token-url", "ISPDESK_TOKEN_URL"),
    ("--documents-url", "ISPDESK_DOCUMENTS_URL"),
    ("--project-id", "ISPDESK_PROJECT_ID"),
    ("--role-collection", "ISPDESK_ROLE_COLLECTION"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    pub api_key: Option<String>,
    pub identity_url: String,
    pub token_url: String,
    pub documents_url: String,
    pub project_id: Option<String>,
    pub role_collection: String,
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        if let Some(v) = args[i].strip_prefix(flag).and_then(|rest| rest.strip_prefix('=')) {
            return Some(v.to_string());
        }
        i += 1;
    }
    None
}

fn non_empty(v: Option<String>) -> Option<String> { v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) }

impl Config {
    /// Build from an arbitrary variable lookup and argument list. Flags win over variables.
    pub fn from_lookup<F>(lookup: F, args: &[String]) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |flag: &str, var: &str| non_empty(parse_str_arg(args, flag)).or_else(|| non_empty(lookup(var)));
        let api_url = get("--api-url", "ISPDESK_API_URL")
            .ok_or_else(|| AppError::user("missing_api_url", "ISPDESK_API_URL (or --api-url) must be set"))?;
        Ok(Self {
            api_url,
            api_key: get("--api-key", "ISPDESK_API_KEY"),
            identity_url: get("--identity-url", "ISPDESK_IDENTITY_URL").unwrap_or_else(|| DEFAULT_IDENTITY_URL.into()),
            token_url: get("--token-url", "ISPDESK_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.into()),
            documents_url: get("--documents-url", "ISPDESK_DOCUMENTS_URL").unwrap_or_else(|| DEFAULT_DOCUMENTS_URL.into()),
            project_id: get("--project-id", "ISPDESK_PROJECT_ID"),
            role_collection: get("--role-collection", "ISPDESK_ROLE_COLLECTION")
                .unwrap_or_else(|| DEFAULT_ROLE_COLLECTION.into()),
        })
    }

    pub fn from_env_and_args(args: &[String]) -> AppResult<Self> { Self::from_lookup(|k| std::env::var(k).ok(), args) }

    /// Root of the document tree for the configured project.
    pub fn documents_base(&self) -> AppResult<String> {
        let project = self
            .project_id
            .as_deref()
            .ok_or_else(|| AppError::user("missing_project_id", "ISPDESK_PROJECT_ID (or --project-id) must be set"))?;
        Ok(format!(
            "{}/projects/{}/databases/(default)/documents",
            self.documents_url.trim_end_matches('/'),
            project
        ))
    }

    pub fn require_api_key(&self) -> AppResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AppError::user("missing_api_key", "ISPDESK_API_KEY (or --api-key) must be set"))
    }

    /// One-line description for the startup banner. The key is never printed.
    pub fn redacted_summary(&self) -> String {
        format!(
            "api_url='{}', api_key={}, identity_url='{}', documents_url='{}', project={}, collection='{}'",
            self.api_url,
            if self.api_key.is_some() { "<set>" } else { "<unset>" },
            self.identity_url,
            self.documents_url,
            self.project_id.as_deref().unwrap_or("<unset>"),
            self.role_collection
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    fn args(a: &[&str]) -> Vec<String> { a.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn flags_override_environment() {
        let cfg = Config::from_lookup(
            env(&[("ISPDESK_API_URL", "http://env"), ("ISPDESK_API_KEY", "k1"), ("ISPDESK_PROJECT_ID", "isp")]),
            &args(&["--api-url", "http://flag", "--role-collection=staff"]),
        )
        .unwrap();
        assert_eq!(cfg.api_url, "http://flag");
        assert_eq!(cfg.api_key.as_deref(), Some("k1"));
        assert_eq!(cfg.role_collection, "staff");
        assert_eq!(cfg.identity_url, DEFAULT_IDENTITY_URL);
        assert_eq!(
            cfg.documents_base().unwrap(),
            "https://firestore.googleapis.com/v1/projects/isp/databases/(default)/documents"
        );
    }

    #[test]
    fn api_url_is_required() {
        let err = Config::from_lookup(env(&[("ISPDESK_API_URL", "  ")]), &[]).unwrap_err();
        assert_eq!(err.code_str(), "missing_api_url");
    }

    #[test]
    fn summary_hides_key() {
        let cfg = Config::from_lookup(env(&[("ISPDESK_API_URL", "http://x"), ("ISPDESK_API_KEY", "secret")]), &[]).unwrap();
        assert!(!cfg.redacted_summary().contains("secret"));
        assert!(cfg.documents_base().is_err());
    }
}
