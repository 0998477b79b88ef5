//! Webhook payload parsing

use serde::Deserialize;

/// The parts of a push notification the pipeline needs.
///
/// Accepts a bare `{"repoURL": "..."}` body as well as GitHub/Gitea-style
/// push events carrying `repository.clone_url` or `repository.url`.
#[derive(Debug, Default, Deserialize)]
pub struct PushPayload {
    #[serde(rename = "repoURL")]
    pub repo_url: Option<String>,
    pub repository: Option<RepositoryInfo>,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub after: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RepositoryInfo {
    pub clone_url: Option<String>,
    pub url: Option<String>,
    pub full_name: Option<String>,
}

impl PushPayload {
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// First usable repository URL, in order `repoURL`,
    /// `repository.clone_url`, `repository.url`.
    pub fn repository_url(&self) -> Option<&str> {
        let repository = self.repository.as_ref();
        [
            self.repo_url.as_deref(),
            repository.and_then(|r| r.clone_url.as_deref()),
            repository.and_then(|r| r.url.as_deref()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|url| is_usable_url(url))
    }

    /// Branch name of the pushed ref, if any.
    pub fn branch(&self) -> Option<&str> {
        self.git_ref
            .as_deref()
            .map(|r| r.strip_prefix("refs/heads/").unwrap_or(r))
    }

    /// `owner/name` of the pushed repository, when the sender includes it.
    pub fn repository_name(&self) -> Option<&str> {
        self.repository.as_ref()?.full_name.as_deref()
    }

    /// Commit id the ref points to after the push.
    pub fn head_commit(&self) -> Option<&str> {
        self.after.as_deref()
    }
}

fn is_usable_url(url: &str) -> bool {
    !url.is_empty() && !url.starts_with('-') && !url.chars().any(char::is_whitespace)
}

/// Extract the repository URL from a raw webhook body.
pub fn parse_repo_url(body: &[u8]) -> Option<String> {
    PushPayload::parse(body)
        .ok()?
        .repository_url()
        .map(str::to_string)
}
