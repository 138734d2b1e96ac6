//! Repository-scoped GitHub REST client.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, error, info};

use tofubot_core::{Label, LabelSpec};

use crate::middleware::RequestTracing;
use crate::store::{CommentSink, LabelStore};
use crate::webhook::PullRequest;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const API_VERSION: &str = "2022-11-28";
const PER_PAGE: usize = 100;

/// An `owner/name` repository identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{0}` is not a repository identifier (expected owner/name)")]
pub struct InvalidRepoId(pub String);

impl FromStr for RepoId {
    type Err = InvalidRepoId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(InvalidRepoId(s.to_string())),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid API base URL `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("failed to build HTTP client ({0})")]
    Build(reqwest::Error),

    #[error("failed to encode request body ({0})")]
    Encode(serde_json::Error),

    #[error("failed to send request to {url} ({error})")]
    Transport {
        url: String,
        error: reqwest_middleware::Error,
    },

    #[error("failed to send request to {url} (invalid status code: {status}): {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("failed to decode response from {url} ({error})")]
    Decode {
        url: String,
        error: reqwest::Error,
    },
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// GitHub answers 422 with an `already_exists` error code when a label
    /// with the same name is already defined.
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            ClientError::Status { status, body, .. }
                if *status == StatusCode::UNPROCESSABLE_ENTITY && body.contains("already_exists")
        )
    }
}

#[derive(Debug, Serialize)]
struct CreateCommentRequest<'a> {
    body: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub body: String,
}

#[derive(Debug, Serialize)]
struct AddLabelsRequest<'a> {
    labels: &'a [String],
}

#[derive(Debug, Serialize)]
struct CreateLabelRequest<'a> {
    name: &'a str,
    color: &'a str,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct CreatePullRequestRequest<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFilter {
    Open,
    Closed,
    All,
}

impl StateFilter {
    fn as_str(self) -> &'static str {
        match self {
            StateFilter::Open => "open",
            StateFilter::Closed => "closed",
            StateFilter::All => "all",
        }
    }
}

/// Filters for listing pull requests. `head` takes the `owner:branch` form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPullRequests {
    pub state: Option<StateFilter>,
    pub head: Option<String>,
    pub base: Option<String>,
}

impl ListPullRequests {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(state) = self.state {
            query.push(("state", state.as_str().to_string()));
        }
        if let Some(head) = &self.head {
            query.push(("head", head.clone()));
        }
        if let Some(base) = &self.base {
            query.push(("base", base.clone()));
        }
        query
    }
}

#[derive(Clone)]
pub struct GitHubClient {
    client: ClientWithMiddleware,
    base_url: Url,
    token: String,
    repo: RepoId,
}

impl fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url.as_str())
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    pub fn new(api_url: &str, token: impl Into<String>, repo: RepoId) -> Result<Self, ClientError> {
        Self::with_tracing(api_url, token, repo, RequestTracing::new())
    }

    pub fn with_tracing(
        api_url: &str,
        token: impl Into<String>,
        repo: RepoId,
        tracing: RequestTracing,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(api_url).map_err(|e| ClientError::InvalidBaseUrl {
            url: api_url.to_string(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl {
                url: api_url.to_string(),
                reason: "URL cannot carry a path".to_string(),
            });
        }

        Ok(Self {
            client: create_github_client(tracing)?,
            base_url,
            token: token.into(),
            repo,
        })
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    /// `{base}/repos/{owner}/{name}/{segments...}`, each segment percent-encoded.
    ///
    /// Label names contain `/`, which must stay inside one segment
    /// (`backport/v1.2` becomes `backport%2Fv1.2`).
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: "URL cannot carry a path".to_string(),
            })?
            // Keeps an enterprise prefix such as `/api/v3`.
            .pop_if_empty()
            .push("repos")
            .push(&self.repo.owner)
            .push(&self.repo.name)
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        self.client
            .request(method, url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    fn with_json<B: Serialize>(builder: RequestBuilder, body: &B) -> Result<RequestBuilder, ClientError> {
        Ok(builder
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(body).map_err(ClientError::Encode)?))
    }

    async fn send(&self, builder: RequestBuilder, url: &Url) -> Result<Response, ClientError> {
        let response = builder
            .send()
            .await
            .map_err(|error| ClientError::Transport {
                url: url.to_string(),
                error,
            })?;

        let status = response.status();
        if !status.is_success() {
            // The body carries GitHub's error codes; see `is_already_exists`.
            let body = response.text().await.unwrap_or_default();
            error!("GitHub API error: {} - {}", status, body);
            return Err(ClientError::Status {
                url: url.to_string(),
                status,
                body,
            });
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        url: &Url,
    ) -> Result<T, ClientError> {
        self.send(builder, url)
            .await?
            .json()
            .await
            .map_err(|error| ClientError::Decode {
                url: url.to_string(),
                error,
            })
    }

    /// GET every page of a list endpoint.
    async fn get_all<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&'static str, String)],
    ) -> Result<Vec<T>, ClientError> {
        let url = self.endpoint(segments)?;
        let mut items = Vec::new();

        for page in 1u32.. {
            let builder = self
                .request(Method::GET, &url)
                .query(query)
                .query(&[("per_page", PER_PAGE.to_string()), ("page", page.to_string())]);
            let batch: Vec<T> = self.send_json(builder, &url).await?;
            // A short page is the last one; no Link header parsing needed.
            let last_page = batch.len() < PER_PAGE;
            items.extend(batch);
            if last_page {
                break;
            }
        }

        Ok(items)
    }

    pub async fn create_comment(&self, issue_number: u64, body: &str) -> Result<Comment, ClientError> {
        let number = issue_number.to_string();
        let url = self.endpoint(&["issues", &number, "comments"])?;
        info!("Posting comment to #{} in {}", issue_number, self.repo);

        let builder = Self::with_json(
            self.request(Method::POST, &url),
            &CreateCommentRequest { body },
        )?;
        let comment: Comment = self.send_json(builder, &url).await?;
        info!("Successfully posted comment with ID: {}", comment.id);
        Ok(comment)
    }

    /// Add labels to an issue; returns the issue's full label set afterwards.
    pub async fn add_labels(&self, issue_number: u64, labels: &[String]) -> Result<Vec<Label>, ClientError> {
        let number = issue_number.to_string();
        let url = self.endpoint(&["issues", &number, "labels"])?;
        info!("Adding labels {:?} to #{}", labels, issue_number);

        let builder = Self::with_json(
            self.request(Method::POST, &url),
            &AddLabelsRequest { labels },
        )?;
        self.send_json(builder, &url).await
    }

    pub async fn get_labels(&self, issue_number: u64) -> Result<Vec<Label>, ClientError> {
        let number = issue_number.to_string();
        self.get_all(&["issues", &number, "labels"], &[]).await
    }

    pub async fn remove_label(&self, issue_number: u64, name: &str) -> Result<(), ClientError> {
        let number = issue_number.to_string();
        let url = self.endpoint(&["issues", &number, "labels", name])?;
        info!("Removing label {} from #{}", name, issue_number);

        self.send(self.request(Method::DELETE, &url), &url).await?;
        Ok(())
    }

    pub async fn create_label(
        &self,
        name: &str,
        color: &str,
        description: &str,
    ) -> Result<Label, ClientError> {
        let url = self.endpoint(&["labels"])?;
        info!("Creating label {} in {}", name, self.repo);

        let builder = Self::with_json(
            self.request(Method::POST, &url),
            &CreateLabelRequest {
                name,
                color,
                description,
            },
        )?;
        self.send_json(builder, &url).await
    }

    pub async fn list_labels(&self) -> Result<Vec<Label>, ClientError> {
        let labels: Vec<Label> = self.get_all(&["labels"], &[]).await?;
        debug!("Repository {} has {} labels", self.repo, labels.len());
        Ok(labels)
    }

    pub async fn list_pull_requests(
        &self,
        params: &ListPullRequests,
    ) -> Result<Vec<PullRequest>, ClientError> {
        self.get_all(&["pulls"], &params.query()).await
    }

    pub async fn create_pull_request(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest, ClientError> {
        let url = self.endpoint(&["pulls"])?;
        info!("Opening pull request {} -> {} in {}", head, base, self.repo);

        let builder = Self::with_json(
            self.request(Method::POST, &url),
            &CreatePullRequestRequest {
                title,
                body,
                head,
                base,
            },
        )?;
        let pr: PullRequest = self.send_json(builder, &url).await?;
        info!("Opened pull request #{}", pr.number);
        Ok(pr)
    }
}

pub fn create_github_client(tracing: RequestTracing) -> Result<ClientWithMiddleware, ClientError> {
    let client = Client::builder()
        .user_agent(concat!("tofubot/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(ClientError::Build)?;

    Ok(ClientBuilder::new(client).with(tracing).build())
}

#[async_trait]
impl LabelStore for GitHubClient {
    async fn repository_labels(&self) -> Result<Vec<Label>, ClientError> {
        self.list_labels().await
    }

    async fn issue_labels(&self, issue_number: u64) -> Result<Vec<Label>, ClientError> {
        self.get_labels(issue_number).await
    }

    async fn add_label(&self, issue_number: u64, name: &str) -> Result<(), ClientError> {
        self.add_labels(issue_number, &[name.to_string()]).await?;
        Ok(())
    }

    async fn remove_label(&self, issue_number: u64, name: &str) -> Result<(), ClientError> {
        GitHubClient::remove_label(self, issue_number, name).await
    }

    async fn create_label(&self, spec: &LabelSpec) -> Result<Label, ClientError> {
        GitHubClient::create_label(self, &spec.name, &spec.color, &spec.description).await
    }
}

#[async_trait]
impl CommentSink for GitHubClient {
    async fn create_comment(&self, issue_number: u64, body: &str) -> Result<(), ClientError> {
        GitHubClient::create_comment(self, issue_number, body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_url: &str) -> GitHubClient {
        GitHubClient::new(api_url, "token", "opentofu/opentofu".parse().unwrap()).unwrap()
    }

    #[test]
    fn test_repo_id_parse() {
        let repo: RepoId = "opentofu/opentofu".parse().unwrap();
        assert_eq!(repo.owner, "opentofu");
        assert_eq!(repo.name, "opentofu");
        assert_eq!(repo.to_string(), "opentofu/opentofu");

        for bad in ["", "opentofu", "/opentofu", "opentofu/", "a/b/c"] {
            assert!(bad.parse::<RepoId>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_endpoint_encodes_label_names() {
        let url = client(DEFAULT_API_URL)
            .endpoint(&["issues", "12", "labels", "backport/v1.2"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/opentofu/opentofu/issues/12/labels/backport%2Fv1.2"
        );
    }

    #[test]
    fn test_endpoint_keeps_enterprise_path_prefix() {
        let url = client("https://github.example.com/api/v3")
            .endpoint(&["labels"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://github.example.com/api/v3/repos/opentofu/opentofu/labels"
        );
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        let repo: RepoId = "opentofu/opentofu".parse().unwrap();
        assert!(matches!(
            GitHubClient::new("not a url", "t", repo.clone()),
            Err(ClientError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            GitHubClient::new("mailto:bot@example.com", "t", repo),
            Err(ClientError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_is_already_exists() {
        let exists = ClientError::Status {
            url: "u".into(),
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: r#"{"message":"Validation Failed","errors":[{"resource":"Label","code":"already_exists","field":"name"}]}"#.into(),
        };
        assert!(exists.is_already_exists());

        let other_validation = ClientError::Status {
            url: "u".into(),
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: r#"{"errors":[{"code":"invalid","field":"color"}]}"#.into(),
        };
        assert!(!other_validation.is_already_exists());

        let server = ClientError::Status {
            url: "u".into(),
            status: StatusCode::BAD_GATEWAY,
            body: "already_exists".into(),
        };
        assert!(!server.is_already_exists());
    }

    #[test]
    fn test_transport_error_chain_names_cause_once() {
        let err = ClientError::Transport {
            url: "https://api.github.com/repos/opentofu/opentofu/labels".into(),
            error: reqwest_middleware::Error::Middleware(anyhow::anyhow!("connection reset")),
        };
        let chain = format!("{:#}", anyhow::Error::new(err).context("failed to list labels"));
        assert_eq!(chain.matches("connection reset").count(), 1, "{chain}");
        assert!(chain.starts_with("failed to list labels: failed to send request to"));
    }

    #[test]
    fn test_list_pull_requests_query() {
        let params = ListPullRequests {
            state: Some(StateFilter::Open),
            head: Some("opentofu:backport/12-v1.2".to_string()),
            base: None,
        };
        assert_eq!(
            params.query(),
            vec![
                ("state", "open".to_string()),
                ("head", "opentofu:backport/12-v1.2".to_string())
            ]
        );
        assert!(ListPullRequests::default().query().is_empty());
    }
}
